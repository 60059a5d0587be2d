//! Platform-agnostic playback/record/command engine for the SwiCC
//! serial-to-USB-HID bridge.
//!
//! This crate has no knowledge of UART peripherals, USB stacks, or
//! timers — it is the pure state machine those bindings drive: a
//! playback ring (`ring`), an RLE recorder (`recorder`), the serial
//! command dispatcher (`command`), and the [`engine::Engine`] that ties
//! them together behind the operations a frame tick or an incoming
//! command line performs. `firmware` supplies the hardware.
//!
//! # Features
//!
//! - `std`: Enable standard library support (for testing)
//! - `defmt`: Enable defmt formatting for embedded logging

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod command;
pub mod engine;
pub mod indicator;
pub mod mode;
pub mod recorder;
pub mod ring;

pub use command::{CommandParser, Effect, ResponseWriter};
pub use engine::Engine;
pub use indicator::heartbeat_color;
pub use mode::Mode;
pub use recorder::{Recorder, RecordingChunk, RecordingEntry};
pub use ring::PlaybackRing;
