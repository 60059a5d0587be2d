//! Controller state types and hex wire codec for the SwiCC serial protocol.
//!
//! This crate is the platform-agnostic wire layer: a 7-byte
//! [`ControllerState`] snapshot and the fixed-width hex codec used to
//! read and write it on the serial link. It carries no ring buffer,
//! recorder, or command dispatch — those live in `swicc-engine`, built
//! on top of this crate the way `gamepad-core` builds on `gamepad-proto`.
//!
//! # Wire format
//!
//! Every numeric field is uppercase hex, zero-padded to a fixed width
//! (4 digits for the 16-bit button mask, 2 digits for everything else).
//! There is no checksum — framing comes from the line-oriented command
//! parser in `swicc-engine`, not from this crate.
//!
//! # No-std support
//!
//! `#![no_std]` by default, no heap allocation. Enable `std` for host
//! testing and `defmt` for embedded logging.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod hex;
pub mod types;

pub use hex::HexError;
pub use types::{Buttons, ControllerState, HAT_NEUTRAL};
