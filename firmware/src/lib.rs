//! RP2040 firmware for the SwiCC serial-to-USB-HID gamepad bridge.
//!
//! This crate binds [`swicc_engine::Engine`] to real hardware: a UART
//! RX interrupt feeding the command parser, a frame ticker racing a
//! free-running timer against the external vsync GPIO, and a USB HID
//! writer forwarding whatever the engine reports.

#![no_std]

pub mod usb_output;

pub use usb_output::{configure_usb_hid, pack_report, GamepadRequestHandler, UsbHidOutput, REPORT_DESCRIPTOR};
