//! USB HID gamepad output (C8): wraps an embassy-usb HID writer and
//! packs [`ControllerState`] into the wire-format 7-byte IN report.

use embassy_usb::class::hid::{HidWriter, ReportId, RequestHandler, State};
use embassy_usb::control::OutResponse;
use embassy_usb::Builder;
use swicc_proto::ControllerState;

/// HID report size: 2 buttons bytes + 1 hat/padding byte + 4 stick bytes.
pub const REPORT_SIZE: usize = 7;

/// Gamepad HID report descriptor.
///
/// 16 buttons, a hat switch with null state (reported value `8` means
/// centered/released — exactly [`swicc_proto::HAT_NEUTRAL`]), and four
/// unsigned 8-bit stick axes. Unlike the teacher's xinput/standard-hid
/// pair, there is only one descriptor here: this protocol has no
/// alternate report shape to switch between.
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Gamepad)
    0xA1, 0x01, // Collection (Application)
    //
    // --- Buttons (16 buttons) ---
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (Button 1)
    0x29, 0x10, //   Usage Maximum (Button 16)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x95, 0x10, //   Report Count (16)
    0x75, 0x01, //   Report Size (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Hat switch (4 bits, null state at value 8) ---
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x09, 0x39, //   Usage (Hat Switch)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x07, //   Logical Maximum (7)
    0x35, 0x00, //   Physical Minimum (0)
    0x46, 0x3B, 0x01, //   Physical Maximum (315)
    0x75, 0x04, //   Report Size (4)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x42, //   Input (Data, Variable, Absolute, Null State)
    //
    // --- Hat switch padding (4 bits) ---
    0x75, 0x04, //   Report Size (4)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x01, //   Input (Constant, Array, Absolute)
    //
    // --- Sticks (4 unsigned axes) ---
    0x09, 0x30, //   Usage (X)
    0x09, 0x31, //   Usage (Y)
    0x09, 0x32, //   Usage (Z)
    0x09, 0x35, //   Usage (Rz)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x04, //   Report Count (4)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    0xC0, // End Collection
];

/// Pack a [`ControllerState`] into the HID report bytes: hat is split
/// into its low nibble plus a zeroed padding nibble, matching the
/// descriptor above; everything else matches
/// [`ControllerState::to_report_bytes`].
#[must_use]
pub fn pack_report(state: ControllerState) -> [u8; REPORT_SIZE] {
    let b = state.to_report_bytes();
    [b[0], b[1], state.hat & 0x0F, b[3], b[4], b[5], b[6]]
}

/// USB HID gamepad output: wraps an embassy-usb HID writer.
pub struct UsbHidOutput<'d> {
    writer: HidWriter<'d, embassy_rp::usb::Driver<'d, embassy_rp::peripherals::USB>, REPORT_SIZE>,
    ready: bool,
}

impl<'d> UsbHidOutput<'d> {
    pub fn new(
        writer: HidWriter<'d, embassy_rp::usb::Driver<'d, embassy_rp::peripherals::USB>, REPORT_SIZE>,
    ) -> Self {
        Self {
            writer,
            ready: false,
        }
    }

    /// Wait until the device is ready (USB enumerated).
    pub async fn wait_ready(&mut self) {
        self.writer.ready().await;
        self.ready = true;
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Send one controller state, dropping (not retrying) on a write
    /// error, the same as the UART side silently drops replies it
    /// cannot flush.
    pub async fn send(&mut self, state: ControllerState) -> Result<(), embassy_usb::driver::EndpointError> {
        let bytes = pack_report(state);
        self.writer.write(&bytes).await
    }
}

/// HID request handler. This protocol has no OUT reports or features to
/// serve, so every hook is a no-op, as in the teacher's own handler.
pub struct GamepadRequestHandler;

impl RequestHandler for GamepadRequestHandler {
    fn get_report(&mut self, _id: ReportId, _buf: &mut [u8]) -> Option<usize> {
        None
    }

    fn set_report(&mut self, _id: ReportId, _data: &[u8]) -> OutResponse {
        OutResponse::Accepted
    }

    fn set_idle_ms(&mut self, _id: Option<ReportId>, _duration_ms: u32) {}

    fn get_idle_ms(&mut self, _id: Option<ReportId>) -> Option<u32> {
        None
    }
}

/// Configure the USB HID class in the USB builder, returning the HID
/// writer for the output task to drive.
pub fn configure_usb_hid<'d>(
    builder: &mut Builder<'d, embassy_rp::usb::Driver<'d, embassy_rp::peripherals::USB>>,
    state: &'d mut State<'d>,
) -> HidWriter<'d, embassy_rp::usb::Driver<'d, embassy_rp::peripherals::USB>, REPORT_SIZE> {
    let config = embassy_usb::class::hid::Config {
        report_descriptor: REPORT_DESCRIPTOR,
        request_handler: None,
        poll_ms: 1,
        max_packet_size: REPORT_SIZE as u16,
        hid_subclass: embassy_usb::class::hid::HidSubclass::No,
        hid_boot_protocol: embassy_usb::class::hid::HidBootProtocol::None,
    };

    embassy_usb::class::hid::HidWriter::new(builder, state, config)
}
