//! Serial command protocol (C7): line buffering and dispatch for the
//! ASCII command set described by the wire protocol.
//!
//! Lines are terminated by CR or LF. A `'+'` byte is a hard
//! resynchronization point: receiving one always restarts the line
//! buffer, regardless of what was collected so far. There is no other
//! way to resync — a line that never starts with `+` also never
//! dispatches, since every recognized command prefix begins with it.

use crate::engine::Engine;
use crate::recorder::CHUNK_LEN;
use swicc_proto::{hex, ControllerState};

/// Line buffer capacity. One byte less than this is usable; the last
/// slot exists only so the buffer can be indexed without a separate
/// bounds check on the final accepted byte.
const LINE_CAP: usize = 32;

/// A side effect the firmware binding layer must carry out in response
/// to a dispatched command. Everything else (ring/recorder/mode state)
/// is handled entirely inside [`Engine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    /// No hardware action required.
    None,
    /// `VSYNC 1`/`VSYNC 0`: enable or disable the external vsync edge
    /// interrupt. Disabling also means free-running ticks resume.
    SetVsyncHardware(bool),
}

/// Buffers incoming serial bytes into lines and dispatches complete
/// ones against an [`Engine`].
pub struct CommandParser {
    buf: [u8; LINE_CAP],
    len: usize,
}

impl CommandParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: [0; LINE_CAP],
            len: 0,
        }
    }

    /// Feed one received byte. Returns a dispatchable line (without the
    /// terminator) when a CR or LF completes one.
    ///
    /// The buffer is *not* cleared after a successful line — only a
    /// fresh `'+'` does that. A second command sent without a leading
    /// `'+'` therefore keeps appending after the previous one and will
    /// not match any recognized prefix, by design: framing is the
    /// caller's responsibility, not this parser's.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        match byte {
            b'+' => {
                self.len = 0;
                None
            }
            b'\r' | b'\n' => Some(&self.buf[..self.len]),
            _ => {
                if self.len < LINE_CAP - 1 {
                    self.buf[self.len] = byte;
                    self.len += 1;
                }
                None
            }
        }
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination for bytes a dispatched command writes back to the host.
/// Implementations may drop writes silently (e.g. a full UART TX FIFO);
/// the protocol has no flow control and no retries.
pub trait ResponseWriter {
    fn write_bytes(&mut self, bytes: &[u8]);
}

fn write_str(w: &mut impl ResponseWriter, s: &str) {
    w.write_bytes(s.as_bytes());
}

/// `+<header> <4-hex>\r\n`, matching every `G*` numeric query reply.
fn reply_hex16(w: &mut impl ResponseWriter, header: &str, value: u16) {
    let mut digits = [0u8; 4];
    hex::write_u16(&mut digits, value);
    write_str(w, "+");
    write_str(w, header);
    write_str(w, " ");
    w.write_bytes(&digits);
    write_str(w, "\r\n");
}

/// Parse up to 3 leading decimal digits from `s`, matching the original
/// firmware's `strtol` call capped at a 3-digit window. Non-digit bytes
/// end the scan rather than erroring; an empty leading digit is `0`.
fn parse_decimal_capped(s: &[u8]) -> u16 {
    let mut value: u16 = 0;
    for &b in s.iter().take(3) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value * 10 + u16::from(b - b'0');
    }
    value
}

/// Dispatch one complete, unterminated line against `engine`, writing
/// any reply through `writer` and returning whatever hardware side
/// effect the binding layer must additionally carry out.
pub fn dispatch(line: &[u8], engine: &mut Engine, writer: &mut impl ResponseWriter) -> Effect {
    if let Some(rest) = strip_prefix(line, b"ID ") {
        let _ = rest;
        write_str(writer, "+SwiCC \r\n");
    } else if let Some(rest) = strip_prefix(line, b"VER ") {
        let _ = rest;
        write_str(writer, "+VER 2.2\r\n");
    } else if let Some(payload) = strip_prefix(line, b"QL ") {
        // Mode switches to LAG even when the payload fails to parse,
        // matching the original firmware's caller setting `action_mode`
        // unconditionally right after `add_to_queue` returns.
        match ControllerState::from_hex_payload(payload) {
            Ok(state) => engine.enqueue_lag(state),
            Err(_) => engine.set_mode_lag(),
        }
    } else if let Some(payload) = strip_prefix(line, b"Q ") {
        match ControllerState::from_hex_payload(payload) {
            Ok(state) => engine.enqueue_play(state),
            Err(_) => engine.set_mode_play(),
        }
    } else if let Some(payload) = strip_prefix(line, b"SLAG ") {
        engine.set_lag_amount(parse_decimal_capped(payload));
    } else if let Some(payload) = strip_prefix(line, b"IMM ") {
        if let Ok(state) = ControllerState::from_hex_payload(payload) {
            engine.force_immediate(state);
        }
    } else if let Some(payload) = strip_prefix(line, b"VSD ") {
        if payload.len() >= 4 && hex::all_hex(&payload[..4]) {
            if let Ok(delay) = hex::parse_u16(&payload[..4], 4) {
                engine.set_frame_delay_us(delay);
            }
        }
    } else if let Some(payload) = strip_prefix(line, b"REC ") {
        engine.set_recording(payload.first() == Some(&b'1'));
    } else if strip_prefix(line, b"GCS ").is_some() {
        write_str(writer, if engine.usb_connected() { "+GCS 1\r\n" } else { "+GCS 0\r\n" });
    } else if strip_prefix(line, b"GQF ").is_some() {
        reply_hex16(writer, "GQF", engine.queue_fill());
    } else if strip_prefix(line, b"GRF ").is_some() {
        reply_hex16(writer, "GRF", engine.recorder().fill());
    } else if strip_prefix(line, b"GRR ").is_some() {
        reply_hex16(writer, "GRR", engine.recorder().remaining());
    } else if strip_prefix(line, b"GRB ").is_some() {
        reply_hex16(writer, "GRB", engine.recorder().total());
    } else if let Some(payload) = strip_prefix(line, b"GR ") {
        if payload.first() == Some(&b'0') {
            engine.recorder_mut().restart_stream();
        }
        send_recording_chunk(engine, writer);
    } else if let Some(payload) = strip_prefix(line, b"VSYNC ") {
        match payload.first() {
            Some(b'1') => {
                engine.enable_vsync_sync();
                return Effect::SetVsyncHardware(true);
            }
            Some(b'0') => {
                engine.disable_vsync_sync();
                return Effect::SetVsyncHardware(false);
            }
            _ => {
                write_str(writer, if engine.vsync_enabled() { "+VSYNC 1\r\n" } else { "+VSYNC 0\r\n" });
            }
        }
    } else if let Some(payload) = strip_prefix(line, b"LED ") {
        // Same "true only on '1', false otherwise" discipline as `REC`:
        // any non-'1' argument, including a missing one, forces the
        // indicator off.
        engine.set_led_on(payload.first() == Some(&b'1'));
    }
    Effect::None
}

/// Exact-prefix match, the same dispatch discipline the original
/// firmware used (`strncmp` against each recognized command in turn).
fn strip_prefix<'a>(line: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    if line.len() >= prefix.len() && &line[..prefix.len()] == prefix {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Stream up to [`CHUNK_LEN`] recording entries as `+R <payload>x<run>\r\n`
/// lines, then a closing `+GR 0\r\n` (caught up) or `+GR 1\r\n` (more
/// pending).
fn send_recording_chunk(engine: &mut Engine, writer: &mut impl ResponseWriter) {
    let chunk = engine.recorder_mut().next_chunk();
    for entry in chunk.entries.iter() {
        let mut buttons = [0u8; 4];
        hex::write_u16(&mut buttons, entry.state.buttons.raw());
        let mut hat = [0u8; 2];
        hex::write_u8(&mut hat, entry.state.hat);
        let mut lx = [0u8; 2];
        hex::write_u8(&mut lx, entry.state.lx);
        let mut ly = [0u8; 2];
        hex::write_u8(&mut ly, entry.state.ly);
        let mut rx = [0u8; 2];
        hex::write_u8(&mut rx, entry.state.rx);
        let mut ry = [0u8; 2];
        hex::write_u8(&mut ry, entry.state.ry);
        let mut run = [0u8; 2];
        hex::write_u8(&mut run, entry.run);

        write_str(writer, "+R ");
        writer.write_bytes(&buttons);
        writer.write_bytes(&hat);
        writer.write_bytes(&lx);
        writer.write_bytes(&ly);
        writer.write_bytes(&rx);
        writer.write_bytes(&ry);
        write_str(writer, "x");
        writer.write_bytes(&run);
        write_str(writer, "\r\n");
    }
    write_str(writer, if chunk.more { "+GR 1\r\n" } else { "+GR 0\r\n" });
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    struct RecordingWriter {
        out: std::vec::Vec<u8>,
    }

    impl ResponseWriter for RecordingWriter {
        fn write_bytes(&mut self, bytes: &[u8]) {
            self.out.extend_from_slice(bytes);
        }
    }

    fn run(line: &[u8]) -> (Engine, std::vec::Vec<u8>) {
        let mut engine = Engine::new();
        let mut writer = RecordingWriter { out: std::vec::Vec::new() };
        dispatch(line, &mut engine, &mut writer);
        (engine, writer.out)
    }

    #[test]
    fn id_and_version_reply_exactly() {
        let (_, out) = run(b"ID ");
        assert_eq!(out, b"+SwiCC \r\n");
        let (_, out) = run(b"VER ");
        assert_eq!(out, b"+VER 2.2\r\n");
    }

    #[test]
    fn q_enqueues_and_switches_to_play() {
        let (engine, _) = run(b"Q 000808808080");
        assert_eq!(engine.mode(), crate::mode::Mode::Play);
        assert_eq!(engine.queue_fill(), 1);
    }

    #[test]
    fn malformed_q_still_switches_mode_but_does_not_enqueue() {
        let (engine, _) = run(b"Q ZZZZZZZZZZZZZZ");
        assert_eq!(engine.mode(), crate::mode::Mode::Play);
        assert_eq!(engine.queue_fill(), 0);
    }

    #[test]
    fn malformed_ql_still_switches_mode() {
        let (engine, _) = run(b"QL ZZZZZZZZZZZZZZ");
        assert_eq!(engine.mode(), crate::mode::Mode::Lag);
    }

    #[test]
    fn led_forces_off_on_any_non_one_argument() {
        let (engine, _) = run(b"LED 0");
        assert!(!engine.led_on());
        let (engine, _) = run(b"LED ");
        assert!(!engine.led_on());
        let (engine, _) = run(b"LED 1");
        assert!(engine.led_on());
    }

    #[test]
    fn slag_caps_at_120() {
        let (engine, _) = run(b"SLAG 999");
        assert_eq!(engine.lag_amount(), 120);
    }

    #[test]
    fn vsd_sets_hex_delay() {
        let (engine, _) = run(b"VSD 1234");
        assert_eq!(engine.frame_delay_us(), 0x1234);
    }

    #[test]
    fn gqf_replies_with_four_hex_digits() {
        let mut parser = CommandParser::new();
        let mut engine = Engine::new();
        let mut writer = RecordingWriter { out: std::vec::Vec::new() };
        for &b in b"+Q 000808808080\r" {
            if let Some(line) = parser.feed(b) {
                dispatch(line, &mut engine, &mut writer);
            }
        }
        writer.out.clear();
        for &b in b"+GQF \r" {
            if let Some(line) = parser.feed(b) {
                dispatch(line, &mut engine, &mut writer);
            }
        }
        assert_eq!(writer.out, b"+GQF 0001\r\n");
    }

    #[test]
    fn vsync_toggle_returns_hardware_effect() {
        let mut engine = Engine::new();
        let mut writer = RecordingWriter { out: std::vec::Vec::new() };
        let effect = dispatch(b"VSYNC 1", &mut engine, &mut writer);
        assert_eq!(effect, Effect::SetVsyncHardware(true));
        assert!(engine.vsync_enabled());
        let effect = dispatch(b"VSYNC 0", &mut engine, &mut writer);
        assert_eq!(effect, Effect::SetVsyncHardware(false));
        assert!(!engine.vsync_enabled());
    }

    #[test]
    fn parser_requires_plus_to_resync() {
        let mut parser = CommandParser::new();
        // Without a leading '+', bytes accumulate but a CR still yields
        // a (non-matching) line rather than being silently dropped.
        for &b in b"ID " {
            assert_eq!(parser.feed(b), None);
        }
        let line = parser.feed(b'\r').unwrap();
        assert_eq!(line, b"ID ");
    }

    #[test]
    fn plus_hard_resets_mid_line() {
        let mut parser = CommandParser::new();
        for &b in b"garbage" {
            parser.feed(b);
        }
        parser.feed(b'+');
        for &b in b"ID " {
            parser.feed(b);
        }
        let line = parser.feed(b'\r').unwrap();
        assert_eq!(line, b"ID ");
    }

    #[test]
    fn overflow_truncates_silently() {
        let mut parser = CommandParser::new();
        parser.feed(b'+');
        let long_payload = [b'A'; 64];
        for &b in long_payload.iter() {
            parser.feed(b);
        }
        let line = parser.feed(b'\r').unwrap();
        assert_eq!(line.len(), LINE_CAP - 1);
    }

    #[test]
    fn recording_readout_streams_and_closes() {
        let mut engine = Engine::new();
        engine.set_recording(true);
        engine.enqueue_play(ControllerState::neutral());
        for _ in 0..5 {
            engine.tick_free_run();
        }
        engine.set_recording(false);
        let mut writer = RecordingWriter { out: std::vec::Vec::new() };
        dispatch(b"GR 0", &mut engine, &mut writer);
        let out = std::string::String::from_utf8(writer.out).unwrap();
        assert!(out.starts_with("+R "));
        assert!(out.ends_with("+GR 0\r\n"));
    }
}
