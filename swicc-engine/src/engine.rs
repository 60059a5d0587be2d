//! The engine (C5/C6): playback ring, recorder, and live controller state
//! tied together behind the operations the command parser and frame
//! ticker drive.

use crate::mode::Mode;
use crate::recorder::Recorder;
use crate::ring::PlaybackRing;
use swicc_proto::ControllerState;

/// Lag amount is capped at 120 frames (2 seconds at 60 Hz), matching the
/// playback ring's practical delay-line depth.
pub const MAX_LAG: u16 = 120;

/// Always-on free-running frame period. The original firmware armed
/// `16_666` microseconds once per `VSYNC 0` and `16_667` everywhere
/// else; this firmware always uses the latter so free-running timing is
/// uniform regardless of how vsync sync was most recently toggled.
pub const FREE_RUN_PERIOD_US: u32 = 16_667;

/// Central playback/record/command state, generic over nothing: one
/// instance drives both host tests and firmware, shared behind whatever
/// mutual-exclusion the binding layer chooses.
pub struct Engine {
    ring: PlaybackRing,
    recorder: Recorder,
    mode: Mode,
    current: ControllerState,
    vsync_count: u8,
    lag_amount: u16,
    frame_delay_us: u16,
    vsync_en: bool,
    led_on: bool,
    usb_connected: bool,
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring: PlaybackRing::new(),
            recorder: Recorder::new(),
            mode: Mode::default(),
            current: ControllerState::neutral(),
            vsync_count: 0,
            lag_amount: 0,
            frame_delay_us: 0,
            vsync_en: false,
            led_on: true,
            usb_connected: false,
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn vsync_count(&self) -> u8 {
        self.vsync_count
    }

    #[must_use]
    pub fn vsync_enabled(&self) -> bool {
        self.vsync_en
    }

    #[must_use]
    pub fn led_on(&self) -> bool {
        self.led_on
    }

    #[must_use]
    pub fn usb_connected(&self) -> bool {
        self.usb_connected
    }

    #[must_use]
    pub fn frame_delay_us(&self) -> u16 {
        self.frame_delay_us
    }

    #[must_use]
    pub fn lag_amount(&self) -> u16 {
        self.lag_amount
    }

    pub fn set_usb_connected(&mut self, connected: bool) {
        self.usb_connected = connected;
    }

    pub fn set_led_on(&mut self, on: bool) {
        self.led_on = on;
    }

    /// `HID IN report`: the 7-byte state to send right now. PLAY/LAG/RT
    /// send `current`; STOP always sends neutral, regardless of what is
    /// queued underneath.
    #[must_use]
    pub fn report(&self) -> ControllerState {
        match self.mode {
            Mode::Stop => ControllerState::neutral(),
            Mode::Play | Mode::Lag | Mode::Rt => self.current,
        }
    }

    /// `Q`: enqueue for FIFO playback, switching to PLAY mode.
    pub fn enqueue_play(&mut self, state: ControllerState) {
        self.ring.enqueue_play(state);
        self.mode = Mode::Play;
    }

    /// `QL`: enqueue into the delay line, switching to LAG mode.
    pub fn enqueue_lag(&mut self, state: ControllerState) {
        self.ring.enqueue_lag(state);
        self.mode = Mode::Lag;
    }

    /// Switch to PLAY mode without touching the ring. `Q`'s mode
    /// assignment happens unconditionally in the original firmware, even
    /// when the payload fails to parse and nothing is actually enqueued;
    /// this lets the command layer reproduce that without enqueuing
    /// garbage.
    pub fn set_mode_play(&mut self) {
        self.mode = Mode::Play;
    }

    /// Switch to LAG mode without touching the ring, for the same reason
    /// as [`Engine::set_mode_play`] but for `QL`.
    pub fn set_mode_lag(&mut self) {
        self.mode = Mode::Lag;
    }

    /// `IMM`: force `current` directly, abandon anything queued, and
    /// switch to RT mode.
    pub fn force_immediate(&mut self, state: ControllerState) {
        self.current = state;
        self.ring.reset();
        self.mode = Mode::Rt;
    }

    /// `SLAG`: set the lag depth (capped at [`MAX_LAG`]), snapping the
    /// ring's tail forward immediately if the lag is being reduced so
    /// the shorter delay takes effect on the very next tick.
    pub fn set_lag_amount(&mut self, lag: u16) {
        let lag = lag.min(MAX_LAG);
        let reducing = lag < self.lag_amount;
        self.lag_amount = lag;
        if reducing {
            self.ring.snap_tail_for_lag(lag);
        }
    }

    /// `VSD`: set the vsync-to-output delay used in external-sync mode.
    pub fn set_frame_delay_us(&mut self, delay_us: u16) {
        self.frame_delay_us = delay_us;
    }

    /// `REC 1` / `REC 0`.
    pub fn set_recording(&mut self, on: bool) {
        if on {
            self.recorder.start(self.current);
        } else {
            self.recorder.stop();
        }
    }

    #[must_use]
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    #[must_use]
    pub fn recorder_mut(&mut self) -> &mut Recorder {
        &mut self.recorder
    }

    /// `GQF`: playback ring fill.
    #[must_use]
    pub fn queue_fill(&self) -> u16 {
        self.ring.fill()
    }

    /// Advance `current` by one PLAY/LAG step and feed the result to the
    /// recorder. Shared by both the free-running and external-sync tick
    /// paths; RT and STOP modes leave `current` untouched here (`IMM`
    /// already wrote it directly).
    fn advance_and_record(&mut self) {
        self.current = match self.mode {
            Mode::Play => self.ring.tick_play(),
            Mode::Lag => self.ring.tick_lag(self.lag_amount),
            Mode::Rt | Mode::Stop => self.current,
        };
        self.recorder.tick(self.current);
    }

    /// One free-running tick: count the frame and advance output. Used
    /// when vsync sync is disabled and frames arrive on the fixed
    /// [`FREE_RUN_PERIOD_US`] cadence.
    pub fn tick_free_run(&mut self) -> ControllerState {
        self.vsync_count = self.vsync_count.wrapping_add(1);
        self.advance_and_record();
        self.report()
    }

    /// A rising edge on the external vsync input: count the frame
    /// immediately. The actual output advance happens later, once
    /// `frame_delay_us` has elapsed (see [`Engine::on_frame_update`]),
    /// mirroring the original firmware's edge-counts-now,
    /// alarm-fires-later split.
    pub fn on_vsync_edge(&mut self) {
        self.vsync_count = self.vsync_count.wrapping_add(1);
    }

    /// The delayed alarm armed by the most recent vsync edge firing:
    /// advance output without touching the frame count a second time.
    pub fn on_frame_update(&mut self) -> ControllerState {
        self.advance_and_record();
        self.report()
    }

    /// `VSYNC 1`: enable external sync and reset the frame counter.
    pub fn enable_vsync_sync(&mut self) {
        self.vsync_en = true;
        self.vsync_count = 0;
    }

    /// `VSYNC 0`: disable external sync, returning to free-running.
    pub fn disable_vsync_sync(&mut self) {
        self.vsync_en = false;
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swicc_proto::Buttons;

    fn state(buttons: u16) -> ControllerState {
        ControllerState {
            buttons: Buttons(buttons),
            ..ControllerState::neutral()
        }
    }

    #[test]
    fn play_mode_drains_in_fifo_order() {
        let mut engine = Engine::new();
        engine.enqueue_play(state(1));
        engine.enqueue_play(state(2));
        assert_eq!(engine.tick_free_run(), state(1));
        assert_eq!(engine.tick_free_run(), state(2));
        assert_eq!(engine.vsync_count(), 2);
    }

    #[test]
    fn immediate_preempts_queue_and_switches_to_rt() {
        let mut engine = Engine::new();
        engine.enqueue_play(state(1));
        engine.force_immediate(state(42));
        assert_eq!(engine.mode(), Mode::Rt);
        assert_eq!(engine.report(), state(42));
        // RT mode holds steady across ticks; nothing was left queued.
        assert_eq!(engine.tick_free_run(), state(42));
        assert_eq!(engine.queue_fill(), 0);
    }

    #[test]
    fn recording_follows_current_while_active() {
        let mut engine = Engine::new();
        engine.set_recording(true);
        engine.enqueue_play(state(5));
        engine.tick_free_run();
        engine.set_recording(false);
        assert!(engine.recorder().fill() >= 1);
    }

    #[test]
    fn external_sync_defers_output_to_frame_update() {
        let mut engine = Engine::new();
        engine.enqueue_play(state(9));
        engine.enable_vsync_sync();
        engine.on_vsync_edge();
        // vsync_count already incremented, but output has not advanced yet.
        assert_eq!(engine.vsync_count(), 1);
        assert_eq!(engine.queue_fill(), 1);
        let report = engine.on_frame_update();
        assert_eq!(report, state(9));
        assert_eq!(engine.vsync_count(), 1); // unchanged by the deferred update
    }
}
