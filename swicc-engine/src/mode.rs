//! Playback mode: which source drives `current` on each tick.

/// Selects how `Engine::tick` derives the next `current` report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Drain queued states from the playback ring in FIFO order (`Q`).
    Play,
    /// Replay queued states through a fixed-depth delay line (`QL`).
    Lag,
    /// Pass the most recent `IMM` write straight through, unbuffered.
    Rt,
    /// Report neutral regardless of anything queued. Reachable in the
    /// type system but never set by any command in this wire protocol.
    Stop,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Play
    }
}
