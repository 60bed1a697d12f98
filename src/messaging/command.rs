// Scheduler commands - control surface to the tick loop

use crate::config::PracticeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    /// Percent of normal speed; validated at the boundary, the prior scale
    /// is kept when the value is invalid.
    SetTempoScale(u16),
    SetPracticeMode(PracticeMode),
    /// Jump back to the start of the loop region (or the song).
    RestartLoop,
}
