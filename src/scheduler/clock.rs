// Playback clock - maps wall-clock instants to song seconds
// Derived from an absolute origin every read, so long sessions cannot
// accumulate drift the way fixed-delta accumulation would

use crate::timing::TimingError;
use std::time::Instant;

/// The cursor's time source. Song seconds advance at
/// `tempo_scale_percent / 100` of wall-clock speed while running, and stand
/// still while frozen (pause, practice gate, pre-start).
///
/// Every mutation rebases the origin at the current position, so position is
/// continuous across pause/resume, seeks and tempo-scale changes.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    origin: Instant,
    origin_seconds: f64,
    tempo_scale_percent: u16,
    running: bool,
}

impl PlaybackClock {
    /// A frozen clock at song position 0.
    pub fn new(tempo_scale_percent: u16) -> Result<Self, TimingError> {
        if tempo_scale_percent == 0 {
            return Err(TimingError::InvalidTempoScale(tempo_scale_percent as i64));
        }
        Ok(Self {
            origin: Instant::now(),
            origin_seconds: 0.0,
            tempo_scale_percent,
            running: false,
        })
    }

    /// Song seconds at a wall-clock instant. Instants before the origin
    /// saturate to the origin position.
    pub fn seconds_at(&self, now: Instant) -> f64 {
        if !self.running {
            return self.origin_seconds;
        }
        let elapsed = now.saturating_duration_since(self.origin).as_secs_f64();
        self.origin_seconds + elapsed * self.tempo_scale_percent as f64 / 100.0
    }

    /// Start or resume advancing from the current position.
    pub fn resume(&mut self, now: Instant) {
        if !self.running {
            self.origin = now;
            self.running = true;
        }
    }

    /// Freeze at the current position.
    pub fn pause(&mut self, now: Instant) {
        if self.running {
            self.origin_seconds = self.seconds_at(now);
            self.origin = now;
            self.running = false;
        }
    }

    /// Freeze at an explicit song position (practice gate, loop rewind).
    pub fn freeze_at(&mut self, seconds: f64) {
        self.origin_seconds = seconds;
        self.running = false;
    }

    /// Jump to a song position without changing run state.
    pub fn seek(&mut self, now: Instant, seconds: f64) {
        self.origin = now;
        self.origin_seconds = seconds;
    }

    /// Change playback speed, keeping the current position continuous.
    /// An invalid scale leaves the clock untouched.
    pub fn set_tempo_scale(
        &mut self,
        now: Instant,
        tempo_scale_percent: u16,
    ) -> Result<(), TimingError> {
        if tempo_scale_percent == 0 {
            return Err(TimingError::InvalidTempoScale(tempo_scale_percent as i64));
        }
        self.origin_seconds = self.seconds_at(now);
        self.origin = now;
        self.tempo_scale_percent = tempo_scale_percent;
        Ok(())
    }

    pub fn tempo_scale_percent(&self) -> u16 {
        self.tempo_scale_percent
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
