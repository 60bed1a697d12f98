// Musical time conversion - ticks, tempo maps, and the user tempo scale
// Pure functions, safe to call from any thread

use serde::{Deserialize, Serialize};

/// Default tempo when a file carries no tempo meta event: 500 000 µs per
/// quarter note (120 BPM).
pub const DEFAULT_MICROS_PER_BEAT: u32 = 500_000;

/// Neutral tempo scale (play at the song's own speed).
pub const DEFAULT_TEMPO_SCALE: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimingError {
    #[error("malformed timeline: resolution must be > 0 ticks per beat")]
    InvalidResolution,

    #[error("invalid configuration: tempo scale must be > 0, got {0}%")]
    InvalidTempoScale(i64),
}

/// Convert a tick count to seconds under a single tempo.
///
/// `seconds = ticks × µs-per-beat / (resolution × 1 000 000)`
pub fn ticks_to_seconds(
    ticks: u64,
    resolution: u16,
    micros_per_beat: u32,
) -> Result<f64, TimingError> {
    if resolution == 0 {
        return Err(TimingError::InvalidResolution);
    }
    Ok(ticks as f64 * micros_per_beat as f64 / (resolution as f64 * 1_000_000.0))
}

/// Inverse of [`ticks_to_seconds`], rounding to the nearest tick.
pub fn seconds_to_ticks(
    seconds: f64,
    resolution: u16,
    micros_per_beat: u32,
) -> Result<u64, TimingError> {
    if resolution == 0 {
        return Err(TimingError::InvalidResolution);
    }
    let ticks = seconds * resolution as f64 * 1_000_000.0 / micros_per_beat as f64;
    Ok(ticks.round().max(0.0) as u64)
}

/// Stretch a song-time duration by the user tempo scale (percent).
///
/// Scale 50 plays at half speed, so durations double. A scale of zero or
/// below is rejected before it can reach a division.
pub fn apply_tempo_scale(seconds: f64, scale_percent: u16) -> Result<f64, TimingError> {
    if scale_percent == 0 {
        return Err(TimingError::InvalidTempoScale(scale_percent as i64));
    }
    Ok(seconds * 100.0 / scale_percent as f64)
}

/// One tempo change on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoEvent {
    pub tick: u64,
    pub micros_per_beat: u32,
}

/// Tempo changes in tick order, covering the timeline from tick 0.
///
/// Construction keeps the invariant that `events` is non-empty, starts at
/// tick 0, and is strictly increasing in tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoMap {
    events: Vec<TempoEvent>,
}

impl TempoMap {
    pub fn new(initial_micros_per_beat: u32) -> Self {
        Self {
            events: vec![TempoEvent {
                tick: 0,
                micros_per_beat: initial_micros_per_beat,
            }],
        }
    }

    /// Record a tempo change. Changes arrive in merge order, so a change at
    /// a tick not after the last one replaces it rather than extending the
    /// map backwards.
    pub fn push(&mut self, tick: u64, micros_per_beat: u32) {
        match self.events.last_mut() {
            Some(last) if tick <= last.tick => {
                last.micros_per_beat = micros_per_beat;
            }
            _ => self.events.push(TempoEvent {
                tick,
                micros_per_beat,
            }),
        }
    }

    /// Tempo in effect at `tick`: the last change at or before it.
    pub fn micros_per_beat_at(&self, tick: u64) -> u32 {
        match self.events.binary_search_by_key(&tick, |e| e.tick) {
            Ok(idx) => self.events[idx].micros_per_beat,
            Err(idx) => self.events[idx.saturating_sub(1)].micros_per_beat,
        }
    }

    /// Absolute seconds at `tick`, integrating piecewise over every tempo
    /// segment up to it.
    pub fn seconds_at(&self, tick: u64, resolution: u16) -> Result<f64, TimingError> {
        let mut seconds = 0.0;
        for (idx, event) in self.events.iter().enumerate() {
            let segment_end = self
                .events
                .get(idx + 1)
                .map_or(tick, |next| next.tick.min(tick));
            if segment_end <= event.tick {
                break;
            }
            seconds +=
                ticks_to_seconds(segment_end - event.tick, resolution, event.micros_per_beat)?;
            if segment_end == tick {
                break;
            }
        }
        Ok(seconds)
    }

    pub fn events(&self) -> &[TempoEvent] {
        &self.events
    }
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new(DEFAULT_MICROS_PER_BEAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_beat_at_120_bpm() {
        // 480 ticks at resolution 480 and 500000 µs/beat is exactly one second
        let seconds = ticks_to_seconds(480, 480, 500_000).unwrap();
        assert!((seconds - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_seconds_non_negative_and_monotonic() {
        let mut prev = -1.0;
        for tick in 0..2000 {
            let s = ticks_to_seconds(tick, 480, 500_000).unwrap();
            assert!(s >= 0.0);
            assert!(s >= prev);
            prev = s;
        }
    }

    #[test]
    fn test_tick_round_trip() {
        for tick in [0u64, 1, 479, 480, 961, 123_456] {
            let s = ticks_to_seconds(tick, 960, 480_000).unwrap();
            let recovered = seconds_to_ticks(s, 960, 480_000).unwrap();
            assert_eq!(recovered, tick);
        }
    }

    #[test]
    fn test_zero_resolution_rejected() {
        assert_eq!(
            ticks_to_seconds(480, 0, 500_000),
            Err(TimingError::InvalidResolution)
        );
        assert_eq!(
            seconds_to_ticks(1.0, 0, 500_000),
            Err(TimingError::InvalidResolution)
        );
    }

    #[test]
    fn test_tempo_scale_half_speed() {
        // Scale 50 = half speed = durations double
        let stretched = apply_tempo_scale(2.0, 50).unwrap();
        assert!((stretched - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_scale_neutral_and_fast() {
        assert_eq!(apply_tempo_scale(2.0, 100).unwrap(), 2.0);
        assert!((apply_tempo_scale(2.0, 200).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_scale_zero_rejected() {
        assert_eq!(
            apply_tempo_scale(1.0, 0),
            Err(TimingError::InvalidTempoScale(0))
        );
    }

    #[test]
    fn test_tempo_map_lookup() {
        let mut map = TempoMap::new(500_000);
        map.push(960, 250_000);
        map.push(1920, 1_000_000);

        assert_eq!(map.micros_per_beat_at(0), 500_000);
        assert_eq!(map.micros_per_beat_at(959), 500_000);
        assert_eq!(map.micros_per_beat_at(960), 250_000);
        assert_eq!(map.micros_per_beat_at(1919), 250_000);
        assert_eq!(map.micros_per_beat_at(5000), 1_000_000);
    }

    #[test]
    fn test_tempo_map_replaces_same_tick() {
        let mut map = TempoMap::new(500_000);
        map.push(0, 400_000);
        assert_eq!(map.events().len(), 1);
        assert_eq!(map.micros_per_beat_at(0), 400_000);
    }

    #[test]
    fn test_piecewise_seconds() {
        // One beat at 120 BPM, then the tempo doubles in speed
        let mut map = TempoMap::new(500_000);
        map.push(480, 250_000);

        // First beat: 1.0s. Second beat (480 ticks at 250000): 0.5s.
        let at_480 = map.seconds_at(480, 480).unwrap();
        let at_960 = map.seconds_at(960, 480).unwrap();
        assert!((at_480 - 1.0).abs() < 1e-9);
        assert!((at_960 - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_piecewise_seconds_at_zero() {
        let map = TempoMap::default();
        assert_eq!(map.seconds_at(0, 480).unwrap(), 0.0);
    }
}
