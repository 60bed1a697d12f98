// Timeline - merges per-track MIDI events into one ordered, wall-clock
// addressable sequence

pub mod cache;
pub mod loader;

use crate::midi::event::{MidiEvent, TrackEvent};
use crate::timing::{TempoMap, TimingError, ticks_to_seconds};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("malformed timeline: negative tick delta in track {track} at event {index}")]
    NegativeDelta { track: usize, index: usize },

    #[error("malformed timeline: {0}")]
    Timing(#[from] TimingError),
}

/// One event on the merged timeline.
///
/// `event` is normalized: releases appear as velocity-0 `NoteOn`, never as
/// `NoteOff`. `seconds` is unscaled song time; the user tempo scale is
/// applied by the playback clock, not baked into the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub tick: u64,
    pub seconds: f64,
    pub track: usize,
    pub channel: u8,
    pub event: MidiEvent,
}

/// An immutable, ordered sequence of timeline entries plus the tempo map
/// that produced their timestamps.
///
/// Ordering invariant: entries are sorted by `(tick, release-before-press,
/// original track order)`, and `seconds` is non-decreasing with `tick`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    tempo_map: TempoMap,
    resolution: u16,
}

impl Timeline {
    /// Merge per-track event lists into a single timeline.
    ///
    /// Steps: normalize releases to velocity-0 note-ons, accumulate each
    /// track's deltas into absolute ticks, stable-merge all tracks, then
    /// assign seconds while folding tempo changes into the running tempo map
    /// so every entry after a change uses the new tempo.
    ///
    /// An empty track set yields an empty timeline. A track whose deltas go
    /// backwards fails with [`TimelineError::NegativeDelta`].
    pub fn build(
        tracks: &[Vec<TrackEvent>],
        resolution: u16,
        initial_micros_per_beat: u32,
    ) -> Result<Timeline, TimelineError> {
        if resolution == 0 {
            return Err(TimingError::InvalidResolution.into());
        }

        struct Pending {
            tick: u64,
            track: usize,
            channel: u8,
            event: MidiEvent,
        }

        let mut pending: Vec<Pending> = Vec::with_capacity(tracks.iter().map(Vec::len).sum());

        for (track_index, track) in tracks.iter().enumerate() {
            let mut absolute_tick: u64 = 0;
            for (event_index, event) in track.iter().enumerate() {
                if event.delta_ticks < 0 {
                    return Err(TimelineError::NegativeDelta {
                        track: track_index,
                        index: event_index,
                    });
                }
                absolute_tick += event.delta_ticks as u64;
                pending.push(Pending {
                    tick: absolute_tick,
                    track: track_index,
                    channel: event.channel,
                    event: event.event.normalized(),
                });
            }
        }

        // Ties at the same tick: releases first so a re-struck key never
        // shows two sounding notes, then original track order. The sort is
        // stable, so within-track ordering survives.
        pending.sort_by_key(|p| (p.tick, if p.event.is_release() { 0u8 } else { 1 }, p.track));

        let mut tempo_map = TempoMap::new(initial_micros_per_beat);
        let mut current_tempo = initial_micros_per_beat;
        let mut seconds = 0.0;
        let mut last_tick = 0u64;

        let mut entries = Vec::with_capacity(pending.len());
        for p in pending {
            if p.tick > last_tick {
                seconds += ticks_to_seconds(p.tick - last_tick, resolution, current_tempo)?;
                last_tick = p.tick;
            }
            if let MidiEvent::Tempo { micros_per_beat } = p.event {
                tempo_map.push(p.tick, micros_per_beat);
                current_tempo = micros_per_beat;
            }
            entries.push(TimelineEntry {
                tick: p.tick,
                seconds,
                track: p.track,
                channel: p.channel,
                event: p.event,
            });
        }

        Ok(Timeline {
            entries,
            tempo_map,
            resolution,
        })
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&TimelineEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolution(&self) -> u16 {
        self.resolution
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    /// Song length in unscaled seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.entries.last().map_or(0.0, |e| e.seconds)
    }

    /// Index of the first entry at or after `seconds`.
    ///
    /// Returns `len()` when `seconds` is past the end; usable directly as a
    /// cursor starting point.
    pub fn index_at_seconds(&self, seconds: f64) -> usize {
        self.entries.partition_point(|e| e.seconds < seconds)
    }

    /// Number of sounding note-on entries (what a player actually plays).
    pub fn note_on_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.event.is_sounding_on())
            .count()
    }
}
