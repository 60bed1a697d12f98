// Upcoming-note prediction - the next group of simultaneous notes ahead of
// the cursor, for learn-mode lighting and flying-note lead-in

use crate::config::{HandMap, LookaheadSettings};
use crate::midi::event::{Hand, MidiEvent};
use crate::timeline::Timeline;
use crate::tracker::NoteSnapshot;
use serde::Serialize;

/// Entries closer together than this count as one chord. Tick-simultaneous
/// notes convert to exactly equal seconds, but tempo-map integration can
/// leave float dust behind.
pub const SIMULTANEITY_EPSILON: f64 = 0.001;

/// One note of a prediction batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictedNote {
    pub entry_index: usize,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    /// Absolute song time of the note-on.
    pub seconds: f64,
    /// Delay from the cursor position at prediction time.
    pub delay_seconds: f64,
    pub hand: Option<Hand>,
}

/// The next chord-like group of not-yet-sounding notes. Recomputed every
/// tick, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictionBatch {
    pub notes: Vec<PredictedNote>,
}

impl PredictionBatch {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Song time of the batch's first member.
    pub fn anchor_seconds(&self) -> Option<f64> {
        self.notes.first().map(|n| n.seconds)
    }

    pub fn contains(&self, channel: u8, note: u8) -> bool {
        self.notes
            .iter()
            .any(|n| n.channel == channel && n.note == note)
    }
}

/// Scan the timeline from `cursor_index` and collect the next group of
/// simultaneous note-ons.
///
/// The first qualifying entry anchors the batch; scanning stops at the
/// first entry more than [`SIMULTANEITY_EPSILON`] past the anchor once the
/// batch is non-empty, or past `window_seconds` from the cursor
/// unconditionally. Notes already sounding in `state` are skipped, as are
/// releases and non-note events.
///
/// Deterministic and side-effect free: identical inputs give identical
/// batches.
pub fn predict(
    timeline: &Timeline,
    cursor_index: usize,
    cursor_seconds: f64,
    state: &NoteSnapshot,
    window_seconds: f64,
    hands: &HandMap,
) -> PredictionBatch {
    let mut batch = PredictionBatch::default();
    let mut anchor: Option<f64> = None;

    for (offset, entry) in timeline.entries()[cursor_index.min(timeline.len())..]
        .iter()
        .enumerate()
    {
        if entry.seconds - cursor_seconds > window_seconds {
            break;
        }
        if let Some(anchor_seconds) = anchor
            && entry.seconds - anchor_seconds > SIMULTANEITY_EPSILON
        {
            break;
        }

        if !entry.event.is_sounding_on() {
            continue;
        }
        let (note, velocity) = match entry.event {
            MidiEvent::NoteOn { note, velocity } => (note, velocity),
            _ => continue,
        };
        if state.is_active(entry.channel, note) || batch.contains(entry.channel, note) {
            continue;
        }

        anchor.get_or_insert(entry.seconds);
        batch.notes.push(PredictedNote {
            entry_index: cursor_index + offset,
            channel: entry.channel,
            note,
            velocity,
            seconds: entry.seconds,
            delay_seconds: entry.seconds - cursor_seconds,
            hand: hands.hand_for(entry.channel),
        });
    }

    batch
}

/// Lookahead window from player skill and song difficulty:
/// `base × (1 + skill/10) × (1 + difficulty/5)`.
pub fn calculate_window(base_seconds: f64, skill_level: f64, song_difficulty: f64) -> f64 {
    base_seconds * (1.0 + skill_level / 10.0) * (1.0 + song_difficulty / 5.0)
}

/// [`calculate_window`] with the configured clamp applied.
pub fn window_from(settings: &LookaheadSettings) -> f64 {
    calculate_window(
        settings.base_seconds,
        settings.skill_level,
        settings.song_difficulty,
    )
    .min(settings.max_window_seconds)
}
