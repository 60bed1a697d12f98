// Note state tracking - which keys are sounding, per channel and hand
// One writer (the scheduler tick), lock-free snapshot reads everywhere else

use crate::config::HandMap;
use crate::midi::event::{Hand, MidiEvent};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// A sounding note as recorded at its note-on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveNote {
    pub velocity: u8,
    pub since_seconds: f64,
    pub hand: Option<Hand>,
}

/// An immutable view of the note state at one point in time.
///
/// Snapshots are swapped in whole, so a reader can never observe a
/// half-applied event.
#[derive(Debug, Clone, Default)]
pub struct NoteSnapshot {
    active: HashMap<(u8, u8), ActiveNote>,
    sustain: HashMap<u8, bool>,
}

impl NoteSnapshot {
    pub fn is_active(&self, channel: u8, note: u8) -> bool {
        self.active.contains_key(&(channel, note))
    }

    pub fn get(&self, channel: u8, note: u8) -> Option<&ActiveNote> {
        self.active.get(&(channel, note))
    }

    /// All sounding `(channel, note)` pairs, unordered.
    pub fn active_set(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.active.keys().copied()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Sustain pedal state for a channel (CC 64, threshold 64).
    pub fn is_sustained(&self, channel: u8) -> bool {
        self.sustain.get(&channel).copied().unwrap_or(false)
    }
}

/// Read handle shared with the prediction engine, wrong-note detection and
/// the broadcast side.
#[derive(Clone)]
pub struct NoteStateHandle {
    snapshot: Arc<ArcSwap<NoteSnapshot>>,
}

impl NoteStateHandle {
    pub fn load(&self) -> Arc<NoteSnapshot> {
        self.snapshot.load_full()
    }
}

/// The single-writer side. Events must arrive already ordered; the router's
/// drain pass is the only caller during playback and guarantees that.
pub struct NoteStateTracker {
    state: NoteSnapshot,
    snapshot: Arc<ArcSwap<NoteSnapshot>>,
    hands: HandMap,
    dirty: bool,
}

impl NoteStateTracker {
    pub fn new(hands: HandMap) -> Self {
        Self {
            state: NoteSnapshot::default(),
            snapshot: Arc::new(ArcSwap::from_pointee(NoteSnapshot::default())),
            hands,
            dirty: false,
        }
    }

    pub fn handle(&self) -> NoteStateHandle {
        NoteStateHandle {
            snapshot: self.snapshot.clone(),
        }
    }

    /// Apply one event at the given playback time. Both release encodings
    /// take the same path, so normalization upstream is not load-bearing
    /// here.
    pub fn apply(&mut self, channel: u8, event: MidiEvent, seconds: f64) {
        match event {
            MidiEvent::NoteOff { note } | MidiEvent::NoteOn { note, velocity: 0 } => {
                if self.state.active.remove(&(channel, note)).is_some() {
                    self.dirty = true;
                }
            }
            MidiEvent::NoteOn { note, velocity } => {
                self.state.active.insert(
                    (channel, note),
                    ActiveNote {
                        velocity,
                        since_seconds: seconds,
                        hand: self.hands.hand_for(channel),
                    },
                );
                self.dirty = true;
            }
            MidiEvent::ControlChange {
                controller: 64,
                value,
            } => {
                self.state.sustain.insert(channel, value >= 64);
                self.dirty = true;
            }
            MidiEvent::ControlChange { .. } | MidiEvent::Tempo { .. } => {}
        }
    }

    /// Publish the current state for readers. Called once per tick after all
    /// of the tick's events are applied, so concurrent readers move between
    /// consistent whole-tick states.
    pub fn publish(&mut self) {
        if self.dirty {
            self.snapshot.store(Arc::new(self.state.clone()));
            self.dirty = false;
        }
    }

    /// Stop sweep: release everything and publish immediately.
    pub fn all_notes_off(&mut self) {
        self.state.active.clear();
        self.state.sustain.clear();
        self.dirty = true;
        self.publish();
    }

    /// Writer-side view of the current state (readers use the handle).
    pub fn current(&self) -> &NoteSnapshot {
        &self.state
    }
}
