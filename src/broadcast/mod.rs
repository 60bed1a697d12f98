// Broadcast boundary - immutable per-tick snapshots for the transport layer
// The transport's framing/protocol is external; this module owns the data
// contract and a JSON sink loop that never touches live engine state

use crate::frame::{Frame, KeyboardLayout};
use crate::predict::PredictionBatch;
use crate::scheduler::PlaybackState;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// A sounding note, as the transport sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveNoteInfo {
    pub channel: u8,
    pub note: u8,
}

/// One upcoming note of the prediction batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictedNoteInfo {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub delay_seconds: f64,
}

impl PredictedNoteInfo {
    pub fn from_batch(batch: &PredictionBatch) -> Vec<PredictedNoteInfo> {
        batch
            .notes
            .iter()
            .map(|n| PredictedNoteInfo {
                channel: n.channel,
                note: n.note,
                velocity: n.velocity,
                delay_seconds: n.delay_seconds,
            })
            .collect()
    }
}

/// The per-tick published state. Handed off by value: once stored, nothing
/// mutates it, so the broadcast side can never observe a half-updated tick
/// and never blocks the tick loop.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub session_id: Uuid,
    /// Tick sequence number; lets consumers skip already-seen snapshots.
    pub seq: u64,
    pub state: PlaybackState,
    pub cursor_seconds: f64,
    pub cursor_index: usize,
    pub tempo_scale_percent: u16,
    pub active_notes: Vec<ActiveNoteInfo>,
    pub predicted_notes: Vec<PredictedNoteInfo>,
    pub frame: Frame,
    /// Notes the practice gate is waiting on, if playback is held.
    pub waiting_on: Vec<ActiveNoteInfo>,
    pub mistakes: u32,
    /// Shared layout; serialized separately so the wire only carries it
    /// when it changes.
    #[serde(skip)]
    pub keyboard_layout: Arc<KeyboardLayout>,
}

impl Snapshot {
    /// Pre-session snapshot (Idle/Loading, nothing playing).
    pub fn empty(state: PlaybackState, keyboard_layout: Arc<KeyboardLayout>) -> Snapshot {
        Snapshot {
            session_id: Uuid::nil(),
            seq: 0,
            state,
            cursor_seconds: 0.0,
            cursor_index: 0,
            tempo_scale_percent: 100,
            active_notes: Vec::new(),
            predicted_notes: Vec::new(),
            frame: Frame::default(),
            waiting_on: Vec::new(),
            mistakes: 0,
            keyboard_layout,
        }
    }
}

/// Wire envelope: the snapshot plus the layout when it changed since the
/// last publish.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotEnvelope<'a> {
    #[serde(flatten)]
    snapshot: &'a Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    keyboard_layout: Option<&'a KeyboardLayout>,
}

/// Single-slot publication: the tick loop stores, any number of readers
/// load. Readers always see the latest complete snapshot.
#[derive(Clone)]
pub struct SnapshotPublisher {
    slot: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotPublisher {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            slot: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    pub fn publish(&self, snapshot: Snapshot) {
        self.slot.store(Arc::new(snapshot));
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        self.slot.load_full()
    }
}

/// Where serialized snapshots go. The real transport implements this; the
/// headless runner writes JSON lines to stdout.
pub trait SnapshotSink {
    fn publish(&mut self, json: &str);
}

/// JSON-lines sink over any writer.
pub struct JsonLineSink<W: std::io::Write> {
    writer: W,
}

impl<W: std::io::Write> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: std::io::Write> SnapshotSink for JsonLineSink<W> {
    fn publish(&mut self, json: &str) {
        // A broken pipe here must not take the engine down
        let _ = writeln!(self.writer, "{json}");
        let _ = self.writer.flush();
    }
}

/// Serialize one snapshot for the wire, attaching the layout only when it
/// differs from the previously sent one.
pub fn encode_snapshot(
    snapshot: &Snapshot,
    last_layout: &mut Option<Arc<KeyboardLayout>>,
) -> serde_json::Result<String> {
    let layout_changed = last_layout
        .as_ref()
        .is_none_or(|prev| !Arc::ptr_eq(prev, &snapshot.keyboard_layout));
    if layout_changed {
        *last_layout = Some(snapshot.keyboard_layout.clone());
    }
    serde_json::to_string(&SnapshotEnvelope {
        snapshot,
        keyboard_layout: layout_changed.then(|| snapshot.keyboard_layout.as_ref()),
    })
}

/// Broadcast loop: reads the latest snapshot at its own cadence and hands
/// new ones to the sink. Runs until `stop` is set or the engine reports
/// `Stopped` (the final snapshot is still delivered).
pub fn run_broadcast_loop(
    publisher: SnapshotPublisher,
    sink: &mut dyn SnapshotSink,
    interval: Duration,
    stop: Arc<AtomicBool>,
) {
    let mut last_seq: Option<(Uuid, u64)> = None;
    let mut last_layout: Option<Arc<KeyboardLayout>> = None;

    loop {
        let snapshot = publisher.latest();
        let key = (snapshot.session_id, snapshot.seq);
        if last_seq != Some(key) {
            last_seq = Some(key);
            match encode_snapshot(&snapshot, &mut last_layout) {
                Ok(json) => sink.publish(&json),
                Err(err) => tracing::warn!(%err, "failed to encode snapshot"),
            }
        }

        if stop.load(Ordering::Relaxed) || snapshot.state == PlaybackState::Stopped {
            break;
        }
        std::thread::sleep(interval);
    }
}
