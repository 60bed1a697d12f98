// Event queue routing - merges live-input and file-playback events into one
// time-ordered stream for the note tracker

use crate::messaging::channels::LiveEventConsumer;
use crate::midi::event::{LiveEvent, MidiEvent};
use crate::scheduler::clock::PlaybackClock;
use crate::tracker::NoteStateTracker;
use ringbuf::traits::Consumer;
use std::collections::VecDeque;

/// A file-timeline event due for application, stamped with its song time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileEvent {
    pub channel: u8,
    pub event: MidiEvent,
    pub seconds: f64,
}

/// What one drain pass did; the scheduler turns the overflow count into a
/// queue-overflow report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub file_applied: usize,
    pub live_applied: usize,
    /// Oldest live events discarded because the bounded queue was full.
    pub overflow_dropped: usize,
    /// Sounding note-ons that came from the live queue this pass, in
    /// application order (practice gating and wrong-note checks read this).
    pub live_note_ons: Vec<(u8, u8)>,
}

/// Dual-source FIFO router. The device callback feeds the live ring buffer;
/// the scheduler feeds the file queue as the cursor passes timeline entries.
/// `drain` is called once per tick and is the only place events reach the
/// tracker, which keeps a single serialization point for note state.
pub struct EventQueueRouter {
    live_rx: LiveEventConsumer,
    live_queue: VecDeque<LiveEvent>,
    live_capacity: usize,
    file_queue: VecDeque<FileEvent>,
}

impl EventQueueRouter {
    pub fn new(live_rx: LiveEventConsumer, live_capacity: usize) -> Self {
        Self {
            live_rx,
            live_queue: VecDeque::with_capacity(live_capacity.max(1)),
            live_capacity: live_capacity.max(1),
            file_queue: VecDeque::new(),
        }
    }

    /// Queue a timeline event the cursor has reached.
    pub fn push_file(&mut self, channel: u8, event: MidiEvent, seconds: f64) {
        self.file_queue.push_back(FileEvent {
            channel,
            event,
            seconds,
        });
    }

    /// Number of live events waiting (staged, not counting the ring buffer).
    pub fn live_pending(&self) -> usize {
        self.live_queue.len()
    }

    /// Dequeue everything currently available from both sources, merge by
    /// song-time timestamp and apply to the tracker.
    ///
    /// Live arrival instants are mapped onto song seconds through the same
    /// clock the cursor uses, so the two queues share one time axis. Each
    /// queue's internal FIFO order is preserved; across queues, the earlier
    /// timestamp wins (file first on exact ties, since its event was already
    /// due).
    pub fn drain(
        &mut self,
        clock: &PlaybackClock,
        tracker: &mut NoteStateTracker,
    ) -> DrainReport {
        let mut report = DrainReport::default();

        // Stage new arrivals; drop oldest beyond capacity. The ring buffer
        // itself is larger than the logical capacity, so the device thread
        // is never blocked - saturation costs the oldest unprocessed events
        // instead.
        while let Some(event) = self.live_rx.try_pop() {
            self.live_queue.push_back(event);
        }
        while self.live_queue.len() > self.live_capacity {
            self.live_queue.pop_front();
            report.overflow_dropped += 1;
        }

        loop {
            let live_seconds = self
                .live_queue
                .front()
                .map(|e| clock.seconds_at(e.received_at));
            let file_seconds = self.file_queue.front().map(|e| e.seconds);

            match (file_seconds, live_seconds) {
                (None, None) => break,
                (Some(_), None) => self.apply_file(tracker, &mut report),
                (None, Some(_)) => self.apply_live(clock, tracker, &mut report),
                (Some(file), Some(live)) => {
                    if file <= live {
                        self.apply_file(tracker, &mut report);
                    } else {
                        self.apply_live(clock, tracker, &mut report);
                    }
                }
            }
        }

        report
    }

    fn apply_file(&mut self, tracker: &mut NoteStateTracker, report: &mut DrainReport) {
        if let Some(event) = self.file_queue.pop_front() {
            tracker.apply(event.channel, event.event, event.seconds);
            report.file_applied += 1;
        }
    }

    fn apply_live(
        &mut self,
        clock: &PlaybackClock,
        tracker: &mut NoteStateTracker,
        report: &mut DrainReport,
    ) {
        if let Some(event) = self.live_queue.pop_front() {
            let seconds = clock.seconds_at(event.received_at);
            tracker.apply(event.channel, event.event, seconds);
            if event.event.is_sounding_on() {
                report.live_note_ons.push((event.channel, event.event.note().unwrap_or(0)));
            }
            report.live_applied += 1;
        }
    }

    /// Drop queued-but-unapplied events (stop, seek, loop rewind).
    pub fn clear(&mut self) {
        self.live_queue.clear();
        self.file_queue.clear();
        // Stale ring-buffer entries from before the reset go too
        while self.live_rx.try_pop().is_some() {}
    }
}
