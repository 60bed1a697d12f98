// Sync scheduler - the concurrency core
// Advances the playback cursor in real time, drains the event queues,
// refreshes prediction, and publishes one immutable snapshot per tick

pub mod clock;
pub mod session;

use crate::broadcast::{ActiveNoteInfo, PredictedNoteInfo, Snapshot, SnapshotPublisher};
use crate::config::PracticeMode;
use crate::frame::{self, KeyboardLayout};
use crate::messaging::channels::{LiveEventConsumer, NotificationProducer};
use crate::messaging::command::Command;
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::midi::event::MidiEvent;
use crate::predict;
use crate::router::{DrainReport, EventQueueRouter};
use crate::timeline::cache::TimelineCache;
use crate::tracker::NoteStateTracker;
use clock::PlaybackClock;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use ringbuf::traits::Producer;
use serde::Serialize;
use session::{Session, SessionError};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Tick cadence; 16 ms keeps the 60-updates-per-second visual contract.
pub const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Scheduler lifecycle. `Stopped` is terminal for a session; a new Loading
/// cycle starts a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
}

/// A practice hold: playback waits at `seconds` until every note in the
/// group is sounding on the live side.
#[derive(Debug)]
struct Gate {
    seconds: f64,
    notes: HashSet<(u8, u8)>,
}

/// The tick state machine, free of threads so tests can drive it with
/// explicit instants. The spawned scheduler thread is a thin cadence loop
/// around this.
///
/// Single-writer discipline: this struct is the only writer of the cursor
/// and the note tracker, and each tick is one serialization point for both
/// file and live events.
pub struct TickEngine {
    session: Session,
    clock: PlaybackClock,
    state: PlaybackState,
    cursor_index: usize,
    tracker: NoteStateTracker,
    router: EventQueueRouter,
    gate: Option<Gate>,
    mistakes: u32,
    seq: u64,
    publisher: SnapshotPublisher,
    notification_tx: NotificationProducer,
}

impl TickEngine {
    pub fn new(
        session: Session,
        live_rx: LiveEventConsumer,
        notification_tx: NotificationProducer,
        publisher: SnapshotPublisher,
    ) -> Result<TickEngine, crate::timing::TimingError> {
        let mut clock = PlaybackClock::new(session.settings.tempo_scale_percent)?;
        let start = session.start_seconds();
        clock.freeze_at(start);

        let cursor_index = session.timeline.index_at_seconds(start);
        let tracker = NoteStateTracker::new(session.settings.hand_map);
        let router = EventQueueRouter::new(live_rx, session.settings.live_queue_capacity);

        Ok(TickEngine {
            session,
            clock,
            state: PlaybackState::Idle,
            cursor_index,
            tracker,
            router,
            gate: None,
            mistakes: 0,
            seq: 0,
            publisher,
            notification_tx,
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn handle_command(&mut self, command: Command, now: Instant) {
        match command {
            Command::Play => {
                if matches!(self.state, PlaybackState::Idle | PlaybackState::Paused) {
                    // A pending practice gate keeps the clock frozen
                    if self.gate.is_none() {
                        self.clock.resume(now);
                    }
                    self.state = PlaybackState::Playing;
                }
            }
            Command::Pause => {
                if self.state == PlaybackState::Playing {
                    self.clock.pause(now);
                    self.state = PlaybackState::Paused;
                }
            }
            Command::Stop => self.stop(now),
            Command::SetTempoScale(scale) => {
                if let Err(err) = self.clock.set_tempo_scale(now, scale) {
                    // Rejected at the boundary; the prior scale stays in effect
                    self.notify(Notification::warning(
                        NotificationCategory::Scheduler,
                        err.to_string(),
                    ));
                }
            }
            Command::SetPracticeMode(mode) => {
                self.session.settings.practice = mode;
                if mode == PracticeMode::Listen
                    && let Some(gate) = self.gate.take()
                {
                    self.release_gate(gate.seconds, now);
                }
            }
            Command::RestartLoop => self.rewind(now),
        }
    }

    /// One scheduler tick at wall-clock `now`.
    pub fn tick(&mut self, now: Instant) {
        match self.state {
            PlaybackState::Playing => {
                self.advance_cursor(now);
                let report = self.router.drain(&self.clock, &mut self.tracker);
                self.report_overflow(&report);
                self.update_gate(&report, now);
                self.check_end(now);
                if self.state == PlaybackState::Stopped {
                    return; // stop() already swept and published
                }
                self.tracker.publish();
                self.publish_snapshot(now);
            }
            PlaybackState::Idle | PlaybackState::Paused => {
                // The cursor stands still but live input keeps updating note
                // state through the same serialization point
                let report = self.router.drain(&self.clock, &mut self.tracker);
                self.report_overflow(&report);
                self.tracker.publish();
                self.publish_snapshot(now);
            }
            PlaybackState::Loading | PlaybackState::Stopped => {}
        }
    }

    /// Stop sweep: release every note, drop queued events, publish the
    /// terminal snapshot. Observed within the tick that requests it.
    pub fn stop(&mut self, now: Instant) {
        if self.state == PlaybackState::Stopped {
            return;
        }
        self.clock.pause(now);
        self.gate = None;
        self.router.clear();
        self.tracker.all_notes_off();
        self.state = PlaybackState::Stopped;
        self.publish_snapshot(now);
        info!(session = %self.session.id, "playback stopped");
    }

    /// Move the cursor forward to the current clock position, queueing every
    /// passed entry. In melody practice, the first expected note group on
    /// the way freezes the clock and opens a gate instead of being queued.
    fn advance_cursor(&mut self, now: Instant) {
        let timeline = self.session.timeline.clone();
        let melody = self.session.settings.practice == PracticeMode::Melody;
        let hands = self.session.settings.hands;
        let hand_map = self.session.settings.hand_map;

        let mut seconds = self.clock.seconds_at(now);

        while let Some(entry) = timeline.get(self.cursor_index) {
            if entry.seconds > seconds {
                break;
            }

            let expected = melody
                && entry.event.is_sounding_on()
                && hands.includes(hand_map.hand_for(entry.channel));
            if expected {
                if self.gate.is_none() {
                    // Hold playback at the chord's own time
                    self.clock.freeze_at(entry.seconds);
                    seconds = entry.seconds;
                    self.gate = Some(Gate {
                        seconds: entry.seconds,
                        notes: HashSet::new(),
                    });
                }
                if let (Some(gate), Some(note)) = (&mut self.gate, entry.event.note()) {
                    gate.notes.insert((entry.channel, note));
                }
                self.cursor_index += 1;
                continue;
            }

            // Tempo metas shaped the timestamps at build time; nothing to
            // route at play time
            if !matches!(entry.event, MidiEvent::Tempo { .. }) {
                self.router
                    .push_file(entry.channel, entry.event, entry.seconds);
            }
            self.cursor_index += 1;
        }
    }

    /// Check the practice gate against live input: count wrong notes,
    /// restart the loop past the mistake limit, release the gate once every
    /// expected note is sounding.
    fn update_gate(&mut self, report: &DrainReport, now: Instant) {
        let (gate_seconds, wrong, satisfied) = match &self.gate {
            None => return,
            Some(gate) => {
                let wrong = report
                    .live_note_ons
                    .iter()
                    .filter(|key| !gate.notes.contains(key))
                    .count() as u32;
                let state = self.tracker.current();
                let satisfied = gate.notes.iter().all(|&(c, n)| state.is_active(c, n));
                (gate.seconds, wrong, satisfied)
            }
        };

        if wrong > 0 {
            self.mistakes += wrong;
            self.notify(Notification::warning(
                NotificationCategory::Scheduler,
                format!("{wrong} wrong note(s), {} total", self.mistakes),
            ));

            let limit = self.session.settings.mistake_limit;
            if limit > 0 && self.mistakes > limit {
                self.notify(Notification::info(
                    NotificationCategory::Scheduler,
                    format!("mistake limit {limit} exceeded, restarting loop"),
                ));
                self.mistakes = 0;
                self.rewind(now);
                return;
            }
        }

        if satisfied {
            self.gate = None;
            self.release_gate(gate_seconds, now);
        }
    }

    fn release_gate(&mut self, gate_seconds: f64, now: Instant) {
        self.clock.seek(now, gate_seconds);
        if self.state == PlaybackState::Playing {
            self.clock.resume(now);
        }
    }

    /// End handling: wrap the loop region, or stop at the end of the song.
    fn check_end(&mut self, now: Instant) {
        if self.gate.is_some() {
            return; // held playback cannot run off the end
        }
        let seconds = self.clock.seconds_at(now);
        if seconds < self.session.end_seconds() {
            return;
        }
        if self.session.settings.loop_region.enabled {
            self.rewind(now);
        } else if self.cursor_index >= self.session.timeline.len() {
            self.stop(now);
        }
    }

    /// Jump back to the loop start (or song start), clearing queued events
    /// and sounding notes so the next pass starts clean.
    fn rewind(&mut self, now: Instant) {
        let start = self.session.start_seconds();
        self.router.clear();
        self.tracker.all_notes_off();
        self.gate = None;
        self.cursor_index = self.session.timeline.index_at_seconds(start);
        self.clock.seek(now, start);
        if self.state == PlaybackState::Playing {
            self.clock.resume(now);
        }
    }

    fn report_overflow(&mut self, report: &DrainReport) {
        if report.overflow_dropped > 0 {
            self.notify(Notification::warning(
                NotificationCategory::Midi,
                format!(
                    "live queue overflow: {} oldest event(s) dropped",
                    report.overflow_dropped
                ),
            ));
        }
    }

    fn notify(&mut self, notification: Notification) {
        // Bounded side channel: losing a report beats blocking the tick
        let _ = self.notification_tx.try_push(notification);
    }

    fn publish_snapshot(&mut self, now: Instant) {
        let seconds = self.clock.seconds_at(now);
        let notes = self.tracker.current();

        let mut active_notes: Vec<ActiveNoteInfo> = notes
            .active_set()
            .map(|(channel, note)| ActiveNoteInfo { channel, note })
            .collect();
        active_notes.sort_by_key(|n| (n.channel, n.note));

        let batch = predict::predict(
            &self.session.timeline,
            self.cursor_index,
            seconds,
            notes,
            self.session.window_seconds,
            &self.session.settings.hand_map,
        );

        let frame = frame::render_frame(
            &self.session.timeline,
            self.cursor_index,
            seconds,
            &self.session.settings.frame,
            &self.session.layout,
            &self.session.settings.hand_map,
        );

        let mut waiting_on: Vec<ActiveNoteInfo> = self
            .gate
            .as_ref()
            .map(|gate| {
                gate.notes
                    .iter()
                    .map(|&(channel, note)| ActiveNoteInfo { channel, note })
                    .collect()
            })
            .unwrap_or_default();
        waiting_on.sort_by_key(|n| (n.channel, n.note));

        self.seq += 1;
        self.publisher.publish(Snapshot {
            session_id: self.session.id,
            seq: self.seq,
            state: self.state,
            cursor_seconds: seconds,
            cursor_index: self.cursor_index,
            tempo_scale_percent: self.clock.tempo_scale_percent(),
            active_notes,
            predicted_notes: PredictedNoteInfo::from_batch(&batch),
            frame,
            waiting_on,
            mistakes: self.mistakes,
            keyboard_layout: self.session.layout.clone(),
        });
    }
}

/// Handle to a running scheduler thread.
pub struct SchedulerHandle {
    commands: Sender<Command>,
    publisher: SnapshotPublisher,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn send(&self, command: Command) {
        let _ = self.commands.send(command);
    }

    /// Cloneable sender for signal handlers and remote control surfaces.
    pub fn command_sender(&self) -> Sender<Command> {
        self.commands.clone()
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        self.publisher.latest()
    }

    pub fn publisher(&self) -> SnapshotPublisher {
        self.publisher.clone()
    }

    /// Wait for the scheduler thread to finish (it exits once Stopped).
    pub fn join(mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the scheduler: publishes a Loading snapshot, builds the session
/// (cache or fresh parse), then runs the tick loop until Stopped. A failed
/// Loading reports the error and parks in Stopped without touching any
/// previously published session state beyond the state marker.
pub fn spawn(
    song_path: PathBuf,
    settings: crate::config::Settings,
    live_rx: LiveEventConsumer,
    notification_tx: NotificationProducer,
    autoplay: bool,
) -> SchedulerHandle {
    let layout = Arc::new(KeyboardLayout::standard_88());
    let publisher = SnapshotPublisher::new(Snapshot::empty(PlaybackState::Idle, layout.clone()));
    let (command_tx, command_rx) = crossbeam::channel::unbounded();

    let thread_publisher = publisher.clone();
    let join = std::thread::spawn(move || {
        scheduler_thread(
            song_path,
            settings,
            live_rx,
            notification_tx,
            thread_publisher,
            layout,
            command_rx,
            autoplay,
        );
    });

    SchedulerHandle {
        commands: command_tx,
        publisher,
        join: Some(join),
    }
}

#[allow(clippy::too_many_arguments)]
fn scheduler_thread(
    song_path: PathBuf,
    settings: crate::config::Settings,
    live_rx: LiveEventConsumer,
    mut notification_tx: NotificationProducer,
    publisher: SnapshotPublisher,
    layout: Arc<KeyboardLayout>,
    command_rx: Receiver<Command>,
    autoplay: bool,
) {
    publisher.publish(Snapshot::empty(PlaybackState::Loading, layout.clone()));

    let cache_dir = settings
        .cache_dir
        .clone()
        .unwrap_or_else(TimelineCache::default_dir);
    let cache = TimelineCache::new(cache_dir);

    let session = match Session::load(&song_path, settings, &cache) {
        Ok(session) => session,
        Err(err) => {
            report_load_failure(&err, &mut notification_tx);
            publisher.publish(Snapshot::empty(PlaybackState::Stopped, layout));
            return;
        }
    };

    let mut engine = match TickEngine::new(session, live_rx, notification_tx, publisher) {
        Ok(engine) => engine,
        Err(err) => {
            // Settings were validated during Loading; this is unreachable in
            // practice but still must not panic the thread
            error!(%err, "scheduler start failed");
            return;
        }
    };

    if autoplay {
        engine.handle_command(Command::Play, Instant::now());
    }

    'run: loop {
        let tick_start = Instant::now();
        engine.tick(tick_start);
        if engine.state() == PlaybackState::Stopped {
            break;
        }

        // Serve commands until the next tick is due; cadence holds even
        // with no input of any kind
        let deadline = tick_start + TICK_INTERVAL;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match command_rx.recv_timeout(deadline - now) {
                Ok(command) => {
                    engine.handle_command(command, Instant::now());
                    if engine.state() == PlaybackState::Stopped {
                        break 'run;
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    engine.stop(Instant::now());
                    break 'run;
                }
            }
        }
    }
}

fn report_load_failure(err: &SessionError, notification_tx: &mut NotificationProducer) {
    error!(%err, "loading failed");
    let category = match err {
        SessionError::File(_) | SessionError::Timeline(_) => NotificationCategory::Timeline,
        SessionError::Config(_) => NotificationCategory::Scheduler,
    };
    let _ = notification_tx.try_push(Notification::error(category, err.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoopSettings, Settings};
    use crate::messaging::channels::{create_live_event_channel, create_notification_channel};
    use crate::midi::event::{LiveEvent, TrackEvent};
    use crate::timeline::Timeline;

    fn on(delta: i64, channel: u8, note: u8) -> TrackEvent {
        TrackEvent {
            delta_ticks: delta,
            channel,
            event: MidiEvent::NoteOn {
                note,
                velocity: 90,
            },
        }
    }

    fn off(delta: i64, channel: u8, note: u8) -> TrackEvent {
        TrackEvent {
            delta_ticks: delta,
            channel,
            event: MidiEvent::NoteOff { note },
        }
    }

    fn session(tracks: &[Vec<TrackEvent>], settings: Settings) -> Session {
        let timeline = Timeline::build(tracks, 480, 500_000).unwrap();
        Session {
            id: uuid::Uuid::new_v4(),
            song_path: PathBuf::from("test.mid"),
            name: "test".to_string(),
            timeline: Arc::new(timeline),
            layout: Arc::new(KeyboardLayout::standard_88()),
            window_seconds: predict::window_from(&settings.lookahead),
            settings,
        }
    }

    struct Rig {
        engine: TickEngine,
        live_tx: crate::messaging::channels::LiveEventProducer,
        notifications: crate::messaging::channels::NotificationConsumer,
        origin: Instant,
    }

    fn rig(tracks: &[Vec<TrackEvent>], settings: Settings) -> Rig {
        let (live_tx, live_rx) = create_live_event_channel(64);
        let (notification_tx, notifications) = create_notification_channel(64);
        let layout = Arc::new(KeyboardLayout::standard_88());
        let publisher =
            SnapshotPublisher::new(Snapshot::empty(PlaybackState::Idle, layout));
        let engine = TickEngine::new(
            session(tracks, settings),
            live_rx,
            notification_tx,
            publisher,
        )
        .unwrap();
        Rig {
            engine,
            live_tx,
            notifications,
            origin: Instant::now(),
        }
    }

    impl Rig {
        fn at(&self, millis: u64) -> Instant {
            self.origin + Duration::from_millis(millis)
        }

        fn play(&mut self) {
            let now = self.at(0);
            self.engine.handle_command(Command::Play, now);
        }

        fn press(&mut self, channel: u8, note: u8, millis: u64) {
            self.live_tx
                .try_push(LiveEvent {
                    channel,
                    event: MidiEvent::NoteOn {
                        note,
                        velocity: 80,
                    },
                    received_at: self.at(millis),
                })
                .unwrap();
        }

        fn latest(&self) -> Arc<Snapshot> {
            self.engine.publisher.latest()
        }
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut rig = rig(&[vec![on(0, 1, 60), off(9600, 1, 60)]], Settings::default());

        assert_eq!(rig.engine.state(), PlaybackState::Idle);
        rig.play();
        assert_eq!(rig.engine.state(), PlaybackState::Playing);

        let now = rig.at(100);
        rig.engine.handle_command(Command::Pause, now);
        assert_eq!(rig.engine.state(), PlaybackState::Paused);

        rig.engine.handle_command(Command::Play, now);
        assert_eq!(rig.engine.state(), PlaybackState::Playing);

        rig.engine.handle_command(Command::Stop, now);
        assert_eq!(rig.engine.state(), PlaybackState::Stopped);

        // Stopped is terminal
        rig.engine.handle_command(Command::Play, now);
        assert_eq!(rig.engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_cursor_applies_file_events_in_time() {
        // Note on at 0s, release at 1s, far-off tail keeps the song alive
        let tracks = vec![vec![on(0, 1, 60), off(480, 1, 60), on(9600, 1, 62)]];
        let mut rig = rig(&tracks, Settings::default());
        rig.play();

        rig.engine.tick(rig.at(500));
        let snapshot = rig.latest();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(
            snapshot.active_notes,
            vec![ActiveNoteInfo {
                channel: 1,
                note: 60
            }]
        );
        assert!((snapshot.cursor_seconds - 0.5).abs() < 0.01);

        rig.engine.tick(rig.at(1100));
        assert!(rig.latest().active_notes.is_empty());
    }

    #[test]
    fn test_song_end_stops_with_clean_sweep() {
        // One held note the song never releases; Stop must sweep it
        let tracks = vec![vec![on(0, 1, 60), on(480, 1, 62)]];
        let mut rig = rig(&tracks, Settings::default());
        rig.play();

        rig.engine.tick(rig.at(500));
        assert_eq!(rig.latest().active_notes.len(), 1);

        // Past the 1s duration: everything consumed, scheduler stops
        rig.engine.tick(rig.at(1500));
        let snapshot = rig.latest();
        assert_eq!(snapshot.state, PlaybackState::Stopped);
        assert!(snapshot.active_notes.is_empty());
    }

    #[test]
    fn test_snapshot_carries_prediction() {
        let tracks = vec![vec![on(480, 1, 60), on(0, 2, 48), on(9600, 1, 62)]];
        let mut rig = rig(&tracks, Settings::default());
        rig.play();

        rig.engine.tick(rig.at(100));
        let snapshot = rig.latest();
        let predicted: Vec<u8> = snapshot.predicted_notes.iter().map(|n| n.note).collect();
        assert_eq!(predicted, vec![60, 48]);
        assert!(snapshot.predicted_notes[0].delay_seconds > 0.8);
    }

    #[test]
    fn test_melody_gate_holds_and_releases() {
        let mut settings = Settings::default();
        settings.practice = PracticeMode::Melody;
        // Expected note at 1s on the right hand, then a later one
        let tracks = vec![vec![on(480, 1, 60), on(960, 1, 62)]];
        let mut rig = rig(&tracks, settings);
        rig.play();

        // Way past the note's time: the gate freezes the cursor at 1.0s
        rig.engine.tick(rig.at(3000));
        let held = rig.latest();
        assert!((held.cursor_seconds - 1.0).abs() < 1e-6);
        assert_eq!(
            held.waiting_on,
            vec![ActiveNoteInfo {
                channel: 1,
                note: 60
            }]
        );

        // Still held two seconds later
        rig.engine.tick(rig.at(5000));
        assert!((rig.latest().cursor_seconds - 1.0).abs() < 1e-6);

        // The player presses the expected key
        rig.press(1, 60, 5000);
        rig.engine.tick(rig.at(5016));
        assert!(rig.latest().waiting_on.is_empty());

        // Playback continues from the gate time, not from wall time
        rig.engine.tick(rig.at(5516));
        let resumed = rig.latest();
        assert!((resumed.cursor_seconds - 1.5).abs() < 0.01);
    }

    #[test]
    fn test_wrong_notes_count_and_restart_loop() {
        let mut settings = Settings::default();
        settings.practice = PracticeMode::Melody;
        settings.mistake_limit = 1;
        let tracks = vec![vec![on(480, 1, 60), on(960, 1, 62)]];
        let mut rig = rig(&tracks, settings);
        rig.play();

        rig.engine.tick(rig.at(2000)); // gate engaged at 1.0s
        rig.press(1, 50, 2100); // wrong
        rig.engine.tick(rig.at(2116));
        assert_eq!(rig.latest().mistakes, 1);

        // Second wrong note exceeds the limit of 1: loop restarts
        rig.press(1, 51, 2200);
        rig.engine.tick(rig.at(2216));
        let snapshot = rig.latest();
        assert_eq!(snapshot.mistakes, 0);
        assert_eq!(snapshot.cursor_seconds, 0.0);
        assert!(snapshot.waiting_on.is_empty());

        use ringbuf::traits::Consumer;
        let messages: Vec<String> = std::iter::from_fn(|| rig.notifications.try_pop())
            .map(|n| n.message)
            .collect();
        assert!(messages.iter().any(|m| m.contains("wrong note")));
        assert!(messages.iter().any(|m| m.contains("mistake limit")));
    }

    #[test]
    fn test_loop_region_wraps() {
        let mut settings = Settings::default();
        settings.loop_region = LoopSettings {
            enabled: true,
            start_percent: 0.0,
            end_percent: 50.0,
        };
        // 4-second song; loop region covers the first 2 seconds
        let tracks = vec![vec![on(0, 1, 60), off(480, 1, 60), on(1440, 1, 62)]];
        let mut rig = rig(&tracks, settings);
        rig.play();

        rig.engine.tick(rig.at(2500));
        let snapshot = rig.latest();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        // Wrapped back near the start instead of running to 2.5s
        assert!(snapshot.cursor_seconds < 1.0);
        assert!(snapshot.active_notes.is_empty());
    }

    #[test]
    fn test_invalid_tempo_scale_rejected_at_runtime() {
        let tracks = vec![vec![on(0, 1, 60), on(9600, 1, 62)]];
        let mut rig = rig(&tracks, Settings::default());
        rig.play();

        rig.engine.handle_command(Command::SetTempoScale(0), rig.at(100));
        rig.engine.tick(rig.at(200));
        assert_eq!(rig.latest().tempo_scale_percent, 100);

        use ringbuf::traits::Consumer;
        let warned = std::iter::from_fn(|| rig.notifications.try_pop())
            .any(|n| n.message.contains("tempo scale"));
        assert!(warned);
    }

    #[test]
    fn test_tempo_scale_slows_cursor() {
        let tracks = vec![vec![on(0, 1, 60), on(9600, 1, 62)]];
        let mut settings = Settings::default();
        settings.tempo_scale_percent = 50;
        let mut rig = rig(&tracks, settings);
        rig.play();

        rig.engine.tick(rig.at(2000));
        // Half speed: 2 wall seconds move the song 1 second
        assert!((rig.latest().cursor_seconds - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_paused_still_tracks_live_input() {
        let tracks = vec![vec![on(9600, 1, 62)]];
        let mut rig = rig(&tracks, Settings::default());
        rig.play();
        rig.engine.handle_command(Command::Pause, rig.at(100));

        rig.press(1, 64, 150);
        rig.engine.tick(rig.at(200));
        let snapshot = rig.latest();
        assert_eq!(snapshot.state, PlaybackState::Paused);
        assert_eq!(
            snapshot.active_notes,
            vec![ActiveNoteInfo {
                channel: 1,
                note: 64
            }]
        );
    }
}
