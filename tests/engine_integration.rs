//! End-to-end engine integration
//!
//! Drives the full pipeline - MIDI file on disk, session loading with the
//! timeline cache, tick engine, snapshot encoding - without mocking any
//! layer out.

use keylight::broadcast::{self, Snapshot, SnapshotPublisher};
use keylight::scheduler::{self, PlaybackState, TickEngine};
use keylight::{
    Command, Session, Settings, TimelineCache, create_live_event_channel,
    create_notification_channel,
};
use std::path::Path;
use std::time::{Duration, Instant};

/// Two-hand test song at 120 BPM: right hand C4 on the downbeat, left hand
/// C3 one beat later, one beat of tail.
fn write_song(path: &Path) {
    let mut smf = midly::Smf::new(midly::Header::new(
        midly::Format::Parallel,
        midly::Timing::Metrical(480.into()),
    ));

    let right = vec![
        midly::TrackEvent {
            delta: 0.into(),
            kind: midly::TrackEventKind::Meta(midly::MetaMessage::Tempo(500_000.into())),
        },
        midly::TrackEvent {
            delta: 0.into(),
            kind: midly::TrackEventKind::Midi {
                channel: 0.into(),
                message: midly::MidiMessage::NoteOn {
                    key: 60.into(),
                    vel: 90.into(),
                },
            },
        },
        midly::TrackEvent {
            delta: 480.into(),
            kind: midly::TrackEventKind::Midi {
                channel: 0.into(),
                message: midly::MidiMessage::NoteOff {
                    key: 60.into(),
                    vel: 0.into(),
                },
            },
        },
        midly::TrackEvent {
            delta: 0.into(),
            kind: midly::TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
        },
    ];

    let left = vec![
        midly::TrackEvent {
            delta: 480.into(),
            kind: midly::TrackEventKind::Midi {
                channel: 0.into(),
                message: midly::MidiMessage::NoteOn {
                    key: 48.into(),
                    vel: 70.into(),
                },
            },
        },
        midly::TrackEvent {
            delta: 480.into(),
            kind: midly::TrackEventKind::Midi {
                channel: 0.into(),
                message: midly::MidiMessage::NoteOff {
                    key: 48.into(),
                    vel: 0.into(),
                },
            },
        },
        midly::TrackEvent {
            delta: 0.into(),
            kind: midly::TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
        },
    ];

    smf.tracks.push(right);
    smf.tracks.push(left);
    smf.save(path).unwrap();
}

struct Pipeline {
    engine: TickEngine,
    publisher: SnapshotPublisher,
    origin: Instant,
}

fn pipeline(settings: Settings) -> (tempfile::TempDir, Pipeline) {
    let dir = tempfile::tempdir().unwrap();
    let song = dir.path().join("duet.mid");
    write_song(&song);

    let cache = TimelineCache::new(dir.path().join("cache"));
    let session = Session::load(&song, settings, &cache).unwrap();

    let (_live_tx, live_rx) = create_live_event_channel(64);
    let (notification_tx, _notification_rx) = create_notification_channel(64);
    let publisher = SnapshotPublisher::new(Snapshot::empty(
        PlaybackState::Idle,
        session.layout.clone(),
    ));
    let engine = TickEngine::new(session, live_rx, notification_tx, publisher.clone()).unwrap();

    (
        dir,
        Pipeline {
            engine,
            publisher,
            origin: Instant::now(),
        },
    )
}

#[test]
fn test_file_to_snapshot_pipeline() {
    let (_dir, mut p) = pipeline(Settings::default());
    p.engine
        .handle_command(Command::Play, p.origin);

    // Mid-first-beat: right-hand C4 sounding, left-hand C3 predicted
    p.engine.tick(p.origin + Duration::from_millis(500));
    let snapshot = p.publisher.latest();

    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(snapshot.active_notes.len(), 1);
    assert_eq!(snapshot.active_notes[0].note, 60);
    assert_eq!(snapshot.active_notes[0].channel, 1);

    let predicted: Vec<u8> = snapshot.predicted_notes.iter().map(|n| n.note).collect();
    assert_eq!(predicted, vec![48]);
    assert!((snapshot.predicted_notes[0].delay_seconds - 0.5).abs() < 0.02);

    // The flying-note frame sees both upcoming note-ons inside its window
    assert_eq!(snapshot.frame.visible_notes.len(), 1);
    assert_eq!(snapshot.frame.visible_notes[0].midi_note, 48);
}

#[test]
fn test_snapshot_json_schema_end_to_end() {
    let (_dir, mut p) = pipeline(Settings::default());
    p.engine.handle_command(Command::Play, p.origin);
    p.engine.tick(p.origin + Duration::from_millis(100));

    let snapshot = p.publisher.latest();
    let mut last_layout = None;
    let json = broadcast::encode_snapshot(&snapshot, &mut last_layout).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    for key in [
        "sessionId",
        "seq",
        "state",
        "cursorSeconds",
        "cursorIndex",
        "tempoScalePercent",
        "activeNotes",
        "predictedNotes",
        "frame",
        "keyboardLayout",
    ] {
        assert!(value.get(key).is_some(), "missing snapshot key {key}");
    }
    assert_eq!(
        value["keyboardLayout"]["keys"].as_array().unwrap().len(),
        88
    );
}

#[test]
fn test_playthrough_reaches_stopped_with_clean_state() {
    let (_dir, mut p) = pipeline(Settings::default());
    p.engine.handle_command(Command::Play, p.origin);

    // Step the whole two-second song at the real tick cadence
    let mut millis = 0;
    while p.publisher.latest().state != PlaybackState::Stopped {
        millis += 16;
        assert!(millis < 4000, "song never finished");
        p.engine.tick(p.origin + Duration::from_millis(millis));
    }

    let last = p.publisher.latest();
    assert_eq!(last.state, PlaybackState::Stopped);
    assert!(last.active_notes.is_empty(), "stop must sweep notes");
}

#[test]
fn test_cached_reload_matches_fresh_parse() {
    let dir = tempfile::tempdir().unwrap();
    let song = dir.path().join("duet.mid");
    write_song(&song);
    let cache = TimelineCache::new(dir.path().join("cache"));

    let fresh = Session::load(&song, Settings::default(), &cache).unwrap();
    let cached = Session::load(&song, Settings::default(), &cache).unwrap();

    assert_eq!(fresh.timeline.entries(), cached.timeline.entries());
    assert_eq!(
        fresh.timeline.tempo_map().events(),
        cached.timeline.tempo_map().events()
    );
}

#[test]
fn test_scheduler_thread_runs_a_song_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let song = dir.path().join("duet.mid");
    write_song(&song);

    let mut settings = Settings::default();
    settings.cache_dir = Some(dir.path().join("cache"));
    // 4x speed keeps the test short
    settings.tempo_scale_percent = 400;

    let (_live_tx, live_rx) = create_live_event_channel(64);
    let (notification_tx, _notification_rx) = create_notification_channel(64);
    let handle = scheduler::spawn(song, settings, live_rx, notification_tx, true);

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut saw_playing = false;
    let final_state = loop {
        let snapshot = handle.latest();
        if snapshot.state == PlaybackState::Playing {
            saw_playing = true;
        }
        if snapshot.state == PlaybackState::Stopped {
            break snapshot;
        }
        assert!(Instant::now() < deadline, "scheduler never stopped");
        std::thread::sleep(Duration::from_millis(10));
    };

    assert!(saw_playing, "scheduler never reached Playing");
    assert!(final_state.active_notes.is_empty());
    handle.join();
}

#[test]
fn test_loading_failure_parks_in_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let song = dir.path().join("broken.mid");
    std::fs::write(&song, b"garbage").unwrap();

    let mut settings = Settings::default();
    settings.cache_dir = Some(dir.path().join("cache"));

    let (_live_tx, live_rx) = create_live_event_channel(64);
    let (notification_tx, mut notification_rx) = create_notification_channel(64);
    let handle = scheduler::spawn(song, settings, live_rx, notification_tx, true);

    let deadline = Instant::now() + Duration::from_secs(10);
    while handle.latest().state != PlaybackState::Stopped {
        assert!(Instant::now() < deadline, "failed load never reached Stopped");
        std::thread::sleep(Duration::from_millis(10));
    }
    handle.join();

    use ringbuf::traits::Consumer;
    let reported = std::iter::from_fn(|| notification_rx.try_pop())
        .any(|n| n.message.contains("MIDI file"));
    assert!(reported, "loading failure must be reported");
}
