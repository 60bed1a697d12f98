// MIDI file loading - adapts parsed SMF data to track event lists
// Byte-level parsing is midly's job; this layer only reshapes its output

use crate::midi::event::{MidiEvent, TrackEvent};
use crate::timing::DEFAULT_MICROS_PER_BEAT;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read MIDI file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("unsupported SMPTE timecode timing")]
    UnsupportedTiming,
}

/// A parsed song, ready for [`crate::timeline::Timeline::build`].
#[derive(Debug, Clone)]
pub struct LoadedSong {
    pub name: String,
    pub resolution: u16,
    pub initial_micros_per_beat: u32,
    pub tracks: Vec<Vec<TrackEvent>>,
}

/// Read and reshape a standard MIDI file.
///
/// Note events get their channel reassigned from the track index so that
/// hand derivation works on files exported per-hand: a two-track file maps
/// tracks to channels 1 and 2, larger files map track k to channel k (track
/// 0 then being the usual meta-only track). Control changes keep the channel
/// they were authored with.
pub fn load_file(path: &Path) -> Result<LoadedSong, LoadError> {
    let bytes = fs::read(path)?;
    let smf = Smf::parse(&bytes)?;

    let resolution = match smf.header.timing {
        Timing::Metrical(ticks_per_beat) => ticks_per_beat.as_int(),
        Timing::Timecode(..) => return Err(LoadError::UnsupportedTiming),
    };

    let channel_offset = if smf.tracks.len() == 2 { 1 } else { 0 };

    let mut tracks: Vec<Vec<TrackEvent>> = Vec::with_capacity(smf.tracks.len());
    let mut initial_micros_per_beat = None;

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let note_channel = ((track_index + channel_offset) & 0x0F) as u8;
        let mut events = Vec::new();
        // Deltas of skipped messages must still advance the clock
        let mut carried_delta: i64 = 0;

        for raw in track {
            let delta = carried_delta + raw.delta.as_int() as i64;

            let converted = match raw.kind {
                TrackEventKind::Midi { channel, message } => match message {
                    MidiMessage::NoteOn { key, vel } => Some(TrackEvent {
                        delta_ticks: delta,
                        channel: note_channel,
                        event: MidiEvent::NoteOn {
                            note: key.as_int(),
                            velocity: vel.as_int(),
                        },
                    }),
                    MidiMessage::NoteOff { key, .. } => Some(TrackEvent {
                        delta_ticks: delta,
                        channel: note_channel,
                        event: MidiEvent::NoteOff { note: key.as_int() },
                    }),
                    MidiMessage::Controller { controller, value } => Some(TrackEvent {
                        delta_ticks: delta,
                        channel: channel.as_int(),
                        event: MidiEvent::ControlChange {
                            controller: controller.as_int(),
                            value: value.as_int(),
                        },
                    }),
                    _ => None,
                },
                TrackEventKind::Meta(MetaMessage::Tempo(micros)) => {
                    let micros_per_beat = micros.as_int();
                    if initial_micros_per_beat.is_none() {
                        initial_micros_per_beat = Some(micros_per_beat);
                    }
                    Some(TrackEvent {
                        delta_ticks: delta,
                        channel: 0,
                        event: MidiEvent::Tempo { micros_per_beat },
                    })
                }
                _ => None,
            };

            match converted {
                Some(event) => {
                    events.push(event);
                    carried_delta = 0;
                }
                None => carried_delta = delta,
            }
        }

        tracks.push(events);
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(LoadedSong {
        name,
        resolution,
        initial_micros_per_beat: initial_micros_per_beat.unwrap_or(DEFAULT_MICROS_PER_BEAT),
        tracks,
    })
}

/// A song file found in the library directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Enumerate `.mid`/`.midi` files under `dir`, sorted by name.
pub fn scan_directory(dir: &Path) -> Vec<SongEntry> {
    let mut songs: Vec<SongEntry> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
        })
        .map(|entry| SongEntry {
            name: entry
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: entry.into_path(),
        })
        .collect();

    songs.sort_by(|a, b| a.name.cmp(&b.name));
    songs
}
