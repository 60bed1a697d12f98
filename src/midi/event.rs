// MIDI event model - shared by the live-input and file-timeline paths

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A MIDI message, channel carried separately (see [`ChannelEvent`]).
///
/// The kind set is closed: anything the engine does not act on is dropped at
/// the parsing boundary, so downstream matches can stay exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
    /// Tempo meta event, microseconds per quarter note.
    Tempo { micros_per_beat: u32 },
}

impl MidiEvent {
    /// Parse a raw MIDI message as received from a device.
    ///
    /// Running status is not handled: midir always delivers complete
    /// messages. Unknown or truncated messages yield `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<ChannelEvent> {
        if bytes.is_empty() {
            return None;
        }

        let status = bytes[0];
        let channel = status & 0x0F;
        let message_type = status & 0xF0;

        let event = match message_type {
            0x90 => {
                if bytes.len() < 3 {
                    return None;
                }
                // Velocity 0 is a release on the wire
                if bytes[2] == 0 {
                    MidiEvent::NoteOff { note: bytes[1] }
                } else {
                    MidiEvent::NoteOn {
                        note: bytes[1],
                        velocity: bytes[2],
                    }
                }
            }
            0x80 => {
                if bytes.len() < 3 {
                    return None;
                }
                MidiEvent::NoteOff { note: bytes[1] }
            }
            0xB0 => {
                if bytes.len() < 3 {
                    return None;
                }
                MidiEvent::ControlChange {
                    controller: bytes[1],
                    value: bytes[2],
                }
            }
            _ => return None,
        };

        Some(ChannelEvent { channel, event })
    }

    /// Rewrite `NoteOff` as a velocity-0 `NoteOn`.
    ///
    /// The timeline and the note tracker only ever see normalized events, so
    /// both release encodings go through a single code path.
    pub fn normalized(self) -> MidiEvent {
        match self {
            MidiEvent::NoteOff { note } => MidiEvent::NoteOn { note, velocity: 0 },
            other => other,
        }
    }

    /// Note number for note events, `None` otherwise.
    pub fn note(&self) -> Option<u8> {
        match self {
            MidiEvent::NoteOn { note, .. } | MidiEvent::NoteOff { note } => Some(*note),
            _ => None,
        }
    }

    /// True for a `NoteOn` that actually starts a sounding note.
    pub fn is_sounding_on(&self) -> bool {
        matches!(self, MidiEvent::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// True for either release encoding.
    pub fn is_release(&self) -> bool {
        matches!(
            self,
            MidiEvent::NoteOff { .. } | MidiEvent::NoteOn { velocity: 0, .. }
        )
    }
}

/// A MIDI event together with its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel: u8,
    pub event: MidiEvent,
}

/// One event of a file track, relative-tick encoded.
///
/// This is the contract with the file-parsing collaborator: ordered per-track
/// lists of delta-timed events. The delta is signed so that a malformed
/// upstream (decreasing absolute ticks) is representable and can be rejected
/// by the timeline builder instead of silently wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEvent {
    pub delta_ticks: i64,
    pub channel: u8,
    pub event: MidiEvent,
}

/// A live event stamped at arrival in the device callback.
#[derive(Debug, Clone, Copy)]
pub struct LiveEvent {
    pub channel: u8,
    pub event: MidiEvent,
    pub received_at: Instant,
}

impl LiveEvent {
    pub fn new(channel_event: ChannelEvent, received_at: Instant) -> Self {
        Self {
            channel: channel_event.channel,
            event: channel_event.event,
            received_at,
        }
    }
}

/// Logical hand grouping, derived from the channel via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
}
