// Frame projection - flying-note geometry, keyboard layout, color keys
// Pure functions; an external renderer consumes the output

use crate::config::{FrameSettings, HandMap};
use crate::midi::event::{Hand, MidiEvent};
use crate::predict::SIMULTANEITY_EPSILON;
use crate::timeline::Timeline;
use serde::Serialize;

/// Standard 88-key range: A0..C8.
pub const KEYBOARD_LOW: u8 = 21;
pub const KEYBOARD_HIGH: u8 = 108;

pub const WHITE_KEY_WIDTH: f64 = 20.0;
pub const BLACK_KEY_WIDTH: f64 = 12.0;

/// White or black key, from the pitch class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyClass {
    White,
    Black,
}

impl KeyClass {
    pub fn of(note: u8) -> KeyClass {
        if matches!(note % 12, 1 | 3 | 6 | 8 | 10) {
            KeyClass::Black
        } else {
            KeyClass::White
        }
    }
}

/// Palette lookup key. Palette contents live outside the engine; only the
/// key derivation is in scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorKey {
    pub hand: Hand,
    pub key_class: KeyClass,
    pub upcoming: bool,
}

impl ColorKey {
    /// Unmapped channels fall back to the left hand, like the original
    /// channel test did.
    pub fn derive(hand: Option<Hand>, note: u8, upcoming: bool) -> ColorKey {
        ColorKey {
            hand: hand.unwrap_or(Hand::Left),
            key_class: KeyClass::of(note),
            upcoming,
        }
    }
}

/// One key's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub midi_note: u8,
    pub x: f64,
    pub width: f64,
    pub class: KeyClass,
}

/// Static 88-key layout. White keys tile uniformly; black keys sit at a
/// fixed per-pitch-class offset because their spacing within an octave is
/// irregular (no clean formula reproduces a real keyboard).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyboardLayout {
    keys: Vec<KeyInfo>,
}

impl KeyboardLayout {
    pub fn standard_88() -> KeyboardLayout {
        let mut keys = Vec::with_capacity((KEYBOARD_HIGH - KEYBOARD_LOW + 1) as usize);
        let mut white_count: u32 = 0;

        for midi_note in KEYBOARD_LOW..=KEYBOARD_HIGH {
            let class = KeyClass::of(midi_note);
            let (x, width) = match class {
                KeyClass::White => {
                    let x = white_count as f64 * WHITE_KEY_WIDTH;
                    white_count += 1;
                    (x, WHITE_KEY_WIDTH)
                }
                KeyClass::Black => {
                    let offset = match midi_note % 12 {
                        1 => -6.0,  // C#
                        3 => 6.0,   // D#
                        6 => -8.0,  // F#
                        8 => 0.0,   // G#
                        _ => 8.0,   // A#
                    };
                    let x = (white_count as f64 - 1.0) * WHITE_KEY_WIDTH
                        + WHITE_KEY_WIDTH / 2.0
                        + offset;
                    (x, BLACK_KEY_WIDTH)
                }
            };
            keys.push(KeyInfo {
                midi_note,
                x,
                width,
                class,
            });
        }

        KeyboardLayout { keys }
    }

    pub fn key(&self, midi_note: u8) -> Option<&KeyInfo> {
        if !(KEYBOARD_LOW..=KEYBOARD_HIGH).contains(&midi_note) {
            return None;
        }
        self.keys.get((midi_note - KEYBOARD_LOW) as usize)
    }

    pub fn keys(&self) -> &[KeyInfo] {
        &self.keys
    }

    /// Total width in layout units (52 white keys).
    pub fn width(&self) -> f64 {
        52.0 * WHITE_KEY_WIDTH
    }
}

/// Fraction of the fall a note has completed: 0 at the top of the window,
/// 1 at the keyboard. Negative or above 1 means not visible.
pub fn progress(note_start_seconds: f64, cursor_seconds: f64, lookahead_seconds: f64) -> f64 {
    1.0 - (note_start_seconds - cursor_seconds) / lookahead_seconds
}

/// Position along `canvas_extent` for a falling note, or `None` outside the
/// visible range.
pub fn project_note_position(
    note_start_seconds: f64,
    cursor_seconds: f64,
    lookahead_seconds: f64,
    canvas_extent: f64,
) -> Option<f64> {
    let p = progress(note_start_seconds, cursor_seconds, lookahead_seconds);
    if (0.0..=1.0).contains(&p) {
        Some(canvas_extent * p)
    } else {
        None
    }
}

/// One renderable falling note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleNote {
    pub midi_note: u8,
    pub channel: u8,
    pub velocity: u8,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: ColorKey,
    /// Seconds until the note reaches the keyboard.
    pub time_until_hit: f64,
}

/// Per-tick renderable state. The keyboard layout is published separately
/// (shared, reused unless the layout itself changes).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub visible_notes: Vec<VisibleNote>,
}

/// Project every note-on inside the visual lookahead onto the canvas.
///
/// Stateless: the same (timeline, cursor, settings) always renders the same
/// frame, which keeps the broadcast side frame-consistent with prediction.
pub fn render_frame(
    timeline: &Timeline,
    cursor_index: usize,
    cursor_seconds: f64,
    settings: &FrameSettings,
    layout: &KeyboardLayout,
    hands: &HandMap,
) -> Frame {
    let lookahead = settings.lookahead_seconds();
    let mut visible_notes = Vec::new();

    for entry in &timeline.entries()[cursor_index.min(timeline.len())..] {
        if entry.seconds - cursor_seconds > lookahead {
            break;
        }
        let (note, velocity) = match entry.event {
            MidiEvent::NoteOn { note, velocity } if velocity > 0 => (note, velocity),
            _ => continue,
        };
        let Some(key) = layout.key(note) else {
            continue; // outside the 88-key range
        };
        let Some(fall_position) = project_note_position(
            entry.seconds,
            cursor_seconds,
            lookahead,
            settings.fall_distance,
        ) else {
            continue;
        };

        let time_until_hit = entry.seconds - cursor_seconds;
        let y = settings.canvas_height - settings.keyboard_height - settings.fall_distance
            + fall_position;

        visible_notes.push(VisibleNote {
            midi_note: note,
            channel: entry.channel,
            velocity,
            x: key.x,
            y,
            width: key.width,
            height: settings.note_height,
            color: ColorKey::derive(
                hands.hand_for(entry.channel),
                note,
                time_until_hit > SIMULTANEITY_EPSILON,
            ),
            time_until_hit,
        });
    }

    Frame { visible_notes }
}
