// Runtime configuration - RON settings file plus boundary validation
// Invalid values are rejected at the boundary; callers keep the prior value

use crate::midi::event::Hand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: tempo scale must be > 0, got {0}%")]
    InvalidTempoScale(i64),

    #[error("invalid configuration: lookahead parameters must be non-negative")]
    InvalidLookahead,

    #[error("invalid configuration: loop region {start}%..{end}% is not a valid range")]
    InvalidLoopRegion { start: f64, end: f64 },

    #[error("invalid configuration: live queue capacity must be > 0")]
    InvalidQueueCapacity,

    #[error("invalid configuration: hand channels must differ")]
    AmbiguousHandMap,

    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings file: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Channel → hand policy. Piano learning files conventionally put the right
/// hand on channel 1 and the left on channel 2; both are configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandMap {
    pub right_channel: u8,
    pub left_channel: u8,
}

impl HandMap {
    pub fn hand_for(&self, channel: u8) -> Option<Hand> {
        if channel == self.right_channel {
            Some(Hand::Right)
        } else if channel == self.left_channel {
            Some(Hand::Left)
        } else {
            None
        }
    }
}

impl Default for HandMap {
    fn default() -> Self {
        Self {
            right_channel: 1,
            left_channel: 2,
        }
    }
}

/// What the engine expects from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PracticeMode {
    /// Playback runs on its own; live input only updates note state.
    #[default]
    Listen,
    /// The cursor holds at each upcoming note group until the player sounds
    /// every note in it.
    Melody,
}

/// Which hand(s) the player is practicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HandFilter {
    #[default]
    Both,
    Right,
    Left,
}

impl HandFilter {
    pub fn includes(&self, hand: Option<Hand>) -> bool {
        match self {
            HandFilter::Both => true,
            HandFilter::Right => hand == Some(Hand::Right),
            HandFilter::Left => hand == Some(Hand::Left),
        }
    }
}

/// Prediction window parameters (see `predict::calculate_window`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookaheadSettings {
    pub base_seconds: f64,
    pub skill_level: f64,
    pub song_difficulty: f64,
    /// Hard clamp applied by callers so sparse timelines cannot trigger
    /// unbounded scans.
    pub max_window_seconds: f64,
}

impl Default for LookaheadSettings {
    fn default() -> Self {
        Self {
            base_seconds: 2.0,
            skill_level: 0.0,
            song_difficulty: 0.0,
            max_window_seconds: 8.0,
        }
    }
}

/// Loop region as percentages of the song, matching how players pick a
/// passage to drill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    pub enabled: bool,
    pub start_percent: f64,
    pub end_percent: f64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start_percent: 0.0,
            end_percent: 100.0,
        }
    }
}

/// Flying-notes geometry handed to the frame projector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub canvas_height: f64,
    pub keyboard_height: f64,
    pub note_height: f64,
    /// Distance a note travels before reaching the keyboard; also defines
    /// the visual lookahead (100 px per second of fall).
    pub fall_distance: f64,
}

impl FrameSettings {
    /// Seconds of song time visible above the keyboard.
    pub fn lookahead_seconds(&self) -> f64 {
        self.fall_distance / 100.0
    }
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            canvas_height: 600.0,
            keyboard_height: 80.0,
            note_height: 20.0,
            fall_distance: 520.0,
        }
    }
}

/// Everything the engine consumes from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tempo_scale_percent: u16,
    pub live_queue_capacity: usize,
    pub practice: PracticeMode,
    pub hands: HandFilter,
    pub hand_map: HandMap,
    pub lookahead: LookaheadSettings,
    pub loop_region: LoopSettings,
    /// Mistakes allowed before the loop region restarts; 0 disables.
    pub mistake_limit: u32,
    pub frame: FrameSettings,
    pub songs_dir: PathBuf,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tempo_scale_percent: 100,
            live_queue_capacity: 256,
            practice: PracticeMode::default(),
            hands: HandFilter::default(),
            hand_map: HandMap::default(),
            lookahead: LookaheadSettings::default(),
            loop_region: LoopSettings::default(),
            mistake_limit: 0,
            frame: FrameSettings::default(),
            songs_dir: PathBuf::from("songs"),
            cache_dir: None,
        }
    }
}

impl Settings {
    /// Load and validate a RON settings file.
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let text = fs::read_to_string(path)?;
        let settings: Settings = ron::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tempo_scale_percent == 0 {
            return Err(ConfigError::InvalidTempoScale(
                self.tempo_scale_percent as i64,
            ));
        }
        if self.live_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        let l = &self.lookahead;
        if l.base_seconds < 0.0
            || l.skill_level < 0.0
            || l.song_difficulty < 0.0
            || l.max_window_seconds <= 0.0
        {
            return Err(ConfigError::InvalidLookahead);
        }
        let r = &self.loop_region;
        if !(0.0..=100.0).contains(&r.start_percent)
            || !(0.0..=100.0).contains(&r.end_percent)
            || r.start_percent >= r.end_percent
        {
            return Err(ConfigError::InvalidLoopRegion {
                start: r.start_percent,
                end: r.end_percent,
            });
        }
        if self.hand_map.right_channel == self.hand_map.left_channel {
            return Err(ConfigError::AmbiguousHandMap);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_tempo_scale_rejected() {
        let mut settings = Settings::default();
        settings.tempo_scale_percent = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidTempoScale(0))
        ));
    }

    #[test]
    fn test_inverted_loop_region_rejected() {
        let mut settings = Settings::default();
        settings.loop_region = LoopSettings {
            enabled: true,
            start_percent: 80.0,
            end_percent: 20.0,
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidLoopRegion { .. })
        ));
    }

    #[test]
    fn test_negative_lookahead_rejected() {
        let mut settings = Settings::default();
        settings.lookahead.skill_level = -1.0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidLookahead)
        ));
    }

    #[test]
    fn test_identical_hand_channels_rejected() {
        let mut settings = Settings::default();
        settings.hand_map = HandMap {
            right_channel: 1,
            left_channel: 1,
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::AmbiguousHandMap)
        ));
    }

    #[test]
    fn test_hand_for_channel() {
        let map = HandMap::default();
        assert_eq!(map.hand_for(1), Some(Hand::Right));
        assert_eq!(map.hand_for(2), Some(Hand::Left));
        assert_eq!(map.hand_for(0), None);
        assert_eq!(map.hand_for(9), None);
    }

    #[test]
    fn test_hand_filter() {
        assert!(HandFilter::Both.includes(Some(Hand::Left)));
        assert!(HandFilter::Both.includes(None));
        assert!(HandFilter::Right.includes(Some(Hand::Right)));
        assert!(!HandFilter::Right.includes(Some(Hand::Left)));
        assert!(!HandFilter::Left.includes(None));
    }

    #[test]
    fn test_ron_round_trip() {
        let settings = Settings {
            tempo_scale_percent: 75,
            practice: PracticeMode::Melody,
            hands: HandFilter::Right,
            mistake_limit: 3,
            ..Settings::default()
        };
        let text = ron::to_string(&settings).unwrap();
        let parsed: Settings = ron::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.ron");
        fs::write(&path, "(tempo_scale_percent: 50)").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.tempo_scale_percent, 50);
        assert_eq!(settings.live_queue_capacity, 256);
    }

    #[test]
    fn test_frame_lookahead_derivation() {
        let frame = FrameSettings::default();
        assert!((frame.lookahead_seconds() - 5.2).abs() < 1e-9);
    }
}
