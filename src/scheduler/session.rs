// Session - one loaded song and everything playback needs
// Built during Loading, torn down on Stopped; no hidden process-wide state

use crate::config::{ConfigError, Settings};
use crate::frame::KeyboardLayout;
use crate::predict;
use crate::timeline::cache::TimelineCache;
use crate::timeline::loader::{self, LoadError};
use crate::timeline::{Timeline, TimelineError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    File(#[from] LoadError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything one playback run owns. A fresh `Loading` cycle builds a fresh
/// session with a fresh id, so transports can tell restarts apart.
pub struct Session {
    pub id: Uuid,
    pub song_path: PathBuf,
    pub name: String,
    pub timeline: Arc<Timeline>,
    pub layout: Arc<KeyboardLayout>,
    pub settings: Settings,
    /// Prediction window, precomputed from the lookahead settings.
    pub window_seconds: f64,
}

impl Session {
    /// Build a session: validated settings, cached timeline when the cache
    /// record is still good, fresh parse otherwise.
    ///
    /// A fresh parse that fails falls back to a stale-but-version-compatible
    /// cache record when one exists; only when both paths fail does Loading
    /// fail. A successful fresh parse is cached best-effort.
    pub fn load(
        song_path: &Path,
        settings: Settings,
        cache: &TimelineCache,
    ) -> Result<Session, SessionError> {
        settings.validate()?;

        let timeline = match cache.load(song_path) {
            Some(timeline) => timeline,
            None => match Self::parse_fresh(song_path) {
                Ok(timeline) => {
                    if let Err(err) = cache.store(song_path, &timeline) {
                        warn!(%err, song = %song_path.display(), "failed to cache timeline");
                    }
                    timeline
                }
                Err(err) => match cache.load_stale(song_path) {
                    Some(timeline) => {
                        warn!(
                            %err,
                            song = %song_path.display(),
                            "fresh parse failed, using stale cache record"
                        );
                        timeline
                    }
                    None => return Err(err),
                },
            },
        };

        let name = song_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| song_path.display().to_string());

        info!(
            song = %name,
            entries = timeline.len(),
            notes = timeline.note_on_count(),
            duration = timeline.duration_seconds(),
            "session loaded"
        );

        Ok(Session {
            id: Uuid::new_v4(),
            song_path: song_path.to_path_buf(),
            name,
            timeline: Arc::new(timeline),
            layout: Arc::new(KeyboardLayout::standard_88()),
            window_seconds: predict::window_from(&settings.lookahead),
            settings,
        })
    }

    fn parse_fresh(song_path: &Path) -> Result<Timeline, SessionError> {
        let song = loader::load_file(song_path)?;
        let timeline = Timeline::build(
            &song.tracks,
            song.resolution,
            song.initial_micros_per_beat,
        )?;
        Ok(timeline)
    }

    /// Playback start position: the loop region start when enabled, else 0.
    pub fn start_seconds(&self) -> f64 {
        if self.settings.loop_region.enabled {
            self.timeline.duration_seconds() * self.settings.loop_region.start_percent / 100.0
        } else {
            0.0
        }
    }

    /// Playback end position: the loop region end when enabled, else the
    /// song duration.
    pub fn end_seconds(&self) -> f64 {
        if self.settings.loop_region.enabled {
            self.timeline.duration_seconds() * self.settings.loop_region.end_percent / 100.0
        } else {
            self.timeline.duration_seconds()
        }
    }
}
