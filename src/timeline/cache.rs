// Timeline cache - skips the merge/convert pass for songs already processed
// Container format: a zip holding metadata.json + timeline.ron

use crate::timeline::Timeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::{ZipArchive, ZipWriter, write::FileOptions};

/// Bump on any change to [`CacheMetadata`] or the serialized timeline
/// layout; older records then read as misses and get rewritten.
pub const CACHE_FORMAT_VERSION: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no cache record for this song")]
    Miss,

    #[error("cache record is stale (source was modified)")]
    Stale,

    #[error("cache format version {found} does not match {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("corrupt cache record: {0}")]
    Corrupt(String),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheMetadata {
    format_version: u32,
    source_path: PathBuf,
    source_modified: DateTime<Utc>,
    written_at: DateTime<Utc>,
    entry_count: usize,
}

/// Stores processed timelines keyed by song path + modification time.
pub struct TimelineCache {
    cache_dir: PathBuf,
}

impl TimelineCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Platform cache directory (`…/keylight`), falling back to a local
    /// directory when the platform offers none.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("keylight")
    }

    /// Retrieve a cached timeline, or `None` for any cold-start condition
    /// (missing, stale, version mismatch, corrupt). Never an error path for
    /// the caller: a miss just means "parse fresh".
    pub fn load(&self, source: &Path) -> Option<Timeline> {
        match self.try_load(source) {
            Ok(timeline) => {
                info!(song = %source.display(), "timeline loaded from cache");
                Some(timeline)
            }
            Err(err) => {
                debug!(song = %source.display(), %err, "timeline cache miss");
                None
            }
        }
    }

    /// Load ignoring staleness: the fallback when a fresh parse of a
    /// modified song fails. Version and integrity checks still apply.
    pub fn load_stale(&self, source: &Path) -> Option<Timeline> {
        match self.read_record(source, false) {
            Ok(timeline) => Some(timeline),
            Err(err) => {
                debug!(song = %source.display(), %err, "no usable stale cache record");
                None
            }
        }
    }

    /// Like [`load`](Self::load), but with the miss reason. Exposed so the
    /// invalidation rules stay testable.
    pub fn try_load(&self, source: &Path) -> Result<Timeline, CacheError> {
        self.read_record(source, true)
    }

    fn read_record(&self, source: &Path, check_stale: bool) -> Result<Timeline, CacheError> {
        let record_path = self.record_path(source);
        if !record_path.is_file() {
            return Err(CacheError::Miss);
        }

        let file = File::open(&record_path)?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        let metadata: CacheMetadata = {
            let mut entry = archive
                .by_name("metadata.json")
                .map_err(|e| CacheError::Corrupt(e.to_string()))?;
            let mut json = String::new();
            entry.read_to_string(&mut json)?;
            serde_json::from_str(&json).map_err(|e| CacheError::Corrupt(e.to_string()))?
        };

        if metadata.format_version != CACHE_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                found: metadata.format_version,
                expected: CACHE_FORMAT_VERSION,
            });
        }

        if check_stale {
            let source_modified = modification_time(source)?;
            if metadata.source_modified < source_modified {
                return Err(CacheError::Stale);
            }
        }

        let timeline: Timeline = {
            let mut entry = archive
                .by_name("timeline.ron")
                .map_err(|e| CacheError::Corrupt(e.to_string()))?;
            let mut ron = String::new();
            entry.read_to_string(&mut ron)?;
            ron::from_str(&ron).map_err(|e| CacheError::Corrupt(e.to_string()))?
        };

        Ok(timeline)
    }

    /// Persist a processed timeline. Best effort: the caller logs a failure
    /// and moves on, the in-memory session is unaffected either way.
    pub fn store(&self, source: &Path, timeline: &Timeline) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir)?;

        let metadata = CacheMetadata {
            format_version: CACHE_FORMAT_VERSION,
            source_path: source.to_path_buf(),
            source_modified: modification_time(source)?,
            written_at: Utc::now(),
            entry_count: timeline.len(),
        };

        let record_path = self.record_path(source);
        let file = File::create(&record_path)?;
        let mut writer = ZipWriter::new(file);

        writer
            .start_file("metadata.json", FileOptions::<()>::default())
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        writer.write_all(json.as_bytes())?;

        writer
            .start_file("timeline.ron", FileOptions::<()>::default())
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let ron =
            ron::to_string(timeline).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        writer.write_all(ron.as_bytes())?;

        writer
            .finish()
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;

        debug!(
            song = %source.display(),
            record = %record_path.display(),
            entries = timeline.len(),
            "timeline cached"
        );
        Ok(())
    }

    /// Record file for a song. The full path is hashed in so same-named
    /// songs in different directories do not collide.
    fn record_path(&self, source: &Path) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "song".to_string());
        self.cache_dir
            .join(format!("{stem}-{:016x}.klc", hasher.finish()))
    }
}

fn modification_time(path: &Path) -> Result<DateTime<Utc>, std::io::Error> {
    Ok(fs::metadata(path)?.modified()?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::{MidiEvent, TrackEvent};

    fn test_timeline() -> Timeline {
        let tracks = vec![vec![
            TrackEvent {
                delta_ticks: 0,
                channel: 1,
                event: MidiEvent::NoteOn {
                    note: 60,
                    velocity: 80,
                },
            },
            TrackEvent {
                delta_ticks: 480,
                channel: 1,
                event: MidiEvent::NoteOff { note: 60 },
            },
        ]];
        Timeline::build(&tracks, 480, 500_000).unwrap()
    }

    fn setup() -> (tempfile::TempDir, TimelineCache, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let cache = TimelineCache::new(dir.path().join("cache"));
        let song = dir.path().join("song.mid");
        fs::write(&song, b"fake midi bytes").unwrap();
        (dir, cache, song)
    }

    #[test]
    fn test_round_trip() {
        let (_dir, cache, song) = setup();
        let timeline = test_timeline();

        cache.store(&song, &timeline).unwrap();
        let loaded = cache.load(&song).expect("expected cache hit");
        assert_eq!(loaded, timeline);
    }

    #[test]
    fn test_missing_record_is_miss() {
        let (_dir, cache, song) = setup();
        assert!(matches!(cache.try_load(&song), Err(CacheError::Miss)));
        assert!(cache.load(&song).is_none());
    }

    #[test]
    fn test_modified_source_invalidates() {
        let (_dir, cache, song) = setup();
        cache.store(&song, &test_timeline()).unwrap();

        // Rewrite the song with a mtime clearly past the stored one
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(120);
        fs::write(&song, b"newer midi bytes").unwrap();
        let file = File::options().write(true).open(&song).unwrap();
        file.set_modified(later).unwrap();

        assert!(matches!(cache.try_load(&song), Err(CacheError::Stale)));
        assert!(cache.load(&song).is_none());
    }

    #[test]
    fn test_version_mismatch_is_miss() {
        let (_dir, cache, song) = setup();
        cache.store(&song, &test_timeline()).unwrap();

        // Rewrite the record's metadata with a stale format version
        let record = cache.record_path(&song);
        let bytes = fs::read(&record).unwrap();
        let mut archive = ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut json = String::new();
        archive
            .by_name("metadata.json")
            .unwrap()
            .read_to_string(&mut json)
            .unwrap();
        let mut metadata: CacheMetadata = serde_json::from_str(&json).unwrap();
        metadata.format_version = CACHE_FORMAT_VERSION - 1;
        let mut ron = String::new();
        archive
            .by_name("timeline.ron")
            .unwrap()
            .read_to_string(&mut ron)
            .unwrap();

        let file = File::create(&record).unwrap();
        let mut writer = ZipWriter::new(file);
        writer
            .start_file("metadata.json", FileOptions::<()>::default())
            .unwrap();
        writer
            .write_all(serde_json::to_string(&metadata).unwrap().as_bytes())
            .unwrap();
        writer
            .start_file("timeline.ron", FileOptions::<()>::default())
            .unwrap();
        writer.write_all(ron.as_bytes()).unwrap();
        writer.finish().unwrap();

        assert!(matches!(
            cache.try_load(&song),
            Err(CacheError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupt_record_is_miss() {
        let (_dir, cache, song) = setup();
        cache.store(&song, &test_timeline()).unwrap();

        fs::write(cache.record_path(&song), b"not a zip archive").unwrap();
        assert!(matches!(cache.try_load(&song), Err(CacheError::Corrupt(_))));
        assert!(cache.load(&song).is_none());
    }
}
