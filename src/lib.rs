// keylight - real-time MIDI timeline engine for LED piano learning and
// flying-note visualization

pub mod broadcast;
pub mod config;
pub mod frame;
pub mod messaging;
pub mod midi;
pub mod predict;
pub mod router;
pub mod scheduler;
pub mod timeline;
pub mod timing;
pub mod tracker;

// Re-export commonly used types for convenience
pub use broadcast::{Snapshot, SnapshotPublisher, SnapshotSink};
pub use config::{HandMap, PracticeMode, Settings};
pub use messaging::channels::{create_live_event_channel, create_notification_channel};
pub use messaging::command::Command;
pub use midi::event::{ChannelEvent, Hand, LiveEvent, MidiEvent, TrackEvent};
pub use midi::manager::MidiInputManager;
pub use predict::{PredictionBatch, calculate_window, predict};
pub use router::EventQueueRouter;
pub use scheduler::session::Session;
pub use scheduler::{PlaybackState, SchedulerHandle, TickEngine};
pub use timeline::cache::TimelineCache;
pub use timeline::{Timeline, TimelineEntry};
pub use timing::{TempoMap, apply_tempo_scale, ticks_to_seconds};
pub use tracker::{NoteSnapshot, NoteStateTracker};
