//! Playback tracking

mod tracker;

pub use tracker::{Channel, ExitTrigger, PlaybackTracker, TrackingSession, TrackingState};
