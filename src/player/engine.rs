// Playback Engine contract consumed by the controller
//
// The engine is a black box: the controller can load a track by identifier,
// play/pause/stop it and destroy the instance. Everything the engine has to
// say comes back as EngineEvent through the EngineEvents handle it was
// created with.

use crate::error::Result;
use crate::player::events::EngineEvents;

pub trait PlaybackEngine: Send {
    /// Start fetching `video_id`; playback starts on the next `play()`.
    ///
    /// Everything about this load, including pause reports, goes out
    /// through `events` from now on.
    fn load(&mut self, video_id: &str, events: EngineEvents) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Tear the instance down. Any later command fails.
    fn destroy(&mut self) -> Result<()>;

    /// False once destroyed (or if the instance never finished initializing).
    fn is_usable(&self) -> bool;
}

/// Creates fresh engine instances targeting a track.
///
/// A new instance loads `video_id` as its first load, reporting through
/// `events`, and emits `EngineEvent::Ready` once it can accept `play()`.
pub trait EngineFactory: Send {
    fn create(&mut self, video_id: &str, events: EngineEvents) -> Result<Box<dyn PlaybackEngine>>;
}
