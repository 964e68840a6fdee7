// ==========================================
// QUEUE & PLAYBACK CONTROLLER
// ==========================================
// Owns the queue, the current position, the single live engine instance and
// the watchdog. Every state transition goes through handle(): user
// commands, engine callbacks, watchdog expiry and search results are all
// Events processed one at a time, so auto-next can never interleave with a
// clear.
//
// Engine instances are numbered, and so is every load issued to them. An
// engine event is only applied if it carries the live (instance, load)
// pair: anything still in flight from a destroyed instance, or from an
// earlier track on the same instance, is dropped. That is how a recreate or
// a new PlayAt cancels a late "playing" or "ended" meant for the old track.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::player::engine::{EngineFactory, PlaybackEngine};
use crate::player::events::{Command, EngineEvent, EngineEvents, EngineState, Event, EventSender};
use crate::player::queue::{Queue, Track};
use crate::player::watchdog::{Armed, Watchdog, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub watchdog_timeout: Duration,
    /// None retries a frozen track forever
    pub max_recoveries: Option<u32>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            watchdog_timeout: DEFAULT_TIMEOUT,
            max_recoveries: None,
        }
    }
}

struct LiveEngine {
    instance: u64,
    load: u64,
    engine: Box<dyn PlaybackEngine>,
}

pub struct Controller {
    queue: Queue,
    results: Vec<Track>,
    status: PlaybackStatus,
    factory: Box<dyn EngineFactory>,
    engine: Option<LiveEngine>,
    next_instance: u64,
    next_load: u64,
    autoplay_on_ready: bool,
    watchdog: Watchdog,
    recoveries: u32,
    max_recoveries: Option<u32>,
    tx: EventSender,
}

impl Controller {
    /// `tx` is the sending half of the channel the caller feeds back into
    /// handle(); engines and the watchdog report through it.
    pub fn new(config: ControllerConfig, factory: Box<dyn EngineFactory>, tx: EventSender) -> Self {
        Controller {
            queue: Queue::new(),
            results: Vec::new(),
            status: PlaybackStatus::Idle,
            factory,
            engine: None,
            next_instance: 0,
            next_load: 0,
            autoplay_on_ready: false,
            watchdog: Watchdog::new(config.watchdog_timeout, tx.clone()),
            recoveries: 0,
            max_recoveries: config.max_recoveries,
            tx,
        }
    }

    // ==========================================
    // SINGLE ENTRY POINT: handle()
    // ==========================================
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.handle_command(command),
            Event::Engine {
                instance,
                load,
                event,
            } => self.handle_engine_event(instance, load, event),
            Event::WatchdogExpired { generation } => {
                if let Some(armed) = self.watchdog.take_expired(generation) {
                    warn!(
                        index = armed.index,
                        video_id = %armed.video_id,
                        "Freeze detected, re-initializing player"
                    );
                    self.recover(armed);
                }
            }
            Event::SearchResults(results) => {
                debug!(count = results.len(), "Search results replaced");
                self.results = results;
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::InstantPlay(track) => {
                info!(video_id = %track.video_id, name = %track.name, "Instant play");
                self.queue.replace(track);
                self.play_at(0);
            }
            Command::AddToQueue(track) => {
                let nothing_selected = self.queue.position().is_none();
                let index = self.queue.add(track);
                debug!(index, "Track queued");
                if nothing_selected {
                    self.play_at(0);
                }
            }
            Command::PlayAt(index) => self.play_at(index),
            Command::Skip => self.advance(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::TogglePause => {
                if self.status == PlaybackStatus::Paused {
                    self.resume();
                } else {
                    self.pause();
                }
            }
            Command::Stop => {
                info!("Stop");
                self.reset();
            }
            Command::Clear => {
                info!("Queue cleared");
                self.reset();
            }
        }
    }

    fn handle_engine_event(&mut self, instance: u64, load: u64, event: EngineEvent) {
        if self.live_load() != Some((instance, load)) {
            debug!(instance, load, ?event, "Dropping event from stale engine load");
            return;
        }

        match event {
            EngineEvent::Ready => {
                if self.autoplay_on_ready {
                    self.autoplay_on_ready = false;
                    self.with_engine("play", |engine| engine.play());
                }
            }
            EngineEvent::StateChanged(EngineState::Playing) => {
                if self.watchdog.is_armed() {
                    debug!(instance, load, "Playback confirmed");
                    self.watchdog.disarm();
                }
                self.recoveries = 0;
                self.status = PlaybackStatus::Playing;
                if let Some(track) = self.queue.current() {
                    info!(video_id = %track.video_id, name = %track.name, "Now playing");
                }
            }
            EngineEvent::StateChanged(EngineState::Paused) => {
                self.status = PlaybackStatus::Paused;
            }
            EngineEvent::StateChanged(EngineState::Ended) => {
                self.status = PlaybackStatus::Ended;
                self.advance();
            }
            EngineEvent::Error(message) => {
                warn!(instance, %message, "Player error, attempting reset");
                let target = self.watchdog.armed().cloned().or_else(|| {
                    let index = self.queue.position()?;
                    let track = self.queue.get(index)?;
                    Some(Armed {
                        generation: 0,
                        index,
                        video_id: track.video_id.clone(),
                    })
                });
                match target {
                    Some(target) => self.recover(target),
                    None => debug!("Nothing selected, ignoring player error"),
                }
            }
        }
    }

    // ==========================================
    // PLAYBACK: play_at()
    // ==========================================
    // Selects `index`, arms the watchdog for it and asks the engine to play.
    // Out-of-bounds indexes are ignored.
    fn play_at(&mut self, index: usize) {
        let Some(track) = self.queue.select(index).cloned() else {
            debug!(index, len = self.queue.len(), "play_at out of bounds");
            return;
        };

        self.recoveries = 0;
        self.status = PlaybackStatus::Loading;
        self.watchdog.arm(index, &track.video_id);

        self.next_load += 1;
        let load = self.next_load;
        let tx = self.tx.clone();

        let loaded = match self.engine.as_mut() {
            Some(live) if live.engine.is_usable() => {
                live.load = load;
                let events = EngineEvents::new(live.instance, load, tx);
                let result = live
                    .engine
                    .load(&track.video_id, events)
                    .and_then(|_| live.engine.play());
                if let Err(e) = &result {
                    debug!(instance = live.instance, error = %e, "Command failed on live engine");
                }
                result.is_ok()
            }
            _ => false,
        };

        if loaded {
            self.autoplay_on_ready = false;
        } else {
            self.destroy_engine();
            self.create_engine(&track.video_id);
        }
    }

    // Skip and auto-next: move to the next index if there is one, otherwise
    // leave position and playback exactly as they are.
    fn advance(&mut self) {
        match self.queue.next_index() {
            Some(next) => self.play_at(next),
            None => debug!(position = ?self.queue.position(), "No next track"),
        }
    }

    fn pause(&mut self) {
        if self.with_engine("pause", |engine| engine.pause()) {
            self.status = PlaybackStatus::Paused;
        }
    }

    fn resume(&mut self) {
        if self.with_engine("play", |engine| engine.play()) && self.status == PlaybackStatus::Paused {
            self.status = PlaybackStatus::Playing;
        }
    }

    // Stop and Clear: stop the engine, forget the queue, cancel the watchdog.
    fn reset(&mut self) {
        self.with_engine("stop", |engine| engine.stop());
        self.queue.clear();
        self.watchdog.disarm();
        self.autoplay_on_ready = false;
        self.recoveries = 0;
        self.status = PlaybackStatus::Idle;
    }

    // ==========================================
    // RECOVERY
    // ==========================================
    // Destroy whatever instance exists, build a fresh one for the track
    // captured at arm time and re-arm so a second freeze is caught too.
    fn recover(&mut self, target: Armed) {
        if let Some(max) = self.max_recoveries {
            if self.recoveries >= max {
                error!(
                    video_id = %target.video_id,
                    attempts = self.recoveries,
                    "Giving up on track after repeated freezes"
                );
                self.watchdog.disarm();
                self.destroy_engine();
                self.status = PlaybackStatus::Idle;
                return;
            }
        }

        self.recoveries += 1;
        info!(
            video_id = %target.video_id,
            attempt = self.recoveries,
            "Recreating player"
        );

        self.destroy_engine();
        self.status = PlaybackStatus::Loading;
        self.watchdog.arm(target.index, &target.video_id);
        self.create_engine(&target.video_id);
    }

    fn create_engine(&mut self, video_id: &str) {
        self.next_instance += 1;
        self.next_load += 1;
        let instance = self.next_instance;
        let load = self.next_load;
        let events = EngineEvents::new(instance, load, self.tx.clone());

        match self.factory.create(video_id, events) {
            Ok(engine) => {
                debug!(instance, video_id, "Engine instance created");
                self.engine = Some(LiveEngine {
                    instance,
                    load,
                    engine,
                });
                self.autoplay_on_ready = true;
            }
            Err(e) => {
                // the armed watchdog will try again
                warn!(instance, video_id, error = %e, "Failed to create engine instance");
                self.engine = None;
                self.autoplay_on_ready = false;
            }
        }
    }

    fn destroy_engine(&mut self) {
        self.autoplay_on_ready = false;
        if let Some(mut live) = self.engine.take() {
            if let Err(e) = live.engine.destroy() {
                debug!(instance = live.instance, error = %e, "Ignoring destroy failure");
            }
        }
    }

    // Runs a command on the live engine. Failures are logged, never fatal.
    fn with_engine<F>(&mut self, what: &str, f: F) -> bool
    where
        F: FnOnce(&mut dyn PlaybackEngine) -> crate::error::Result<()>,
    {
        match self.engine.as_mut() {
            Some(live) => match f(live.engine.as_mut()) {
                Ok(()) => true,
                Err(e) => {
                    debug!(instance = live.instance, command = what, error = %e, "Engine command failed");
                    false
                }
            },
            None => false,
        }
    }

    fn live_instance(&self) -> Option<u64> {
        self.engine.as_ref().map(|live| live.instance)
    }

    fn live_load(&self) -> Option<(u64, u64)> {
        self.engine.as_ref().map(|live| (live.instance, live.load))
    }

    pub fn sender(&self) -> EventSender {
        self.tx.clone()
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn position(&self) -> Option<usize> {
        self.queue.position()
    }

    pub fn current(&self) -> Option<&Track> {
        self.queue.current()
    }

    pub fn results(&self) -> &[Track] {
        &self.results
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn armed(&self) -> Option<&Armed> {
        self.watchdog.armed()
    }

    pub fn engine_instance(&self) -> Option<u64> {
        self.live_instance()
    }

    /// (instance, load) that engine events must carry to be applied
    #[cfg(test)]
    pub fn engine_load(&self) -> Option<(u64, u64)> {
        self.live_load()
    }

    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }
}
