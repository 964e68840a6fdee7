// Inbound messages for the playback controller
//
// Everything that can change the controller's state arrives as an Event on a
// single channel: user commands, engine callbacks, watchdog expiry and search
// results. The controller handles them one at a time.

use tokio::sync::mpsc;

use crate::player::queue::Track;

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// User intents
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    InstantPlay(Track),
    AddToQueue(Track),
    PlayAt(usize),
    Skip,
    Pause,
    Resume,
    TogglePause,
    Stop,
    Clear,
}

/// State changes reported by a Playback Engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Playing,
    Paused,
    Ended,
}

/// Callbacks emitted by a Playback Engine instance
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Ready,
    StateChanged(EngineState),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command(Command),
    /// `instance` is the id the controller assigned when it created the
    /// engine, `load` the sequence number of the load the event belongs to
    Engine {
        instance: u64,
        load: u64,
        event: EngineEvent,
    },
    WatchdogExpired { generation: u64 },
    SearchResults(Vec<Track>),
}

impl From<Command> for Event {
    fn from(command: Command) -> Self {
        Event::Command(command)
    }
}

/// Handle given to an engine so it can report back to the controller.
///
/// The controller hands out a fresh one for every load, so events still in
/// flight from an earlier load of the same instance can be told apart.
/// Sends are best effort: once the controller is gone nobody is listening.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    instance: u64,
    load: u64,
    tx: EventSender,
}

impl EngineEvents {
    pub fn new(instance: u64, load: u64, tx: EventSender) -> Self {
        EngineEvents { instance, load, tx }
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn load(&self) -> u64 {
        self.load
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(Event::Engine {
            instance: self.instance,
            load: self.load,
            event,
        });
    }
}
