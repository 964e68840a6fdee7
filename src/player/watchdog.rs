// ==========================================
// PLAYBACK WATCHDOG
// ==========================================
// Detects a play attempt that never reached the "playing" state.
//
// Every arm() schedules a single timer task that sends
// Event::WatchdogExpired { generation } after the configured delay.
// Arming again (or disarming) aborts the previous task and bumps the
// generation, so at most one timer is ever live.
//
// Aborting the task is not enough on its own: the expiry may already be
// sitting in the channel when the controller disarms. take_expired() only
// honors an expiry whose generation matches the currently armed one.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::player::events::{Event, EventSender};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// What the timer was armed for, captured at arm time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Armed {
    pub generation: u64,
    pub index: usize,
    pub video_id: String,
}

pub struct Watchdog {
    timeout: Duration,
    tx: EventSender,
    generation: u64,
    armed: Option<Armed>,
    timer: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new(timeout: Duration, tx: EventSender) -> Self {
        Watchdog {
            timeout,
            tx,
            generation: 0,
            armed: None,
            timer: None,
        }
    }

    /// Cancels any pending timer and schedules a new one for (index, video_id).
    ///
    /// Returns the generation of the new timer.
    pub fn arm(&mut self, index: usize, video_id: &str) -> u64 {
        self.cancel_timer();
        self.generation += 1;
        let generation = self.generation;

        self.armed = Some(Armed {
            generation,
            index,
            video_id: video_id.to_string(),
        });

        let tx = self.tx.clone();
        let timeout = self.timeout;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Event::WatchdogExpired { generation });
        }));

        debug!(generation, index, video_id, "Watchdog armed");
        generation
    }

    /// Playback confirmed (or abandoned): cancel without recovery.
    pub fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            debug!(generation = armed.generation, "Watchdog disarmed");
        }
        self.cancel_timer();
        self.generation += 1;
    }

    /// Consumes an expiry. Returns what was armed if `generation` is the live
    /// timer, None for a stale or already-cancelled one.
    pub fn take_expired(&mut self, generation: u64) -> Option<Armed> {
        match &self.armed {
            Some(armed) if armed.generation == generation => {
                self.timer = None;
                self.armed.take()
            }
            _ => {
                debug!(generation, current = self.generation, "Ignoring stale watchdog expiry");
                None
            }
        }
    }

    pub fn armed(&self) -> Option<&Armed> {
        self.armed.as_ref()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
