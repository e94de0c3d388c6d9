//! Binary paused state with an optional timed auto-resume and an event
//! queue for autonomous actions suspended while paused.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::event_bus::Event;

use super::duration::parse_duration_secs;

struct State {
    paused: bool,
    queue: Vec<Event>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

/// Process-local pause state. Direct messages always bypass this manager;
/// only scheduler firings (skipped while paused) and webhook-derived
/// autonomous actions (queued while paused) consult it.
pub struct PauseManager {
    state: Mutex<State>,
}

impl PauseManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                paused: false,
                queue: Vec::new(),
                timer: None,
            }),
        })
    }

    /// Pause. `duration`, if it parses, schedules an automatic `resume`
    /// after that many seconds. Idempotent: pausing while already paused
    /// just leaves `paused = true` (replacing any prior auto-resume timer
    /// with the new one, if a duration was given).
    pub fn pause(self: &Arc<Self>, duration: Option<&str>) {
        let mut state = self.state.lock();
        state.paused = true;

        if let Some(old) = state.timer.take() {
            old.abort();
        }

        if let Some(secs) = duration.and_then(parse_duration_secs) {
            let this = Arc::clone(self);
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                let missed = this.resume();
                info!(missed, "pause manager auto-resumed");
            }));
        }
    }

    /// Resume immediately, cancelling any pending auto-resume timer and
    /// draining the queue exactly once. Returns the number of events that
    /// had been queued while paused.
    pub fn resume(&self) -> usize {
        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.paused = false;
        let drained = state.queue.len();
        state.queue.clear();
        drained
    }

    /// Append an event to the pause queue (unbounded; bounded in practice
    /// by pause duration times event rate).
    pub fn queue_event(&self, event: Event) {
        self.state.lock().queue.push(event);
    }

    /// Return and clear the queue.
    pub fn drain_queue(&self) -> Vec<Event> {
        std::mem::take(&mut self.state.lock().queue)
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }
}
