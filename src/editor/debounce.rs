//! Debounce scheduler: coalesces bursts of change notifications into one
//! deferred action.
//!
//! Each `on_change` re-arms a single timer `delay` after the most recent call,
//! replacing any timer that has not fired yet. `cancel` disarms it. A
//! generation counter makes both operations take effect immediately, even
//! against a timer that has already elapsed but whose task has not run.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Default quiet period before a save fires
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Action run when the quiet period elapses
pub type DebouncedAction = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct DebounceState {
    /// Bumped on every arm/cancel; a timer only fires if its generation is current
    generation: u64,
    armed: Option<JoinHandle<()>>,
    last_change: Option<Instant>,
    fire_count: u64,
}

/// A cancellable, re-armable deferred trigger
pub struct Debouncer {
    delay: Duration,
    runtime: Handle,
    action: DebouncedAction,
    state: Arc<Mutex<DebounceState>>,
}

impl Debouncer {
    /// Create a debouncer whose timers run on `runtime`
    pub fn new(delay: Duration, runtime: Handle, action: DebouncedAction) -> Self {
        Self {
            delay,
            runtime,
            action,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    /// Record a change now and (re)arm the trigger
    pub fn on_change(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;
        if let Some(previous) = state.armed.take() {
            previous.abort();
        }
        state.last_change = Some(Instant::now());

        let delay = self.delay;
        let action = self.action.clone();
        let shared: Weak<Mutex<DebounceState>> = Arc::downgrade(&self.state);

        state.armed = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(shared) = shared.upgrade() else {
                return;
            };
            {
                let mut state = shared.lock();
                if state.generation != generation {
                    return;
                }
                state.armed = None;
                state.fire_count += 1;
            }
            trace!("Debounce fired (generation {})", generation);
            action();
        }));
    }

    /// Disarm any pending trigger. Returns true if one was armed.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        state.generation += 1;
        match state.armed.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// True while a trigger is armed and has not fired
    pub fn is_armed(&self) -> bool {
        self.state.lock().armed.is_some()
    }

    /// Number of times the action has run
    pub fn fire_count(&self) -> u64 {
        self.state.lock().fire_count
    }

    /// Time of the most recent `on_change`
    pub fn last_change(&self) -> Option<Instant> {
        self.state.lock().last_change
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
