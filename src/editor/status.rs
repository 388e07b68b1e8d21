//! Save-status state machine.
//!
//! The machine itself is owned by the autosave session; everyone else gets a
//! read-only [`StatusSignal`]. Allowed transitions:
//!
//! ```text
//! Idle | Saved | Failed | Saving --change--> Pending
//! Pending --fire + credential--> Saving
//! Pending --fire, no credential--> Failed
//! Pending --teardown--> Idle
//! Saving --success--> Saved
//! Saving --error--> Failed
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Capacity of the transition event channel
const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// Persistence state of the open document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    /// No pending work
    #[default]
    Idle,
    /// A change was observed; the save trigger is armed
    Pending,
    /// A persistence call is in flight
    Saving,
    /// The last attempt succeeded
    Saved,
    /// The last attempt failed
    Failed,
}

impl SaveStatus {
    /// Compact indicator text for the UI
    pub fn label(self) -> &'static str {
        match self {
            SaveStatus::Idle => "",
            SaveStatus::Pending => "Unsaved changes",
            SaveStatus::Saving => "Saving…",
            SaveStatus::Saved => "Saved",
            SaveStatus::Failed => "Save failed",
        }
    }

    /// True while work is outstanding
    pub fn is_busy(self) -> bool {
        matches!(self, SaveStatus::Pending | SaveStatus::Saving)
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveStatus::Idle => "idle",
            SaveStatus::Pending => "pending",
            SaveStatus::Saving => "saving",
            SaveStatus::Saved => "saved",
            SaveStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One applied transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: SaveStatus,
    pub to: SaveStatus,
}

/// Read-only view of a session's save status
#[derive(Clone)]
pub struct StatusSignal {
    current: watch::Receiver<SaveStatus>,
    transitions: broadcast::Sender<StatusTransition>,
}

impl StatusSignal {
    /// Status right now
    pub fn current(&self) -> SaveStatus {
        *self.current.borrow()
    }

    /// Wait until the status changes from the last value seen by this handle.
    /// Returns `None` once the owning session is gone.
    pub async fn changed(&mut self) -> Option<SaveStatus> {
        self.current.changed().await.ok()?;
        Some(*self.current.borrow_and_update())
    }

    /// Wait until the status satisfies `predicate`.
    /// Returns `None` if the owning session goes away first.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&SaveStatus) -> bool) -> Option<SaveStatus> {
        self.current.wait_for(predicate).await.ok().map(|status| *status)
    }

    /// Stream of every transition applied from now on
    pub fn transitions(&self) -> broadcast::Receiver<StatusTransition> {
        self.transitions.subscribe()
    }
}

/// The state machine; only the autosave session holds one
pub struct StatusMachine {
    /// Serializes check-and-set so concurrent callers cannot interleave
    guard: Mutex<()>,
    current: watch::Sender<SaveStatus>,
    transitions: broadcast::Sender<StatusTransition>,
}

impl StatusMachine {
    pub fn new() -> Self {
        let (current, _) = watch::channel(SaveStatus::Idle);
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            guard: Mutex::new(()),
            current,
            transitions,
        }
    }

    pub fn signal(&self) -> StatusSignal {
        StatusSignal {
            current: self.current.subscribe(),
            transitions: self.transitions.clone(),
        }
    }

    pub fn current(&self) -> SaveStatus {
        *self.current.borrow()
    }

    /// A change was observed
    pub fn mark_pending(&self) -> bool {
        self.transition(
            &[
                SaveStatus::Idle,
                SaveStatus::Saved,
                SaveStatus::Failed,
                SaveStatus::Saving,
            ],
            SaveStatus::Pending,
        )
    }

    /// The trigger fired with a credential available
    pub fn begin_saving(&self) -> bool {
        self.transition(&[SaveStatus::Pending], SaveStatus::Saving)
    }

    /// The trigger fired but nothing could be sent
    pub fn fail_pending(&self) -> bool {
        self.transition(&[SaveStatus::Pending], SaveStatus::Failed)
    }

    /// Teardown before the trigger fired
    pub fn cancel_pending(&self) -> bool {
        self.transition(&[SaveStatus::Pending], SaveStatus::Idle)
    }

    /// The in-flight save completed
    pub fn finish_saving(&self, succeeded: bool) -> bool {
        let to = if succeeded {
            SaveStatus::Saved
        } else {
            SaveStatus::Failed
        };
        self.transition(&[SaveStatus::Saving], to)
    }

    fn transition(&self, allowed_from: &[SaveStatus], to: SaveStatus) -> bool {
        let _guard = self.guard.lock();
        let from = *self.current.borrow();
        if !allowed_from.contains(&from) {
            if from != to {
                debug!("Ignoring save status transition {} -> {}", from, to);
            }
            return false;
        }

        self.current.send_replace(to);
        let _ = self.transitions.send(StatusTransition { from, to });
        true
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}
