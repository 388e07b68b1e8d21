//! Autosave session controller.
//!
//! One [`AutosaveSession`] exists per open document. It subscribes to the
//! editing surface, re-arms the debouncer on every change, and when the
//! debouncer fires takes a snapshot, reads the credential, and hands the
//! snapshot to the persistence client.
//!
//! Every save is tagged with a sequence number. A response only updates the
//! status if it belongs to the most recent save and the session is still
//! open; anything else is discarded. Closing the session (explicitly or by
//! drop) unsubscribes and disarms the debouncer. A request already in flight
//! runs to completion, but its result is ignored.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tracing::{debug, info, warn};

use crate::config::AutosaveConfig;
use crate::model::DocumentId;

use super::client::{PersistenceClient, SaveError};
use super::debounce::Debouncer;
use super::session::{AuthRejectionSink, Credential, SessionGate};
use super::snapshot::Snapshot;
use super::status::{SaveStatus, StatusMachine, StatusSignal};
use super::surface::{EditingSurface, Subscription};

/// Errors starting an autosave session
#[derive(Error, Debug)]
pub enum AutosaveError {
    #[error("Autosave needs a running tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

/// Result type for autosave operations
pub type AutosaveResult<T> = Result<T, AutosaveError>;

/// Collaborators shared by every session
#[derive(Clone)]
pub struct AutosaveContext {
    pub gate: Arc<dyn SessionGate>,
    pub client: Arc<dyn PersistenceClient>,
    pub on_auth_rejected: Arc<dyn AuthRejectionSink>,
    pub config: AutosaveConfig,
}

impl AutosaveContext {
    /// Build a context where one session store is both the gate and the
    /// rejection sink
    pub fn new<S>(session: Arc<S>, client: Arc<dyn PersistenceClient>, config: AutosaveConfig) -> Self
    where
        S: SessionGate + AuthRejectionSink + 'static,
    {
        Self {
            gate: session.clone(),
            client,
            on_auth_rejected: session,
            config,
        }
    }
}

#[derive(Default)]
struct SaveBook {
    /// Highest sequence number handed out so far
    latest_seq: u64,
    detached: bool,
    /// Fingerprint of the last snapshot the store acknowledged
    last_saved_fingerprint: Option<String>,
}

struct SessionShared {
    document_id: DocumentId,
    surface: Arc<dyn EditingSurface>,
    context: AutosaveContext,
    runtime: Handle,
    status: StatusMachine,
    debouncer: Debouncer,
    book: Mutex<SaveBook>,
}

impl SessionShared {
    fn on_change(&self) {
        let book = self.book.lock();
        if book.detached {
            return;
        }
        self.status.mark_pending();
        self.debouncer.on_change();
        drop(book);
        debug!(document_id = %self.document_id, "Change observed, autosave armed");
    }

    fn fire(self: &Arc<Self>) {
        if self.book.lock().detached {
            return;
        }

        // Both are read fresh at fire time, never cached from activation.
        let snapshot = self.surface.snapshot_now();
        let credential = self.context.gate.current_credential();

        let mut book = self.book.lock();
        if book.detached {
            return;
        }

        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(document_id = %self.document_id, "Snapshot failed, save skipped: {}", e);
                self.status.fail_pending();
                return;
            }
        };
        let Some(credential) = credential else {
            warn!(document_id = %self.document_id, "{}, save skipped", SaveError::MissingCredential);
            self.status.fail_pending();
            return;
        };

        book.latest_seq += 1;
        let seq = book.latest_seq;
        let fingerprint = snapshot.fingerprint();
        if book.last_saved_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            debug!(document_id = %self.document_id, seq, "Snapshot matches the last acknowledged save");
        }
        self.status.begin_saving();
        drop(book);

        debug!(document_id = %self.document_id, seq, "Saving snapshot");
        self.spawn_save(seq, snapshot, fingerprint, credential);
    }

    fn spawn_save(self: &Arc<Self>, seq: u64, snapshot: Snapshot, fingerprint: String, credential: Credential) {
        let session = Arc::downgrade(self);
        let client = self.context.client.clone();
        let sink = self.context.on_auth_rejected.clone();
        let document_id = self.document_id.clone();

        self.runtime.spawn(async move {
            let result = client.save(&document_id, &snapshot, &credential).await;

            // The credential is bad whether or not anyone still cares about this response.
            if matches!(result, Err(SaveError::AuthRejected)) {
                sink.auth_rejected(&credential);
            }

            match session.upgrade() {
                Some(session) => session.complete(seq, fingerprint, result),
                None => debug!(document_id = %document_id, seq, "Session gone, save response discarded"),
            }
        });
    }

    fn complete(&self, seq: u64, fingerprint: String, result: Result<(), SaveError>) {
        let mut book = self.book.lock();
        if book.detached {
            debug!(document_id = %self.document_id, seq, "Session closed, save response discarded");
            return;
        }
        if seq != book.latest_seq {
            debug!(
                document_id = %self.document_id,
                seq,
                latest = book.latest_seq,
                "Superseded save response discarded"
            );
            return;
        }

        match result {
            Ok(()) => {
                book.last_saved_fingerprint = Some(fingerprint);
                if self.status.finish_saving(true) {
                    info!(document_id = %self.document_id, seq, "Document saved");
                } else {
                    debug!(document_id = %self.document_id, seq, "Saved, newer changes pending");
                }
            }
            Err(e) => {
                warn!(document_id = %self.document_id, seq, "Autosave failed: {}", e);
                self.status.finish_saving(false);
            }
        }
    }

    fn detach(&self) {
        let mut book = self.book.lock();
        if book.detached {
            return;
        }
        book.detached = true;
        self.debouncer.cancel();
        self.status.cancel_pending();
        debug!(document_id = %self.document_id, "Autosave session closed");
    }
}

/// Autosave wiring for one open document
pub struct AutosaveSession {
    shared: Arc<SessionShared>,
    subscription: Option<Subscription>,
}

impl AutosaveSession {
    /// Start observing `surface` and saving it as `document_id`
    pub fn activate(
        document_id: impl Into<DocumentId>,
        surface: Arc<dyn EditingSurface>,
        context: AutosaveContext,
    ) -> AutosaveResult<Self> {
        let runtime = Handle::try_current()?;
        let document_id = document_id.into();
        let delay = context.config.debounce;

        let shared = Arc::new_cyclic(|weak: &Weak<SessionShared>| {
            let on_fire = weak.clone();
            let debouncer = Debouncer::new(
                delay,
                runtime.clone(),
                Arc::new(move || {
                    if let Some(session) = on_fire.upgrade() {
                        session.fire();
                    }
                }),
            );
            SessionShared {
                document_id,
                surface: surface.clone(),
                context,
                runtime,
                status: StatusMachine::new(),
                debouncer,
                book: Mutex::new(SaveBook::default()),
            }
        });

        let listener = Arc::downgrade(&shared);
        let subscription = surface.subscribe(Arc::new(move || {
            if let Some(session) = listener.upgrade() {
                session.on_change();
            }
        }));

        info!(document_id = %shared.document_id, debounce = ?delay, "Autosave session opened");
        Ok(Self {
            shared,
            subscription: Some(subscription),
        })
    }

    pub fn document_id(&self) -> &str {
        &self.shared.document_id
    }

    /// Read-only save status for the UI
    pub fn status(&self) -> StatusSignal {
        self.shared.status.signal()
    }

    pub fn current_status(&self) -> SaveStatus {
        self.shared.status.current()
    }

    /// Number of saves started so far
    pub fn saves_started(&self) -> u64 {
        self.shared.book.lock().latest_seq
    }

    /// Fingerprint of the last snapshot the store acknowledged
    pub fn last_saved_fingerprint(&self) -> Option<String> {
        self.shared.book.lock().last_saved_fingerprint.clone()
    }

    /// Stop observing the document. Same as dropping the session.
    pub fn close(mut self) {
        self.deactivate();
    }

    fn deactivate(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.shared.detach();
    }
}

impl Drop for AutosaveSession {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Keeps autosave attached to whichever document is open
pub struct AutosaveController {
    context: AutosaveContext,
    current: Option<AutosaveSession>,
}

impl AutosaveController {
    pub fn new(context: AutosaveContext) -> Self {
        Self {
            context,
            current: None,
        }
    }

    /// Close the open document (if any) and start autosaving `surface`
    pub fn open_document(
        &mut self,
        document_id: impl Into<DocumentId>,
        surface: Arc<dyn EditingSurface>,
    ) -> AutosaveResult<StatusSignal> {
        self.close_document();
        let session = AutosaveSession::activate(document_id, surface, self.context.clone())?;
        let signal = session.status();
        self.current = Some(session);
        Ok(signal)
    }

    /// Returns true if a document was open
    pub fn close_document(&mut self) -> bool {
        match self.current.take() {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    pub fn current_document(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.document_id())
    }

    pub fn status(&self) -> Option<StatusSignal> {
        self.current.as_ref().map(|s| s.status())
    }

    pub fn session(&self) -> Option<&AutosaveSession> {
        self.current.as_ref()
    }
}
