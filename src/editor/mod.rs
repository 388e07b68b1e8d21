//! Editing session and autosave engine.
//!
//! Leaves first:
//! - `snapshot`: editor tree <-> serializable snapshot
//! - `surface`: the observable document tree
//! - `debounce`: cancellable, re-armable deferred trigger
//! - `status`: save-status state machine and its read-only signal
//! - `session`: credential gate
//! - `client`: persistence client for the remote store
//! - `autosave`: the per-document controller wiring it all together

pub mod autosave;
pub mod client;
pub mod debounce;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod surface;

pub use autosave::{AutosaveContext, AutosaveController, AutosaveError, AutosaveSession};
pub use client::{ClientError, HttpPersistenceClient, PersistenceClient, SaveError};
pub use debounce::Debouncer;
pub use session::{AuthRejectionSink, Credential, SessionGate, SessionStore};
pub use snapshot::{EditorState, Snapshot, SnapshotCodec, SnapshotError};
pub use status::{SaveStatus, StatusSignal, StatusTransition};
pub use surface::{DocumentTree, EditingSurface, Subscription};
