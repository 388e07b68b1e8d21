//! Session gate: the process-wide authentication credential.
//!
//! The autosave engine only reads the credential, through [`SessionGate`], and
//! reports rejected credentials through [`AuthRejectionSink`]. [`SessionStore`]
//! is the concrete store the rest of the application logs in and out through.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from loading or persisting the session file
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Bearer token plus the identity it was issued to
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub username: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Read access to the current credential
pub trait SessionGate: Send + Sync {
    /// The credential as of this call, or `None` when logged out
    fn current_credential(&self) -> Option<Credential>;
}

/// Receives credentials the remote store refused
pub trait AuthRejectionSink: Send + Sync {
    fn auth_rejected(&self, credential: &Credential);
}

/// Process-wide credential store, optionally backed by a JSON file.
///
/// Only the credential is ever written to disk. The file is written while
/// the write lock is held, so it always matches the last in-memory change.
#[derive(Default)]
pub struct SessionStore {
    current: RwLock<Option<Credential>>,
    persist_path: Option<PathBuf>,
}

impl SessionStore {
    /// An in-memory store that starts logged out
    pub fn new() -> Self {
        Self::default()
    }

    /// A store persisted at `path`, restoring any credential already saved there
    pub fn with_persistence(path: impl Into<PathBuf>) -> SessionResult<Self> {
        let path = path.into();
        let restored = read_session_file(&path)?;
        if let Some(credential) = &restored {
            info!("Restored session for {}", credential.username);
        }
        Ok(Self {
            current: RwLock::new(restored),
            persist_path: Some(path),
        })
    }

    /// Replace the current credential
    pub fn login(&self, credential: Credential) {
        info!("Logged in as {}", credential.username);
        let mut current = self.current.write();
        *current = Some(credential);
        self.persist(&current);
    }

    /// Clear the current credential
    pub fn logout(&self) {
        let mut current = self.current.write();
        if let Some(credential) = current.take() {
            info!("Logged out {}", credential.username);
        }
        self.persist(&current);
    }

    pub fn current(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Must be called with the write lock held; `current` is the guarded value
    fn persist(&self, current: &Option<Credential>) {
        let Some(path) = &self.persist_path else {
            return;
        };
        if let Err(e) = write_session_file(path, current.as_ref()) {
            warn!("Failed to persist session to {}: {}", path.display(), e);
        }
    }
}

impl SessionGate for SessionStore {
    fn current_credential(&self) -> Option<Credential> {
        self.current()
    }
}

impl AuthRejectionSink for SessionStore {
    fn auth_rejected(&self, credential: &Credential) {
        let mut current = self.current.write();
        let cleared = matches!(current.as_ref(), Some(active) if active.token == credential.token);

        if cleared {
            *current = None;
            warn!(
                "Credential for {} was rejected by the store; session cleared",
                credential.username
            );
            self.persist(&current);
        } else {
            debug!("Ignoring rejection of a credential that is no longer current");
        }
    }
}

fn read_session_file(path: &Path) -> SessionResult<Option<Credential>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(serde_json::from_str(&raw)?)
}

fn write_session_file(path: &Path, credential: Option<&Credential>) -> SessionResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let raw = serde_json::to_string_pretty(&credential)?;
    std::fs::write(path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_login_logout() {
        let store = SessionStore::new();
        assert!(store.current_credential().is_none());

        store.login(Credential::new("tok-1", "alice"));
        assert_eq!(store.current_credential().unwrap().username, "alice");
        assert!(store.is_authenticated());

        store.logout();
        assert!(store.current_credential().is_none());
    }

    #[test]
    fn test_rejection_clears_matching_credential() {
        let store = SessionStore::new();
        let credential = Credential::new("tok-1", "alice");
        store.login(credential.clone());

        store.auth_rejected(&credential);
        assert!(store.current().is_none());
    }

    #[test]
    fn test_stale_rejection_keeps_newer_login() {
        let store = SessionStore::new();
        let old = Credential::new("tok-old", "alice");
        store.login(old.clone());
        store.login(Credential::new("tok-new", "alice"));

        store.auth_rejected(&old);
        assert_eq!(store.current().unwrap().token, "tok-new");
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::with_persistence(&path).unwrap();
        assert!(store.current().is_none());
        store.login(Credential::new("tok-1", "bob"));

        let restored = SessionStore::with_persistence(&path).unwrap();
        assert_eq!(restored.current(), Some(Credential::new("tok-1", "bob")));

        restored.auth_rejected(&Credential::new("tok-1", "bob"));
        let after = SessionStore::with_persistence(&path).unwrap();
        assert!(after.current().is_none());
    }

    #[test]
    fn test_file_matches_memory_under_concurrent_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = SessionStore::with_persistence(&path).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..100 {
                    store.login(Credential::new(format!("tok-a-{}", i), "alice"));
                    store.logout();
                }
            });
            scope.spawn(|| {
                for i in 0..100 {
                    let credential = Credential::new(format!("tok-b-{}", i), "bob");
                    store.login(credential.clone());
                    store.auth_rejected(&credential);
                    store.login(credential);
                }
            });
        });

        let on_disk = SessionStore::with_persistence(&path).unwrap();
        assert_eq!(on_disk.current(), store.current());
    }

    #[test]
    fn test_corrupt_session_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            SessionStore::with_persistence(&path),
            Err(SessionError::Format(_))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", Credential::new("secret-token", "carol"));
        assert!(rendered.contains("carol"));
        assert!(!rendered.contains("secret-token"));
    }
}
