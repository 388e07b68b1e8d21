//! Storage module for the document store, backed by Sled.
//!
//! Documents and user accounts live in separate trees as bincode records.
//! Document bodies are kept as JSON text inside the record, since bincode
//! cannot carry an arbitrary `serde_json::Value`.

mod sled_store;

pub use sled_store::{DocumentStore, StorageError, StorageResult, StorageStats};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::env_parse;
use crate::model::{Document, DocumentId, DocumentPatch, DocumentStatus, NewDocument};

/// A document as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPost {
    pub id: DocumentId,
    pub title: String,
    /// Body as JSON text, `None` until the first save
    pub content: Option<String>,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_username: Option<String>,
}

impl StoredPost {
    pub fn new(id: impl Into<DocumentId>, new: &NewDocument, author: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: new.title.clone(),
            content: new.content.as_ref().map(Value::to_string),
            status: new.status,
            created_at: now,
            updated_at: now,
            author_username: Some(author.to_string()),
        }
    }

    /// Apply a partial update, bumping `updated_at`
    pub fn apply(&mut self, patch: &DocumentPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(content) = &patch.content {
            self.content = Some(content.to_string());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        self.updated_at = Utc::now();
    }

    /// Convert to the wire form. Unreadable content comes back as `{}`.
    pub fn into_document(self) -> Document {
        let content = self.content.map(|raw| {
            serde_json::from_str(&raw).unwrap_or_else(|_| Value::Object(Default::default()))
        });
        Document {
            id: self.id,
            title: self.title,
            content,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            author_username: self.author_username,
        }
    }
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub username: String,
    /// Hex SHA-256 of salt || password
    pub password_hash: String,
    /// Hex-encoded random salt
    pub salt: String,
    pub created_at: DateTime<Utc>,
}

/// Configuration for the storage layer
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the Sled database directory
    pub path: String,
    /// Cache size in bytes (default: 64MB)
    pub cache_size: u64,
    /// Flush interval in milliseconds (0 = only on explicit flush)
    pub flush_interval_ms: u64,
    /// Throwaway database removed on drop
    pub temporary: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/draft-sync.sled".to_string(),
            cache_size: 64 * 1024 * 1024,
            flush_interval_ms: 500,
            temporary: false,
        }
    }
}

impl StorageConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Read `STORAGE_PATH`
    pub fn from_env() -> Self {
        let config = match std::env::var("STORAGE_PATH") {
            Ok(path) => Self::new(path),
            Err(_) => Self::default(),
        };
        let flush_interval_ms = env_parse("STORAGE_FLUSH_INTERVAL_MS").unwrap_or(config.flush_interval_ms);
        config.with_flush_interval(flush_interval_ms)
    }

    /// A database that lives only as long as the store
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Default::default()
        }
    }

    pub fn with_cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    pub fn with_flush_interval(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }
}
