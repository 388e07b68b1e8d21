//! Sled-based storage for documents and user accounts.
//!
//! Two trees:
//! - `posts`: document id -> bincode `StoredPost`
//! - `users`: username -> bincode `StoredUser`
//!
//! Read-modify-write paths use compare-and-swap so concurrent handlers never
//! lose an update.

use sled::{CompareAndSwapError, Db, Tree};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::model::{DocumentPatch, NewDocument};

use super::{StorageConfig, StoredPost, StoredUser};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Sled database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage initialization failed: {0}")]
    InitFailed(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

const TREE_POSTS: &str = "posts";
const TREE_USERS: &str = "users";

/// Sled-backed store of documents and users
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<Db>,
    posts: Tree,
    users: Tree,
}

impl DocumentStore {
    /// Open or create a store at the configured path
    pub fn open(config: StorageConfig) -> StorageResult<Self> {
        let mut sled_config = sled::Config::new()
            .cache_capacity(config.cache_size)
            .flush_every_ms(if config.flush_interval_ms > 0 {
                Some(config.flush_interval_ms)
            } else {
                None
            });

        if config.temporary {
            sled_config = sled_config.temporary(true);
        } else {
            let path = Path::new(&config.path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::InitFailed(format!("Failed to create directory: {}", e))
                })?;
            }
            sled_config = sled_config.path(&config.path);
        }

        let db = sled_config.open()?;
        let posts = db.open_tree(TREE_POSTS)?;
        let users = db.open_tree(TREE_USERS)?;

        Ok(Self {
            db: Arc::new(db),
            posts,
            users,
        })
    }

    /// Store a new document under a fresh id
    pub fn create_post(&self, new: &NewDocument, author: &str) -> StorageResult<StoredPost> {
        let id = uuid::Uuid::new_v4().to_string();
        let post = StoredPost::new(id, new, author);
        let bytes = bincode::serialize(&post)?;

        self.posts
            .compare_and_swap(post.id.as_bytes(), None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| StorageError::AlreadyExists(post.id.clone()))?;

        debug!("Created post {} for {}", post.id, author);
        Ok(post)
    }

    pub fn get_post(&self, id: &str) -> StorageResult<Option<StoredPost>> {
        match self.posts.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All documents, most recently updated first
    pub fn list_posts(&self) -> StorageResult<Vec<StoredPost>> {
        let mut posts = Vec::with_capacity(self.posts.len());
        for item in self.posts.iter() {
            let (_, value) = item?;
            posts.push(bincode::deserialize::<StoredPost>(&value)?);
        }
        posts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(posts)
    }

    /// Apply a partial update. Returns the updated record, or `None` if the
    /// document does not exist.
    pub fn update_post(&self, id: &str, patch: &DocumentPatch) -> StorageResult<Option<StoredPost>> {
        loop {
            let Some(current) = self.posts.get(id.as_bytes())? else {
                return Ok(None);
            };
            let mut post: StoredPost = bincode::deserialize(&current)?;
            post.apply(patch);
            let bytes = bincode::serialize(&post)?;

            match self
                .posts
                .compare_and_swap(id.as_bytes(), Some(&current), Some(bytes))?
            {
                Ok(()) => return Ok(Some(post)),
                Err(CompareAndSwapError { .. }) => {
                    debug!("Concurrent update on post {}, retrying", id);
                }
            }
        }
    }

    /// Returns true if the document existed
    pub fn delete_post(&self, id: &str) -> StorageResult<bool> {
        Ok(self.posts.remove(id.as_bytes())?.is_some())
    }

    /// Register a user; fails if the username is taken
    pub fn create_user(&self, user: &StoredUser) -> StorageResult<()> {
        let bytes = bincode::serialize(user)?;
        self.users
            .compare_and_swap(user.username.as_bytes(), None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| StorageError::AlreadyExists(user.username.clone()))
    }

    pub fn get_user(&self, username: &str) -> StorageResult<Option<StoredUser>> {
        match self.users.get(username.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Force flush all pending writes to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            post_count: self.posts.len(),
            user_count: self.users.len(),
            total_size_bytes: self.db.size_on_disk().unwrap_or(0),
        }
    }
}

/// Statistics about the storage
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub post_count: usize,
    pub user_count: usize,
    pub total_size_bytes: u64,
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        // Attempt to flush on drop, but don't panic
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentStatus;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn test_store() -> DocumentStore {
        DocumentStore::open(StorageConfig::temporary()).unwrap()
    }

    fn user(name: &str) -> StoredUser {
        StoredUser {
            username: name.to_string(),
            password_hash: "00".repeat(32),
            salt: "11".repeat(16),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_post_create_get() {
        let store = test_store();
        let created = store
            .create_post(&NewDocument::draft().with_title("First"), "alice")
            .unwrap();

        let loaded = store.get_post(&created.id).unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.status, DocumentStatus::Draft);
    }

    #[test]
    fn test_post_not_found() {
        let store = test_store();
        assert!(store.get_post("nonexistent").unwrap().is_none());
        assert!(store
            .update_post("nonexistent", &DocumentPatch::title("x"))
            .unwrap()
            .is_none());
        assert!(!store.delete_post("nonexistent").unwrap());
    }

    #[test]
    fn test_update_post_content() {
        let store = test_store();
        let created = store.create_post(&NewDocument::draft(), "alice").unwrap();

        let body = json!({"root": {"children": [], "type": "root"}});
        let updated = store
            .update_post(&created.id, &DocumentPatch::content(body.clone()))
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, created.title);
        let doc = store.get_post(&created.id).unwrap().unwrap().into_document();
        assert_eq!(doc.content, Some(body));
    }

    #[test]
    fn test_list_newest_first() {
        let store = test_store();
        let a = store.create_post(&NewDocument::draft().with_title("a"), "u").unwrap();
        let b = store.create_post(&NewDocument::draft().with_title("b"), "u").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.update_post(&a.id, &DocumentPatch::title("a2")).unwrap();

        let titles: Vec<String> = store
            .list_posts()
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["a2".to_string(), "b".to_string()]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_delete_post() {
        let store = test_store();
        let created = store.create_post(&NewDocument::draft(), "alice").unwrap();

        assert!(store.delete_post(&created.id).unwrap());
        assert!(store.get_post(&created.id).unwrap().is_none());
        assert_eq!(store.stats().post_count, 0);
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let store = test_store();
        store.create_user(&user("alice")).unwrap();

        assert!(matches!(
            store.create_user(&user("alice")),
            Err(StorageError::AlreadyExists(name)) if name == "alice"
        ));
        assert_eq!(store.get_user("alice").unwrap().unwrap().username, "alice");
        assert!(store.get_user("bob").unwrap().is_none());
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sled").to_string_lossy().to_string();

        let id = {
            let store = DocumentStore::open(StorageConfig::new(&path)).unwrap();
            let post = store.create_post(&NewDocument::draft(), "alice").unwrap();
            store.flush().unwrap();
            post.id
        };

        let reopened = DocumentStore::open(StorageConfig::new(&path)).unwrap();
        assert!(reopened.get_post(&id).unwrap().is_some());
    }
}
