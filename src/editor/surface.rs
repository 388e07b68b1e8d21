//! The editing-surface capability the autosave engine observes.
//!
//! A surface owns a mutable document tree. The engine only ever subscribes to
//! change notifications and asks for snapshots; it never writes to the tree.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use super::snapshot::{EditorState, Snapshot, SnapshotCodec, SnapshotResult};

/// Callback invoked after every committed change to the tree
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Something the user edits: a tree that can be observed and snapshotted
pub trait EditingSurface: Send + Sync {
    /// Register a change listener; dropping the returned guard unregisters it
    fn subscribe(&self, listener: ChangeListener) -> Subscription;

    /// Serialize the tree as it is right now
    fn snapshot_now(&self) -> SnapshotResult<Snapshot>;
}

/// Scoped listener registration.
///
/// The listener stays registered for as long as this guard lives.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unregister now instead of at drop
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<u64, ChangeListener>,
}

/// In-memory editor tree with update listeners
pub struct DocumentTree {
    state: RwLock<EditorState>,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

impl DocumentTree {
    pub fn new(state: EditorState) -> Self {
        Self {
            state: RwLock::new(state),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    /// Open a tree from stored content (`None`/empty gives the empty document).
    ///
    /// Content that does not decode is refused rather than replaced.
    pub fn try_open(snapshot: Option<&Snapshot>) -> SnapshotResult<Self> {
        Ok(Self::new(SnapshotCodec::from_snapshot(snapshot)?))
    }

    /// Mutate the tree, then notify every listener once.
    pub fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut EditorState) -> R,
    {
        let result = {
            let mut state = self.state.write();
            f(&mut *state)
        };
        self.notify();
        result
    }

    /// Append text to the last block
    pub fn type_text(&self, text: &str) {
        self.update(|state| state.push_text(text));
    }

    /// Start a new paragraph holding `text`
    pub fn insert_paragraph(&self, text: &str) {
        self.update(|state| state.append_paragraph(text));
    }

    /// Read the tree without notifying anyone
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&EditorState) -> R,
    {
        f(&*self.state.read())
    }

    pub fn state(&self) -> EditorState {
        self.state.read().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().listeners.len()
    }

    fn notify(&self) {
        // Listeners run outside the registry lock so they may subscribe/unsubscribe.
        let listeners: Vec<ChangeListener> =
            self.listeners.lock().listeners.values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new(EditorState::default())
    }
}

impl EditingSurface for DocumentTree {
    fn subscribe(&self, listener: ChangeListener) -> Subscription {
        let id = {
            let mut registry = self.listeners.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.insert(id, listener);
            id
        };

        let registry: Weak<Mutex<ListenerRegistry>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.lock().listeners.remove(&id);
            }
        })
    }

    fn snapshot_now(&self) -> SnapshotResult<Snapshot> {
        SnapshotCodec::to_snapshot(&self.state.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::snapshot::SnapshotError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener() -> (ChangeListener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let listener: ChangeListener = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    #[test]
    fn test_update_notifies_listeners() {
        let tree = DocumentTree::default();
        let (listener, count) = counting_listener();
        let _sub = tree.subscribe(listener);

        tree.type_text("a");
        tree.insert_paragraph("b");

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(tree.read(|s| s.plain_text()), "a\n\nb");
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let tree = DocumentTree::default();
        let (listener, count) = counting_listener();
        let sub = tree.subscribe(listener);
        assert_eq!(tree.listener_count(), 1);

        drop(sub);
        tree.type_text("ignored");

        assert_eq!(tree.listener_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_explicit_unsubscribe() {
        let tree = DocumentTree::default();
        let (listener, _count) = counting_listener();
        tree.subscribe(listener).unsubscribe();
        assert_eq!(tree.listener_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_tree() {
        let tree = DocumentTree::default();
        let (listener, _count) = counting_listener();
        let sub = tree.subscribe(listener);
        drop(tree);
        drop(sub);
    }

    #[test]
    fn test_open_and_snapshot_round_trip() {
        let tree = DocumentTree::default();
        tree.type_text("draft body");
        let snapshot = tree.snapshot_now().unwrap();

        let reopened = DocumentTree::try_open(Some(&snapshot)).unwrap();
        assert_eq!(reopened.state(), tree.state());
        assert_eq!(reopened.snapshot_now().unwrap(), snapshot);
    }

    #[test]
    fn test_unreadable_content_is_not_opened() {
        let stored = Snapshot::from_value(json!({"root": {"type": "root", "children": "oops"}}));

        assert!(matches!(
            DocumentTree::try_open(Some(&stored)),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn test_editing_keeps_unknown_nodes() {
        let link = json!({
            "type": "link",
            "url": "https://example.com",
            "children": [{"type": "text", "text": "original body"}]
        });
        let stored = Snapshot::from_value(json!({
            "root": {"type": "root", "children": [{"type": "paragraph", "children": [link.clone()]}]}
        }));

        let tree = DocumentTree::try_open(Some(&stored)).unwrap();
        tree.type_text("!");

        let saved = tree.snapshot_now().unwrap().into_value();
        assert_eq!(saved["root"]["children"][0]["children"][0], link);
        assert_eq!(tree.read(|s| s.plain_text()), "original body!");
    }
}
