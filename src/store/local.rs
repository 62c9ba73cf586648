//! File-backed document store with JSON persistence
//!
//! Directory layout:
//! ```text
//! <base>/
//! └── <uid>/
//!     ├── resources/
//!     │   ├── <uuid>.json
//!     │   └── ...
//!     └── clusters/
//!         ├── <uuid>.json
//!         └── ...
//! ```
//!
//! The directory is the source of truth. Several processes may share it
//! (a running `shell` next to one-shot commands), so every operation
//! re-reads the collection before acting on it, and a `notify` watcher
//! pushes changes made elsewhere to live subscribers. Documents are written
//! to a temporary file and renamed into place, so readers never see a
//! partial document. Writes hit disk before they become visible to
//! subscribers, so a failed write leaves the collection unchanged.

use super::{Collection, Document, DocumentStore, Fields, Snapshot};
use crate::error::{Error, Result};
use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, RwLock};

type CollectionKey = (String, Collection);
type Collections = RwLock<HashMap<CollectionKey, CollectionState>>;

/// One loaded collection and its subscribers
struct CollectionState {
    dir: PathBuf,
    docs: Vec<Document>,
    tx: watch::Sender<Snapshot>,
    /// Kept alive for as long as the collection is loaded
    _watcher: Option<RecommendedWatcher>,
}

impl CollectionState {
    fn publish(&self) {
        self.tx
            .send_replace(Snapshot::Ready(Arc::new(self.docs.clone())));
    }

    /// Re-read the directory; subscribers are only notified of real changes
    fn refresh(&mut self) {
        let docs = read_collection(&self.dir);
        if docs != self.docs {
            self.docs = docs;
            self.publish();
        }
    }
}

/// Document store backed by one JSON file per document
pub struct LocalStore {
    base_dir: PathBuf,
    collections: Arc<Collections>,
}

impl LocalStore {
    /// Create a store rooted at `base_dir`. Nothing is read until a
    /// collection is first used.
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn collection_dir(&self, uid: &str, collection: Collection) -> PathBuf {
        self.base_dir.join(uid).join(collection.name())
    }

    /// Get a collection with its current on-disk contents
    async fn state_mut<'a>(
        &self,
        map: &'a mut HashMap<CollectionKey, CollectionState>,
        uid: &str,
        collection: Collection,
    ) -> Result<&'a mut CollectionState> {
        validate_key("user id", uid)?;
        let key = (uid.to_string(), collection);
        match map.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let state = entry.into_mut();
                state.refresh();
                Ok(state)
            }
            Entry::Vacant(entry) => {
                let dir = self.collection_dir(uid, collection);
                tokio::fs::create_dir_all(&dir).await?;

                let docs = read_collection(&dir);
                tracing::debug!(
                    uid = %uid,
                    collection = %collection,
                    documents = docs.len(),
                    "Loaded collection"
                );
                let (tx, _) = watch::channel(Snapshot::Ready(Arc::new(docs.clone())));
                let watcher = watch_collection(Arc::downgrade(&self.collections), key, &dir);
                Ok(entry.insert(CollectionState {
                    dir,
                    docs,
                    tx,
                    _watcher: watcher,
                }))
            }
        }
    }
}

/// Refresh the collection whenever its directory changes on disk.
///
/// Without a watcher the store still re-reads on every operation; only
/// live updates from other processes are lost.
fn watch_collection(
    collections: Weak<Collections>,
    key: CollectionKey,
    dir: &Path,
) -> Option<RecommendedWatcher> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if event.is_ok() {
            let _ = events_tx.send(());
        }
    })
    .and_then(|mut watcher| {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    });
    let watcher = match watcher {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::warn!("Cannot watch {}: {}", dir.display(), e);
            return None;
        }
    };

    tokio::spawn(async move {
        while events_rx.recv().await.is_some() {
            // Coalesce bursts into a single re-read
            while events_rx.try_recv().is_ok() {}

            let Some(collections) = collections.upgrade() else {
                break;
            };
            let mut map = collections.write().await;
            if let Some(state) = map.get_mut(&key) {
                state.refresh();
            }
        }
    });
    Some(watcher)
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn create(&self, uid: &str, collection: Collection, fields: Fields) -> Result<Document> {
        let mut map = self.collections.write().await;
        let state = self.state_mut(&mut map, uid, collection).await?;

        let doc = Document {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            fields,
        };
        write_document(&state.dir, &doc).await?;

        state.docs.push(doc.clone());
        sort_documents(&mut state.docs);
        state.publish();
        tracing::debug!(uid = %uid, collection = %collection, id = %doc.id, "Created document");
        Ok(doc)
    }

    async fn update(
        &self,
        uid: &str,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<Document> {
        validate_key("document id", id)?;
        let mut map = self.collections.write().await;
        let state = self.state_mut(&mut map, uid, collection).await?;

        let index = state
            .docs
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?;

        let mut updated = state.docs[index].clone();
        updated.fields.extend(fields);
        write_document(&state.dir, &updated).await?;

        state.docs[index] = updated.clone();
        state.publish();
        tracing::debug!(uid = %uid, collection = %collection, id = %id, "Updated document");
        Ok(updated)
    }

    async fn delete(&self, uid: &str, collection: Collection, id: &str) -> Result<()> {
        validate_key("document id", id)?;
        let mut map = self.collections.write().await;
        let state = self.state_mut(&mut map, uid, collection).await?;

        let Some(index) = state.docs.iter().position(|d| d.id == id) else {
            return Ok(());
        };

        let path = state.dir.join(format!("{}.json", id));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        state.docs.remove(index);
        state.publish();
        tracing::debug!(uid = %uid, collection = %collection, id = %id, "Deleted document");
        Ok(())
    }

    async fn query_eq(
        &self,
        uid: &str,
        collection: Collection,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Document>> {
        let mut map = self.collections.write().await;
        let state = self.state_mut(&mut map, uid, collection).await?;

        Ok(state
            .docs
            .iter()
            .filter(|d| d.fields.get(field) == Some(value))
            .cloned()
            .collect())
    }

    async fn subscribe(&self, uid: &str, collection: Collection) -> watch::Receiver<Snapshot> {
        let mut map = self.collections.write().await;
        match self.state_mut(&mut map, uid, collection).await {
            Ok(state) => state.tx.subscribe(),
            Err(e) => {
                tracing::warn!(uid = %uid, collection = %collection, "Subscription failed: {}", e);
                watch::channel(Snapshot::Failed(e.to_string())).1
            }
        }
    }
}

/// User and document ids become path components; keep them to a safe alphabet
fn validate_key(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Store(format!("Invalid {} '{}'", kind, value)))
    }
}

async fn write_document(dir: &Path, doc: &Document) -> Result<()> {
    let path = dir.join(format!("{}.json", doc.id));
    let staging = dir.join(format!(".{}.json.tmp", doc.id));
    let json = serde_json::to_string_pretty(doc)?;
    tokio::fs::write(&staging, json).await?;
    tokio::fs::rename(&staging, &path).await?;
    Ok(())
}

fn read_collection(dir: &Path) -> Vec<Document> {
    let mut docs = load_json_files::<Document>(dir);
    sort_documents(&mut docs);
    docs
}

/// Creation time, ties broken by id. Documents created within the same
/// millisecond therefore have no meaningful relative order.
fn sort_documents(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Load all JSON files from a directory into a Vec, skipping unreadable ones
fn load_json_files<T: serde::de::DeserializeOwned>(dir: &Path) -> Vec<T> {
    let mut items = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read directory {}: {}", dir.display(), e);
            }
            return items;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}", path.display(), e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
            }
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn make_store() -> (LocalStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        (store, dir)
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let (store, _dir) = make_store();

        let doc = store
            .create("alice", Collection::Clusters, fields(json!({"name": "Frontend"})))
            .await
            .unwrap();

        assert!(!doc.id.is_empty());
        assert!(doc.created_at > 0);
        assert_eq!(doc.get_str("name"), Some("Frontend"));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let (store, _dir) = make_store();
        let doc = store
            .create(
                "alice",
                Collection::Resources,
                fields(json!({"title": "Go Tour", "progress": "Not Started"})),
            )
            .await
            .unwrap();

        let updated = store
            .update(
                "alice",
                Collection::Resources,
                &doc.id,
                fields(json!({"progress": "In Progress"})),
            )
            .await
            .unwrap();

        assert_eq!(updated.get_str("title"), Some("Go Tour"));
        assert_eq!(updated.get_str("progress"), Some("In Progress"));
        assert_eq!(updated.created_at, doc.created_at);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let (store, _dir) = make_store();
        let err = store
            .update("alice", Collection::Resources, "missing", Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _dir) = make_store();
        let doc = store
            .create("alice", Collection::Clusters, fields(json!({"name": "x"})))
            .await
            .unwrap();

        tokio_test::assert_ok!(store.delete("alice", Collection::Clusters, &doc.id).await);
        tokio_test::assert_ok!(store.delete("alice", Collection::Clusters, &doc.id).await);

        let remaining = store
            .query_eq("alice", Collection::Clusters, "name", &json!("x"))
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_query_eq() {
        let (store, _dir) = make_store();
        for cluster in ["a", "b", "a"] {
            store
                .create(
                    "alice",
                    Collection::Resources,
                    fields(json!({"clusterId": cluster})),
                )
                .await
                .unwrap();
        }

        let hits = store
            .query_eq("alice", Collection::Resources, "clusterId", &json!("a"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|d| d.get_str("clusterId") == Some("a")));
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let (store, _dir) = make_store();
        store
            .create("alice", Collection::Clusters, fields(json!({"name": "mine"})))
            .await
            .unwrap();

        let rx = store.subscribe("bob", Collection::Clusters).await;
        let snapshot = rx.borrow().clone();
        assert!(snapshot.documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscription_sees_changes() {
        let (store, _dir) = make_store();
        let mut rx = store.subscribe("alice", Collection::Resources).await;
        assert!(rx.borrow().documents().unwrap().is_empty());

        let doc = store
            .create("alice", Collection::Resources, fields(json!({"title": "a"})))
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().documents().unwrap().len(), 1);

        store
            .delete("alice", Collection::Resources, &doc.id)
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_user_id_rejected() {
        let (store, _dir) = make_store();
        let err = store
            .create("../etc", Collection::Clusters, Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));

        let rx = store.subscribe("../etc", Collection::Clusters).await;
        assert!(matches!(*rx.borrow(), Snapshot::Failed(_)));
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();

        {
            let store = LocalStore::new(dir.path().to_path_buf());
            store
                .create("alice", Collection::Clusters, fields(json!({"name": "first"})))
                .await
                .unwrap();
            store
                .create("alice", Collection::Clusters, fields(json!({"name": "second"})))
                .await
                .unwrap();
        }

        let store = LocalStore::new(dir.path().to_path_buf());
        let rx = store.subscribe("alice", Collection::Clusters).await;
        let snapshot = rx.borrow().clone();
        let docs = snapshot.documents().unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].created_at <= docs[1].created_at);
    }

    #[tokio::test]
    async fn test_load_skips_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let clusters_dir = dir.path().join("alice").join("clusters");
        std::fs::create_dir_all(&clusters_dir).unwrap();
        std::fs::write(clusters_dir.join("bad.json"), "not valid json").unwrap();

        let store = LocalStore::new(dir.path().to_path_buf());
        let rx = store.subscribe("alice", Collection::Clusters).await;
        assert!(rx.borrow().documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_fields_written_by_another_store() {
        let dir = TempDir::new().unwrap();
        let shell = LocalStore::new(dir.path().to_path_buf());
        let oneshot = LocalStore::new(dir.path().to_path_buf());

        let doc = shell
            .create(
                "alice",
                Collection::Resources,
                fields(json!({"title": "Go Tour", "progress": "Not Started"})),
            )
            .await
            .unwrap();
        oneshot
            .update(
                "alice",
                Collection::Resources,
                &doc.id,
                fields(json!({"progress": "In Progress"})),
            )
            .await
            .unwrap();

        let updated = shell
            .update(
                "alice",
                Collection::Resources,
                &doc.id,
                fields(json!({"notes": "chapter 3"})),
            )
            .await
            .unwrap();
        assert_eq!(updated.get_str("progress"), Some("In Progress"));

        let fresh = LocalStore::new(dir.path().to_path_buf());
        let stored = fresh
            .query_eq("alice", Collection::Resources, "title", &json!("Go Tour"))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get_str("progress"), Some("In Progress"));
        assert_eq!(stored[0].get_str("notes"), Some("chapter 3"));
    }

    #[tokio::test]
    async fn test_query_and_delete_see_documents_from_another_store() {
        let dir = TempDir::new().unwrap();
        let shell = LocalStore::new(dir.path().to_path_buf());
        let oneshot = LocalStore::new(dir.path().to_path_buf());

        // Load the collection before the other store writes to it
        assert!(shell
            .query_eq("alice", Collection::Resources, "clusterId", &json!("c1"))
            .await
            .unwrap()
            .is_empty());

        let doc = oneshot
            .create("alice", Collection::Resources, fields(json!({"clusterId": "c1"})))
            .await
            .unwrap();

        let hits = shell
            .query_eq("alice", Collection::Resources, "clusterId", &json!("c1"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        shell
            .delete("alice", Collection::Resources, &doc.id)
            .await
            .unwrap();
        assert!(oneshot
            .query_eq("alice", Collection::Resources, "clusterId", &json!("c1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_subscription_sees_changes_from_another_store() {
        let dir = TempDir::new().unwrap();
        let shell = LocalStore::new(dir.path().to_path_buf());
        let oneshot = LocalStore::new(dir.path().to_path_buf());

        let mut rx = shell.subscribe("alice", Collection::Clusters).await;
        assert!(rx.borrow_and_update().documents().unwrap().is_empty());

        oneshot
            .create("alice", Collection::Clusters, fields(json!({"name": "Frontend"})))
            .await
            .unwrap();

        let snapshot = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            rx.wait_for(|s| s.documents().map(|d| d.len() == 1).unwrap_or(false)),
        )
        .await
        .expect("change not observed")
        .unwrap()
        .clone();
        assert_eq!(snapshot.documents().unwrap()[0].get_str("name"), Some("Frontend"));
    }

    #[tokio::test]
    async fn test_staging_files_are_not_loaded() {
        let (store, dir) = make_store();
        store
            .create("alice", Collection::Clusters, fields(json!({"name": "a"})))
            .await
            .unwrap();

        let clusters_dir = dir.path().join("alice").join("clusters");
        let names: Vec<String> = std::fs::read_dir(&clusters_dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }
}
