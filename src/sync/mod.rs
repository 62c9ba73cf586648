//! Sync layer: live view state for the signed-in user
//!
//! The layer follows the identity service's current user. For a signed-in
//! user it holds two independent subscriptions (resources, clusters) and,
//! whenever either fires, rebuilds the whole [`ViewSnapshot`] with
//! [`view::merge`] and publishes it. Signing out publishes an empty
//! snapshot. Consumers read immutable `Arc<ViewSnapshot>`s from a single
//! `watch` channel.

pub mod view;

pub use view::{merge, ClusterView, DashboardStats, FilteredCluster, ViewSnapshot};

use crate::identity::User;
use crate::store::{Collection, Document, DocumentStore, Snapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Publishes view snapshots for whoever is signed in
pub struct SyncLayer {
    view: watch::Sender<Arc<ViewSnapshot>>,
    task: Option<JoinHandle<()>>,
}

impl SyncLayer {
    /// Start following `users` on the current Tokio runtime
    pub fn start(store: Arc<dyn DocumentStore>, users: watch::Receiver<Option<User>>) -> Self {
        let (view, _) = watch::channel(Arc::new(ViewSnapshot::default()));
        let task = tokio::spawn(follow_users(store, users, view.clone()));
        Self {
            view,
            task: Some(task),
        }
    }

    /// Live snapshots
    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewSnapshot>> {
        self.view.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<ViewSnapshot> {
        self.view.borrow().clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Arc<ViewSnapshot>
    where
        F: FnMut(&ViewSnapshot) -> bool,
    {
        let mut rx = self.view.subscribe();
        let result = rx.wait_for(|snapshot| predicate(snapshot.as_ref())).await;
        match result {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Wait for the first snapshot that belongs to `uid` (or to nobody)
    pub async fn wait_for_user(&self, uid: Option<&str>) -> Arc<ViewSnapshot> {
        self.wait_for(|snapshot| snapshot.uid() == uid).await
    }
}

impl Drop for SyncLayer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Publishing side shared by the per-user tasks.
///
/// Each user switch bumps the generation; a task only publishes while its
/// generation is current, so a torn-down subscription can never overwrite
/// the next user's view.
#[derive(Clone)]
struct Publisher {
    view: watch::Sender<Arc<ViewSnapshot>>,
    generation: Arc<AtomicU64>,
}

impl Publisher {
    fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, generation: u64, snapshot: ViewSnapshot) {
        let snapshot = Arc::new(snapshot);
        self.view.send_if_modified(|slot| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *slot = snapshot;
            true
        });
    }
}

async fn follow_users(
    store: Arc<dyn DocumentStore>,
    mut users: watch::Receiver<Option<User>>,
    view: watch::Sender<Arc<ViewSnapshot>>,
) {
    let publisher = Publisher {
        view,
        generation: Arc::new(AtomicU64::new(0)),
    };
    let mut current: Option<(User, JoinHandle<()>)> = None;

    loop {
        let user = users.borrow_and_update().clone();

        let unchanged = matches!(
            (&current, &user),
            (Some((following, _)), Some(user)) if following == user
        );
        if !unchanged {
            if let Some((previous, task)) = current.take() {
                task.abort();
                tracing::debug!(uid = %previous.uid, "Stopped following user");
            }

            let generation = publisher.advance();
            match user {
                Some(user) => {
                    tracing::debug!(uid = %user.uid, "Following user");
                    let task = tokio::spawn(follow_user(
                        store.clone(),
                        user.clone(),
                        publisher.clone(),
                        generation,
                    ));
                    current = Some((user, task));
                }
                None => publisher.publish(generation, ViewSnapshot::default()),
            }
        }

        if users.changed().await.is_err() {
            // Identity service gone; keep serving the last user
            if let Some((_, task)) = current.take() {
                let _ = task.await;
            }
            return;
        }
    }
}

async fn follow_user(
    store: Arc<dyn DocumentStore>,
    user: User,
    publisher: Publisher,
    generation: u64,
) {
    let mut resources_rx = store.subscribe(&user.uid, Collection::Resources).await;
    let mut clusters_rx = store.subscribe(&user.uid, Collection::Clusters).await;

    let mut resources: Arc<Vec<Document>> = Arc::default();
    let mut clusters: Arc<Vec<Document>> = Arc::default();
    absorb(&user, Collection::Resources, &mut resources_rx, &mut resources);
    absorb(&user, Collection::Clusters, &mut clusters_rx, &mut clusters);

    let mut resources_open = true;
    let mut clusters_open = true;

    loop {
        publisher.publish(
            generation,
            merge(Some(user.clone()), &resources, &clusters),
        );

        tokio::select! {
            changed = resources_rx.changed(), if resources_open => match changed {
                Ok(()) => absorb(&user, Collection::Resources, &mut resources_rx, &mut resources),
                Err(_) => {
                    resources_open = false;
                    tracing::debug!(uid = %user.uid, "Resources subscription closed");
                }
            },
            changed = clusters_rx.changed(), if clusters_open => match changed {
                Ok(()) => absorb(&user, Collection::Clusters, &mut clusters_rx, &mut clusters),
                Err(_) => {
                    clusters_open = false;
                    tracing::debug!(uid = %user.uid, "Clusters subscription closed");
                }
            },
            else => break,
        }
    }
}

/// Take the latest snapshot from `rx`; failures keep the last good documents
fn absorb(
    user: &User,
    collection: Collection,
    rx: &mut watch::Receiver<Snapshot>,
    latest: &mut Arc<Vec<Document>>,
) {
    match &*rx.borrow_and_update() {
        Snapshot::Ready(docs) => *latest = docs.clone(),
        Snapshot::Failed(reason) => {
            tracing::warn!(
                uid = %user.uid,
                collection = %collection,
                "Subscription error: {}",
                reason
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::DEFAULT_CLUSTER_ID;
    use crate::error::Result;
    use crate::store::{Fields, LocalStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn user(uid: &str) -> User {
        User {
            uid: uid.to_string(),
            email: None,
            provider: "password".to_string(),
        }
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    async fn wait<F>(sync: &SyncLayer, predicate: F) -> Arc<ViewSnapshot>
    where
        F: FnMut(&ViewSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), sync.wait_for(predicate))
            .await
            .expect("snapshot not published in time")
    }

    #[tokio::test]
    async fn test_signed_out_publishes_empty() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(LocalStore::new(dir.path().to_path_buf()));
        let (_users_tx, users_rx) = watch::channel(None);

        let sync = SyncLayer::start(store, users_rx);
        let snapshot = wait(&sync, |s| !s.is_signed_in()).await;
        assert!(snapshot.clusters.is_empty());
    }

    #[tokio::test]
    async fn test_follows_changes_of_both_collections() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().to_path_buf()));
        let (_users_tx, users_rx) = watch::channel(Some(user("alice")));
        let sync = SyncLayer::start(store.clone(), users_rx);

        let snapshot = wait(&sync, |s| s.uid() == Some("alice")).await;
        assert_eq!(snapshot.clusters.len(), 1);
        assert_eq!(snapshot.clusters[0].cluster.id, DEFAULT_CLUSTER_ID);

        let cluster = store
            .create("alice", Collection::Clusters, fields(json!({"name": "Frontend"})))
            .await
            .unwrap();
        let snapshot = wait(&sync, |s| s.clusters.len() == 2).await;
        assert!(snapshot.cluster(&cluster.id).unwrap().resources.is_empty());

        store
            .create(
                "alice",
                Collection::Resources,
                fields(json!({"title": "CSS Grid", "clusterId": cluster.id})),
            )
            .await
            .unwrap();
        let snapshot = wait(&sync, |s| s.stats.total == 1).await;
        assert_eq!(snapshot.cluster(&cluster.id).unwrap().resources.len(), 1);
    }

    #[tokio::test]
    async fn test_user_switch_and_logout() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().to_path_buf()));
        store
            .create("alice", Collection::Resources, fields(json!({"title": "a"})))
            .await
            .unwrap();

        let (users_tx, users_rx) = watch::channel(Some(user("alice")));
        let sync = SyncLayer::start(store.clone(), users_rx);
        let snapshot = wait(&sync, |s| s.uid() == Some("alice")).await;
        assert_eq!(snapshot.stats.total, 1);

        users_tx.send(Some(user("bob"))).unwrap();
        let snapshot = wait(&sync, |s| s.uid() == Some("bob")).await;
        assert_eq!(snapshot.stats.total, 0);

        // Alice's changes no longer reach the view
        store
            .create("alice", Collection::Resources, fields(json!({"title": "b"})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sync.snapshot().uid(), Some("bob"));
        assert_eq!(sync.snapshot().stats.total, 0);

        users_tx.send(None).unwrap();
        let snapshot = wait(&sync, |s| !s.is_signed_in()).await;
        assert!(snapshot.resources.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_user_helper() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().to_path_buf()));
        let (_users_tx, users_rx) = watch::channel(Some(user("carol")));
        let sync = SyncLayer::start(store, users_rx);

        let snapshot = tokio::time::timeout(Duration::from_secs(5), sync.wait_for_user(Some("carol")))
            .await
            .unwrap();
        assert_eq!(snapshot.user, Some(user("carol")));
    }

    /// Store whose resources subscription is driven by the test
    struct ScriptedStore {
        inner: LocalStore,
        resources: watch::Receiver<Snapshot>,
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        async fn create(&self, uid: &str, collection: Collection, fields: Fields) -> Result<Document> {
            self.inner.create(uid, collection, fields).await
        }

        async fn update(
            &self,
            uid: &str,
            collection: Collection,
            id: &str,
            fields: Fields,
        ) -> Result<Document> {
            self.inner.update(uid, collection, id, fields).await
        }

        async fn delete(&self, uid: &str, collection: Collection, id: &str) -> Result<()> {
            self.inner.delete(uid, collection, id).await
        }

        async fn query_eq(
            &self,
            uid: &str,
            collection: Collection,
            field: &str,
            value: &serde_json::Value,
        ) -> Result<Vec<Document>> {
            self.inner.query_eq(uid, collection, field, value).await
        }

        async fn subscribe(&self, uid: &str, collection: Collection) -> watch::Receiver<Snapshot> {
            match collection {
                Collection::Resources => self.resources.clone(),
                Collection::Clusters => self.inner.subscribe(uid, collection).await,
            }
        }
    }

    #[tokio::test]
    async fn test_failed_snapshot_keeps_last_good_documents() {
        let dir = TempDir::new().unwrap();
        let go_tour = Document {
            id: "r1".to_string(),
            created_at: 1,
            fields: fields(json!({"title": "Go Tour"})),
        };
        let (resources_tx, resources_rx) =
            watch::channel(Snapshot::Ready(Arc::new(vec![go_tour])));
        let store = Arc::new(ScriptedStore {
            inner: LocalStore::new(dir.path().to_path_buf()),
            resources: resources_rx,
        });
        let (_users_tx, users_rx) = watch::channel(Some(user("alice")));
        let sync = SyncLayer::start(store.clone(), users_rx);

        wait(&sync, |s| s.stats.total == 1).await;

        resources_tx.send_replace(Snapshot::Failed("permission denied".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Another change still flows through with the last good resources
        store
            .create("alice", Collection::Clusters, fields(json!({"name": "Frontend"})))
            .await
            .unwrap();
        let snapshot = wait(&sync, |s| s.clusters.len() == 2).await;
        assert_eq!(snapshot.stats.total, 1);
        assert!(snapshot.resource("r1").is_some());

        // Recovery replaces the kept documents
        resources_tx.send_replace(Snapshot::Ready(Arc::new(Vec::new())));
        let snapshot = wait(&sync, |s| s.stats.total == 0).await;
        assert_eq!(snapshot.clusters.len(), 2);
    }
}
