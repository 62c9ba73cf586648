//! Tracker: mutation operations forwarded to the document store
//!
//! Every operation acts on the signed-in user's collections. Without a
//! signed-in user an operation does nothing and reports that it was not
//! applied (`None` / `false`); nothing is queued. Store failures are logged
//! here and returned; callers typically drop them.

use crate::error::{Error, Result};
use crate::identity::User;
use crate::resources::types::field;
use crate::resources::{Cluster, NewResource, Resource, ResourcePatch};
use crate::store::{Collection, DocumentStore, Fields};
use std::sync::Arc;
use tokio::sync::watch;

/// Resource and cluster mutations for the current user
#[derive(Clone)]
pub struct Tracker {
    store: Arc<dyn DocumentStore>,
    users: watch::Receiver<Option<User>>,
}

impl Tracker {
    pub fn new(store: Arc<dyn DocumentStore>, users: watch::Receiver<Option<User>>) -> Self {
        Self { store, users }
    }

    /// Signed-in user id, or `None` after logging the skipped operation
    fn uid(&self, operation: &str) -> Option<String> {
        let uid = self.users.borrow().as_ref().map(|u| u.uid.clone());
        if uid.is_none() {
            tracing::debug!(operation, "Ignored: not signed in");
        }
        uid
    }

    /// Add a resource; it starts as "Not Started"
    pub async fn create_resource(&self, input: NewResource) -> Result<Option<Resource>> {
        let Some(uid) = self.uid("create_resource") else {
            return Ok(None);
        };
        let doc = logged(
            "create_resource",
            self.store
                .create(&uid, Collection::Resources, input.into_fields())
                .await,
        )?;
        Ok(Some(Resource::from_document(&doc)))
    }

    /// Merge the set fields of `patch` into a resource
    pub async fn update_resource(&self, id: &str, patch: ResourcePatch) -> Result<Option<Resource>> {
        let Some(uid) = self.uid("update_resource") else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(None);
        }
        let doc = logged(
            "update_resource",
            self.store
                .update(&uid, Collection::Resources, id, patch.into_fields())
                .await,
        )?;
        Ok(Some(Resource::from_document(&doc)))
    }

    /// Advance a resource's progress one step
    pub async fn cycle_progress(&self, resource: &Resource) -> Result<Option<Resource>> {
        self.update_resource(&resource.id, ResourcePatch::progress(resource.progress.next()))
            .await
    }

    /// Replace a resource's notes
    pub async fn update_notes(&self, id: &str, notes: &str) -> Result<Option<Resource>> {
        self.update_resource(id, ResourcePatch::notes(notes)).await
    }

    /// Move a resource into another cluster (drag-and-drop drop)
    pub async fn reassign_resource_cluster(
        &self,
        resource_id: &str,
        new_cluster_id: &str,
    ) -> Result<Option<Resource>> {
        tracing::debug!(resource = %resource_id, cluster = %new_cluster_id, "Reassigning resource");
        self.update_resource(resource_id, ResourcePatch::cluster(new_cluster_id))
            .await
    }

    pub async fn delete_resource(&self, id: &str) -> Result<bool> {
        let Some(uid) = self.uid("delete_resource") else {
            return Ok(false);
        };
        logged(
            "delete_resource",
            self.store.delete(&uid, Collection::Resources, id).await,
        )?;
        Ok(true)
    }

    /// Create a named cluster. Blank names are ignored.
    pub async fn create_cluster(&self, name: &str) -> Result<Option<Cluster>> {
        let Some(uid) = self.uid("create_cluster") else {
            return Ok(None);
        };
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let mut fields = Fields::new();
        fields.insert(field::NAME.into(), name.into());
        let doc = logged(
            "create_cluster",
            self.store.create(&uid, Collection::Clusters, fields).await,
        )?;
        Ok(Some(Cluster::from_document(&doc)))
    }

    /// Delete a cluster together with every resource assigned to it.
    ///
    /// Resource deletions run concurrently without a transaction. If any of
    /// them fails, the cluster document is kept and
    /// [`Error::CascadeIncomplete`] is returned; calling again finishes the
    /// job. Nothing already deleted is restored.
    pub async fn delete_cluster(&self, id: &str) -> Result<bool> {
        let Some(uid) = self.uid("delete_cluster") else {
            return Ok(false);
        };

        let members = logged(
            "delete_cluster",
            self.store
                .query_eq(&uid, Collection::Resources, field::CLUSTER_ID, &id.into())
                .await,
        )?;

        let results = futures::future::join_all(
            members
                .iter()
                .map(|doc| self.store.delete(&uid, Collection::Resources, &doc.id)),
        )
        .await;

        let mut remaining = 0;
        for (doc, result) in members.iter().zip(results) {
            if let Err(e) = result {
                remaining += 1;
                tracing::warn!(cluster = %id, resource = %doc.id, "Cascade delete failed: {}", e);
            }
        }
        if remaining > 0 {
            return Err(Error::CascadeIncomplete {
                cluster_id: id.to_string(),
                remaining,
            });
        }

        logged(
            "delete_cluster",
            self.store.delete(&uid, Collection::Clusters, id).await,
        )?;
        tracing::info!(cluster = %id, resources = members.len(), "Deleted cluster");
        Ok(true)
    }
}

fn logged<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::warn!(operation, "Store operation failed: {}", e);
    }
    result
}
