//! Document store: per-user collections with live subscriptions
//!
//! The tracker never talks to a concrete backend. It talks to a
//! [`DocumentStore`]: per-user, schemaless document collections supporting
//! create, field-level merge update, delete, one-shot equality queries and
//! live subscriptions that deliver the full collection on every change.
//!
//! [`LocalStore`] is the bundled file-backed implementation.

pub mod local;

pub use local::LocalStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Document fields (schemaless JSON object)
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// The two per-user collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Resources,
    Clusters,
}

impl Collection {
    /// Collection name as used in storage paths
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resources => "resources",
            Self::Clusters => "clusters",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Store-assigned id
    pub id: String,
    /// Creation time in Unix milliseconds, used for stable ordering
    pub created_at: i64,
    /// Document body
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    /// String field accessor; non-string values read as absent
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

/// State delivered to live subscribers
#[derive(Debug, Clone)]
pub enum Snapshot {
    /// Full current contents of the collection, by creation time (ties by id)
    Ready(Arc<Vec<Document>>),
    /// The subscription could not be served
    Failed(String),
}

impl Snapshot {
    /// Documents in this snapshot, if it is ready
    pub fn documents(&self) -> Option<&Arc<Vec<Document>>> {
        match self {
            Self::Ready(docs) => Some(docs),
            Self::Failed(_) => None,
        }
    }
}

/// Per-user document store.
///
/// Every operation is scoped to the user id `uid`; users never see each
/// other's documents. Writes are last-writer-wins at the field level.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document with a store-assigned id
    async fn create(&self, uid: &str, collection: Collection, fields: Fields) -> Result<Document>;

    /// Merge `fields` into an existing document
    async fn update(
        &self,
        uid: &str,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<Document>;

    /// Remove a document. Removing a missing document succeeds.
    async fn delete(&self, uid: &str, collection: Collection, id: &str) -> Result<()>;

    /// One-shot query for documents whose `field` equals `value`
    async fn query_eq(
        &self,
        uid: &str,
        collection: Collection,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Document>>;

    /// Live subscription over the whole collection.
    ///
    /// The receiver holds the current snapshot immediately and observes a
    /// new one after every change.
    async fn subscribe(&self, uid: &str, collection: Collection) -> watch::Receiver<Snapshot>;
}
