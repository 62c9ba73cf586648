//! Resources module: learning resources, clusters, search and viewer
//!
//! Resources and clusters are stored as documents in the per-user
//! `resources` and `clusters` collections. This module owns their decoding,
//! the form inputs that create or patch them, client-side search, and the
//! embed decision of the resource viewer.

pub mod search;
pub mod types;
pub mod viewer;

pub use types::{
    parse_tags, Cluster, NewResource, Progress, Resource, ResourcePatch, ResourceType,
    DEFAULT_CLUSTER_ID, DEFAULT_CLUSTER_NAME,
};
pub use viewer::{embed, embed_resource, Embed};
