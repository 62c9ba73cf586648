//! View snapshots: the grouped, derived state the UI renders
//!
//! A [`ViewSnapshot`] is rebuilt wholesale from the two collections by
//! [`merge`] and never patched in place.

use crate::identity::User;
use crate::resources::search;
use crate::resources::{Cluster, Progress, Resource};
use crate::store::Document;
use serde::Serialize;
use std::collections::HashMap;

/// Dashboard counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl DashboardStats {
    pub fn from_resources(resources: &[Resource]) -> Self {
        let mut stats = Self {
            total: resources.len(),
            ..Default::default()
        };
        for resource in resources {
            match resource.progress {
                Progress::InProgress => stats.in_progress += 1,
                Progress::Completed => stats.completed += 1,
                Progress::NotStarted => {}
            }
        }
        stats
    }
}

/// A cluster with the resources grouped under it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterView {
    pub cluster: Cluster,
    pub resources: Vec<Resource>,
}

/// A cluster with only the resources matching a search
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredCluster<'a> {
    pub cluster: &'a Cluster,
    pub resources: Vec<&'a Resource>,
}

/// Immutable view state for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewSnapshot {
    /// User the snapshot belongs to; `None` when signed out
    pub user: Option<User>,
    /// Default cluster first, then persisted clusters by creation time (ties by id)
    pub clusters: Vec<ClusterView>,
    /// Every resource, by creation time (ties by id)
    pub resources: Vec<Resource>,
    pub stats: DashboardStats,
}

impl ViewSnapshot {
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn uid(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.uid.as_str())
    }

    pub fn cluster(&self, id: &str) -> Option<&ClusterView> {
        self.clusters.iter().find(|c| c.cluster.id == id)
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Cluster a resource is displayed under
    pub fn cluster_of(&self, resource_id: &str) -> Option<&ClusterView> {
        self.clusters
            .iter()
            .find(|c| c.resources.iter().any(|r| r.id == resource_id))
    }

    /// Find a resource by id or unique id prefix
    pub fn resolve_resource(&self, key: &str) -> Option<&Resource> {
        resolve(&self.resources, key, |r| r.id.as_str())
    }

    /// Find a cluster by id, unique id prefix, or case-insensitive name
    pub fn resolve_cluster(&self, key: &str) -> Option<&Cluster> {
        let clusters: Vec<&Cluster> = self.clusters.iter().map(|c| &c.cluster).collect();
        if let Some(cluster) = resolve(&clusters, key, |c| c.id.as_str()) {
            return Some(*cluster);
        }
        let mut named = clusters
            .into_iter()
            .filter(|c| c.name.eq_ignore_ascii_case(key));
        match (named.next(), named.next()) {
            (Some(cluster), None) => Some(cluster),
            _ => None,
        }
    }

    /// Every cluster, each with only the resources matching `query`
    pub fn filtered(&self, query: &str) -> Vec<FilteredCluster<'_>> {
        self.clusters
            .iter()
            .map(|c| FilteredCluster {
                cluster: &c.cluster,
                resources: search::filter(&c.resources, query),
            })
            .collect()
    }
}

/// Exact id match first, then a unique prefix
fn resolve<'a, T>(items: &'a [T], key: &str, id: impl Fn(&T) -> &str) -> Option<&'a T> {
    if key.is_empty() {
        return None;
    }
    if let Some(item) = items.iter().find(|i| id(*i) == key) {
        return Some(item);
    }
    let mut prefixed = items.iter().filter(|i| id(*i).starts_with(key));
    match (prefixed.next(), prefixed.next()) {
        (Some(item), None) => Some(item),
        _ => None,
    }
}

/// Combine the current resource and cluster documents into a snapshot.
///
/// Resources whose cluster id is absent, `"default"` or unknown land in the
/// default cluster, which is always present. Clusters without resources are
/// kept with an empty list.
pub fn merge(user: Option<User>, resources: &[Document], clusters: &[Document]) -> ViewSnapshot {
    let resources: Vec<Resource> = resources.iter().map(Resource::from_document).collect();

    let mut views = vec![ClusterView {
        cluster: Cluster::default_cluster(),
        resources: Vec::new(),
    }];
    for doc in clusters {
        let cluster = Cluster::from_document(doc);
        if cluster.is_default() {
            // A persisted "default" document only renames the implicit cluster
            if !cluster.name.is_empty() {
                views[0].cluster.name = cluster.name;
            }
            continue;
        }
        views.push(ClusterView {
            cluster,
            resources: Vec::new(),
        });
    }

    let index: HashMap<&str, usize> = views
        .iter()
        .enumerate()
        .map(|(i, v)| (v.cluster.id.as_str(), i))
        .collect();
    let mut groups: Vec<Vec<Resource>> = vec![Vec::new(); views.len()];
    for resource in &resources {
        // The default cluster is always slot 0
        let slot = index
            .get(resource.cluster_id.as_str())
            .copied()
            .unwrap_or(0);
        groups[slot].push(resource.clone());
    }
    for (view, group) in views.iter_mut().zip(groups) {
        view.resources = group;
    }

    ViewSnapshot {
        user,
        stats: DashboardStats::from_resources(&resources),
        clusters: views,
        resources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::DEFAULT_CLUSTER_ID;
    use serde_json::json;

    fn doc(id: &str, created_at: i64, value: serde_json::Value) -> Document {
        Document {
            id: id.to_string(),
            created_at,
            fields: value.as_object().cloned().unwrap(),
        }
    }

    fn user() -> User {
        User {
            uid: "u1".into(),
            email: Some("ada@example.com".into()),
            provider: "password".into(),
        }
    }

    fn sample() -> ViewSnapshot {
        let resources = vec![
            doc("r1", 1, json!({"title": "Go Tour", "clusterId": "default"})),
            doc("r2", 2, json!({"title": "CSS Grid", "clusterId": "c1", "progress": "In Progress"})),
            doc("r3", 3, json!({"title": "Orphan", "clusterId": "gone", "progress": "Completed"})),
            doc("r4", 4, json!({"title": "No cluster"})),
        ];
        let clusters = vec![
            doc("c1", 1, json!({"name": "Frontend"})),
            doc("c2", 2, json!({"name": "Empty"})),
        ];
        merge(Some(user()), &resources, &clusters)
    }

    #[test]
    fn test_default_cluster_always_present() {
        let snapshot = merge(Some(user()), &[], &[]);
        assert_eq!(snapshot.clusters.len(), 1);
        assert_eq!(snapshot.clusters[0].cluster, Cluster::default_cluster());
        assert!(snapshot.clusters[0].resources.is_empty());
    }

    #[test]
    fn test_grouping_falls_back_to_default() {
        let snapshot = sample();

        let default_ids: Vec<&str> = snapshot
            .cluster(DEFAULT_CLUSTER_ID)
            .unwrap()
            .resources
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(default_ids, vec!["r1", "r3", "r4"]);

        let frontend = snapshot.cluster("c1").unwrap();
        assert_eq!(frontend.cluster.name, "Frontend");
        assert_eq!(frontend.resources.len(), 1);
        assert_eq!(frontend.resources[0].id, "r2");
    }

    #[test]
    fn test_every_resource_grouped_exactly_once() {
        let snapshot = sample();
        let grouped: usize = snapshot.clusters.iter().map(|c| c.resources.len()).sum();
        assert_eq!(grouped, snapshot.resources.len());
        for resource in &snapshot.resources {
            let home = snapshot.cluster_of(&resource.id).unwrap();
            if snapshot.cluster(&resource.cluster_id).is_some() {
                assert_eq!(home.cluster.id, resource.cluster_id);
            } else {
                assert_eq!(home.cluster.id, DEFAULT_CLUSTER_ID);
            }
        }
    }

    #[test]
    fn test_empty_cluster_kept() {
        let snapshot = sample();
        let empty = snapshot.cluster("c2").unwrap();
        assert_eq!(empty.cluster.name, "Empty");
        assert!(empty.resources.is_empty());
    }

    #[test]
    fn test_cluster_order() {
        let snapshot = sample();
        let ids: Vec<&str> = snapshot.clusters.iter().map(|c| c.cluster.id.as_str()).collect();
        assert_eq!(ids, vec!["default", "c1", "c2"]);
    }

    #[test]
    fn test_persisted_default_renames_only() {
        let clusters = vec![doc("default", 1, json!({"name": "Inbox"}))];
        let snapshot = merge(None, &[], &clusters);
        assert_eq!(snapshot.clusters.len(), 1);
        assert_eq!(snapshot.clusters[0].cluster.name, "Inbox");
    }

    #[test]
    fn test_stats() {
        let snapshot = sample();
        assert_eq!(
            snapshot.stats,
            DashboardStats {
                total: 4,
                in_progress: 1,
                completed: 1
            }
        );
    }

    #[test]
    fn test_filtered_keeps_all_clusters() {
        let snapshot = sample();
        let filtered = snapshot.filtered("grid");
        assert_eq!(filtered.len(), 3);
        assert!(filtered[0].resources.is_empty());
        assert_eq!(filtered[1].resources.len(), 1);
        assert!(filtered[2].resources.is_empty());

        let all = snapshot.filtered("");
        assert_eq!(all[0].resources.len(), 3);
    }

    #[test]
    fn test_resolve_resource_by_prefix() {
        let resources = vec![
            doc("abc123", 1, json!({})),
            doc("abd456", 2, json!({})),
        ];
        let snapshot = merge(Some(user()), &resources, &[]);

        assert_eq!(snapshot.resolve_resource("abc").unwrap().id, "abc123");
        assert_eq!(snapshot.resolve_resource("abd456").unwrap().id, "abd456");
        assert!(snapshot.resolve_resource("ab").is_none());
        assert!(snapshot.resolve_resource("zz").is_none());
        assert!(snapshot.resolve_resource("").is_none());
    }

    #[test]
    fn test_resolve_cluster_by_name() {
        let snapshot = sample();
        assert_eq!(snapshot.resolve_cluster("frontend").unwrap().id, "c1");
        assert_eq!(snapshot.resolve_cluster("default").unwrap().id, "default");
        assert_eq!(snapshot.resolve_cluster("c2").unwrap().name, "Empty");
        assert!(snapshot.resolve_cluster("missing").is_none());
    }

    #[test]
    fn test_signed_out_snapshot_is_empty() {
        let snapshot = ViewSnapshot::default();
        assert!(!snapshot.is_signed_in());
        assert!(snapshot.clusters.is_empty());
        assert_eq!(snapshot.stats.total, 0);
    }
}
