//! Client-side resource search

use super::types::Resource;

/// Case-insensitive match against title, description, category and tags.
/// An empty query matches everything.
pub fn matches(resource: &Resource, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let q = query.to_lowercase();
    resource.title.to_lowercase().contains(&q)
        || resource.description.to_lowercase().contains(&q)
        || resource.category.to_lowercase().contains(&q)
        || resource.tags.iter().any(|t| t.to_lowercase().contains(&q))
}

/// Resources matching `query`, in their original order
pub fn filter<'a>(resources: &'a [Resource], query: &str) -> Vec<&'a Resource> {
    resources.iter().filter(|r| matches(r, query)).collect()
}
