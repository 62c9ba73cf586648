//! Resource and cluster types
//!
//! Documents are schemaless, so decoding is lenient: a missing or mistyped
//! field reads as its empty value instead of failing the whole document.
//! Stored field names are camelCase and enum values use their display
//! strings (`"Not Started"`, `"youtube"`).

use crate::store::{Document, Fields};
use serde::Serialize;
use serde_json::Value;

/// Id of the implicit cluster holding unassigned resources
pub const DEFAULT_CLUSTER_ID: &str = "default";

/// Display name of the implicit cluster
pub const DEFAULT_CLUSTER_NAME: &str = "Default";

/// Stored field names
pub mod field {
    pub const TITLE: &str = "title";
    pub const URL: &str = "url";
    pub const DESCRIPTION: &str = "description";
    pub const CATEGORY: &str = "category";
    pub const TAGS: &str = "tags";
    pub const TYPE: &str = "type";
    pub const PROGRESS: &str = "progress";
    pub const NOTES: &str = "notes";
    pub const CLUSTER_ID: &str = "clusterId";
    pub const NAME: &str = "name";
}

/// Kind of learning material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Website,
    Youtube,
    Vimeo,
    Pdf,
    Article,
    Video,
    /// Absent, or a stored value this version does not recognise
    Unknown,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Youtube => "youtube",
            Self::Vimeo => "vimeo",
            Self::Pdf => "pdf",
            Self::Article => "article",
            Self::Video => "video",
            Self::Unknown => "unknown",
        }
    }

    fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website" => Ok(Self::Website),
            "youtube" => Ok(Self::Youtube),
            "vimeo" => Ok(Self::Vimeo),
            "pdf" => Ok(Self::Pdf),
            "article" => Ok(Self::Article),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown resource type: {}", other)),
        }
    }
}

/// Completion status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Progress {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Completed")]
    Completed,
}

impl Progress {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }

    /// Next state of the single progress toggle; wraps after `Completed`
    pub fn next(self) -> Self {
        match self {
            Self::NotStarted => Self::InProgress,
            Self::InProgress => Self::Completed,
            Self::Completed => Self::NotStarted,
        }
    }

    /// Label of the toggle that advances from this state
    pub fn action_label(&self) -> &'static str {
        match self {
            Self::NotStarted => "Start",
            Self::InProgress => "Complete",
            Self::Completed => "Restart",
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Progress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Not Started" => Ok(Self::NotStarted),
            "In Progress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            other => Err(format!("unknown progress: {}", other)),
        }
    }
}

/// A tracked learning resource
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub progress: Progress,
    pub notes: String,
    pub cluster_id: String,
}

impl Resource {
    /// Decode a resource document
    pub fn from_document(doc: &Document) -> Self {
        let fields = &doc.fields;
        let tags = match fields.get(field::TAGS) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        let cluster_id = match text(fields, field::CLUSTER_ID) {
            id if id.is_empty() => DEFAULT_CLUSTER_ID.to_string(),
            id => id,
        };

        Self {
            id: doc.id.clone(),
            title: text(fields, field::TITLE),
            url: text(fields, field::URL),
            description: text(fields, field::DESCRIPTION),
            category: text(fields, field::CATEGORY),
            tags,
            kind: fields
                .get(field::TYPE)
                .and_then(Value::as_str)
                .map(ResourceType::from_stored)
                .unwrap_or(ResourceType::Unknown),
            progress: fields
                .get(field::PROGRESS)
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            notes: text(fields, field::NOTES),
            cluster_id,
        }
    }

    /// Url to open or embed, if one was stored
    pub fn url(&self) -> Option<&str> {
        if self.url.is_empty() {
            None
        } else {
            Some(&self.url)
        }
    }
}

/// A named grouping of resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
}

impl Cluster {
    /// The implicit cluster for unassigned resources
    pub fn default_cluster() -> Self {
        Self {
            id: DEFAULT_CLUSTER_ID.to_string(),
            name: DEFAULT_CLUSTER_NAME.to_string(),
        }
    }

    /// Decode a cluster document
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            name: text(&doc.fields, field::NAME),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_CLUSTER_ID
    }
}

/// Input of the add-resource form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewResource {
    pub title: String,
    pub url: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub kind: ResourceType,
    /// Target cluster; `None` or empty places the resource in the default cluster
    pub cluster_id: Option<String>,
}

impl NewResource {
    /// Document body for a freshly created resource
    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(field::TITLE.into(), self.title.into());
        fields.insert(field::URL.into(), self.url.into());
        fields.insert(field::DESCRIPTION.into(), self.description.into());
        fields.insert(field::CATEGORY.into(), self.category.into());
        fields.insert(field::TAGS.into(), self.tags.into());
        fields.insert(field::TYPE.into(), self.kind.as_str().into());
        fields.insert(field::PROGRESS.into(), Progress::NotStarted.as_str().into());
        fields.insert(
            field::CLUSTER_ID.into(),
            cluster_or_default(self.cluster_id).into(),
        );
        fields
    }
}

/// Partial update of a resource; only `Some` fields are written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePatch {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub kind: Option<ResourceType>,
    pub progress: Option<Progress>,
    pub notes: Option<String>,
    pub cluster_id: Option<String>,
}

impl ResourcePatch {
    pub fn progress(progress: Progress) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Default::default()
        }
    }

    pub fn cluster(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: Some(cluster_id.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fields to merge into the stored document.
    /// An empty cluster id is written as the default cluster.
    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        if let Some(title) = self.title {
            fields.insert(field::TITLE.into(), title.into());
        }
        if let Some(url) = self.url {
            fields.insert(field::URL.into(), url.into());
        }
        if let Some(description) = self.description {
            fields.insert(field::DESCRIPTION.into(), description.into());
        }
        if let Some(category) = self.category {
            fields.insert(field::CATEGORY.into(), category.into());
        }
        if let Some(tags) = self.tags {
            fields.insert(field::TAGS.into(), tags.into());
        }
        if let Some(kind) = self.kind {
            fields.insert(field::TYPE.into(), kind.as_str().into());
        }
        if let Some(progress) = self.progress {
            fields.insert(field::PROGRESS.into(), progress.as_str().into());
        }
        if let Some(notes) = self.notes {
            fields.insert(field::NOTES.into(), notes.into());
        }
        if let Some(cluster_id) = self.cluster_id {
            fields.insert(
                field::CLUSTER_ID.into(),
                cluster_or_default(Some(cluster_id)).into(),
            );
        }
        fields
    }
}

/// Split comma-separated form input into trimmed, non-empty tags
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn cluster_or_default(cluster_id: Option<String>) -> String {
    match cluster_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => DEFAULT_CLUSTER_ID.to_string(),
    }
}

fn text(fields: &Fields, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
