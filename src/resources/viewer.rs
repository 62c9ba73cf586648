//! Resource viewer: decides how a resource is embedded
//!
//! Pure decision over type and url; nothing is fetched here.

use super::types::{Resource, ResourceType};
use serde::Serialize;

const YOUTUBE_EMBED_BASE: &str = "https://www.youtube.com/embed/";
const VIMEO_EMBED_BASE: &str = "https://player.vimeo.com/video/";

/// How the viewer should present a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum Embed {
    /// Embeddable video player url
    Player(String),
    /// Embed the stored url as-is
    Inline(String),
    /// No url was stored
    NoUrl,
    /// Type cannot be embedded
    Unsupported,
}

/// Choose an embed for `kind` and `url`
pub fn embed(kind: ResourceType, url: Option<&str>) -> Embed {
    let url = match url {
        Some(u) if !u.is_empty() => u,
        _ => return Embed::NoUrl,
    };

    match kind {
        ResourceType::Youtube => Embed::Player(format!("{}{}", YOUTUBE_EMBED_BASE, video_id(url))),
        ResourceType::Vimeo => Embed::Player(format!("{}{}", VIMEO_EMBED_BASE, video_id(url))),
        ResourceType::Pdf | ResourceType::Article | ResourceType::Website => {
            Embed::Inline(url.to_string())
        }
        ResourceType::Video | ResourceType::Unknown => Embed::Unsupported,
    }
}

/// Embed for a stored resource
pub fn embed_resource(resource: &Resource) -> Embed {
    embed(resource.kind, resource.url())
}

/// Last path segment of the url, taken as the video identifier
fn video_id(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
