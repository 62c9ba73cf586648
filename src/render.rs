//! Text rendering of view snapshots
//!
//! Pure functions from a [`ViewSnapshot`] (plus search query and theme) to
//! the text the CLI prints. Nothing here touches the store.

use crate::preferences::Preferences;
use crate::resources::{embed_resource, Embed, Resource};
use crate::sync::ViewSnapshot;
use std::fmt::Write as _;

/// Number of id characters shown; any unique prefix resolves back
pub const SHORT_ID_LEN: usize = 8;

/// Terminal palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Theme {
    pub dark: bool,
    /// Emit ANSI escapes
    pub color: bool,
}

impl Theme {
    /// No escapes at all
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn from_preferences(preferences: &Preferences, color: bool) -> Self {
        Self {
            dark: preferences.dark_mode,
            color,
        }
    }

    pub fn name(&self) -> &'static str {
        if self.dark {
            "dark"
        } else {
            "light"
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint(text, if self.dark { "1;97" } else { "1;34" })
    }

    fn muted(&self, text: &str) -> String {
        self.paint(text, if self.dark { "37" } else { "90" })
    }

    fn accent(&self, text: &str) -> String {
        self.paint(text, if self.dark { "96" } else { "35" })
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Dashboard: counters, then every cluster with the resources matching `query`
pub fn dashboard(snapshot: &ViewSnapshot, query: &str, theme: &Theme) -> String {
    let mut out = String::new();

    let Some(user) = &snapshot.user else {
        let _ = writeln!(out, "Not signed in. Use `signup` or `login`.");
        return out;
    };

    let _ = writeln!(out, "{}", theme.heading("Learnboard"));
    let _ = writeln!(out, "{}", theme.muted(&format!("Signed in as {}", user.display_name())));
    let stats = &snapshot.stats;
    let _ = writeln!(
        out,
        "Total: {}  In progress: {}  Completed: {}",
        stats.total, stats.in_progress, stats.completed
    );
    if !query.is_empty() {
        let _ = writeln!(out, "Search: {}", theme.accent(query));
    }

    for group in snapshot.filtered(query) {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} {}",
            theme.heading(&format!("{} ({})", group.cluster.name, group.resources.len())),
            theme.muted(&format!("[{}]", short_id(&group.cluster.id)))
        );
        if group.resources.is_empty() {
            let _ = writeln!(out, "  {}", theme.muted("(no resources)"));
        }
        for resource in group.resources {
            let _ = writeln!(out, "  {}", resource_line(resource, theme));
        }
    }
    out
}

/// One-line summary used in the dashboard
pub fn resource_line(resource: &Resource, theme: &Theme) -> String {
    let mut line = format!(
        "{} {} ({}, {}) -> {}",
        theme.muted(&format!("[{}]", short_id(&resource.id))),
        resource.title,
        resource.kind,
        resource.progress,
        theme.accent(resource.progress.action_label()),
    );
    if !resource.tags.is_empty() {
        let tags: Vec<String> = resource.tags.iter().map(|t| format!("#{}", t)).collect();
        line.push(' ');
        line.push_str(&theme.muted(&tags.join(" ")));
    }
    line
}

/// Full resource view with its embed
pub fn resource_detail(snapshot: &ViewSnapshot, resource: &Resource, theme: &Theme) -> String {
    let mut out = String::new();
    let cluster = snapshot
        .cluster_of(&resource.id)
        .map(|c| c.cluster.name.as_str())
        .unwrap_or_default();

    let _ = writeln!(out, "{}", theme.heading(&resource.title));
    let _ = writeln!(out, "Id:          {}", resource.id);
    let _ = writeln!(out, "Cluster:     {}", cluster);
    let _ = writeln!(out, "Type:        {}", resource.kind);
    if !resource.category.is_empty() {
        let _ = writeln!(out, "Category:    {}", resource.category);
    }
    if !resource.tags.is_empty() {
        let _ = writeln!(out, "Tags:        {}", resource.tags.join(", "));
    }
    let _ = writeln!(
        out,
        "Progress:    {} ({})",
        resource.progress,
        theme.accent(resource.progress.action_label())
    );
    if !resource.description.is_empty() {
        let _ = writeln!(out, "Description: {}", resource.description);
    }
    if !resource.notes.is_empty() {
        let _ = writeln!(out, "Notes:       {}", resource.notes);
    }
    let _ = writeln!(out, "{}", embed_line(&embed_resource(resource)));
    out
}

pub fn embed_line(embed: &Embed) -> String {
    match embed {
        Embed::Player(url) => format!("Player:      {}", url),
        Embed::Inline(url) => format!("Embed:       {}", url),
        Embed::NoUrl => "No URL provided".to_string(),
        Embed::Unsupported => "Embedding not supported for this type".to_string(),
    }
}
