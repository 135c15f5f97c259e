//! Navigation listing
//!
//! Content (projects, domains, folders, bookmarks) is addressed by slash
//! separated paths such as `/PROJECTS/p1`. [`list_content`] filters a set of
//! items the way the listing endpoint does: by parent, search tokens,
//! visibility and hierarchy mode, rendering references in the requested
//! style.

use super::Style;
use serde::{Deserialize, Serialize};

/// How deep a listing goes under its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HierarchyMode {
    /// Direct children only
    #[default]
    None,
    /// Every descendant, depth-first by path
    Tree,
    /// Every descendant, sorted by name
    Flat,
}

/// Visibility filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    /// Visible items only
    #[default]
    Visible,
    /// Every item
    All,
    /// Hidden items only
    Hidden,
}

impl Visibility {
    fn accepts(self, visible: bool) -> bool {
        match self {
            Visibility::Visible => visible,
            Visibility::All => true,
            Visibility::Hidden => !visible,
        }
    }
}

/// Kind of navigation item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemKind {
    /// A project
    Project,
    /// A domain of a project
    Domain,
    /// A bookmark folder
    Folder,
    /// A bookmark
    Bookmark,
}

/// One entry of a navigation listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationItem {
    /// Canonical object id
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Path of the containing item
    pub parent: String,
    /// Item kind
    pub kind: ItemKind,
    /// Whether the item is visible by default
    pub visible: bool,
    /// Internal compound key, only exposed in legacy style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_key: Option<String>,
    /// Reference rendered in the requested style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl NavigationItem {
    /// Visible item with no description
    pub fn new(kind: ItemKind, parent: &str, id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            parent: normalize(parent),
            kind,
            visible: true,
            legacy_key: None,
            reference: None,
        }
    }

    /// Mark the item hidden
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Attach the internal compound key
    pub fn with_legacy_key(mut self, key: &str) -> Self {
        self.legacy_key = Some(key.to_string());
        self
    }

    /// Path of the item itself
    pub fn path(&self) -> String {
        if self.parent == "/" {
            format!("/{}", self.id)
        } else {
            format!("{}/{}", self.parent, self.id)
        }
    }

    fn matches(&self, tokens: &[String]) -> bool {
        let name = self.name.to_lowercase();
        let description = self.description.as_deref().unwrap_or_default().to_lowercase();
        tokens
            .iter()
            .all(|token| name.contains(token.as_str()) || description.contains(token.as_str()))
    }

    fn render(mut self, style: Style) -> Self {
        match style {
            Style::Human => {
                self.reference = Some(format!("'{}'", self.name.replace('\'', "\\'")));
                self.legacy_key = None;
            }
            Style::Machine => {
                self.reference = Some(format!("@'{}'", self.id));
                self.legacy_key = None;
            }
            Style::Legacy => {
                self.reference = Some(format!("@'{}'", self.id));
            }
        }
        self
    }
}

/// Listing request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationQuery {
    /// Parent path, `/` when absent
    pub parent: Option<String>,
    /// Comma separated search tokens
    pub q: Option<String>,
    /// Hierarchy mode
    pub hierarchy: HierarchyMode,
    /// Reference style
    pub style: Style,
    /// Visibility filter
    pub visibility: Visibility,
}

impl NavigationQuery {
    /// Lower-cased, non-empty search tokens
    pub fn tokens(&self) -> Vec<String> {
        self.q
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Listing reply, echoing the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationReply {
    /// The query that produced the listing
    pub query: NavigationQuery,
    /// Matching items
    pub result: Vec<NavigationItem>,
}

/// Filter `items` according to `query`
pub fn list_content(items: &[NavigationItem], query: NavigationQuery) -> NavigationReply {
    let parent = normalize(query.parent.as_deref().unwrap_or("/"));
    let tokens = query.tokens();

    let mut result: Vec<NavigationItem> = items
        .iter()
        .filter(|item| match query.hierarchy {
            HierarchyMode::None => item.parent == parent,
            HierarchyMode::Tree | HierarchyMode::Flat => is_under(&item.parent, &parent),
        })
        .filter(|item| query.visibility.accepts(item.visible))
        .filter(|item| item.matches(&tokens))
        .cloned()
        .map(|item| item.render(query.style))
        .collect();

    match query.hierarchy {
        HierarchyMode::Tree => result.sort_by_key(|item| item.path()),
        HierarchyMode::Flat => result.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
        HierarchyMode::None => {}
    }

    NavigationReply { query, result }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn is_under(path: &str, ancestor: &str) -> bool {
    ancestor == "/"
        || path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}
