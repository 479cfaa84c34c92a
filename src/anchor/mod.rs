//! Anchor ids and the map from anchor id to render tree element.
//!
//! Ids come from four places:
//! - link fragments (`#id`), see [`fragment`]
//! - explicit heading ids (`## Title {#id}`), see [`split_explicit_id`]
//! - HTML anchors (`<a id="id">`, `<a name="id">`), see [`html_anchor_ids`]
//! - heading text, see [`slugify`]

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::document::{ElementHandle, RenderTree, TreeId};

static FRAGMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)#(.*)$").expect("valid regex"));
static EXPLICIT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s*\{#([^}\s]+)\}\s*$").expect("valid regex"));
static HTML_ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<a(?:\s[^>]*?)?\s(?:id|name)\s*=\s*["']([^"']*)["']"#).expect("valid regex")
});

/// Extract the fragment of `href`: everything after the first `#`.
///
/// Returns `None` when there is no `#` at all and `Some("")` for a bare `#`.
///
/// ```
/// use markjump::anchor::fragment;
///
/// assert_eq!(fragment("#section-2"), Some("section-2"));
/// assert_eq!(fragment("guide.md#install"), Some("install"));
/// assert_eq!(fragment("#"), Some(""));
/// assert_eq!(fragment("https://example.com"), None);
/// ```
pub fn fragment(href: &str) -> Option<&str> {
    FRAGMENT_RE
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// GitHub-style slug for heading text.
///
/// Lowercases, keeps alphanumerics, `-` and `_`, turns whitespace into `-`
/// and drops other punctuation.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            out.extend(ch.to_lowercase());
        } else if ch.is_whitespace() {
            out.push('-');
        }
    }
    out
}

/// Split a trailing `{#id}` off heading text.
pub fn split_explicit_id(text: &str) -> (&str, Option<&str>) {
    EXPLICIT_ID_RE.captures(text).map_or((text, None), |caps| {
        let head = caps.get(1).map_or("", |m| m.as_str());
        (head, caps.get(2).map(|m| m.as_str()))
    })
}

/// Ids declared by `<a id=..>` / `<a name=..>` tags in an HTML fragment.
pub fn html_anchor_ids(html: &str) -> Vec<String> {
    HTML_ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Anchor id to element lookup for one render tree.
///
/// Built once per parse and replaced wholesale on the next one. Every handle
/// in the map belongs to [`AnchorMap::tree_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorMap {
    tree: TreeId,
    entries: HashMap<String, ElementHandle>,
}

/// One row of [`AnchorMap::entries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorEntry {
    pub id: String,
    pub line: usize,
}

impl AnchorMap {
    /// Scan `tree` for elements carrying an anchor id.
    ///
    /// Duplicate ids keep the last element in document order.
    pub fn build(tree: &RenderTree) -> Self {
        let mut entries = HashMap::new();
        for element in tree.elements() {
            if let Some(id) = element.anchor() {
                if let Some(previous) = entries.insert(id.to_string(), element.handle()) {
                    tracing::debug!(id, %previous, "duplicate anchor id, keeping the later element");
                }
            }
        }
        Self {
            tree: tree.id(),
            entries,
        }
    }

    pub fn lookup(&self, id: &str) -> Option<ElementHandle> {
        self.entries.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The tree every handle in this map belongs to.
    pub const fn tree_id(&self) -> TreeId {
        self.tree
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Anchors with their first rendered line, sorted by line then id.
    pub fn entries(&self, tree: &RenderTree) -> Vec<AnchorEntry> {
        let mut out: Vec<AnchorEntry> = self
            .entries
            .iter()
            .filter_map(|(id, handle)| {
                tree.element(*handle).map(|element| AnchorEntry {
                    id: id.clone(),
                    line: element.lines().start,
                })
            })
            .collect();
        out.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.id.cmp(&b.id)));
        out
    }
}
