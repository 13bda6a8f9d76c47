use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic role class of a canonical node. Closed set; every node gets
/// exactly one tag, with `Unknown` as the deterministic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleTag {
    Interactive,
    Container,
    Navigation,
    Input,
    Static,
    Decorative,
    Unknown,
}

impl RoleTag {
    /// All tags in a fixed order, for histogram iteration.
    pub const ALL: [RoleTag; 7] = [
        RoleTag::Interactive,
        RoleTag::Container,
        RoleTag::Navigation,
        RoleTag::Input,
        RoleTag::Static,
        RoleTag::Decorative,
        RoleTag::Unknown,
    ];
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoleTag::Interactive => "interactive",
            RoleTag::Container => "container",
            RoleTag::Navigation => "navigation",
            RoleTag::Input => "input",
            RoleTag::Static => "static",
            RoleTag::Decorative => "decorative",
            RoleTag::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A single canonical node. Owned exclusively by its parent; immutable
/// once canonicalization and classification are done.
///
/// `properties` is a BTreeMap so serde_json serialization is
/// deterministic, which every digest in the system depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub role: String,
    pub name: String,
    #[serde(default)]
    pub tag: RoleTag,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Default for RoleTag {
    fn default() -> Self {
        RoleTag::Unknown
    }
}

impl Node {
    pub fn count(&self) -> u32 {
        1 + self.children.iter().map(Node::count).sum::<u32>()
    }

    /// Depth in levels: a lone root is 1.
    pub fn depth(&self) -> u32 {
        1 + self.children.iter().map(Node::depth).max().unwrap_or(0)
    }

    /// Collects every non-empty node name in the subtree, depth-first.
    pub fn collect_names(&self, names: &mut std::collections::BTreeSet<String>) {
        if !self.name.is_empty() {
            names.insert(self.name.clone());
        }
        for child in &self.children {
            child.collect_names(names);
        }
    }

    pub fn names(&self) -> std::collections::BTreeSet<String> {
        let mut names = std::collections::BTreeSet::new();
        self.collect_names(&mut names);
        names
    }
}

/// Capture metadata carried alongside a canonical tree for audit purposes.
/// Stripped before fingerprinting; never participates in any digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    pub captured_at: i64,
    pub source: String,
}

/// A canonical tree plus its capture metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub root: Node,
    pub capture: Capture,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(role: &str, name: &str) -> Node {
        Node {
            role: role.into(),
            name: name.into(),
            tag: RoleTag::Unknown,
            properties: BTreeMap::new(),
            children: vec![],
        }
    }

    #[test]
    fn count_and_depth() {
        let mut root = leaf("window", "main");
        root.children.push(leaf("button", "ok"));
        let mut pane = leaf("pane", "body");
        pane.children.push(leaf("text", "hello"));
        root.children.push(pane);

        assert_eq!(root.count(), 4);
        assert_eq!(root.depth(), 3);
        assert_eq!(leaf("button", "ok").depth(), 1);
    }

    #[test]
    fn names_skip_empty() {
        let mut root = leaf("window", "main");
        root.children.push(leaf("separator", ""));
        root.children.push(leaf("button", "ok"));
        let names = root.names();
        assert_eq!(names.len(), 2);
        assert!(names.contains("main"));
        assert!(names.contains("ok"));
    }
}
