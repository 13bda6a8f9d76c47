use crate::tree::Node;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Numeric property differences at or below this are not significant.
const SIGNIFICANCE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Moved,
}

/// One structural delta between two canonical trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Computes the structured delta between two canonical trees along with a
/// similarity score in [0, 1].
///
/// Nodes align by identity key (role, name) at each level, not by
/// position; unmatched nodes become Added/Removed for their whole
/// subtree. A matched pair whose non-identity properties differ beyond
/// the significance epsilon yields Modified; an unchanged subtree whose
/// rank among its siblings shifted yields Moved.
///
/// `diff(t, t)` is `([], 1.0)` for any canonical tree.
pub fn diff(before: &Node, after: &Node) -> (Vec<Change>, f64) {
    let mut changes = Vec::new();
    let mut changed: u32 = 0;
    let mut union: u32 = 0;

    let root_path = node_path("", before);
    if identity(before) != identity(after) {
        // Different screens entirely: everything on both sides changed.
        changes.push(removed(&root_path, before));
        changes.push(added(&node_path("", after), after));
        changed = before.count() + after.count();
        union = changed;
    } else {
        diff_nodes(before, after, &root_path, &mut changes, &mut changed, &mut union);
    }

    let similarity = if union == 0 {
        1.0
    } else {
        1.0 - changed as f64 / union as f64
    };
    (changes, similarity)
}

fn identity(node: &Node) -> (&str, &str) {
    (node.role.as_str(), node.name.as_str())
}

fn node_path(parent: &str, node: &Node) -> String {
    if node.name.is_empty() {
        format!("{parent}/{}", node.role)
    } else {
        format!("{parent}/{}[{}]", node.role, node.name)
    }
}

fn summarize(node: &Node) -> Value {
    json!({"role": node.role, "name": node.name, "nodes": node.count()})
}

fn added(path: &str, node: &Node) -> Change {
    Change {
        kind: ChangeKind::Added,
        path: path.to_string(),
        before: None,
        after: Some(summarize(node)),
    }
}

fn removed(path: &str, node: &Node) -> Change {
    Change {
        kind: ChangeKind::Removed,
        path: path.to_string(),
        before: Some(summarize(node)),
        after: None,
    }
}

fn diff_nodes(
    before: &Node,
    after: &Node,
    path: &str,
    changes: &mut Vec<Change>,
    changed: &mut u32,
    union: &mut u32,
) {
    *union += 1;

    let property_delta = significant_property_delta(before, after);
    if !property_delta.is_empty() {
        let (old_props, new_props): (BTreeMap<_, _>, BTreeMap<_, _>) = property_delta
            .into_iter()
            .map(|(key, old, new)| ((key.clone(), old), (key, new)))
            .unzip();
        changes.push(Change {
            kind: ChangeKind::Modified,
            path: path.to_string(),
            before: Some(json!(old_props)),
            after: Some(json!(new_props)),
        });
        *changed += 1;
    }

    diff_children(before, after, path, changes, changed, union);
}

fn diff_children(
    before: &Node,
    after: &Node,
    path: &str,
    changes: &mut Vec<Change>,
    changed: &mut u32,
    union: &mut u32,
) {
    // Bucket both sides by identity key; duplicates pair up in order.
    let mut before_slots: BTreeMap<(&str, &str), Vec<(usize, &Node)>> = BTreeMap::new();
    for (index, child) in before.children.iter().enumerate() {
        before_slots.entry(identity(child)).or_default().push((index, child));
    }
    let mut after_slots: BTreeMap<(&str, &str), Vec<(usize, &Node)>> = BTreeMap::new();
    for (index, child) in after.children.iter().enumerate() {
        after_slots.entry(identity(child)).or_default().push((index, child));
    }

    let mut matched: Vec<(usize, usize, &Node, &Node)> = Vec::new();

    for (key, old_entries) in &before_slots {
        let new_entries = after_slots.get(key).map(Vec::as_slice).unwrap_or(&[]);
        for (slot, (old_index, old_child)) in old_entries.iter().enumerate() {
            match new_entries.get(slot) {
                Some((new_index, new_child)) => {
                    matched.push((*old_index, *new_index, *old_child, *new_child));
                }
                None => {
                    let child_path = node_path(path, old_child);
                    changes.push(removed(&child_path, old_child));
                    *changed += old_child.count();
                    *union += old_child.count();
                }
            }
        }
    }

    for (key, new_entries) in &after_slots {
        let already_matched = before_slots.get(key).map(Vec::len).unwrap_or(0);
        for (_, new_child) in new_entries.iter().skip(already_matched) {
            let child_path = node_path(path, new_child);
            changes.push(added(&child_path, new_child));
            *changed += new_child.count();
            *union += new_child.count();
        }
    }

    // Moved detection compares ranks among matched pairs only, so an
    // insertion or removal elsewhere does not read as movement here.
    let mut old_order: Vec<usize> = matched.iter().map(|m| m.0).collect();
    old_order.sort_unstable();
    let mut new_order: Vec<usize> = matched.iter().map(|m| m.1).collect();
    new_order.sort_unstable();

    for (old_index, new_index, old_child, new_child) in matched {
        let child_path = node_path(path, old_child);
        let old_rank = old_order.binary_search(&old_index).unwrap_or(usize::MAX);
        let new_rank = new_order.binary_search(&new_index).unwrap_or(usize::MAX);
        if old_child == new_child && old_rank != new_rank {
            changes.push(Change {
                kind: ChangeKind::Moved,
                path: child_path.clone(),
                before: Some(json!(old_rank)),
                after: Some(json!(new_rank)),
            });
            *changed += 1;
        }
        diff_nodes(old_child, new_child, &child_path, changes, changed, union);
    }
}

/// Keys whose values differ beyond the epsilon, with before/after values.
fn significant_property_delta(before: &Node, after: &Node) -> Vec<(String, Value, Value)> {
    let mut delta = Vec::new();
    let keys: std::collections::BTreeSet<&String> = before
        .properties
        .keys()
        .chain(after.properties.keys())
        .collect();
    for key in keys {
        let old = before.properties.get(key);
        let new = after.properties.get(key);
        if !values_equivalent(old, new) {
            delta.push((
                key.clone(),
                old.cloned().unwrap_or(Value::Null),
                new.cloned().unwrap_or(Value::Null),
            ));
        }
    }
    delta
}

fn values_equivalent(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() <= SIGNIFICANCE_EPSILON,
                _ => x == y,
            }
        }
        (x, y) => x == y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::canonicalize;
    use crate::classify::annotate;

    fn canon(raw: &Value) -> Node {
        annotate(canonicalize(raw).unwrap())
    }

    fn login() -> Node {
        canon(&json!({
            "role": "window", "name": "login", "children": [
                {"role": "button", "name": "submit_button", "children": []},
                {"role": "text_field", "name": "username_field", "value": "alice", "children": []}
            ]
        }))
    }

    #[test]
    fn diff_of_identical_trees_is_empty() {
        let t = login();
        let (changes, similarity) = diff(&t, &t);
        assert!(changes.is_empty());
        assert_eq!(similarity, 1.0);
    }

    #[test]
    fn detects_added_and_removed() {
        let before = login();
        let after = canon(&json!({
            "role": "window", "name": "login", "children": [
                {"role": "button", "name": "submit_button", "children": []},
                {"role": "text", "name": "maintenance notice", "children": []}
            ]
        }));
        let (changes, similarity) = diff(&before, &after);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|c| c.kind == ChangeKind::Removed
            && c.path.contains("username_field")));
        assert!(changes.iter().any(|c| c.kind == ChangeKind::Added
            && c.path.contains("maintenance notice")));
        assert!(similarity < 1.0);
    }

    #[test]
    fn detects_modified_properties() {
        let before = login();
        let after = canon(&json!({
            "role": "window", "name": "login", "children": [
                {"role": "button", "name": "submit_button", "children": []},
                {"role": "text_field", "name": "username_field", "value": "mallory", "children": []}
            ]
        }));
        let (changes, similarity) = diff(&before, &after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert!(changes[0].path.contains("username_field"));
        assert!(similarity > 0.0 && similarity < 1.0);
    }

    #[test]
    fn tiny_numeric_wobble_is_not_significant() {
        let before = canon(&json!({
            "role": "window", "name": "w", "opacity": 0.5, "children": []
        }));
        let after = canon(&json!({
            "role": "window", "name": "w", "opacity": 0.5000000001, "children": []
        }));
        let (changes, similarity) = diff(&before, &after);
        assert!(changes.is_empty());
        assert_eq!(similarity, 1.0);
    }

    #[test]
    fn different_roots_are_wholesale_replacement() {
        let before = login();
        let after = canon(&json!({"role": "window", "name": "home", "children": []}));
        let (changes, similarity) = diff(&before, &after);
        assert_eq!(changes.len(), 2);
        assert_eq!(similarity, 0.0);
    }

    #[test]
    fn reordered_unchanged_siblings_read_as_moved() {
        // Hand-built (unsorted) trees: canonical ordering never reorders
        // unchanged siblings, but the engine handles raw Node values too.
        let leaf = |name: &str| Node {
            role: "item".into(),
            name: name.into(),
            tag: crate::tree::RoleTag::Unknown,
            properties: BTreeMap::new(),
            children: vec![],
        };
        let parent = |children: Vec<Node>| Node {
            role: "list".into(),
            name: "menu".into(),
            tag: crate::tree::RoleTag::Unknown,
            properties: BTreeMap::new(),
            children,
        };
        let before = parent(vec![leaf("a"), leaf("b")]);
        let after = parent(vec![leaf("b"), leaf("a")]);
        let (changes, _) = diff(&before, &after);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::Moved));
    }

    #[test]
    fn similarity_counts_subtree_sizes() {
        let before = login();
        let after = canon(&json!({
            "role": "window", "name": "login", "children": [
                {"role": "button", "name": "submit_button", "children": []}
            ]
        }));
        // union = 2 matched + 1 removed = 3, changed = 1.
        let (_, similarity) = diff(&before, &after);
        assert!((similarity - (1.0 - 1.0 / 3.0)).abs() < 1e-12);
    }
}
