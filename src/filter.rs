use crate::classify;
use crate::tree::{Node, RoleTag};
use serde_json::Value;

/// Roles that never carry screen semantics: scroll chrome and transient
/// status indicators.
const NOISE_ROLES: &[&str] = &[
    "scrollbar",
    "separator",
    "statusbar",
    "progressbar",
    "spinner",
];

/// Name fragments that mark transient loading artifacts.
const NOISE_NAMES: &[&str] = &["loading", "spinner", "dots", "ellipsis"];

/// Removes non-semantic nodes from a classified canonical tree.
///
/// Runs after classification and before fingerprinting, and is fully
/// deterministic. Returns `None` when the root itself is noise.
pub fn filter(node: Node) -> Option<Node> {
    if should_filter(&node) {
        return None;
    }
    let mut node = node;
    node.children = node.children.into_iter().filter_map(filter).collect();
    Some(node)
}

fn should_filter(node: &Node) -> bool {
    // Interactive or focusable nodes always survive, whatever else they
    // look like: a hidden-but-focusable control is exactly the kind of
    // thing drift analysis must see.
    if node.tag == RoleTag::Interactive || classify::flag(node, "focusable") {
        return false;
    }

    let role = node.role.to_lowercase();
    if NOISE_ROLES.contains(&role.as_str()) {
        return true;
    }

    let name = node.name.to_lowercase();
    if NOISE_NAMES.iter().any(|noise| name.contains(noise)) {
        return true;
    }

    // Explicitly hidden.
    if matches!(node.properties.get("visible"), Some(Value::Bool(false)))
        || classify::flag(node, "hidden")
        || classify::flag(node, "invisible")
    {
        return true;
    }

    // Zero-area bounds.
    if let Some(Value::Object(bounds)) = node.properties.get("bounds") {
        let width = bounds.get("width").and_then(Value::as_f64).unwrap_or(0.0);
        let height = bounds.get("height").and_then(Value::as_f64).unwrap_or(0.0);
        if width <= 0.0 || height <= 0.0 {
            return true;
        }
    }

    node.tag == RoleTag::Decorative
}
