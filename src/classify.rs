use crate::tree::{Node, RoleTag};
use serde_json::Value;

const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "menuitem", "tab", "checkbox", "radio", "switch", "slider", "textbox",
];
const STATIC_ROLES: &[&str] = &[
    "text",
    "label",
    "heading",
    "paragraph",
    "image",
    "icon",
    "statictext",
];
const CONTAINER_ROLES: &[&str] = &[
    "window",
    "pane",
    "panel",
    "group",
    "container",
    "scroll_pane",
    "splitpane",
    "frame",
];
const NAVIGATION_ROLES: &[&str] = &["menu", "menubar", "toolbar", "tablist", "navigation", "tree"];
const INPUT_ROLES: &[&str] = &["text_field", "textarea", "combobox", "spinbutton", "searchbox"];

/// Assigns a semantic role class to a single node.
///
/// Lookup order: role table, then type/name substring fallback, then
/// clickable/focusable property hints, then the decorative heuristic.
/// Pure and total; `Unknown` is the deterministic fallback, which the
/// fingerprint determinism invariant depends on.
pub fn classify(node: &Node) -> RoleTag {
    let role = node.role.to_lowercase();
    let name = node.name.to_lowercase();
    let node_type = node
        .properties
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();

    if INTERACTIVE_ROLES.contains(&role.as_str()) {
        return RoleTag::Interactive;
    }
    if STATIC_ROLES.contains(&role.as_str()) {
        return RoleTag::Static;
    }
    if NAVIGATION_ROLES.contains(&role.as_str()) {
        return RoleTag::Navigation;
    }
    if INPUT_ROLES.contains(&role.as_str()) {
        return RoleTag::Input;
    }
    if CONTAINER_ROLES.contains(&role.as_str()) {
        return RoleTag::Container;
    }

    // Type/name substring fallback for platforms with nonstandard roles.
    if node_type.contains("button") || name.contains("button") {
        return RoleTag::Interactive;
    }
    if node_type.contains("text") || node_type.contains("label") {
        return RoleTag::Static;
    }
    if node_type.contains("container") || node_type.contains("pane") {
        return RoleTag::Container;
    }

    if flag(node, "clickable") || flag(node, "focusable") {
        return RoleTag::Interactive;
    }

    // No role, no name, not enabled: bare visual chrome.
    if role.is_empty() && name.is_empty() && !flag(node, "enabled") {
        return RoleTag::Decorative;
    }

    RoleTag::Unknown
}

/// Re-tags a whole canonical tree, returning it with every node carrying
/// its classification. Runs between canonicalization and noise filtering.
pub fn annotate(mut node: Node) -> Node {
    node.tag = classify(&node);
    node.children = node.children.into_iter().map(annotate).collect();
    node
}

/// Truthiness of a property flag: boolean true, nonzero number, or the
/// string "true".
pub fn flag(node: &Node, key: &str) -> bool {
    match node.properties.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
