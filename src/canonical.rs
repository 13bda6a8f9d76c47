use crate::error::DriftError;
use crate::tree::{Node, RoleTag};
use serde_json::Value;
use std::collections::BTreeMap;

/// Property keys stripped during canonicalization: capture timestamps,
/// platform identities and focus/hover state churn between otherwise
/// identical snapshots.
pub const VOLATILE_KEYS: &[&str] = &[
    "timestamp",
    "id",
    "instance_id",
    "hash",
    "focused",
    "hovered",
    "active",
    "pressed",
];

/// Synonym keys mapped onto the canonical `name`, in priority order.
/// The first non-empty value wins.
pub const NAME_SYNONYMS: &[&str] = &["name", "label", "title", "text", "description"];

// Keys consumed by the node structure itself rather than kept as
// properties. `tag` is listed so a re-serialized canonical node
// canonicalizes to itself.
const STRUCTURAL_KEYS: &[&str] = &["role", "children", "properties", "tag"];

/// Reduces a raw captured tree to canonical form: volatile keys removed,
/// name synonyms collapsed, children deterministically sorted.
///
/// Accepts either a bare node object or a capture envelope carrying the
/// node under a `root` key. Returns `MalformedTree` when a node is not an
/// object, lacks a children list, or maps a non-string name.
pub fn canonicalize(raw: &Value) -> Result<Node, DriftError> {
    let node = match raw {
        Value::Object(map) if map.contains_key("root") => &map["root"],
        other => other,
    };
    canonicalize_node(node)
}

fn canonicalize_node(raw: &Value) -> Result<Node, DriftError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| DriftError::MalformedTree("node is not an object".into()))?;

    let role = match obj.get("role") {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(DriftError::MalformedTree("role is not a string".into())),
    };

    let name = canonical_name(obj)?;

    let children_raw = obj
        .get("children")
        .ok_or_else(|| DriftError::MalformedTree("node lacks a children list".into()))?
        .as_array()
        .ok_or_else(|| DriftError::MalformedTree("children is not a list".into()))?;

    let mut children = children_raw
        .iter()
        .map(canonicalize_node)
        .collect::<Result<Vec<_>, _>>()?;
    sort_children(&mut children);

    let mut properties = BTreeMap::new();
    if let Some(Value::Object(props)) = obj.get("properties") {
        for (key, value) in props {
            if !VOLATILE_KEYS.contains(&key.as_str()) {
                properties.insert(key.clone(), value.clone());
            }
        }
    }
    for (key, value) in obj {
        let key_str = key.as_str();
        if STRUCTURAL_KEYS.contains(&key_str)
            || VOLATILE_KEYS.contains(&key_str)
            || NAME_SYNONYMS.contains(&key_str)
        {
            continue;
        }
        properties.entry(key.clone()).or_insert_with(|| value.clone());
    }

    Ok(Node {
        role,
        name,
        tag: RoleTag::Unknown,
        properties,
        children,
    })
}

fn canonical_name(obj: &serde_json::Map<String, Value>) -> Result<String, DriftError> {
    for synonym in NAME_SYNONYMS {
        match obj.get(*synonym) {
            None => continue,
            Some(Value::String(s)) => {
                if !s.is_empty() {
                    return Ok(s.clone());
                }
            }
            Some(_) => {
                return Err(DriftError::MalformedTree(format!(
                    "name key '{synonym}' is not a string"
                )))
            }
        }
    }
    Ok(String::new())
}

/// Stable composite sort: role, then name, then serialized properties.
/// Two captures of the same screen with shuffled children canonicalize
/// identically because of this.
fn sort_children(children: &mut [Node]) {
    children.sort_by(|a, b| {
        (&a.role, &a.name)
            .cmp(&(&b.role, &b.name))
            .then_with(|| serialized_props(a).cmp(&serialized_props(b)))
    });
}

fn serialized_props(node: &Node) -> String {
    serde_json::to_string(&node.properties).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_volatile_and_maps_synonyms() {
        let raw = json!({
            "role": "button",
            "label": "Submit",
            "timestamp": 12345,
            "instance_id": "0xdead",
            "enabled": true,
            "children": []
        });
        let node = canonicalize(&raw).unwrap();
        assert_eq!(node.name, "Submit");
        assert_eq!(node.role, "button");
        assert!(node.properties.contains_key("enabled"));
        assert!(!node.properties.contains_key("timestamp"));
        assert!(!node.properties.contains_key("instance_id"));
    }

    #[test]
    fn first_non_empty_synonym_wins() {
        let raw = json!({
            "role": "text",
            "label": "",
            "title": "Welcome",
            "text": "ignored",
            "children": []
        });
        let node = canonicalize(&raw).unwrap();
        assert_eq!(node.name, "Welcome");
    }

    #[test]
    fn sorts_children_deterministically() {
        let shuffled = json!({
            "role": "window", "name": "main", "children": [
                {"role": "text", "name": "b", "children": []},
                {"role": "button", "name": "ok", "children": []},
                {"role": "text", "name": "a", "children": []}
            ]
        });
        let ordered = json!({
            "role": "window", "name": "main", "children": [
                {"role": "button", "name": "ok", "children": []},
                {"role": "text", "name": "a", "children": []},
                {"role": "text", "name": "b", "children": []}
            ]
        });
        assert_eq!(
            canonicalize(&shuffled).unwrap(),
            canonicalize(&ordered).unwrap()
        );
    }

    #[test]
    fn missing_children_is_malformed() {
        let raw = json!({"role": "button", "name": "ok"});
        assert!(matches!(
            canonicalize(&raw),
            Err(DriftError::MalformedTree(_))
        ));
    }

    #[test]
    fn non_string_name_is_malformed() {
        let raw = json!({"role": "button", "label": 42, "children": []});
        assert!(matches!(
            canonicalize(&raw),
            Err(DriftError::MalformedTree(_))
        ));
    }

    #[test]
    fn unwraps_capture_envelope() {
        let raw = json!({
            "timestamp": 999,
            "root": {"role": "window", "name": "main", "children": []}
        });
        let node = canonicalize(&raw).unwrap();
        assert_eq!(node.name, "main");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let raw = json!({
            "role": "window", "title": "main", "focused": true, "children": [
                {"role": "text", "name": "b", "visible": true, "children": []},
                {"role": "button", "label": "ok", "children": []}
            ]
        });
        let once = canonicalize(&raw).unwrap();
        let round = serde_json::to_value(&once).unwrap();
        let twice = canonicalize(&round).unwrap();
        assert_eq!(once, twice);
    }
}
