use crate::digest::Digest;
use crate::tree::{Node, RoleTag};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Content-addressed identity of a filtered canonical tree: three BLAKE3
/// digests plus the shape metadata the matcher scores against.
///
/// Determinism invariant: equal filtered trees produce equal fingerprints,
/// bit for bit, across all fields. Serialization goes through serde_json
/// with BTreeMap-backed objects, so field and key order is fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub full: Digest,
    pub structural: Digest,
    pub content: Digest,
    pub node_count: u32,
    pub max_depth: u32,
    pub role_histogram: BTreeMap<RoleTag, u32>,
}

/// Fingerprints a filtered canonical tree. `None` is the empty tree (a
/// root that was itself filtered as noise) and hashes the empty byte
/// string everywhere.
pub fn fingerprint(root: Option<&Node>) -> Fingerprint {
    let Some(root) = root else {
        let empty = Digest::blake3(b"");
        return Fingerprint {
            full: empty,
            structural: empty,
            content: empty,
            node_count: 0,
            max_depth: 0,
            role_histogram: BTreeMap::new(),
        };
    };

    let full_bytes =
        serde_json::to_vec(&full_view(root)).expect("canonical tree serializes infallibly");
    let structural_bytes =
        serde_json::to_vec(&structural_view(root)).expect("canonical tree serializes infallibly");

    let mut content = Vec::new();
    collect_content(root, &mut content);
    let content_bytes = content.join("|").into_bytes();

    let mut histogram = BTreeMap::new();
    count_roles(root, &mut histogram);

    Fingerprint {
        full: Digest::blake3(&full_bytes),
        structural: Digest::blake3(&structural_bytes),
        content: Digest::blake3(&content_bytes),
        node_count: root.count(),
        max_depth: root.depth(),
        role_histogram: histogram,
    }
}

/// Everything that survives canonicalization participates in the full
/// digest.
fn full_view(node: &Node) -> Value {
    json!({
        "role": node.role,
        "name": node.name,
        "properties": node.properties,
        "children": node.children.iter().map(full_view).collect::<Vec<_>>(),
    })
}

/// Shape and roles only: content blanked so pure text changes do not
/// move this digest.
fn structural_view(node: &Node) -> Value {
    json!({
        "role": node.role,
        "tag": node.tag,
        "children": node.children.iter().map(structural_view).collect::<Vec<_>>(),
    })
}

/// Depth-first sequence of display content: node names plus any `value`
/// property, structure ignored.
fn collect_content(node: &Node, out: &mut Vec<String>) {
    if !node.name.is_empty() {
        out.push(node.name.clone());
    }
    if let Some(value) = node.properties.get("value") {
        match value {
            Value::String(s) => out.push(s.clone()),
            other => out.push(other.to_string()),
        }
    }
    for child in &node.children {
        collect_content(child, out);
    }
}

fn count_roles(node: &Node, histogram: &mut BTreeMap<RoleTag, u32>) {
    *histogram.entry(node.tag).or_insert(0) += 1;
    for child in &node.children {
        count_roles(child, histogram);
    }
}
