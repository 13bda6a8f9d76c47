use crate::error::DriftError;
use crate::tree::RoleTag;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Expected shape metadata a baseline declares for its screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralRef {
    pub node_count: u32,
    pub max_depth: u32,
    #[serde(default)]
    pub role_histogram: BTreeMap<RoleTag, u32>,
}

/// A declared expected screen: identity, required node names, structural
/// reference and allowed successor screens. Immutable after load; the
/// loader/validator that produces these lives outside this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub id: String,
    #[serde(default)]
    pub required_nodes: BTreeSet<String>,
    pub structural: StructuralRef,
    /// Allowed next screen ids. Empty means unrestricted.
    #[serde(default)]
    pub allowed_next: BTreeSet<String>,
}

/// The active set of baselines, keyed by id. Ids are unique; `insert`
/// rejects duplicates rather than silently replacing.
#[derive(Debug, Clone, Default)]
pub struct BaselineSet {
    by_id: BTreeMap<String, Baseline>,
}

impl BaselineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, baseline: Baseline) -> Result<(), DriftError> {
        if self.by_id.contains_key(&baseline.id) {
            return Err(DriftError::DuplicateBaseline(baseline.id));
        }
        self.by_id.insert(baseline.id.clone(), baseline);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Baseline> {
        self.by_id.get(id)
    }

    /// Iterates in ascending id order, which the matcher's deterministic
    /// tie-break relies on.
    pub fn iter(&self) -> impl Iterator<Item = &Baseline> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Loads a set from a JSON array of baseline records. Thin glue over
    /// the external loader contract; only id uniqueness is enforced here.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, DriftError> {
        let records: Vec<Baseline> = serde_json::from_slice(bytes)?;
        let mut set = Self::new();
        for record in records {
            set.insert(record)?;
        }
        Ok(set)
    }
}
