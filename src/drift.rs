use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftKind {
    Layout,
    Content,
    Sequence,
    Manipulative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A detected deviation from baseline expectations. Immutable once
/// constructed; the id is a digest of the event's own serialized content,
/// so identical evidence at the same instant dedups to the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEvent {
    pub id: Digest,
    pub kind: DriftKind,
    pub severity: Severity,
    pub timestamp: i64,
    pub evidence: BTreeMap<String, Value>,
}

impl DriftEvent {
    pub fn new(kind: DriftKind, severity: Severity, evidence: BTreeMap<String, Value>) -> Self {
        Self::at(kind, severity, evidence, chrono::Utc::now().timestamp())
    }

    pub fn at(
        kind: DriftKind,
        severity: Severity,
        evidence: BTreeMap<String, Value>,
        timestamp: i64,
    ) -> Self {
        let body = json!({
            "kind": kind,
            "severity": severity,
            "evidence": evidence,
            "timestamp": timestamp,
        });
        let id = Digest::sha256(&serde_json::to_vec(&body).expect("event body serializes"));
        Self {
            id,
            kind,
            severity,
            timestamp,
            evidence,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// No baseline scored at or above the threshold: the screen is not
    /// one we know. Always critical.
    pub fn unmatched_screen(score: f64) -> Self {
        let mut evidence = BTreeMap::new();
        evidence.insert("reason".into(), json!("no baseline matched"));
        evidence.insert("best_score".into(), json!(score));
        Self::new(DriftKind::Layout, Severity::Critical, evidence)
    }

    /// A matched screen whose shape or content moved since its previous
    /// observation. Severity scales with how far it moved.
    pub fn screen_changed(
        kind: DriftKind,
        screen_id: &str,
        similarity: f64,
        change_count: usize,
        sample: Value,
    ) -> Self {
        let severity = if similarity < 0.7 {
            Severity::Critical
        } else if similarity < 0.9 {
            Severity::Warning
        } else {
            Severity::Info
        };
        let mut evidence = BTreeMap::new();
        evidence.insert("screen_id".into(), json!(screen_id));
        evidence.insert("similarity".into(), json!(similarity));
        evidence.insert("change_count".into(), json!(change_count));
        evidence.insert("changes".into(), sample);
        Self::new(kind, severity, evidence)
    }

    pub fn invalid_transition(from: &str, to: &str, expected: &[String]) -> Self {
        let mut evidence = BTreeMap::new();
        evidence.insert("transition".into(), json!(format!("{from} -> {to}")));
        evidence.insert("expected".into(), json!(expected));
        Self::new(DriftKind::Sequence, Severity::Warning, evidence)
    }

    pub fn transition_loop(from: &str, to: &str, repeats: usize) -> Self {
        let mut evidence = BTreeMap::new();
        evidence.insert("transition".into(), json!(format!("{from} -> {to}")));
        evidence.insert("repeats".into(), json!(repeats));
        Self::new(DriftKind::Sequence, Severity::Info, evidence)
    }

    /// The baseline permits alternatives the observed history never
    /// exercises: a funneled path.
    pub fn forced_flow(state: &str, observed_next: &[String], allowed_next: &[String]) -> Self {
        let mut evidence = BTreeMap::new();
        evidence.insert("state".into(), json!(state));
        evidence.insert("observed_next".into(), json!(observed_next));
        evidence.insert("allowed_next".into(), json!(allowed_next));
        Self::new(DriftKind::Manipulative, Severity::Critical, evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_derives_from_content() {
        let mut evidence = BTreeMap::new();
        evidence.insert("k".to_string(), json!("v"));
        let a = DriftEvent::at(DriftKind::Layout, Severity::Info, evidence.clone(), 100);
        let b = DriftEvent::at(DriftKind::Layout, Severity::Info, evidence.clone(), 100);
        assert_eq!(a.id, b.id);

        let later = DriftEvent::at(DriftKind::Layout, Severity::Info, evidence.clone(), 101);
        assert_ne!(a.id, later.id);
        let other_kind = DriftEvent::at(DriftKind::Content, Severity::Info, evidence, 100);
        assert_ne!(a.id, other_kind.id);
    }

    #[test]
    fn severity_ladder_for_screen_changes() {
        let sample = json!([]);
        let critical =
            DriftEvent::screen_changed(DriftKind::Layout, "login", 0.5, 3, sample.clone());
        assert_eq!(critical.severity, Severity::Critical);
        let warning =
            DriftEvent::screen_changed(DriftKind::Layout, "login", 0.8, 2, sample.clone());
        assert_eq!(warning.severity, Severity::Warning);
        let info = DriftEvent::screen_changed(DriftKind::Content, "login", 0.95, 1, sample);
        assert_eq!(info.severity, Severity::Info);
    }

    #[test]
    fn round_trips_through_json() {
        let event = DriftEvent::unmatched_screen(0.42);
        let json = serde_json::to_string(&event).unwrap();
        let back: DriftEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
