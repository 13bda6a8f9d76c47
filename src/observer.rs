use crate::baseline::BaselineSet;
use crate::canonical::canonicalize;
use crate::chain::{EntryStore, ImmutableLog, LogEntry, LogPayload, ObservationRecord};
use crate::classify::annotate;
use crate::diff::diff;
use crate::drift::{DriftEvent, DriftKind};
use crate::error::DriftError;
use crate::filter::filter;
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::matcher::{best_match, MatchResult};
use crate::transition::{TransitionChecker, UNKNOWN_STATE};
use crate::tree::{Capture, Node, Tree};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// How many individual changes ride along as evidence on a drift event.
const EVIDENCE_CHANGE_LIMIT: usize = 10;

/// What one observation produced: the match, the fingerprint, any drift
/// events, and the chain entries that recorded all of it.
#[derive(Debug)]
pub struct Observation {
    pub matched: MatchResult,
    pub fingerprint: Fingerprint,
    pub events: Vec<DriftEvent>,
    pub entries: Vec<LogEntry>,
}

/// The previously observed screen, retained with its capture metadata
/// for audit and for diffing a revisit against it.
struct LastScreen {
    state: String,
    tree: Option<Tree>,
    fingerprint: Fingerprint,
}

/// Orchestrates the deterministic pipeline over a stream of snapshots:
/// canonicalize, classify, filter, fingerprint, match, diff on change,
/// check the transition, and record everything in the chained log.
///
/// The observer is the single writer of its log; callers share it behind
/// a mutex. A malformed snapshot is rejected at this boundary and leaves
/// both the chain and the transition history untouched.
pub struct Observer<S: EntryStore> {
    baselines: BaselineSet,
    threshold: f64,
    transitions: TransitionChecker,
    last: Option<LastScreen>,
    log: ImmutableLog<S>,
}

impl<S: EntryStore> Observer<S> {
    pub fn new(baselines: BaselineSet, threshold: f64, log: ImmutableLog<S>) -> Self {
        Self {
            baselines,
            threshold,
            transitions: TransitionChecker::new(),
            last: None,
            log,
        }
    }

    pub fn log(&self) -> &ImmutableLog<S> {
        &self.log
    }

    pub fn baselines(&self) -> &BaselineSet {
        &self.baselines
    }

    /// Runs the full pipeline over one raw snapshot.
    pub fn observe(&mut self, raw: &Value, source: &str) -> Result<Observation, DriftError> {
        let captured_at = chrono::Utc::now().timestamp();

        let canonical = annotate(canonicalize(raw)?);
        let filtered = filter(canonical);
        let fp = fingerprint(filtered.as_ref());
        let names: BTreeSet<String> = filtered.as_ref().map(Node::names).unwrap_or_default();

        let matched = best_match(&names, &fp, &self.baselines, self.threshold);
        let state = matched
            .baseline_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_STATE.to_string());

        let mut events = Vec::new();

        if matched.baseline_id.is_none() {
            events.push(DriftEvent::unmatched_screen(matched.score));
        }

        match &self.last {
            Some(last) if last.state == state => {
                // Same screen as before: any fingerprint movement is
                // layout or content drift against our own history.
                if state != UNKNOWN_STATE && fp.full != last.fingerprint.full {
                    if let (Some(before), Some(after)) = (&last.tree, &filtered) {
                        let (changes, similarity) = diff(&before.root, after);
                        let kind = if fp.structural != last.fingerprint.structural {
                            DriftKind::Layout
                        } else {
                            DriftKind::Content
                        };
                        let sample = json!(changes
                            .iter()
                            .take(EVIDENCE_CHANGE_LIMIT)
                            .collect::<Vec<_>>());
                        events.push(DriftEvent::screen_changed(
                            kind,
                            &state,
                            similarity,
                            changes.len(),
                            sample,
                        ));
                    }
                }
            }
            Some(last) => {
                // Screen change: validate the observed transition.
                let from = last.state.clone();
                let report = self.transitions.record(&from, &state, &self.baselines);
                events.extend(report.events);
            }
            None => {}
        }

        let record = ObservationRecord {
            screen_id: matched.baseline_id.clone(),
            score: matched.score,
            fingerprint: fp.clone(),
            source: source.to_string(),
            captured_at,
        };

        let mut entries = Vec::with_capacity(1 + events.len());
        entries.push(self.log.append(LogPayload::Observation(record))?);
        for event in &events {
            entries.push(self.log.append(LogPayload::Drift(event.clone()))?);
        }

        self.last = Some(LastScreen {
            state,
            tree: filtered.map(|root| Tree {
                root,
                capture: Capture {
                    captured_at,
                    source: source.to_string(),
                },
            }),
            fingerprint: fp.clone(),
        });

        Ok(Observation {
            matched,
            fingerprint: fp,
            events,
            entries,
        })
    }
}
