use crate::baseline::BaselineSet;
use crate::drift::DriftEvent;
use std::collections::{BTreeSet, VecDeque};

/// Synthetic state for observations no baseline matched.
pub const UNKNOWN_STATE: &str = "unknown";

pub const DEFAULT_WINDOW: usize = 100;
pub const DEFAULT_LOOP_THRESHOLD: usize = 3;

/// Minimum departures observed from a state before the forced-flow rule
/// may fire; a single visit proves nothing about funneling.
const MIN_FLOW_SAMPLES: usize = 3;

/// Result of recording one transition.
#[derive(Debug, Clone)]
pub struct TransitionReport {
    pub from: String,
    pub to: String,
    pub allowed: bool,
    pub events: Vec<DriftEvent>,
}

/// Bounded state machine over matched screen identifiers.
///
/// Holds the last `window` transitions; oldest entries are silently
/// evicted, never corrected. Detects disallowed transitions, loops, and
/// forced flows within that window.
#[derive(Debug)]
pub struct TransitionChecker {
    window: usize,
    loop_threshold: usize,
    history: VecDeque<(String, String)>,
    current: Option<String>,
}

impl Default for TransitionChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionChecker {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_WINDOW, DEFAULT_LOOP_THRESHOLD)
    }

    pub fn with_limits(window: usize, loop_threshold: usize) -> Self {
        Self {
            window,
            loop_threshold,
            history: VecDeque::with_capacity(window),
            current: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn history(&self) -> impl Iterator<Item = &(String, String)> {
        self.history.iter()
    }

    /// Records an observed `(from, to)` transition and checks it against
    /// the baseline-declared graph. Appends to the bounded window; never
    /// mutates prior history.
    pub fn record(&mut self, from: &str, to: &str, baselines: &BaselineSet) -> TransitionReport {
        self.history.push_back((from.to_string(), to.to_string()));
        while self.history.len() > self.window {
            self.history.pop_front();
        }
        self.current = Some(to.to_string());

        let mut events = Vec::new();

        // Graph check. Unknown source states and baselines with an empty
        // allowed_next set are unrestricted.
        let mut allowed = true;
        if from != UNKNOWN_STATE {
            if let Some(baseline) = baselines.get(from) {
                if !baseline.allowed_next.is_empty() && !baseline.allowed_next.contains(to) {
                    allowed = false;
                    let expected: Vec<String> = baseline.allowed_next.iter().cloned().collect();
                    events.push(DriftEvent::invalid_transition(from, to, &expected));
                }
            }
        }

        // Loop check: fires exactly once, when the repeat count reaches
        // the threshold. Continued looping re-fires only at each full
        // multiple once eviction has brought the count back down.
        let repeats = self
            .history
            .iter()
            .filter(|(f, t)| f == from && t == to)
            .count();
        if repeats == self.loop_threshold {
            events.push(DriftEvent::transition_loop(from, to, repeats));
        }

        // Forced-flow check on the state just entered: enough departures
        // on record, all to a single successor, while the baseline
        // declares real alternatives.
        if let Some(event) = self.check_forced_flow(to, baselines) {
            events.push(event);
        }

        TransitionReport {
            from: from.to_string(),
            to: to.to_string(),
            allowed,
            events,
        }
    }

    fn check_forced_flow(&self, state: &str, baselines: &BaselineSet) -> Option<DriftEvent> {
        if state == UNKNOWN_STATE {
            return None;
        }
        let baseline = baselines.get(state)?;
        if baseline.allowed_next.len() < 2 {
            return None;
        }

        let departures: Vec<&(String, String)> =
            self.history.iter().filter(|(f, _)| f == state).collect();
        if departures.len() < MIN_FLOW_SAMPLES {
            return None;
        }

        let reachable: BTreeSet<&str> = departures.iter().map(|(_, t)| t.as_str()).collect();
        if reachable.len() >= 2 {
            return None;
        }

        let observed: Vec<String> = reachable.iter().map(|s| s.to_string()).collect();
        let allowed: Vec<String> = baseline.allowed_next.iter().cloned().collect();
        Some(DriftEvent::forced_flow(state, &observed, &allowed))
    }
}
