// SPDX-License-Identifier: MIT

//! Match outcome and phase timing

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use super::troubleshooter::TroubleshooterRecord;
use crate::catalog::MemberId;

pub const PHASE_FETCH: &str = "fetch";
pub const PHASE_RESOLVE: &str = "resolve";
pub const PHASE_PRIMARY: &str = "primary";
pub const PHASE_FALLBACK: &str = "fallback";

/// Wall-clock timer for one phase
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimer {
    started: Instant,
}

impl PhaseTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Elapsed milliseconds, or `None` if the clock cannot be trusted
    pub fn elapsed_ms(&self) -> Option<f64> {
        Instant::now()
            .checked_duration_since(self.started)
            .map(|d| d.as_secs_f64() * 1000.0)
    }
}

/// Duration of each phase in milliseconds; `None` when unavailable
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct PhaseTimings(BTreeMap<String, Option<f64>>);

impl PhaseTimings {
    pub fn record(&mut self, phase: &str, timer: &PhaseTimer) {
        self.insert(phase, timer.elapsed_ms());
    }

    pub fn insert(&mut self, phase: &str, duration_ms: Option<f64>) {
        self.0.insert(phase.to_string(), duration_ms);
    }

    /// `None` if the phase did not run, `Some(None)` if it ran untimed
    pub fn get(&self, phase: &str) -> Option<Option<f64>> {
        self.0.get(phase).copied()
    }

    pub fn phases(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

/// Result of one routing call
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub matched_member_ids: BTreeSet<MemberId>,
    pub checked_fallback: bool,
    pub canceled: bool,
    pub warnings: Vec<String>,
    pub time_taken: PhaseTimings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub troubleshooter: Option<TroubleshooterRecord>,
}

impl MatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.matched_member_ids.is_empty()
    }

    pub fn matched(&self, member_id: &str) -> bool {
        self.matched_member_ids.contains(member_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timer_measures() {
        let timer = PhaseTimer::start();
        let elapsed = timer.elapsed_ms().unwrap();
        assert!(elapsed >= 0.0);
    }

    #[test]
    fn test_timings_distinguish_missing_and_untimed() {
        let mut timings = PhaseTimings::default();
        timings.insert(PHASE_PRIMARY, None);
        timings.insert(PHASE_RESOLVE, Some(1.5));

        assert_eq!(timings.get(PHASE_PRIMARY), Some(None));
        assert_eq!(timings.get(PHASE_RESOLVE), Some(Some(1.5)));
        assert_eq!(timings.get(PHASE_FALLBACK), None);
        assert_eq!(timings.phases().count(), 2);
    }

    #[test]
    fn test_outcome_serialize() {
        let mut outcome = MatchOutcome {
            matched_member_ids: ["bob", "alice"].iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        outcome.time_taken.insert(PHASE_PRIMARY, None);

        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "matchedMemberIds": ["alice", "bob"],
                "checkedFallback": false,
                "canceled": false,
                "warnings": [],
                "timeTaken": {"primary": null}
            })
        );
        assert!(outcome.matched("alice"));
        assert!(!outcome.is_empty());
    }
}
