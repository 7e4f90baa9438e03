// SPDX-License-Identifier: MIT

//! Troubleshooter: structured explanation of a routing decision
//!
//! Records are diagnostics only. They are written once, at the end of a
//! call, and never feed back into which members matched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Why an outcome occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TroubleshooterCase {
    /// No primary tree configured; every member matched
    NoLogicFound,
    /// Primary tree had no rules; every member matched
    MatchesAllMembersBecauseOfEmptyQueryValue,
    /// Result comes from the primary tree
    MatchResultsReady,
    /// Primary matched nobody; result comes from the fallback tree
    MatchResultsReadyWithFallback,
    /// The caller canceled the call before evaluation finished
    EvaluationCanceled,
}

impl fmt::Display for TroubleshooterCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TroubleshooterCase::NoLogicFound => "NO_LOGIC_FOUND",
            TroubleshooterCase::MatchesAllMembersBecauseOfEmptyQueryValue => {
                "MATCHES_ALL_MEMBERS_BECAUSE_OF_EMPTY_QUERY_VALUE"
            }
            TroubleshooterCase::MatchResultsReady => "MATCH_RESULTS_READY",
            TroubleshooterCase::MatchResultsReadyWithFallback => {
                "MATCH_RESULTS_READY_WITH_FALLBACK"
            }
            TroubleshooterCase::EvaluationCanceled => "EVALUATION_CANCELED",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TroubleshooterRecord {
    pub case: TroubleshooterCase,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Diagnostic sink for one call
#[derive(Debug, Clone, Copy)]
pub struct Troubleshooter {
    enabled: bool,
}

impl Troubleshooter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Build a record. When disabled the payload closure is never called.
    pub fn record<F>(&self, case: TroubleshooterCase, payload: F) -> Option<TroubleshooterRecord>
    where
        F: FnOnce() -> Value,
    {
        if !self.enabled {
            return None;
        }
        log::debug!("troubleshooter case: {}", case);
        Some(TroubleshooterRecord {
            case,
            payload: payload(),
            recorded_at: Utc::now(),
        })
    }
}
