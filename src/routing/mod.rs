// SPDX-License-Identifier: MIT

//! Routing: match orchestration, outcomes and diagnostics

mod orchestrator;
mod outcome;
mod service;
mod troubleshooter;

pub use orchestrator::{
    CancelHandle, CancellationSignal, MatchInput, MatchOrchestrator, CANCELED_WARNING,
    NO_LOGIC_WARNING,
};
pub use outcome::{
    MatchOutcome, PhaseTimer, PhaseTimings, PHASE_FALLBACK, PHASE_FETCH, PHASE_PRIMARY,
    PHASE_RESOLVE,
};
pub use service::{FindMatchingMembersRequest, RoutingService};
pub use troubleshooter::{Troubleshooter, TroubleshooterCase, TroubleshooterRecord};
