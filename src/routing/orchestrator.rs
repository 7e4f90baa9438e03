// SPDX-License-Identifier: MIT

//! Match orchestrator: primary-then-fallback evaluation across all members

use futures::future::join_all;
use serde_json::json;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use super::outcome::{
    MatchOutcome, PhaseTimer, PhaseTimings, PHASE_FALLBACK, PHASE_PRIMARY, PHASE_RESOLVE,
};
use super::troubleshooter::{Troubleshooter, TroubleshooterCase};
use crate::catalog::{AttributeCatalog, MemberId};
use crate::config::EngineConfig;
use crate::error::RoutingError;
use crate::logic::{
    self, AttributeLogicEvaluator, DynamicOperandBindings, EvaluationContext, Evaluator,
    OperandResolver, QueryNode, ResolvedQueryNode,
};

pub const NO_LOGIC_WARNING: &str = "no attribute logic configured";
pub const CANCELED_WARNING: &str = "evaluation canceled before all members were checked";

/// Caller-side handle that cancels a routing call
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation signal observed by the orchestrator
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn channel() -> (CancelHandle, CancellationSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancellationSignal { rx })
    }

    /// A signal that is never raised
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Inputs of one orchestration run
pub struct MatchInput<'a> {
    pub primary: Option<&'a QueryNode>,
    pub fallback: Option<&'a QueryNode>,
    pub operands: &'a DynamicOperandBindings,
    pub troubleshooter_enabled: bool,
}

/// A resolved and validated tree, ready to be shared by workers
struct PreparedTree {
    tree: Arc<ResolvedQueryNode>,
    warnings: Vec<String>,
}

/// Matches and evaluation state collected by one worker or one phase
#[derive(Default)]
struct PhaseResult {
    matched: BTreeSet<MemberId>,
    context: EvaluationContext,
    canceled: bool,
}

impl PhaseResult {
    fn absorb(&mut self, other: PhaseResult) {
        self.matched.extend(other.matched);
        self.context.merge(other.context);
        self.canceled |= other.canceled;
    }
}

/// Drives evaluation of all members through the primary and fallback trees
pub struct MatchOrchestrator {
    evaluator: Arc<dyn Evaluator>,
    resolver: OperandResolver,
    parallelism: usize,
    min_members_per_task: usize,
}

impl MatchOrchestrator {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        let defaults = EngineConfig::default();
        Self {
            evaluator,
            resolver: OperandResolver::default(),
            parallelism: defaults.parallelism,
            min_members_per_task: defaults.min_members_per_task,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            evaluator: config.evaluator.build(),
            resolver: OperandResolver::new(config.operand_sources.iter().cloned()),
            parallelism: config.parallelism.max(1),
            min_members_per_task: config.min_members_per_task.max(1),
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize, min_members_per_task: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self.min_members_per_task = min_members_per_task.max(1);
        self
    }

    pub fn evaluator_name(&self) -> &str {
        self.evaluator.name()
    }

    /// Run the primary/fallback protocol over every member of the catalog
    pub async fn run(
        &self,
        catalog: Arc<AttributeCatalog>,
        input: MatchInput<'_>,
        cancel: &CancellationSignal,
    ) -> Result<MatchOutcome, RoutingError> {
        let call_id = Uuid::new_v4();
        let troubleshooter = Troubleshooter::new(input.troubleshooter_enabled);
        let mut timings = PhaseTimings::default();

        let primary = match input.primary {
            Some(tree) => tree,
            None => {
                let all = catalog.member_ids();
                log::info!(
                    "[{}] No attribute logic configured, routing to all {} members",
                    call_id,
                    all.len()
                );
                let troubleshooter = troubleshooter.record(TroubleshooterCase::NoLogicFound, || {
                    json!({ "callId": call_id.to_string(), "memberIds": &all })
                });
                return Ok(MatchOutcome {
                    matched_member_ids: all,
                    warnings: vec![NO_LOGIC_WARNING.to_string()],
                    time_taken: timings,
                    troubleshooter,
                    ..Default::default()
                });
            }
        };

        if primary.is_empty_query() {
            let all = catalog.member_ids();
            log::info!(
                "[{}] Attribute logic has no rules, routing to all {} members",
                call_id,
                all.len()
            );
            let troubleshooter = troubleshooter.record(
                TroubleshooterCase::MatchesAllMembersBecauseOfEmptyQueryValue,
                || json!({ "callId": call_id.to_string(), "memberIds": &all, "query": primary }),
            );
            return Ok(MatchOutcome {
                matched_member_ids: all,
                time_taken: timings,
                troubleshooter,
                ..Default::default()
            });
        }

        // Resolve and validate both trees before any member is evaluated
        let timer = PhaseTimer::start();
        let primary_plan = self.prepare(primary, &catalog, input.operands)?;
        let fallback_plan = input
            .fallback
            .map(|tree| self.prepare(tree, &catalog, input.operands))
            .transpose()?;
        timings.record(PHASE_RESOLVE, &timer);

        let mut warnings = primary_plan.warnings.clone();

        let timer = PhaseTimer::start();
        let primary_result = self
            .evaluate_members(&primary_plan.tree, &catalog, cancel)
            .await?;
        timings.record(PHASE_PRIMARY, &timer);
        log::info!(
            "[{}] Primary logic matched {} of {} members",
            call_id,
            primary_result.matched.len(),
            catalog.members.len()
        );

        let mut context = EvaluationContext::new();
        context.merge(primary_result.context.clone());

        let fallback_result = match &fallback_plan {
            Some(plan) if primary_result.matched.is_empty() && !primary_result.canceled => {
                warnings.extend(plan.warnings.iter().cloned());
                let timer = PhaseTimer::start();
                let result = self.evaluate_members(&plan.tree, &catalog, cancel).await?;
                timings.record(PHASE_FALLBACK, &timer);
                log::info!(
                    "[{}] Fallback logic matched {} of {} members",
                    call_id,
                    result.matched.len(),
                    catalog.members.len()
                );
                context.merge(result.context.clone());
                Some(result)
            }
            _ => None,
        };

        let checked_fallback = fallback_result.is_some();
        let canceled = primary_result.canceled
            || fallback_result.as_ref().is_some_and(|r| r.canceled);

        warnings.extend(context.warnings());
        if canceled {
            warnings.push(CANCELED_WARNING.to_string());
        }
        let warnings = dedupe(warnings);

        let (case, matched) = if canceled {
            log::warn!("[{}] Routing canceled", call_id);
            (TroubleshooterCase::EvaluationCanceled, BTreeSet::new())
        } else if let Some(result) = &fallback_result {
            (
                TroubleshooterCase::MatchResultsReadyWithFallback,
                result.matched.clone(),
            )
        } else {
            (
                TroubleshooterCase::MatchResultsReady,
                primary_result.matched.clone(),
            )
        };

        let troubleshooter = troubleshooter.record(case, || {
            json!({
                "callId": call_id.to_string(),
                "evaluator": self.evaluator.name(),
                "primary": {
                    "query": &*primary_plan.tree,
                    "matchedMemberIds": &primary_result.matched,
                },
                "fallback": fallback_plan.as_ref().map(|plan| json!({
                    "query": &*plan.tree,
                    "evaluated": checked_fallback,
                    "matchedMemberIds": fallback_result.as_ref().map(|r| &r.matched),
                })),
                "checkedFallback": checked_fallback,
                "rulesEvaluated": context.rules_evaluated(),
                "warnings": &warnings,
                "timeTaken": &timings,
            })
        });

        Ok(MatchOutcome {
            matched_member_ids: matched,
            checked_fallback,
            canceled,
            warnings,
            time_taken: timings,
            troubleshooter,
        })
    }

    fn prepare(
        &self,
        tree: &QueryNode,
        catalog: &AttributeCatalog,
        operands: &DynamicOperandBindings,
    ) -> Result<PreparedTree, RoutingError> {
        let resolution = self.resolver.resolve(tree, operands)?;
        let validation = logic::validate(resolution.tree, catalog)?;
        let mut warnings = resolution.warnings;
        warnings.extend(validation.warnings);
        Ok(PreparedTree {
            tree: Arc::new(validation.tree),
            warnings,
        })
    }

    fn chunk_size(&self, total: usize) -> usize {
        total
            .div_ceil(self.parallelism)
            .max(self.min_members_per_task)
            .max(1)
    }

    /// Evaluate every member against a tree, fanning out over tasks
    async fn evaluate_members(
        &self,
        tree: &Arc<ResolvedQueryNode>,
        catalog: &Arc<AttributeCatalog>,
        cancel: &CancellationSignal,
    ) -> Result<PhaseResult, RoutingError> {
        let total = catalog.members.len();
        let chunk_size = self.chunk_size(total);

        // A single chunk is at most `min_members_per_task` members or the
        // configured parallelism is 1; both stay on the calling task.
        if total <= chunk_size {
            return Ok(evaluate_range(
                self.evaluator.as_ref(),
                tree,
                catalog,
                0..total,
                cancel,
            ));
        }

        let mut result = PhaseResult::default();
        let mut handles = Vec::new();
        for start in (0..total).step_by(chunk_size) {
            if cancel.is_canceled() {
                result.canceled = true;
                break;
            }
            let end = (start + chunk_size).min(total);
            let evaluator = self.evaluator.clone();
            let tree = tree.clone();
            let catalog = catalog.clone();
            let cancel = cancel.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                evaluate_range(evaluator.as_ref(), &tree, &catalog, start..end, &cancel)
            }));
        }

        log::debug!(
            "Evaluating {} members in {} tasks of up to {}",
            total,
            handles.len(),
            chunk_size
        );

        for joined in join_all(handles).await {
            let partial = joined.map_err(|e| RoutingError::Evaluation(e.to_string()))?;
            result.absorb(partial);
        }

        Ok(result)
    }
}

impl Default for MatchOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(AttributeLogicEvaluator))
    }
}

fn evaluate_range(
    evaluator: &dyn Evaluator,
    tree: &ResolvedQueryNode,
    catalog: &AttributeCatalog,
    range: Range<usize>,
    cancel: &CancellationSignal,
) -> PhaseResult {
    let mut result = PhaseResult::default();
    for member in &catalog.members[range] {
        if cancel.is_canceled() {
            result.canceled = true;
            break;
        }
        if evaluator.evaluate(tree, &member.attributes, &mut result.context) {
            result.matched.insert(member.id.clone());
        }
    }
    result
}

/// Drop repeated warnings, keeping first occurrences in order
fn dedupe(warnings: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    warnings
        .into_iter()
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDefinition, AttributeOption, AttributeType, MemberAttributeValues, TeamMember};
    use crate::error::ConfigurationError;
    use crate::logic::{MatchAllEvaluator, Operand, Operator, OperandValue};
    use crate::routing::outcome::PHASE_FETCH;

    fn department_catalog() -> Arc<AttributeCatalog> {
        Arc::new(AttributeCatalog {
            team_id: "team".to_string(),
            org_id: "org".to_string(),
            attributes: vec![AttributeDefinition {
                id: "dept".to_string(),
                name: "Department".to_string(),
                value_type: AttributeType::SingleSelect,
                options: vec![
                    AttributeOption {
                        id: "sales".to_string(),
                        value: "Sales".to_string(),
                    },
                    AttributeOption {
                        id: "support".to_string(),
                        value: "Support".to_string(),
                    },
                ],
            }],
            members: vec![
                TeamMember::new("A", MemberAttributeValues::new().with("dept", &["sales"])),
                TeamMember::new("B", MemberAttributeValues::new().with("dept", &["support"])),
                TeamMember::new("C", MemberAttributeValues::new()),
            ],
        })
    }

    fn large_catalog(members: usize) -> Arc<AttributeCatalog> {
        let mut catalog = (*department_catalog()).clone();
        catalog.members = (0..members)
            .map(|i| {
                let dept = if i % 3 == 0 { "sales" } else { "support" };
                TeamMember::new(
                    format!("m{:04}", i),
                    MemberAttributeValues::new().with("dept", &[dept]),
                )
            })
            .collect();
        Arc::new(catalog)
    }

    fn ids(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn input<'a>(
        primary: Option<&'a QueryNode>,
        fallback: Option<&'a QueryNode>,
        operands: &'a DynamicOperandBindings,
    ) -> MatchInput<'a> {
        MatchInput {
            primary,
            fallback,
            operands,
            troubleshooter_enabled: true,
        }
    }

    fn case_of(outcome: &MatchOutcome) -> TroubleshooterCase {
        outcome.troubleshooter.as_ref().map(|t| t.case).unwrap()
    }

    #[tokio::test]
    async fn test_no_logic_matches_everyone() {
        let operands = DynamicOperandBindings::new();
        let outcome = MatchOrchestrator::default()
            .run(department_catalog(), input(None, None, &operands), &CancellationSignal::never())
            .await
            .unwrap();

        assert_eq!(outcome.matched_member_ids, ids(&["A", "B", "C"]));
        assert!(!outcome.checked_fallback);
        assert_eq!(outcome.warnings, vec![NO_LOGIC_WARNING.to_string()]);
        assert_eq!(case_of(&outcome), TroubleshooterCase::NoLogicFound);
    }

    #[tokio::test]
    async fn test_empty_group_matches_everyone() {
        let tree = QueryNode::and(vec![]);
        let operands = DynamicOperandBindings::new();
        let outcome = MatchOrchestrator::default()
            .run(department_catalog(), input(Some(&tree), None, &operands), &CancellationSignal::never())
            .await
            .unwrap();

        assert_eq!(outcome.matched_member_ids, ids(&["A", "B", "C"]));
        assert!(outcome.warnings.is_empty());
        assert_eq!(
            case_of(&outcome),
            TroubleshooterCase::MatchesAllMembersBecauseOfEmptyQueryValue
        );
    }

    #[tokio::test]
    async fn test_primary_match() {
        let tree = QueryNode::rule("dept", Operator::Equals, Some(Operand::text("Sales")));
        let operands = DynamicOperandBindings::new();
        let outcome = MatchOrchestrator::default()
            .run(department_catalog(), input(Some(&tree), None, &operands), &CancellationSignal::never())
            .await
            .unwrap();

        assert_eq!(outcome.matched_member_ids, ids(&["A"]));
        assert!(outcome.warnings.is_empty());
        assert!(!outcome.checked_fallback);
        assert_eq!(case_of(&outcome), TroubleshooterCase::MatchResultsReady);
        assert!(outcome.time_taken.get(PHASE_RESOLVE).is_some());
        assert!(outcome.time_taken.get(PHASE_PRIMARY).is_some());
        assert!(outcome.time_taken.get(PHASE_FALLBACK).is_none());
        assert!(outcome.time_taken.get(PHASE_FETCH).is_none());
    }

    #[tokio::test]
    async fn test_fallback_used_when_primary_empty() {
        let primary = QueryNode::and(vec![
            QueryNode::rule("dept", Operator::Equals, Some(Operand::text("sales"))),
            QueryNode::rule("dept", Operator::Equals, Some(Operand::text("support"))),
        ]);
        let fallback = QueryNode::rule("dept", Operator::NoneIn, Some(Operand::list(&["Sales"])));
        let operands = DynamicOperandBindings::new();
        let outcome = MatchOrchestrator::default()
            .run(
                department_catalog(),
                input(Some(&primary), Some(&fallback), &operands),
                &CancellationSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.matched_member_ids, ids(&["B", "C"]));
        assert!(outcome.checked_fallback);
        assert_eq!(case_of(&outcome), TroubleshooterCase::MatchResultsReadyWithFallback);
        assert!(outcome.time_taken.get(PHASE_FALLBACK).is_some());
    }

    #[tokio::test]
    async fn test_fallback_skipped_when_primary_matches() {
        let primary = QueryNode::rule("dept", Operator::Equals, Some(Operand::text("support")));
        let fallback = QueryNode::and(vec![]);
        let operands = DynamicOperandBindings::new();
        let outcome = MatchOrchestrator::default()
            .run(
                department_catalog(),
                input(Some(&primary), Some(&fallback), &operands),
                &CancellationSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.matched_member_ids, ids(&["B"]));
        assert!(!outcome.checked_fallback);
    }

    #[tokio::test]
    async fn test_no_catch_all_when_both_trees_miss() {
        let primary = QueryNode::rule("dept", Operator::Equals, Some(Operand::text("sales")));
        let fallback = QueryNode::rule("dept", Operator::IsEmpty, None);
        let catalog = {
            let mut catalog = (*department_catalog()).clone();
            catalog.members.retain(|m| m.id == "B");
            Arc::new(catalog)
        };
        let operands = DynamicOperandBindings::new();
        let outcome = MatchOrchestrator::default()
            .run(catalog, input(Some(&primary), Some(&fallback), &operands), &CancellationSignal::never())
            .await
            .unwrap();

        assert!(outcome.is_empty());
        assert!(outcome.checked_fallback);
        assert_eq!(case_of(&outcome), TroubleshooterCase::MatchResultsReadyWithFallback);
    }

    #[tokio::test]
    async fn test_configuration_error_aborts() {
        let primary = QueryNode::rule("region", Operator::Equals, Some(Operand::text("EU")));
        let operands = DynamicOperandBindings::new();
        let err = MatchOrchestrator::default()
            .run(department_catalog(), input(Some(&primary), None, &operands), &CancellationSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RoutingError::Configuration(ConfigurationError::UnknownAttribute(ref id)) if id == "region"
        ));
    }

    #[tokio::test]
    async fn test_invalid_fallback_aborts_even_if_primary_matches() {
        let primary = QueryNode::rule("dept", Operator::Equals, Some(Operand::text("sales")));
        let fallback = QueryNode::rule("dept", Operator::GreaterThan, Some(Operand::number(3.0)));
        let operands = DynamicOperandBindings::new();
        let err = MatchOrchestrator::default()
            .run(
                department_catalog(),
                input(Some(&primary), Some(&fallback), &operands),
                &CancellationSignal::never(),
            )
            .await
            .unwrap_err();

        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_unbound_dynamic_operand_warns() {
        let primary = QueryNode::rule("dept", Operator::Equals, Some(Operand::dynamic("field", "dept")));
        let fallback = QueryNode::rule("dept", Operator::Equals, Some(Operand::text("support")));
        let operands = DynamicOperandBindings::new();
        let outcome = MatchOrchestrator::default()
            .run(
                department_catalog(),
                input(Some(&primary), Some(&fallback), &operands),
                &CancellationSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.matched_member_ids, ids(&["B"]));
        assert!(outcome.checked_fallback);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("{field:dept}"));
    }

    #[tokio::test]
    async fn test_bound_dynamic_operand_matches() {
        let primary = QueryNode::rule("dept", Operator::Equals, Some(Operand::dynamic("field", "dept")));
        let operands =
            DynamicOperandBindings::new().with("field", "dept", OperandValue::from("Support"));
        let outcome = MatchOrchestrator::default()
            .run(department_catalog(), input(Some(&primary), None, &operands), &CancellationSignal::never())
            .await
            .unwrap();

        assert_eq!(outcome.matched_member_ids, ids(&["B"]));
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let catalog = large_catalog(1_000);
        let tree = QueryNode::or(vec![
            QueryNode::rule("dept", Operator::Equals, Some(Operand::text("sales"))),
            QueryNode::rule("dept", Operator::IsEmpty, None),
        ]);
        let operands = DynamicOperandBindings::new();

        let sequential = MatchOrchestrator::default()
            .with_parallelism(1, 10_000)
            .run(catalog.clone(), input(Some(&tree), None, &operands), &CancellationSignal::never())
            .await
            .unwrap();
        let parallel = MatchOrchestrator::default()
            .with_parallelism(8, 1)
            .run(catalog, input(Some(&tree), None, &operands), &CancellationSignal::never())
            .await
            .unwrap();

        assert_eq!(sequential.matched_member_ids.len(), 334);
        assert_eq!(sequential.matched_member_ids, parallel.matched_member_ids);

        let rules = |o: &MatchOutcome| o.troubleshooter.as_ref().unwrap().payload["rulesEvaluated"].clone();
        assert_eq!(rules(&sequential), rules(&parallel));
    }

    #[test]
    fn test_chunk_size() {
        let orchestrator = MatchOrchestrator::default().with_parallelism(4, 10);
        assert_eq!(orchestrator.chunk_size(0), 10);
        assert_eq!(orchestrator.chunk_size(20), 10);
        assert_eq!(orchestrator.chunk_size(100), 25);
    }

    #[tokio::test]
    async fn test_canceled_call_returns_empty() {
        let (handle, signal) = CancellationSignal::channel();
        handle.cancel();
        assert!(signal.is_canceled());

        let tree = QueryNode::rule("dept", Operator::Equals, Some(Operand::text("sales")));
        let fallback = QueryNode::and(vec![]);
        let operands = DynamicOperandBindings::new();
        let outcome = MatchOrchestrator::default()
            .with_parallelism(4, 1)
            .run(large_catalog(100), input(Some(&tree), Some(&fallback), &operands), &signal)
            .await
            .unwrap();

        assert!(outcome.canceled);
        assert!(outcome.is_empty());
        assert!(!outcome.checked_fallback);
        assert!(outcome.warnings.contains(&CANCELED_WARNING.to_string()));
        assert_eq!(case_of(&outcome), TroubleshooterCase::EvaluationCanceled);
    }

    #[tokio::test]
    async fn test_match_all_strategy() {
        let tree = QueryNode::rule("dept", Operator::Equals, Some(Operand::text("sales")));
        let operands = DynamicOperandBindings::new();
        let orchestrator = MatchOrchestrator::new(Arc::new(MatchAllEvaluator));
        let outcome = orchestrator
            .run(department_catalog(), input(Some(&tree), None, &operands), &CancellationSignal::never())
            .await
            .unwrap();

        assert_eq!(orchestrator.evaluator_name(), "match_all");
        assert_eq!(outcome.matched_member_ids, ids(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_troubleshooter_disabled() {
        let tree = QueryNode::rule("dept", Operator::Equals, Some(Operand::text("sales")));
        let operands = DynamicOperandBindings::new();
        let mut input = input(Some(&tree), None, &operands);
        input.troubleshooter_enabled = false;

        let outcome = MatchOrchestrator::default()
            .run(department_catalog(), input, &CancellationSignal::never())
            .await
            .unwrap();

        assert!(outcome.troubleshooter.is_none());
        assert_eq!(outcome.matched_member_ids, ids(&["A"]));
    }
}
