// SPDX-License-Identifier: MIT

//! Attribute logic evaluator

use std::collections::BTreeSet;

use super::ast::{Combinator, LogicNode, Operator, ResolvedQueryNode, Rule};
use super::operand::{ResolvedOperand, Scalar};
use crate::catalog::MemberAttributeValues;

/// Per-call evaluation state.
///
/// One context per worker; contexts are merged after the workers join.
#[derive(Debug, Default, Clone)]
pub struct EvaluationContext {
    rules_evaluated: usize,
    warned: BTreeSet<String>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaf rules evaluated so far (short-circuited rules are not counted)
    pub fn rules_evaluated(&self) -> usize {
        self.rules_evaluated
    }

    /// Record a warning; repeated warnings are kept once
    pub fn warn_once(&mut self, message: String) {
        if !self.warned.contains(&message) {
            log::debug!("{}", message);
            self.warned.insert(message);
        }
    }

    /// Warnings in sorted order
    pub fn warnings(&self) -> Vec<String> {
        self.warned.iter().cloned().collect()
    }

    pub fn merge(&mut self, other: EvaluationContext) {
        self.rules_evaluated += other.rules_evaluated;
        self.warned.extend(other.warned);
    }
}

/// Evaluation strategy: decides whether one member satisfies a tree
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        tree: &ResolvedQueryNode,
        values: &MemberAttributeValues,
        ctx: &mut EvaluationContext,
    ) -> bool;
}

/// Matches every member. Used when attribute logic is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchAllEvaluator;

impl Evaluator for MatchAllEvaluator {
    fn name(&self) -> &str {
        "match_all"
    }

    fn evaluate(
        &self,
        _tree: &ResolvedQueryNode,
        _values: &MemberAttributeValues,
        _ctx: &mut EvaluationContext,
    ) -> bool {
        true
    }
}

/// Interpreter for AND/OR trees of attribute rules
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeLogicEvaluator;

impl Evaluator for AttributeLogicEvaluator {
    fn name(&self) -> &str {
        "attribute_logic"
    }

    fn evaluate(
        &self,
        tree: &ResolvedQueryNode,
        values: &MemberAttributeValues,
        ctx: &mut EvaluationContext,
    ) -> bool {
        evaluate_node(tree, values, ctx)
    }
}

fn evaluate_node(
    node: &ResolvedQueryNode,
    values: &MemberAttributeValues,
    ctx: &mut EvaluationContext,
) -> bool {
    match node {
        // Empty AND is vacuously true, empty OR is false
        LogicNode::Group {
            combinator: Combinator::And,
            rules,
        } => rules.iter().all(|child| evaluate_node(child, values, ctx)),
        LogicNode::Group {
            combinator: Combinator::Or,
            rules,
        } => rules.iter().any(|child| evaluate_node(child, values, ctx)),
        LogicNode::Rule(rule) => {
            ctx.rules_evaluated += 1;
            evaluate_rule(rule, values.get(&rule.attribute_id), ctx)
        }
    }
}

fn evaluate_rule(
    rule: &Rule<ResolvedOperand>,
    member_values: &[String],
    ctx: &mut EvaluationContext,
) -> bool {
    let operand = rule
        .value
        .as_ref()
        .and_then(|o| o.value())
        .map(|v| v.scalars());

    match (rule.operator, operand) {
        (Operator::IsEmpty, _) => member_values.is_empty(),
        (Operator::IsNotEmpty, _) => !member_values.is_empty(),
        // Missing or unbound operand: the rule cannot match
        (_, None) => false,
        (Operator::Equals, Some(operand)) => {
            operand.len() == 1 && contains_value(member_values, &operand[0])
        }
        (Operator::NotEquals, Some(operand)) => {
            operand.len() == 1 && !contains_value(member_values, &operand[0])
        }
        (Operator::AnyIn, Some(operand)) => {
            operand.iter().any(|o| contains_value(member_values, o))
        }
        (Operator::NoneIn, Some(operand)) => {
            !operand.iter().any(|o| contains_value(member_values, o))
        }
        (Operator::AllIn, Some(operand)) => {
            !operand.is_empty() && operand.iter().all(|o| contains_value(member_values, o))
        }
        (Operator::Contains, Some([needle])) => {
            let needle = normalize(&needle.as_text());
            member_values.iter().any(|v| normalize(v).contains(&needle))
        }
        (Operator::Contains, Some(_)) => false,
        (Operator::GreaterThan, Some(operand)) => {
            compare_number(rule, member_values, operand, ctx, |a, b| a > b)
        }
        (Operator::GreaterThanOrEqual, Some(operand)) => {
            compare_number(rule, member_values, operand, ctx, |a, b| a >= b)
        }
        (Operator::LessThan, Some(operand)) => {
            compare_number(rule, member_values, operand, ctx, |a, b| a < b)
        }
        (Operator::LessThanOrEqual, Some(operand)) => {
            compare_number(rule, member_values, operand, ctx, |a, b| a <= b)
        }
        (Operator::Between, Some([low, high])) => match (low.as_number(), high.as_number()) {
            (Some(low), Some(high)) => member_number(rule, member_values, ctx)
                .map(|n| n >= low && n <= high)
                .unwrap_or(false),
            _ => false,
        },
        (Operator::Between, Some(_)) => false,
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Whether any member value equals the operand value
fn contains_value(member_values: &[String], operand: &Scalar) -> bool {
    match operand {
        Scalar::Integer(_) | Scalar::Number(_) => {
            let Some(n) = operand.as_number() else {
                return false;
            };
            member_values.iter().any(|v| {
                v.trim()
                    .parse::<f64>()
                    .map(|f| (f - n).abs() < f64::EPSILON)
                    .unwrap_or(false)
            })
        }
        Scalar::Text(s) => {
            let needle = normalize(s);
            member_values.iter().any(|v| normalize(v) == needle)
        }
    }
}

fn compare_number<F>(
    rule: &Rule<ResolvedOperand>,
    member_values: &[String],
    operand: &[Scalar],
    ctx: &mut EvaluationContext,
    cmp: F,
) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    let rhs = match operand {
        [single] => single.as_number(),
        _ => None,
    };
    match (member_number(rule, member_values, ctx), rhs) {
        (Some(lhs), Some(rhs)) => cmp(lhs, rhs),
        _ => false,
    }
}

/// The member's single numeric value, or a warning when there is none
fn member_number(
    rule: &Rule<ResolvedOperand>,
    member_values: &[String],
    ctx: &mut EvaluationContext,
) -> Option<f64> {
    let parsed = match member_values {
        [single] => single.trim().parse::<f64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        ctx.warn_once(format!(
            "members without a single numeric value for attribute '{}' did not match {}",
            rule.attribute_id, rule.operator
        ));
    }
    parsed
}
