// SPDX-License-Identifier: MIT

//! Syntax tree for attribute logic
//!
//! The external JSON shape is
//! `{"combinator": "AND", "rules": [<rule or nested group>, ...]}` where a
//! rule is `{"attributeId": .., "operator": .., "value": ..}`.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;

use super::operand::{Operand, ResolvedOperand};
use crate::catalog::AttributeId;

/// A query tree as authored, possibly containing dynamic references
pub type QueryNode = LogicNode<Operand>;

/// A query tree whose dynamic references have been resolved
pub type ResolvedQueryNode = LogicNode<ResolvedOperand>;

/// How a group combines its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    And,
    Or,
}

/// Rule operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    AnyIn,
    NoneIn,
    AllIn,
    IsEmpty,
    IsNotEmpty,
    Contains,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
}

impl Operator {
    /// IS_EMPTY and IS_NOT_EMPTY ignore the operand
    pub fn takes_operand(&self) -> bool {
        !matches!(self, Operator::IsEmpty | Operator::IsNotEmpty)
    }

    /// Operators that only apply to single-valued numeric attributes
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Operator::GreaterThan
                | Operator::GreaterThanOrEqual
                | Operator::LessThan
                | Operator::LessThanOrEqual
                | Operator::Between
        )
    }

    /// Operators whose operand is a set of values
    pub fn takes_set(&self) -> bool {
        matches!(
            self,
            Operator::AnyIn | Operator::NoneIn | Operator::AllIn | Operator::Between
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Equals => "EQUALS",
            Operator::NotEquals => "NOT_EQUALS",
            Operator::AnyIn => "ANY_IN",
            Operator::NoneIn => "NONE_IN",
            Operator::AllIn => "ALL_IN",
            Operator::IsEmpty => "IS_EMPTY",
            Operator::IsNotEmpty => "IS_NOT_EMPTY",
            Operator::Contains => "CONTAINS",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            Operator::LessThan => "LESS_THAN",
            Operator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Operator::Between => "BETWEEN",
        };
        write!(f, "{}", name)
    }
}

/// A leaf rule comparing one attribute against an operand
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule<O> {
    pub attribute_id: AttributeId,
    pub operator: Operator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<O>,
}

/// A node of the logic tree
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LogicNode<O> {
    /// AND/OR group over child nodes
    Group {
        combinator: Combinator,
        #[serde(default = "Vec::new")]
        rules: Vec<LogicNode<O>>,
    },
    /// Leaf rule
    Rule(Rule<O>),
}

impl<O> LogicNode<O> {
    pub fn and(rules: Vec<LogicNode<O>>) -> Self {
        LogicNode::Group {
            combinator: Combinator::And,
            rules,
        }
    }

    pub fn or(rules: Vec<LogicNode<O>>) -> Self {
        LogicNode::Group {
            combinator: Combinator::Or,
            rules,
        }
    }

    pub fn rule(attribute_id: impl Into<String>, operator: Operator, value: Option<O>) -> Self {
        LogicNode::Rule(Rule {
            attribute_id: attribute_id.into(),
            operator,
            value,
        })
    }

    /// Number of leaf rules anywhere in the tree
    pub fn rule_count(&self) -> usize {
        match self {
            LogicNode::Rule(_) => 1,
            LogicNode::Group { rules, .. } => rules.iter().map(|r| r.rule_count()).sum(),
        }
    }

    /// A tree with no rules at all (e.g. an empty root group)
    pub fn is_empty_query(&self) -> bool {
        self.rule_count() == 0
    }

    /// Leaf rules in document order
    pub fn rules(&self) -> Vec<&Rule<O>> {
        let mut out = Vec::new();
        self.collect_rules(&mut out);
        out
    }

    fn collect_rules<'a>(&'a self, out: &mut Vec<&'a Rule<O>>) {
        match self {
            LogicNode::Rule(rule) => out.push(rule),
            LogicNode::Group { rules, .. } => {
                for node in rules {
                    node.collect_rules(out);
                }
            }
        }
    }

    /// Rebuild the tree rule by rule, keeping its shape
    pub fn try_map_rules<P, E, F>(self, f: &mut F) -> Result<LogicNode<P>, E>
    where
        F: FnMut(Rule<O>) -> Result<Rule<P>, E>,
    {
        match self {
            LogicNode::Rule(rule) => Ok(LogicNode::Rule(f(rule)?)),
            LogicNode::Group { combinator, rules } => {
                let mut mapped = Vec::with_capacity(rules.len());
                for node in rules {
                    mapped.push(node.try_map_rules(f)?);
                }
                Ok(LogicNode::Group {
                    combinator,
                    rules: mapped,
                })
            }
        }
    }

    /// Rebuild the tree operand by operand
    pub fn try_map_operands<P, E, F>(self, f: &mut F) -> Result<LogicNode<P>, E>
    where
        F: FnMut(O) -> Result<P, E>,
    {
        self.try_map_rules(&mut |rule: Rule<O>| {
            Ok(Rule {
                attribute_id: rule.attribute_id,
                operator: rule.operator,
                value: rule.value.map(&mut *f).transpose()?,
            })
        })
    }

    pub fn map_operands<P, F>(self, mut f: F) -> LogicNode<P>
    where
        F: FnMut(O) -> P,
    {
        match self.try_map_operands(&mut |o| Ok::<P, Infallible>(f(o))) {
            Ok(node) => node,
            Err(never) => match never {},
        }
    }
}
