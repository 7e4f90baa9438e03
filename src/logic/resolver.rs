// SPDX-License-Identifier: MIT

//! Dynamic operand resolution
//!
//! Replaces every `{source:field}` reference in a query tree with the value
//! bound for it. Runs once per tree, before any member is evaluated.

use std::collections::BTreeSet;

use super::ast::{QueryNode, ResolvedQueryNode};
use super::operand::{DynamicOperandBindings, DynamicRef, Operand, ResolvedOperand};
use crate::error::ConfigurationError;

/// Source of routing form responses
pub const FORM_FIELD_SOURCE: &str = "field";

/// A resolved tree plus the warnings produced while resolving it
#[derive(Debug, Clone)]
pub struct Resolution {
    pub tree: ResolvedQueryNode,
    pub warnings: Vec<String>,
}

/// Resolves dynamic references against the sources it knows about
#[derive(Debug, Clone)]
pub struct OperandResolver {
    known_sources: BTreeSet<String>,
}

impl OperandResolver {
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    pub fn knows(&self, source: &str) -> bool {
        self.known_sources.contains(source)
    }

    /// Resolve a tree.
    ///
    /// A reference to an unknown source is a configuration error. A known
    /// reference without a value becomes `Indeterminate` and yields one warning.
    pub fn resolve(
        &self,
        tree: &QueryNode,
        bindings: &DynamicOperandBindings,
    ) -> Result<Resolution, ConfigurationError> {
        let mut unbound: Vec<DynamicRef> = Vec::new();

        let resolved = tree.clone().try_map_operands(&mut |operand| match operand {
            Operand::Literal(value) => Ok(ResolvedOperand::Static(value)),
            Operand::Dynamic(reference) => {
                if !self.knows(&reference.source) {
                    return Err(ConfigurationError::InvalidOperandReference {
                        source_name: reference.source,
                        field: reference.field,
                    });
                }
                match bindings.get(&reference) {
                    Some(value) => Ok(ResolvedOperand::Bound {
                        value: value.clone(),
                        reference,
                    }),
                    None => {
                        if !unbound.contains(&reference) {
                            unbound.push(reference.clone());
                        }
                        Ok(ResolvedOperand::Indeterminate { reference })
                    }
                }
            }
        })?;

        let warnings = unbound
            .iter()
            .map(|r| format!("dynamic operand {} has no bound value", r))
            .collect();

        Ok(Resolution {
            tree: resolved,
            warnings,
        })
    }
}

impl Default for OperandResolver {
    fn default() -> Self {
        Self::new([FORM_FIELD_SOURCE])
    }
}
