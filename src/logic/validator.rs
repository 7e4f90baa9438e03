// SPDX-License-Identifier: MIT

//! Fail-closed validation of a resolved tree against the attribute catalog
//!
//! Also canonicalizes select operands: an option given by its label is
//! rewritten to its option id, so the evaluator only compares ids.

use super::ast::{Operator, ResolvedQueryNode, Rule};
use super::operand::{OperandValue, ResolvedOperand, Scalar};
use crate::catalog::{AttributeCatalog, AttributeDefinition, AttributeType};
use crate::error::ConfigurationError;

/// Operators accepted for each attribute type
pub fn allowed_operators(value_type: AttributeType) -> &'static [Operator] {
    use Operator::*;
    match value_type {
        AttributeType::Text => &[
            Equals, NotEquals, AnyIn, NoneIn, Contains, IsEmpty, IsNotEmpty,
        ],
        AttributeType::Number => &[
            Equals,
            NotEquals,
            GreaterThan,
            GreaterThanOrEqual,
            LessThan,
            LessThanOrEqual,
            Between,
            IsEmpty,
            IsNotEmpty,
        ],
        AttributeType::SingleSelect => &[Equals, NotEquals, AnyIn, NoneIn, IsEmpty, IsNotEmpty],
        AttributeType::MultiSelect => &[
            Equals, NotEquals, AnyIn, NoneIn, AllIn, IsEmpty, IsNotEmpty,
        ],
    }
}

/// A validated tree plus warnings about booking-time values it could not use
#[derive(Debug, Clone)]
pub struct Validation {
    pub tree: ResolvedQueryNode,
    pub warnings: Vec<String>,
}

/// Validate every rule and return the canonicalized tree.
///
/// Authored operands that do not fit their rule are configuration errors.
/// A bound dynamic value that does not fit becomes `Indeterminate` and yields
/// a warning, so the rule fails closed without aborting the call.
pub fn validate(
    tree: ResolvedQueryNode,
    catalog: &AttributeCatalog,
) -> Result<Validation, ConfigurationError> {
    let mut warnings = Vec::new();
    let tree = tree.try_map_rules(&mut |rule: Rule<ResolvedOperand>| {
        let attribute = catalog
            .attribute(&rule.attribute_id)
            .ok_or_else(|| ConfigurationError::UnknownAttribute(rule.attribute_id.clone()))?;
        validate_rule(rule, attribute, &mut warnings)
    })?;
    Ok(Validation { tree, warnings })
}

fn validate_rule(
    rule: Rule<ResolvedOperand>,
    attribute: &AttributeDefinition,
    warnings: &mut Vec<String>,
) -> Result<Rule<ResolvedOperand>, ConfigurationError> {
    let op = rule.operator;
    if !allowed_operators(attribute.value_type).contains(&op) {
        return Err(ConfigurationError::OperatorNotAllowed {
            attribute: attribute.id.clone(),
            operator: op.to_string(),
            value_type: attribute.value_type.to_string(),
        });
    }

    if !op.takes_operand() {
        return Ok(rule);
    }

    let operand = rule
        .value
        .ok_or_else(|| ConfigurationError::invalid_operand(&attribute.id, op, "operand is missing"))?;

    let operand = match operand {
        ResolvedOperand::Static(value) => {
            check_shape(op, &value, attribute)
                .map_err(|reason| ConfigurationError::invalid_operand(&attribute.id, op, reason))?;
            ResolvedOperand::Static(value)
        }
        ResolvedOperand::Bound { value, reference } => match check_shape(op, &value, attribute) {
            Ok(()) => ResolvedOperand::Bound { value, reference },
            Err(reason) => {
                let warning = format!(
                    "dynamic operand {} does not fit {} on attribute '{}': {}",
                    reference, op, attribute.id, reason
                );
                log::debug!("{}", warning);
                warnings.push(warning);
                ResolvedOperand::Indeterminate { reference }
            }
        },
        indeterminate => indeterminate,
    };

    let operand = if attribute.value_type == AttributeType::Number {
        coerce_numbers(operand)
    } else if attribute.value_type.has_options() {
        canonicalize_options(operand, attribute)?
    } else {
        operand
    };

    Ok(Rule {
        value: Some(operand),
        ..rule
    })
}

/// Why a value cannot be the operand of `op` on this attribute
fn check_shape(
    op: Operator,
    value: &OperandValue,
    attribute: &AttributeDefinition,
) -> Result<(), &'static str> {
    let scalars = value.scalars();

    if op == Operator::Between {
        if scalars.len() != 2 || scalars.iter().any(|s| s.as_number().is_none()) {
            return Err("expected two numeric bounds");
        }
        return Ok(());
    }

    if !op.takes_set() && scalars.len() != 1 {
        return Err("expected a single value");
    }

    let numeric = op.is_numeric() || attribute.value_type == AttributeType::Number;
    if numeric && scalars.iter().any(|s| s.as_number().is_none()) {
        return Err("expected a numeric value");
    }

    Ok(())
}

/// Numeric text on NUMBER attributes is compared as a number
fn coerce_numbers(operand: ResolvedOperand) -> ResolvedOperand {
    match operand {
        ResolvedOperand::Static(value) => ResolvedOperand::Static(map_value(value, Scalar::into_numeric)),
        ResolvedOperand::Bound { value, reference } => ResolvedOperand::Bound {
            value: map_value(value, Scalar::into_numeric),
            reference,
        },
        indeterminate => indeterminate,
    }
}

fn canonicalize_options(
    operand: ResolvedOperand,
    attribute: &AttributeDefinition,
) -> Result<ResolvedOperand, ConfigurationError> {
    match operand {
        ResolvedOperand::Static(value) => {
            let value = map_scalars(value, |scalar| {
                let text = scalar.as_text();
                attribute
                    .find_option(&text)
                    .map(|option| Scalar::Text(option.id.clone()))
                    .ok_or_else(|| ConfigurationError::UnknownOption {
                        attribute: attribute.id.clone(),
                        option: text.into_owned(),
                    })
            })?;
            Ok(ResolvedOperand::Static(value))
        }
        // Values supplied at booking time may not name an option; they stay
        // as given and simply fail to match.
        ResolvedOperand::Bound { value, reference } => {
            let value = map_scalars(value, |scalar| {
                let option_id = attribute
                    .find_option(&scalar.as_text())
                    .map(|option| option.id.clone());
                Ok(option_id.map(Scalar::Text).unwrap_or(scalar))
            })?;
            Ok(ResolvedOperand::Bound { value, reference })
        }
        indeterminate => Ok(indeterminate),
    }
}

fn map_scalars<F>(value: OperandValue, mut f: F) -> Result<OperandValue, ConfigurationError>
where
    F: FnMut(Scalar) -> Result<Scalar, ConfigurationError>,
{
    match value {
        OperandValue::Single(scalar) => Ok(OperandValue::Single(f(scalar)?)),
        OperandValue::List(items) => Ok(OperandValue::List(
            items.into_iter().map(f).collect::<Result<Vec<_>, _>>()?,
        )),
    }
}

fn map_value<F>(value: OperandValue, mut f: F) -> OperandValue
where
    F: FnMut(Scalar) -> Scalar,
{
    match value {
        OperandValue::Single(scalar) => OperandValue::Single(f(scalar)),
        OperandValue::List(items) => OperandValue::List(items.into_iter().map(f).collect()),
    }
}
