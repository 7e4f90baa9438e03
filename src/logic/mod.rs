// SPDX-License-Identifier: MIT

//! Attribute logic: query trees, operand resolution, validation and evaluation
//!
//! A query tree is a nested AND/OR structure of rules such as:
//! - `dept EQUALS sales`
//! - `languages ANY_IN [en, de]`
//! - `dept EQUALS {field:department}` (value taken from the booking form)

mod ast;
mod evaluator;
mod operand;
mod resolver;
mod validator;

pub use ast::{Combinator, LogicNode, Operator, QueryNode, ResolvedQueryNode, Rule};
pub use evaluator::{AttributeLogicEvaluator, EvaluationContext, Evaluator, MatchAllEvaluator};
pub use operand::{
    DynamicOperandBindings, DynamicRef, Operand, OperandValue, ResolvedOperand, Scalar,
};
pub use resolver::{OperandResolver, Resolution, FORM_FIELD_SOURCE};
pub use validator::{allowed_operators, validate, Validation};
