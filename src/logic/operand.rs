// SPDX-License-Identifier: MIT

//! Rule operands: literal values, dynamic references and their bindings

use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// A single literal value.
///
/// Integers and floats are kept apart so `3` serializes back as `3`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Text form used for comparisons against member values
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Scalar::Text(s) => Cow::Borrowed(s.as_str()),
            Scalar::Integer(n) => Cow::Owned(n.to_string()),
            Scalar::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Integer(n) => Some(*n as f64),
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Numeric text becomes a number; anything else is returned unchanged
    pub fn into_numeric(self) -> Scalar {
        match self {
            Scalar::Text(s) => {
                let trimmed = s.trim();
                if let Ok(n) = trimmed.parse::<i64>() {
                    Scalar::Integer(n)
                } else if let Some(n) = trimmed.parse::<f64>().ok().filter(|n| n.is_finite()) {
                    Scalar::Number(n)
                } else {
                    Scalar::Text(s)
                }
            }
            other => other,
        }
    }
}

/// A literal operand: one value or a set of values
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OperandValue {
    Single(Scalar),
    List(Vec<Scalar>),
}

impl OperandValue {
    /// The operand as a slice; a single value is a one-element set
    pub fn scalars(&self) -> &[Scalar] {
        match self {
            OperandValue::Single(s) => std::slice::from_ref(s),
            OperandValue::List(items) => items,
        }
    }

    /// Blank text and empty lists count as "not provided"
    pub fn is_blank(&self) -> bool {
        self.scalars().iter().all(|s| match s {
            Scalar::Text(t) => t.trim().is_empty(),
            Scalar::Integer(_) | Scalar::Number(_) => false,
        })
    }

    pub fn list<S: AsRef<str>>(items: &[S]) -> Self {
        OperandValue::List(
            items
                .iter()
                .map(|s| Scalar::Text(s.as_ref().to_string()))
                .collect(),
        )
    }
}

impl From<&str> for OperandValue {
    fn from(s: &str) -> Self {
        OperandValue::Single(Scalar::Text(s.to_string()))
    }
}

impl From<f64> for OperandValue {
    fn from(n: f64) -> Self {
        OperandValue::Single(Scalar::Number(n))
    }
}

impl From<i64> for OperandValue {
    fn from(n: i64) -> Self {
        OperandValue::Single(Scalar::Integer(n))
    }
}

/// Reference to a value supplied at evaluation time, written `{source:field}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DynamicRef {
    pub source: String,
    pub field: String,
}

impl DynamicRef {
    pub fn new(source: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            field: field.into(),
        }
    }

    /// Parse a `{source:field}` template. Anything else is a plain literal.
    pub fn parse(input: &str) -> Option<Self> {
        let inner = input.trim().strip_prefix('{')?.strip_suffix('}')?;
        let (source, field) = inner.split_once(':')?;
        let (source, field) = (source.trim(), field.trim());

        let is_ident = |s: &str| {
            !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        };
        if is_ident(source) && is_ident(field) {
            Some(Self::new(source, field))
        } else {
            None
        }
    }
}

impl fmt::Display for DynamicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}:{}}}", self.source, self.field)
    }
}

impl Serialize for DynamicRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Operand as authored in a query tree
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "OperandValue", into = "OperandValue")]
pub enum Operand {
    Literal(OperandValue),
    Dynamic(DynamicRef),
}

impl Operand {
    pub fn text(s: &str) -> Self {
        Operand::from(OperandValue::from(s))
    }

    pub fn number(n: f64) -> Self {
        Operand::Literal(OperandValue::from(n))
    }

    pub fn list<S: AsRef<str>>(items: &[S]) -> Self {
        Operand::Literal(OperandValue::list(items))
    }

    pub fn dynamic(source: &str, field: &str) -> Self {
        Operand::Dynamic(DynamicRef::new(source, field))
    }
}

impl From<OperandValue> for Operand {
    fn from(value: OperandValue) -> Self {
        if let OperandValue::Single(Scalar::Text(s)) = &value {
            if let Some(reference) = DynamicRef::parse(s) {
                return Operand::Dynamic(reference);
            }
        }
        Operand::Literal(value)
    }
}

impl From<Operand> for OperandValue {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Literal(value) => value,
            Operand::Dynamic(reference) => OperandValue::from(reference.to_string().as_str()),
        }
    }
}

/// Operand after dynamic references have been resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolvedOperand {
    /// Authored literal
    Static(OperandValue),
    /// Value bound to a dynamic reference
    Bound {
        value: OperandValue,
        reference: DynamicRef,
    },
    /// Dynamic reference with no bound value; the rule never matches
    Indeterminate { reference: DynamicRef },
}

impl ResolvedOperand {
    pub fn value(&self) -> Option<&OperandValue> {
        match self {
            ResolvedOperand::Static(value) | ResolvedOperand::Bound { value, .. } => Some(value),
            ResolvedOperand::Indeterminate { .. } => None,
        }
    }

    /// Undo resolution, recovering the authored operand
    pub fn into_operand(self) -> Operand {
        match self {
            ResolvedOperand::Static(value) => Operand::Literal(value),
            ResolvedOperand::Bound { reference, .. }
            | ResolvedOperand::Indeterminate { reference } => Operand::Dynamic(reference),
        }
    }
}

/// Values available to dynamic references, keyed by source then field
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DynamicOperandBindings {
    #[serde(flatten)]
    sources: HashMap<String, HashMap<String, OperandValue>>,
}

impl DynamicOperandBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: &str, field: &str, value: OperandValue) -> Self {
        self.sources
            .entry(source.to_string())
            .or_default()
            .insert(field.to_string(), value);
        self
    }

    /// Bound value for a reference; blank values count as unbound
    pub fn get(&self, reference: &DynamicRef) -> Option<&OperandValue> {
        self.sources
            .get(&reference.source)
            .and_then(|fields| fields.get(&reference.field))
            .filter(|value| !value.is_blank())
    }
}
