// SPDX-License-Identifier: MIT

//! Typed error handling for attribute routing
//!
//! Fatal conditions are modelled here. Recoverable conditions (a dynamic
//! operand without a value, a member without a numeric value) never become
//! errors; they surface as warnings on the `MatchOutcome`.

use thiserror::Error;

/// Top-level error type for attribute routing
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The query tree cannot be evaluated against the catalog
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The attribute catalog could not be fetched or is incomplete
    #[error("Attribute data unavailable for team {team_id} (org {org_id}): {message}")]
    DataUnavailable {
        team_id: String,
        org_id: String,
        message: String,
    },

    /// A member evaluation task failed to complete
    #[error("Evaluation task failed: {0}")]
    Evaluation(String),

    /// Engine configuration errors (bad config file, invalid env override)
    #[error("Engine configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Malformed query trees. Always detected before any member is evaluated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    /// Rule references an attribute the organization does not define
    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// Operator is not valid for the attribute's value type
    #[error("Operator {operator} is not allowed for {value_type} attribute '{attribute}'")]
    OperatorNotAllowed {
        attribute: String,
        operator: String,
        value_type: String,
    },

    /// Operand is missing or has the wrong shape for the operator
    #[error("Invalid operand for {operator} on attribute '{attribute}': {reason}")]
    InvalidOperand {
        attribute: String,
        operator: String,
        reason: String,
    },

    /// Static option literal is not one of the attribute's options
    #[error("Option '{option}' is not defined for attribute '{attribute}'")]
    UnknownOption { attribute: String, option: String },

    /// Dynamic operand names a source the resolver does not know
    #[error("Invalid operand reference '{{{source_name}:{field}}}': unknown source '{source_name}'")]
    InvalidOperandReference { source_name: String, field: String },
}

impl RoutingError {
    /// Create a data-unavailable error
    pub fn data_unavailable(
        team_id: impl Into<String>,
        org_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DataUnavailable {
            team_id: team_id.into(),
            org_id: org_id.into(),
            message: message.into(),
        }
    }

    /// Create an engine config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for errors caused by the query tree itself
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl ConfigurationError {
    pub fn invalid_operand(
        attribute: impl Into<String>,
        operator: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOperand {
            attribute: attribute.into(),
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_reference_message() {
        let err = ConfigurationError::InvalidOperandReference {
            source_name: "booker".to_string(),
            field: "email".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid operand reference '{booker:email}': unknown source 'booker'"
        );
    }

    #[test]
    fn test_configuration_converts_into_routing_error() {
        let err: RoutingError = ConfigurationError::UnknownAttribute("dept".to_string()).into();
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Configuration error: Unknown attribute 'dept'"
        );
    }

    #[test]
    fn test_data_unavailable_message() {
        let err = RoutingError::data_unavailable("team-1", "org-1", "connection refused");
        assert!(!err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Attribute data unavailable for team team-1 (org org-1): connection refused"
        );
    }
}
