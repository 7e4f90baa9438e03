// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Loaded from YAML, then overridden by `ROUTING_*` environment variables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::RoutingError;
use crate::logic::{AttributeLogicEvaluator, Evaluator, MatchAllEvaluator, FORM_FIELD_SOURCE};

/// Which evaluation strategy to run
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    /// Interpret the query tree (default)
    #[default]
    AttributeLogic,
    /// Route to every member regardless of the tree
    MatchAll,
}

impl EvaluatorKind {
    pub fn build(&self) -> Arc<dyn Evaluator> {
        match self {
            EvaluatorKind::AttributeLogic => Arc::new(AttributeLogicEvaluator),
            EvaluatorKind::MatchAll => Arc::new(MatchAllEvaluator),
        }
    }
}

impl std::str::FromStr for EvaluatorKind {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "attribute_logic" => Ok(EvaluatorKind::AttributeLogic),
            "match_all" => Ok(EvaluatorKind::MatchAll),
            other => Err(RoutingError::config(format!("unknown evaluator '{}'", other))),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of evaluation tasks per phase
    pub parallelism: usize,
    /// Members below this count per task are not split further
    pub min_members_per_task: usize,
    /// Evaluation strategy
    pub evaluator: EvaluatorKind,
    /// Sources dynamic operands may reference
    pub operand_sources: Vec<String>,
    /// Timeout for the attribute fetch, in milliseconds
    pub fetch_timeout_ms: u64,
    /// Troubleshooter default when a request does not say
    pub troubleshooter: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            min_members_per_task: 64,
            evaluator: EvaluatorKind::AttributeLogic,
            operand_sources: vec![FORM_FIELD_SOURCE.to_string()],
            fetch_timeout_ms: 5_000,
            troubleshooter: false,
        }
    }
}

impl EngineConfig {
    /// Load a config file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RoutingError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)?.with_env_overrides()
    }

    pub fn parse_yaml(content: &str) -> Result<Self, RoutingError> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.check()
    }

    pub fn with_env_overrides(self) -> Result<Self, RoutingError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `ROUTING_PARALLELISM`, `ROUTING_EVALUATOR` and
    /// `ROUTING_FETCH_TIMEOUT_MS` from the given lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, RoutingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ROUTING_PARALLELISM") {
            self.parallelism = parse_number("ROUTING_PARALLELISM", &value)?;
        }
        if let Some(value) = lookup("ROUTING_EVALUATOR") {
            self.evaluator = value.parse()?;
        }
        if let Some(value) = lookup("ROUTING_FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = parse_number("ROUTING_FETCH_TIMEOUT_MS", &value)?;
        }
        self.check()
    }

    fn check(self) -> Result<Self, RoutingError> {
        if self.parallelism == 0 {
            return Err(RoutingError::config("parallelism must be at least 1"));
        }
        if self.min_members_per_task == 0 {
            return Err(RoutingError::config("min_members_per_task must be at least 1"));
        }
        Ok(self)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, RoutingError> {
    value
        .trim()
        .parse()
        .map_err(|_| RoutingError::config(format!("{} must be a number, got '{}'", key, value)))
}
