// SPDX-License-Identifier: MIT

//! Inbound entry point: fetch the catalog, then run the orchestrator

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::orchestrator::{CancellationSignal, MatchInput, MatchOrchestrator};
use super::outcome::{MatchOutcome, PhaseTimer, PHASE_FETCH};
use crate::catalog::AttributeCatalogSource;
use crate::config::EngineConfig;
use crate::error::RoutingError;
use crate::logic::{DynamicOperandBindings, QueryNode};

/// One routing decision request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMatchingMembersRequest {
    pub team_id: String,
    pub org_id: String,
    #[serde(default)]
    pub primary_query_value: Option<QueryNode>,
    #[serde(default)]
    pub fallback_query_value: Option<QueryNode>,
    #[serde(default)]
    pub dynamic_operands: Option<DynamicOperandBindings>,
    #[serde(default)]
    pub troubleshooter_enabled: Option<bool>,
}

impl FindMatchingMembersRequest {
    pub fn new(team_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            org_id: org_id.into(),
            ..Default::default()
        }
    }

    pub fn with_primary(mut self, tree: QueryNode) -> Self {
        self.primary_query_value = Some(tree);
        self
    }

    pub fn with_fallback(mut self, tree: QueryNode) -> Self {
        self.fallback_query_value = Some(tree);
        self
    }

    pub fn with_operands(mut self, operands: DynamicOperandBindings) -> Self {
        self.dynamic_operands = Some(operands);
        self
    }

    pub fn with_troubleshooter(mut self, enabled: bool) -> Self {
        self.troubleshooter_enabled = Some(enabled);
        self
    }
}

/// Routes bookings to team members by attribute logic
pub struct RoutingService {
    source: Arc<dyn AttributeCatalogSource>,
    orchestrator: MatchOrchestrator,
    fetch_timeout: Duration,
    troubleshooter_default: bool,
}

impl RoutingService {
    pub fn new(source: Arc<dyn AttributeCatalogSource>, config: &EngineConfig) -> Self {
        Self {
            source,
            orchestrator: MatchOrchestrator::from_config(config),
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
            troubleshooter_default: config.troubleshooter,
        }
    }

    pub async fn find_matching_members(
        &self,
        request: &FindMatchingMembersRequest,
    ) -> Result<MatchOutcome, RoutingError> {
        self.find_matching_members_with_cancel(request, &CancellationSignal::never())
            .await
    }

    pub async fn find_matching_members_with_cancel(
        &self,
        request: &FindMatchingMembersRequest,
        cancel: &CancellationSignal,
    ) -> Result<MatchOutcome, RoutingError> {
        log::debug!(
            "Finding matching members for team {} (org {})",
            request.team_id,
            request.org_id
        );

        let timer = PhaseTimer::start();
        let catalog = self.fetch(&request.team_id, &request.org_id).await?;
        let fetch_ms = timer.elapsed_ms();

        let operands = request.dynamic_operands.clone().unwrap_or_default();
        let input = MatchInput {
            primary: request.primary_query_value.as_ref(),
            fallback: request.fallback_query_value.as_ref(),
            operands: &operands,
            troubleshooter_enabled: request
                .troubleshooter_enabled
                .unwrap_or(self.troubleshooter_default),
        };

        let mut outcome = self
            .orchestrator
            .run(Arc::new(catalog), input, cancel)
            .await?;
        outcome.time_taken.insert(PHASE_FETCH, fetch_ms);
        Ok(outcome)
    }

    /// Fetch the catalog; every failure is reported as unavailable data
    async fn fetch(
        &self,
        team_id: &str,
        org_id: &str,
    ) -> Result<crate::catalog::AttributeCatalog, RoutingError> {
        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.source.fetch_attributes_and_assignments(team_id, org_id),
        )
        .await;

        let catalog = match fetched {
            Err(_) => {
                log::warn!("Attribute fetch for team {} timed out", team_id);
                return Err(RoutingError::data_unavailable(
                    team_id,
                    org_id,
                    format!("fetch timed out after {}ms", self.fetch_timeout.as_millis()),
                ));
            }
            Ok(Err(err @ RoutingError::DataUnavailable { .. })) => return Err(err),
            Ok(Err(err)) => {
                return Err(RoutingError::data_unavailable(team_id, org_id, err.to_string()))
            }
            Ok(Ok(catalog)) => catalog,
        };

        if catalog.team_id != team_id || catalog.org_id != org_id {
            return Err(RoutingError::data_unavailable(
                team_id,
                org_id,
                format!(
                    "catalog returned for team {} (org {})",
                    catalog.team_id, catalog.org_id
                ),
            ));
        }

        log::debug!(
            "Fetched {} attributes and {} members for team {}",
            catalog.attributes.len(),
            catalog.members.len(),
            team_id
        );
        Ok(catalog)
    }
}
