// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AttributeCatalog, AttributeCatalogSource};
use crate::error::RoutingError;

/// In-memory catalog source keyed by (team, org)
#[derive(Clone)]
pub struct InMemoryCatalogStore {
    catalogs: Arc<RwLock<HashMap<(String, String), AttributeCatalog>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self {
            catalogs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, catalog: AttributeCatalog) {
        let mut catalogs = self.catalogs.write().await;
        catalogs.insert((catalog.team_id.clone(), catalog.org_id.clone()), catalog);
    }

    pub async fn get(&self, team_id: &str, org_id: &str) -> Option<AttributeCatalog> {
        let catalogs = self.catalogs.read().await;
        catalogs
            .get(&(team_id.to_string(), org_id.to_string()))
            .cloned()
    }
}

impl Default for InMemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttributeCatalogSource for InMemoryCatalogStore {
    async fn fetch_attributes_and_assignments(
        &self,
        team_id: &str,
        org_id: &str,
    ) -> Result<AttributeCatalog, RoutingError> {
        self.get(team_id, org_id).await.ok_or_else(|| {
            RoutingError::data_unavailable(team_id, org_id, "no catalog registered")
        })
    }
}
