// SPDX-License-Identifier: MIT

//! Catalog loader - YAML/JSON fixture loading

use super::AttributeCatalog;
use crate::error::RoutingError;
use std::fs;
use std::path::Path;

/// Loads attribute catalogs from files
pub struct CatalogLoader;

impl CatalogLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a catalog, choosing the format from the file extension
    pub fn load_catalog<P: AsRef<Path>>(&self, path: P) -> Result<AttributeCatalog, RoutingError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::parse_json(&content),
            _ => Self::parse_yaml(&content),
        }
    }

    pub fn parse_yaml(content: &str) -> Result<AttributeCatalog, RoutingError> {
        let catalog: AttributeCatalog = serde_yaml::from_str(content)?;
        Ok(catalog)
    }

    pub fn parse_json(content: &str) -> Result<AttributeCatalog, RoutingError> {
        let catalog: AttributeCatalog = serde_json::from_str(content)?;
        Ok(catalog)
    }
}

impl Default for CatalogLoader {
    fn default() -> Self {
        Self::new()
    }
}
