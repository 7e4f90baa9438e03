// SPDX-License-Identifier: MIT

//! Attribute catalog: the organization's attribute definitions and the
//! values assigned to each team member.
//!
//! The catalog is owned by an external collaborator. The engine only ever
//! reads it, through the `AttributeCatalogSource` trait.

mod loader;
mod store;

pub use loader::CatalogLoader;
pub use store::InMemoryCatalogStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::RoutingError;

pub type AttributeId = String;
pub type MemberId = String;

/// Value type of an attribute
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    Text,
    Number,
    SingleSelect,
    MultiSelect,
}

impl AttributeType {
    /// Whether members may carry more than one value for this attribute
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, AttributeType::MultiSelect)
    }

    /// Whether operands are drawn from the attribute's option list
    pub fn has_options(&self) -> bool {
        matches!(self, AttributeType::SingleSelect | AttributeType::MultiSelect)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Text => write!(f, "TEXT"),
            AttributeType::Number => write!(f, "NUMBER"),
            AttributeType::SingleSelect => write!(f, "SINGLE_SELECT"),
            AttributeType::MultiSelect => write!(f, "MULTI_SELECT"),
        }
    }
}

/// One selectable option of a select attribute
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AttributeOption {
    pub id: String,
    /// Human-readable label
    pub value: String,
}

/// Definition of an organization attribute
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub id: AttributeId,
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: AttributeType,
    #[serde(default)]
    pub options: Vec<AttributeOption>,
}

impl AttributeDefinition {
    pub fn allowed_option_ids(&self) -> BTreeSet<&str> {
        self.options.iter().map(|o| o.id.as_str()).collect()
    }

    /// Find an option by id, or by label (case-insensitive)
    pub fn find_option(&self, id_or_label: &str) -> Option<&AttributeOption> {
        let needle = id_or_label.trim();
        self.options
            .iter()
            .find(|o| o.id == needle)
            .or_else(|| {
                self.options
                    .iter()
                    .find(|o| o.value.trim().eq_ignore_ascii_case(needle))
            })
    }
}

/// Values assigned to one member, keyed by attribute id.
///
/// An attribute missing from the map is the same as an empty sequence.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MemberAttributeValues {
    #[serde(flatten)]
    values: HashMap<AttributeId, Vec<String>>,
}

impl MemberAttributeValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign values for an attribute, replacing previous ones
    pub fn with(mut self, attribute_id: &str, values: &[&str]) -> Self {
        self.values.insert(
            attribute_id.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn get(&self, attribute_id: &str) -> &[String] {
        self.values
            .get(attribute_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn attribute_ids(&self) -> impl Iterator<Item = &AttributeId> {
        self.values.keys()
    }
}

/// A candidate team member
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: MemberId,
    #[serde(default)]
    pub attributes: MemberAttributeValues,
}

impl TeamMember {
    pub fn new(id: impl Into<String>, attributes: MemberAttributeValues) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

/// Attribute definitions and member assignments for one team
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeCatalog {
    pub team_id: String,
    pub org_id: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

impl AttributeCatalog {
    pub fn attribute(&self, id: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.id == id)
    }

    pub fn member_ids(&self) -> BTreeSet<MemberId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }
}

/// Storage collaborator that supplies the catalog for a team.
///
/// Any error returned here aborts the whole routing call.
#[async_trait]
pub trait AttributeCatalogSource: Send + Sync {
    async fn fetch_attributes_and_assignments(
        &self,
        team_id: &str,
        org_id: &str,
    ) -> Result<AttributeCatalog, RoutingError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn department() -> AttributeDefinition {
        AttributeDefinition {
            id: "dept".to_string(),
            name: "Department".to_string(),
            value_type: AttributeType::SingleSelect,
            options: vec![
                AttributeOption {
                    id: "opt-sales".to_string(),
                    value: "Sales".to_string(),
                },
                AttributeOption {
                    id: "opt-support".to_string(),
                    value: "Support".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_find_option_by_id_or_label() {
        let attr = department();
        assert_eq!(attr.find_option("opt-sales").unwrap().value, "Sales");
        assert_eq!(attr.find_option("support").unwrap().id, "opt-support");
        assert_eq!(attr.find_option(" SALES ").unwrap().id, "opt-sales");
        assert!(attr.find_option("Marketing").is_none());
    }

    #[test]
    fn test_allowed_option_ids() {
        let dept = department();
        let ids = dept.allowed_option_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("opt-sales"));
    }

    #[test]
    fn test_missing_attribute_is_empty() {
        let values = MemberAttributeValues::new().with("dept", &["opt-sales"]);
        assert_eq!(values.get("dept"), &["opt-sales".to_string()]);
        assert!(values.get("region").is_empty());
    }

    #[test]
    fn test_catalog_deserialize() {
        let catalog: AttributeCatalog = serde_json::from_value(json!({
            "teamId": "team-1",
            "orgId": "org-1",
            "attributes": [
                {"id": "dept", "name": "Department", "type": "SINGLE_SELECT",
                 "options": [{"id": "opt-sales", "value": "Sales"}]},
                {"id": "seniority", "name": "Seniority", "type": "NUMBER"}
            ],
            "members": [
                {"id": "alice", "attributes": {"dept": ["opt-sales"], "seniority": ["4"]}},
                {"id": "bob"}
            ]
        }))
        .unwrap();

        assert_eq!(catalog.attributes.len(), 2);
        assert_eq!(
            catalog.attribute("seniority").unwrap().value_type,
            AttributeType::Number
        );
        assert!(catalog.attribute("seniority").unwrap().options.is_empty());
        assert_eq!(catalog.members[0].attributes.get("seniority"), &["4"]);
        assert!(catalog.members[1].attributes.get("dept").is_empty());
        assert_eq!(
            catalog.member_ids().into_iter().collect::<Vec<_>>(),
            vec!["alice", "bob"]
        );
    }

    #[test]
    fn test_attribute_type_display() {
        assert_eq!(AttributeType::MultiSelect.to_string(), "MULTI_SELECT");
        assert!(AttributeType::MultiSelect.is_multi_valued());
        assert!(!AttributeType::Number.has_options());
    }
}
