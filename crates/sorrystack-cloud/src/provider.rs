//! Cloud provider trait definition

use crate::action::Plan;
use crate::error::Result;
use crate::synthesis::Synthesis;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cloud provider abstraction trait
///
/// A provider turns a loaded stack declaration into a synthesized template.
/// Applying the template is left to an external provisioning engine.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Render the desired state
    async fn synthesize(&self) -> Result<Synthesis>;

    /// Calculate the diff between desired and current state
    async fn plan(&self, desired: &ResourceSet, current: &ResourceSet) -> Result<Plan> {
        Ok(Plan::diff(current, desired))
    }
}

/// Set of resources keyed by logical id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub resources: BTreeMap<String, ResourceConfig>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: ResourceConfig) {
        self.resources.insert(resource.id.clone(), resource);
    }

    pub fn get(&self, id: &str) -> Option<&ResourceConfig> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.resources.values()
    }

    pub fn by_type(&self, resource_type: &str) -> Vec<&ResourceConfig> {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }
}

impl FromIterator<ResourceConfig> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = ResourceConfig>>(iter: I) -> Self {
        let mut set = ResourceSet::new();
        for resource in iter {
            set.add(resource);
        }
        set
    }
}

/// Configuration for a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g., "AWS::S3::Bucket")
    pub resource_type: String,

    /// Logical id, unique within the template
    pub id: String,

    /// Provider name
    pub provider: String,

    /// Resource properties
    pub config: serde_json::Value,

    /// Resource-level attributes (DeletionPolicy, DependsOn, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ResourceConfig {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        provider: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            provider: provider.into(),
            config,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Get the full resource key (type:id)
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }

    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
