//! AWS provider implementation

use crate::sorry_page::{PROVIDER_NAME, synthesize};
use async_trait::async_trait;
use sorrystack_cloud::{CloudProvider, Result, Synthesis};
use sorrystack_config::ToolkitSettings;
use sorrystack_core::StackDefinition;

/// Synthesizes CloudFormation templates for a loaded stack definition
pub struct AwsProvider {
    definition: StackDefinition,
    settings: ToolkitSettings,
}

impl AwsProvider {
    pub fn new(definition: StackDefinition, settings: ToolkitSettings) -> Self {
        Self { definition, settings }
    }

    pub fn definition(&self) -> &StackDefinition {
        &self.definition
    }

    pub fn settings(&self) -> &ToolkitSettings {
        &self.settings
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn display_name(&self) -> &str {
        "AWS CloudFormation"
    }

    async fn synthesize(&self) -> Result<Synthesis> {
        tracing::debug!(stack = %self.definition.name, "Synthesizing via AWS provider");
        Ok(synthesize(&self.definition, &self.settings)?)
    }
}
