//! Stack assembly
//!
//! Renders a `StackDefinition` into a template: network first, then
//! compute, storage, deployments and finally the distributions that front
//! the buckets.

use crate::cloudfront::{self, DistributionRefs};
use crate::deployment;
use crate::ecs;
use crate::error::{AwsError, Result};
use crate::s3::{self, BucketRefs};
use crate::template::Stack;
use crate::vpc;
use sorrystack_cloud::{Artifact, Synthesis};
use sorrystack_config::ToolkitSettings;
use sorrystack_core::StackDefinition;
use std::collections::BTreeMap;
use tracing::info;

pub const PROVIDER_NAME: &str = "aws";

/// A rendered stack and the assets it references
#[derive(Debug, Clone)]
pub struct RenderedStack {
    pub stack: Stack,
    pub artifacts: Vec<Artifact>,
}

impl RenderedStack {
    pub fn into_synthesis(self) -> Synthesis {
        Synthesis {
            stack_name: self.stack.name.clone(),
            resources: self.stack.resource_set(PROVIDER_NAME),
            document: self.stack.to_document(),
            artifacts: self.artifacts,
        }
    }
}

/// Build the stack without producing the final document
#[tracing::instrument(skip_all, fields(stack = %definition.name))]
pub fn build_stack(definition: &StackDefinition, settings: &ToolkitSettings) -> Result<RenderedStack> {
    let mut stack = Stack::new(&definition.name);
    stack.description = definition.description.clone();

    let az_count = definition.availability_zone_count();
    let vpc = vpc::add_vpc(&mut stack, &definition.vpc, &definition.env, az_count)?;

    if let Some(cluster) = &definition.cluster {
        let cluster_id = ecs::add_cluster(&mut stack, cluster)?;
        for service in &definition.services {
            ecs::add_load_balanced_fargate_service(&mut stack, service, &cluster_id, &vpc)?;
        }
    } else if let Some(service) = definition.services.first() {
        return Err(AwsError::ResourceNotFound(format!(
            "cluster for service {}",
            service.id
        )));
    }

    let mut buckets: BTreeMap<&str, BucketRefs> = BTreeMap::new();
    for spec in &definition.buckets {
        let refs = s3::add_bucket(&mut stack, spec, settings)?;
        buckets.insert(spec.id.as_str(), refs);
    }

    let mut artifacts = Vec::new();
    for spec in &definition.deployments {
        let bucket = lookup_bucket(&buckets, &spec.destination_bucket)?;
        artifacts.extend(deployment::add_bucket_deployment(&mut stack, spec, bucket, settings)?);
    }

    let mut controls: BTreeMap<&str, String> = BTreeMap::new();
    for spec in &definition.origin_access_controls {
        let id = cloudfront::add_origin_access_control(&mut stack, spec)?;
        controls.insert(spec.id.as_str(), id);
    }

    for spec in &definition.distributions {
        let bucket = lookup_bucket(&buckets, &spec.origin_bucket)?;
        let mut distribution: DistributionRefs = cloudfront::add_distribution(&mut stack, spec, bucket)?;
        if let Some(control) = &spec.origin_access_control {
            let oac_id = controls
                .get(control.as_str())
                .ok_or_else(|| AwsError::ResourceNotFound(control.clone()))?;
            cloudfront::use_origin_access_control(&mut stack, &mut distribution, bucket, oac_id, &definition.env)?;
        }
    }

    stack.validate()?;
    Ok(RenderedStack { stack, artifacts })
}

/// Synthesize the full template for a stack definition
pub fn synthesize(definition: &StackDefinition, settings: &ToolkitSettings) -> Result<Synthesis> {
    let rendered = build_stack(definition, settings)?;
    info!(
        stack = %definition.name,
        resources = rendered.stack.resources().count(),
        assets = rendered.artifacts.len(),
        "Synthesized stack"
    );
    Ok(rendered.into_synthesis())
}

fn lookup_bucket<'a>(buckets: &'a BTreeMap<&str, BucketRefs>, id: &str) -> Result<&'a BucketRefs> {
    buckets
        .get(id)
        .ok_or_else(|| AwsError::ResourceNotFound(format!("bucket {id}")))
}
