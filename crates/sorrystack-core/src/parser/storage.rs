//! バケット / デプロイノードのパース

use super::{first_bool, first_integer, first_parsed, first_string, required_id, strings};
use crate::error::{Result, StackError};
use crate::model::{BucketSpec, CorsRule, DeploymentSpec, HttpMethod};
use kdl::KdlNode;
use std::path::PathBuf;

/// bucket ノードをパース
pub fn parse_bucket(node: &KdlNode) -> Result<BucketSpec> {
    let mut bucket = BucketSpec::new(required_id(node)?);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "bucket_name" | "bucket-name" => bucket.bucket_name = first_string(child),
                "versioned" => bucket.versioned = first_bool(child)?,
                "removal_policy" | "removal-policy" => bucket.removal_policy = first_parsed(child)?,
                "auto_delete_objects" | "auto-delete-objects" => {
                    bucket.auto_delete_objects = first_bool(child)?;
                }
                "block_public_access" | "block-public-access" => {
                    bucket.block_public_access = first_parsed(child)?;
                }
                "cors" => bucket.cors.push(parse_cors_rule(child)?),
                _ => {}
            }
        }
    }

    Ok(bucket)
}

/// cors ブロックをパース
fn parse_cors_rule(node: &KdlNode) -> Result<CorsRule> {
    let mut rule = CorsRule::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "allowed_methods" | "allowed-methods" => {
                    rule.allowed_methods = strings(child)
                        .iter()
                        .map(|m| m.parse::<HttpMethod>())
                        .collect::<Result<Vec<_>>>()?;
                }
                "allowed_origins" | "allowed-origins" => rule.allowed_origins = strings(child),
                "allowed_headers" | "allowed-headers" => rule.allowed_headers = strings(child),
                "max_age" | "max-age" => rule.max_age = Some(first_integer(child)?),
                _ => {}
            }
        }
    }

    if rule.allowed_methods.is_empty() || rule.allowed_origins.is_empty() {
        return Err(StackError::InvalidConfig(
            "cors には allowed-methods と allowed-origins が必要です".to_string(),
        ));
    }

    Ok(rule)
}

/// deployment ノードをパース
pub fn parse_deployment(node: &KdlNode) -> Result<DeploymentSpec> {
    let id = required_id(node)?;
    let mut destination = None;
    let mut deployment = DeploymentSpec::new(id, String::new());

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "source" | "sources" => {
                    deployment
                        .sources
                        .extend(strings(child).into_iter().map(PathBuf::from));
                }
                "bucket" | "destination_bucket" | "destination-bucket" => {
                    destination = first_string(child);
                }
                "destination_key_prefix" | "destination-key-prefix" | "prefix" => {
                    deployment.destination_key_prefix = first_string(child);
                }
                "retain_on_delete" | "retain-on-delete" => {
                    deployment.retain_on_delete = first_bool(child)?;
                }
                "prune" => deployment.prune = first_bool(child)?,
                _ => {}
            }
        }
    }

    deployment.destination_bucket = destination.ok_or_else(|| {
        StackError::InvalidConfig(format!("デプロイ '{}' に bucket が必要です", deployment.id))
    })?;

    Ok(deployment)
}
