//! OAC / ディストリビューションノードのパース

use super::{first_bool, first_parsed, first_string, required_id};
use crate::error::{Result, StackError};
use crate::model::{DistributionSpec, OriginAccessControlSpec};
use kdl::KdlNode;

/// origin-access-control ノードをパース
pub fn parse_origin_access_control(node: &KdlNode) -> Result<OriginAccessControlSpec> {
    let id = required_id(node)?;
    let mut name = None;
    let mut oac = OriginAccessControlSpec::new(id, String::new());

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "name" => name = first_string(child),
                "origin_type" | "origin-type" => oac.origin_type = first_parsed(child)?,
                "signing_behavior" | "signing-behavior" => {
                    oac.signing_behavior = first_parsed(child)?;
                }
                "signing_protocol" | "signing-protocol" => {
                    oac.signing_protocol = first_parsed(child)?;
                }
                "description" => oac.description = first_string(child),
                _ => {}
            }
        }
    }

    // name 省略時は id をそのまま使う
    oac.name = name.unwrap_or_else(|| oac.id.clone());
    Ok(oac)
}

/// distribution ノードをパース
pub fn parse_distribution(node: &KdlNode) -> Result<DistributionSpec> {
    let id = required_id(node)?;
    let mut origin = None;
    let mut distribution = DistributionSpec::new(id, String::new());

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "comment" => distribution.comment = first_string(child),
                "origin_bucket" | "origin-bucket" | "origin" => origin = first_string(child),
                "default_root_object" | "default-root-object" => {
                    distribution.default_root_object = first_string(child);
                }
                "http_version" | "http-version" => {
                    distribution.http_version = first_parsed(child)?;
                }
                "origin_access_control" | "origin-access-control" | "oac" => {
                    distribution.origin_access_control = first_string(child);
                }
                "price_class" | "price-class" => {
                    distribution.price_class = Some(first_parsed(child)?);
                }
                "enable_ipv6" | "enable-ipv6" => distribution.enable_ipv6 = first_bool(child)?,
                _ => {}
            }
        }
    }

    distribution.origin_bucket = origin.ok_or_else(|| {
        StackError::InvalidConfig(format!(
            "ディストリビューション '{}' に origin-bucket が必要です",
            distribution.id
        ))
    })?;

    Ok(distribution)
}
