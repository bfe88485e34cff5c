//! CloudFront distributions with S3 origins
//!
//! A distribution is first rendered with a legacy origin access identity
//! (OAI) granted read access through the bucket policy. When an origin access
//! control (OAC) is attached, `use_origin_access_control` rewires the origin
//! with property overrides, removes the OAI together with its grant and
//! replaces it with a statement scoped to the distribution ARN.

use crate::error::Result;
use crate::iam::{PolicyStatement, service_principal};
use crate::intrinsic;
use crate::naming::logical_id;
use crate::s3::{self, BucketRefs};
use crate::template::{CfnResource, Stack};
use serde_json::{Value, json};
use sorrystack_core::{DistributionSpec, OriginAccessControlSpec, StackEnv};
use tracing::{debug, info};

/// Managed "CachingOptimized" cache policy
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

const ORIGIN_ACCESS_IDENTITY_PATH: &str = "DistributionConfig.Origins.0.S3OriginConfig.OriginAccessIdentity";
const ORIGIN_ACCESS_CONTROL_PATH: &str = "DistributionConfig.Origins.0.OriginAccessControlId";

/// Logical ids of a rendered distribution
#[derive(Debug, Clone)]
pub struct DistributionRefs {
    pub distribution_id: String,
    /// Legacy identity; `None` once replaced by an OAC
    pub origin_identity_id: Option<String>,
}

/// Render an origin access control; returns its logical id
pub fn add_origin_access_control(stack: &mut Stack, spec: &OriginAccessControlSpec) -> Result<String> {
    let id = logical_id(&[spec.id.as_str()]);
    let mut config = json!({
        "Name": spec.name,
        "OriginAccessControlOriginType": spec.origin_type.as_cfn(),
        "SigningBehavior": spec.signing_behavior.as_cfn(),
        "SigningProtocol": spec.signing_protocol.as_cfn(),
    });
    if let Some(description) = &spec.description {
        config["Description"] = json!(description);
    }
    stack.add_resource(
        &id,
        CfnResource::new(
            "AWS::CloudFront::OriginAccessControl",
            json!({ "OriginAccessControlConfig": config }),
        ),
    )?;
    Ok(id)
}

/// Render a distribution in front of `bucket`
#[tracing::instrument(skip_all, fields(distribution = %spec.id))]
pub fn add_distribution(stack: &mut Stack, spec: &DistributionSpec, bucket: &BucketRefs) -> Result<DistributionRefs> {
    let distribution_id = logical_id(&[spec.id.as_str(), "Resource"]);
    let origin_id = logical_id(&[stack.name.as_str(), spec.id.as_str(), "Origin1"]);
    let identity_id = logical_id(&[spec.id.as_str(), "Origin1", "S3Origin", "Resource"]);

    stack.add_resource(
        &identity_id,
        CfnResource::new(
            "AWS::CloudFront::CloudFrontOriginAccessIdentity",
            json!({
                "CloudFrontOriginAccessIdentityConfig": {
                    "Comment": format!("Identity for {origin_id}"),
                }
            }),
        ),
    )?;

    s3::add_to_resource_policy(
        stack,
        bucket,
        PolicyStatement::allow(["s3:GetObject"])
            .on(bucket.objects_arn())
            .principal(json!({ "CanonicalUser": intrinsic::get_att(&identity_id, "S3CanonicalUserId") })),
    )?;

    let mut config = json!({
        "DefaultCacheBehavior": {
            "CachePolicyId": CACHING_OPTIMIZED_POLICY_ID,
            "Compress": true,
            "TargetOriginId": origin_id,
            "ViewerProtocolPolicy": "allow-all",
        },
        "Enabled": true,
        "HttpVersion": spec.http_version.as_cfn(),
        "IPV6Enabled": spec.enable_ipv6,
        "Origins": [{
            "DomainName": intrinsic::get_att(&bucket.bucket_id, "RegionalDomainName"),
            "Id": origin_id,
            "S3OriginConfig": {
                "OriginAccessIdentity": intrinsic::join(
                    "",
                    vec![json!("origin-access-identity/cloudfront/"), intrinsic::reference(&identity_id)],
                ),
            },
        }],
    });
    if let Some(comment) = &spec.comment {
        config["Comment"] = json!(comment);
    }
    if let Some(root) = &spec.default_root_object {
        config["DefaultRootObject"] = json!(root);
    }
    if let Some(price_class) = spec.price_class {
        config["PriceClass"] = json!(price_class.as_cfn());
    }

    stack.add_resource(
        &distribution_id,
        CfnResource::new(
            "AWS::CloudFront::Distribution",
            json!({ "DistributionConfig": config }),
        ),
    )?;

    Ok(DistributionRefs {
        distribution_id,
        origin_identity_id: Some(identity_id),
    })
}

/// ARN of a distribution, as used in `AWS:SourceArn` conditions
pub fn distribution_arn(env: &StackEnv, distribution_id: &str) -> Value {
    let account = match &env.account {
        Some(account) => json!(account),
        None => intrinsic::account(),
    };
    intrinsic::join(
        "",
        vec![
            json!("arn:aws:cloudfront::"),
            account,
            json!(":distribution/"),
            intrinsic::reference(distribution_id),
        ],
    )
}

/// Switch the distribution's origin from the legacy identity to an OAC
#[tracing::instrument(skip_all, fields(distribution = %distribution.distribution_id, oac = %oac_id))]
pub fn use_origin_access_control(
    stack: &mut Stack,
    distribution: &mut DistributionRefs,
    bucket: &BucketRefs,
    oac_id: &str,
    env: &StackEnv,
) -> Result<()> {
    let target = distribution.distribution_id.clone();
    stack.add_property_override(&target, ORIGIN_ACCESS_IDENTITY_PATH, json!(""))?;
    stack.add_property_override(&target, ORIGIN_ACCESS_CONTROL_PATH, intrinsic::get_att(oac_id, "Id"))?;

    if let Some(identity_id) = distribution.origin_identity_id.take() {
        let removed = s3::remove_policy_statements(stack, bucket, |statement| {
            intrinsic::references(statement).contains(&identity_id)
        })?;
        stack.remove_resource(&identity_id);
        debug!(identity = %identity_id, grants = removed, "Removed legacy origin access identity");
    }

    s3::add_to_resource_policy(
        stack,
        bucket,
        PolicyStatement::allow(["s3:GetObject"])
            .on(bucket.objects_arn())
            .principal(service_principal("cloudfront.amazonaws.com"))
            .condition(json!({
                "StringEquals": { "AWS:SourceArn": distribution_arn(env, &target) }
            })),
    )?;

    info!("Distribution now uses origin access control");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorrystack_config::ToolkitSettings;
    use sorrystack_core::{BucketSpec, HttpVersion};

    fn setup() -> (Stack, BucketRefs, DistributionRefs) {
        let mut stack = Stack::new("TestSorryPageStack");
        let bucket = s3::add_bucket(&mut stack, &BucketSpec::new("SorryPageBucket"), &ToolkitSettings::default()).unwrap();
        let mut spec = DistributionSpec::new("Distribution", "SorryPageBucket");
        spec.comment = Some("distribution.".to_string());
        spec.default_root_object = Some("index.html".to_string());
        spec.http_version = HttpVersion::Http2And3;
        let distribution = add_distribution(&mut stack, &spec, &bucket).unwrap();
        (stack, bucket, distribution)
    }

    fn origin(stack: &Stack, distribution: &DistributionRefs) -> Value {
        stack.resource(&distribution.distribution_id).unwrap().properties["DistributionConfig"]["Origins"][0].clone()
    }

    #[test]
    fn test_distribution_defaults_to_identity() {
        let (stack, bucket, distribution) = setup();
        let identity = distribution.origin_identity_id.clone().unwrap();
        assert!(stack.contains(&identity));

        let config = &stack.resource(&distribution.distribution_id).unwrap().properties["DistributionConfig"];
        assert_eq!(config["DefaultRootObject"], json!("index.html"));
        assert_eq!(config["HttpVersion"], json!("http2and3"));
        assert_eq!(config["Comment"], json!("distribution."));
        assert_eq!(
            config["DefaultCacheBehavior"]["CachePolicyId"],
            json!(CACHING_OPTIMIZED_POLICY_ID)
        );

        let statements = s3::policy_statements(&stack, &bucket);
        assert_eq!(statements.len(), 1);
        assert!(statements[0]["Principal"].get("CanonicalUser").is_some());
        stack.validate().unwrap();
    }

    #[test]
    fn test_use_origin_access_control() {
        let (mut stack, bucket, mut distribution) = setup();
        let oac = add_origin_access_control(
            &mut stack,
            &OriginAccessControlSpec::new("OriginAccessControl", "OriginAccessControlForSorryPageBucket"),
        )
        .unwrap();
        assert_eq!(oac, "OriginAccessControl");

        let env = StackEnv {
            account: Some("123456789012".to_string()),
            ..StackEnv::default()
        };
        use_origin_access_control(&mut stack, &mut distribution, &bucket, &oac, &env).unwrap();

        let origin = origin(&stack, &distribution);
        assert_eq!(origin["S3OriginConfig"]["OriginAccessIdentity"], json!(""));
        assert_eq!(
            origin["OriginAccessControlId"],
            json!({ "Fn::GetAtt": ["OriginAccessControl", "Id"] })
        );

        assert!(distribution.origin_identity_id.is_none());
        assert!(
            !stack
                .resources()
                .any(|(_, r)| r.resource_type == "AWS::CloudFront::CloudFrontOriginAccessIdentity")
        );

        let statements = s3::policy_statements(&stack, &bucket);
        assert_eq!(statements.len(), 1);
        let statement = &statements[0];
        assert_eq!(statement["Action"], json!("s3:GetObject"));
        assert_eq!(statement["Principal"]["Service"], json!("cloudfront.amazonaws.com"));
        let source_arn = &statement["Condition"]["StringEquals"]["AWS:SourceArn"]["Fn::Join"][1];
        assert_eq!(source_arn[1], json!("123456789012"));
        assert_eq!(source_arn[3], json!({ "Ref": distribution.distribution_id }));

        stack.validate().unwrap();
    }

    #[test]
    fn test_agnostic_account_uses_pseudo_parameter() {
        let arn = distribution_arn(&StackEnv::default(), "Distribution830FAC52");
        assert_eq!(arn["Fn::Join"][1][1], json!({ "Ref": "AWS::AccountId" }));
    }
}
