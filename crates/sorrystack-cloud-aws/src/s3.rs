//! S3 buckets, bucket policies and the auto-delete custom resource

use crate::error::Result;
use crate::iam::{PolicyStatement, policy_document, service_principal};
use crate::intrinsic;
use crate::naming::logical_id;
use crate::template::{CfnResource, Stack};
use serde_json::{Value, json};
use sorrystack_config::ToolkitSettings;
use sorrystack_core::{BlockPublicAccess, BucketSpec, RemovalPolicy};
use tracing::debug;

const AUTO_DELETE_RESOURCE_TYPE: &str = "Custom::S3AutoDeleteObjects";
const AUTO_DELETE_PROVIDER: &str = "Custom::S3AutoDeleteObjectsCustomResourceProvider";
const AUTO_DELETE_TAG: &str = "aws-cdk:auto-delete-objects";

/// Logical ids of a rendered bucket
#[derive(Debug, Clone)]
pub struct BucketRefs {
    pub construct_id: String,
    pub bucket_id: String,
    /// Id of the bucket policy (only present once a statement was added)
    pub policy_id: String,
}

impl BucketRefs {
    pub fn bucket_ref(&self) -> Value {
        intrinsic::reference(&self.bucket_id)
    }

    pub fn arn(&self) -> Value {
        intrinsic::get_att(&self.bucket_id, "Arn")
    }

    /// `<bucket arn>/*`
    pub fn objects_arn(&self) -> Value {
        intrinsic::join("", vec![self.arn(), json!("/*")])
    }
}

/// Render a bucket (and its auto-delete machinery when requested)
#[tracing::instrument(skip_all, fields(bucket = %spec.id))]
pub fn add_bucket(stack: &mut Stack, spec: &BucketSpec, settings: &ToolkitSettings) -> Result<BucketRefs> {
    let refs = BucketRefs {
        construct_id: spec.id.clone(),
        bucket_id: logical_id(&[spec.id.as_str(), "Resource"]),
        policy_id: logical_id(&[spec.id.as_str(), "Policy", "Resource"]),
    };

    let mut properties = json!({});
    if let Some(name) = &spec.bucket_name {
        properties["BucketName"] = json!(name);
    }
    if !spec.cors.is_empty() {
        let rules: Vec<Value> = spec
            .cors
            .iter()
            .map(|rule| {
                let mut rendered = json!({
                    "AllowedMethods": rule.allowed_methods.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
                    "AllowedOrigins": rule.allowed_origins,
                });
                if !rule.allowed_headers.is_empty() {
                    rendered["AllowedHeaders"] = json!(rule.allowed_headers);
                }
                if let Some(max_age) = rule.max_age {
                    rendered["MaxAge"] = json!(max_age);
                }
                rendered
            })
            .collect();
        properties["CorsConfiguration"] = json!({ "CorsRules": rules });
    }
    if spec.block_public_access == BlockPublicAccess::BlockAll {
        properties["PublicAccessBlockConfiguration"] = json!({
            "BlockPublicAcls": true,
            "BlockPublicPolicy": true,
            "IgnorePublicAcls": true,
            "RestrictPublicBuckets": true,
        });
    }
    if spec.versioned {
        properties["VersioningConfiguration"] = json!({ "Status": "Enabled" });
    }
    if spec.auto_delete_objects {
        properties["Tags"] = json!([{ "Key": AUTO_DELETE_TAG, "Value": "true" }]);
    }

    stack.add_resource(
        &refs.bucket_id,
        CfnResource::new("AWS::S3::Bucket", properties).with_removal_policy(spec.removal_policy.as_cfn()),
    )?;

    if spec.auto_delete_objects && spec.removal_policy == RemovalPolicy::Destroy {
        add_auto_delete_objects(stack, &refs, settings)?;
    }

    Ok(refs)
}

/// Append a statement to the bucket policy, creating the policy on first use
pub fn add_to_resource_policy(stack: &mut Stack, bucket: &BucketRefs, statement: PolicyStatement) -> Result<()> {
    if !stack.contains(&bucket.policy_id) {
        debug!(policy = %bucket.policy_id, "Creating bucket policy");
        stack.add_resource(
            &bucket.policy_id,
            CfnResource::new(
                "AWS::S3::BucketPolicy",
                json!({
                    "Bucket": bucket.bucket_ref(),
                    "PolicyDocument": policy_document(&[]),
                }),
            ),
        )?;
    }

    let policy = stack.resource_mut(&bucket.policy_id)?;
    if let Some(Value::Array(statements)) = policy
        .properties
        .get_mut("PolicyDocument")
        .and_then(|doc| doc.get_mut("Statement"))
    {
        statements.push(statement.to_json());
    }
    Ok(())
}

/// Remove statements matching `predicate`; an emptied policy is dropped
///
/// Returns the number of removed statements.
pub fn remove_policy_statements<F>(stack: &mut Stack, bucket: &BucketRefs, predicate: F) -> Result<usize>
where
    F: Fn(&Value) -> bool,
{
    if !stack.contains(&bucket.policy_id) {
        return Ok(0);
    }

    let policy = stack.resource_mut(&bucket.policy_id)?;
    let (removed, now_empty) = match policy
        .properties
        .get_mut("PolicyDocument")
        .and_then(|doc| doc.get_mut("Statement"))
    {
        Some(Value::Array(statements)) => {
            let before = statements.len();
            statements.retain(|s| !predicate(s));
            (before - statements.len(), statements.is_empty())
        }
        _ => (0, false),
    };

    if now_empty {
        debug!(policy = %bucket.policy_id, "Bucket policy is empty, removing");
        stack.remove_resource(&bucket.policy_id);
    }
    Ok(removed)
}

/// Statements currently attached to the bucket policy
pub fn policy_statements<'a>(stack: &'a Stack, bucket: &BucketRefs) -> &'a [Value] {
    stack
        .resource(&bucket.policy_id)
        .and_then(|p| p.properties.get("PolicyDocument"))
        .and_then(|doc| doc.get("Statement"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn add_auto_delete_objects(stack: &mut Stack, bucket: &BucketRefs, settings: &ToolkitSettings) -> Result<()> {
    let (role_id, handler_id) = ensure_auto_delete_provider(stack, settings)?;

    add_to_resource_policy(
        stack,
        bucket,
        PolicyStatement::allow([
            "s3:PutBucketPolicy",
            "s3:GetBucket*",
            "s3:List*",
            "s3:DeleteObject*",
        ])
        .on(bucket.arn())
        .on(bucket.objects_arn())
        .principal(json!({ "AWS": intrinsic::get_att(&role_id, "Arn") })),
    )?;

    let resource_id = logical_id(&[bucket.construct_id.as_str(), "AutoDeleteObjectsCustomResource", "Default"]);
    stack.add_resource(
        &resource_id,
        CfnResource::new(
            AUTO_DELETE_RESOURCE_TYPE,
            json!({
                "BucketName": bucket.bucket_ref(),
                "ServiceToken": intrinsic::get_att(&handler_id, "Arn"),
            }),
        )
        .depends_on(bucket.policy_id.clone())
        .with_removal_policy("Delete"),
    )?;
    Ok(())
}

/// Stack-wide singleton provider shared by every auto-deleting bucket
fn ensure_auto_delete_provider(stack: &mut Stack, settings: &ToolkitSettings) -> Result<(String, String)> {
    let role_id = logical_id(&[AUTO_DELETE_PROVIDER, "Role"]);
    let handler_id = logical_id(&[AUTO_DELETE_PROVIDER, "Handler"]);
    if stack.contains(&handler_id) {
        return Ok((role_id, handler_id));
    }

    let assume = PolicyStatement::allow(["sts:AssumeRole"]).principal(service_principal("lambda.amazonaws.com"));
    stack.add_resource(
        &role_id,
        CfnResource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": policy_document(&[assume]),
                "ManagedPolicyArns": [intrinsic::sub(
                    "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
                )],
            }),
        ),
    )?;

    stack.add_resource(
        &handler_id,
        CfnResource::new(
            "AWS::Lambda::Function",
            json!({
                "Code": {
                    "S3Bucket": intrinsic::sub(&settings.assets_bucket_sub()),
                    "S3Key": settings.auto_delete_handler_key,
                },
                "Description": format!("Lambda function for auto-deleting objects in S3 buckets of {}", stack.name),
                "Handler": "index.handler",
                "MemorySize": 128,
                "Role": intrinsic::get_att(&role_id, "Arn"),
                "Runtime": settings.handler_runtime,
                "Timeout": 900,
            }),
        )
        .depends_on(role_id.clone()),
    )?;
    Ok((role_id, handler_id))
}
