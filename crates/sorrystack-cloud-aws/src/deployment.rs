//! Bucket deployments
//!
//! Each deployment hashes its sources into assets staged in the bootstrap
//! bucket and renders a `Custom::CDKBucketDeployment` resource that copies
//! them into the destination bucket. A single handler function (and its
//! role) is shared by all deployments in the stack.

use crate::asset::{AssetSource, hash_source};
use crate::error::Result;
use crate::iam::{PolicyStatement, ServiceRole};
use crate::intrinsic;
use crate::naming::logical_id;
use crate::s3::BucketRefs;
use crate::template::{CfnResource, Stack};
use serde_json::{Value, json};
use sorrystack_cloud::{Artifact, Packaging};
use sorrystack_config::ToolkitSettings;
use sorrystack_core::DeploymentSpec;
use tracing::{debug, info};

pub const DEPLOYMENT_RESOURCE_TYPE: &str = "Custom::CDKBucketDeployment";
const HANDLER_CONSTRUCT: &str = "Custom::CDKBucketDeploymentHandler";

/// Logical ids of the shared deployment handler
#[derive(Debug, Clone)]
struct HandlerRefs {
    function_id: String,
    policy_id: String,
}

/// Object key of an asset in the bootstrap bucket
pub fn object_key(source: &AssetSource) -> String {
    match source.packaging {
        Packaging::Zip => format!("{}.zip", source.hash),
        Packaging::File => match source.path.extension() {
            Some(ext) => format!("{}.{}", source.hash, ext.to_string_lossy()),
            None => source.hash.clone(),
        },
    }
}

/// Render a deployment into the stack; returns the assets it references
#[tracing::instrument(skip_all, fields(deployment = %spec.id))]
pub fn add_bucket_deployment(
    stack: &mut Stack,
    spec: &DeploymentSpec,
    destination: &BucketRefs,
    settings: &ToolkitSettings,
) -> Result<Vec<Artifact>> {
    let resource_id = logical_id(&[spec.id.as_str(), "CustomResource", "Default"]);
    let assets_bucket = settings.assets_bucket_sub();

    let sources = spec
        .sources
        .iter()
        .map(|path| hash_source(path))
        .collect::<Result<Vec<_>>>()?;

    let handler = ensure_handler(stack, settings)?;
    grant_destination(stack, &handler, destination)?;

    let object_keys: Vec<String> = sources.iter().map(object_key).collect();
    let mut properties = json!({
        "DestinationBucketName": destination.bucket_ref(),
        "Prune": spec.prune,
        "RetainOnDelete": spec.retain_on_delete,
        "ServiceToken": intrinsic::get_att(&handler.function_id, "Arn"),
        "SourceBucketNames": vec![intrinsic::sub(&assets_bucket); sources.len()],
        "SourceObjectKeys": object_keys,
    });
    if let Some(prefix) = &spec.destination_key_prefix {
        properties["DestinationBucketKeyPrefix"] = json!(prefix);
    }
    stack.add_resource(
        &resource_id,
        CfnResource::new(DEPLOYMENT_RESOURCE_TYPE, properties).with_removal_policy("Delete"),
    )?;

    let artifacts: Vec<Artifact> = sources
        .into_iter()
        .zip(object_keys)
        .map(|(source, object_key)| Artifact {
            id: resource_id.clone(),
            source: source.path,
            hash: source.hash,
            packaging: source.packaging,
            destination_bucket: assets_bucket.clone(),
            object_key,
        })
        .collect();

    info!(assets = artifacts.len(), "Added bucket deployment");
    Ok(artifacts)
}

fn ensure_handler(stack: &mut Stack, settings: &ToolkitSettings) -> Result<HandlerRefs> {
    let function_id = logical_id(&[HANDLER_CONSTRUCT, "Resource"]);
    let mut role = ServiceRole::new(&[HANDLER_CONSTRUCT, "ServiceRole"], "lambda.amazonaws.com")
        .with_managed_policy("service-role/AWSLambdaBasicExecutionRole");
    let policy_id = role.policy_logical_id();
    if stack.contains(&function_id) {
        return Ok(HandlerRefs {
            function_id,
            policy_id,
        });
    }

    debug!("Creating bucket deployment handler");
    let assets_bucket_arn = intrinsic::join(
        "",
        vec![
            json!("arn:"),
            intrinsic::partition(),
            json!(":s3:::"),
            intrinsic::sub(&settings.assets_bucket_sub()),
        ],
    );
    role.add_to_policy(
        PolicyStatement::allow(["s3:GetBucket*", "s3:GetObject*", "s3:List*"])
            .on(assets_bucket_arn.clone())
            .on(intrinsic::join("", vec![assets_bucket_arn, json!("/*")])),
    );
    let role = role.add_to_stack(stack)?;

    let mut function = CfnResource::new(
        "AWS::Lambda::Function",
        json!({
            "Code": {
                "S3Bucket": intrinsic::sub(&settings.assets_bucket_sub()),
                "S3Key": settings.deployment_handler_key,
            },
            "Handler": "index.handler",
            "Role": role.arn(),
            "Runtime": settings.handler_runtime,
            "Timeout": 900,
        }),
    )
    .depends_on(role.role_id.clone());
    if let Some(policy) = &role.policy_id {
        function = function.depends_on(policy.clone());
    }
    stack.add_resource(&function_id, function)?;

    Ok(HandlerRefs {
        function_id,
        policy_id,
    })
}

/// Let the handler write into the destination bucket
fn grant_destination(stack: &mut Stack, handler: &HandlerRefs, destination: &BucketRefs) -> Result<()> {
    let statement = PolicyStatement::allow([
        "s3:Abort*",
        "s3:DeleteObject*",
        "s3:GetBucket*",
        "s3:GetObject*",
        "s3:List*",
        "s3:PutObject",
        "s3:PutObjectLegalHold",
        "s3:PutObjectRetention",
        "s3:PutObjectTagging",
        "s3:PutObjectVersionTagging",
    ])
    .on(destination.arn())
    .on(destination.objects_arn())
    .to_json();

    let policy = stack.resource_mut(&handler.policy_id)?;
    if let Some(Value::Array(statements)) = policy
        .properties
        .get_mut("PolicyDocument")
        .and_then(|doc| doc.get_mut("Statement"))
    {
        if !statements.contains(&statement) {
            statements.push(statement);
        }
    }
    Ok(())
}
