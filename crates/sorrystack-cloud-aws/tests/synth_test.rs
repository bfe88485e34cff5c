//! End-to-end synthesis of the sorry page stack

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use sorrystack_cloud::CloudProvider;
use sorrystack_cloud_aws::{AwsError, AwsProvider, build_stack, synthesize};
use sorrystack_config::ToolkitSettings;
use sorrystack_core::{Ipv4Cidr, StackDefinition, load_stack};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const STACK_KDL: &str = r#"
stack "TestSorryPageStack" {
    description "VPC, Fargate web service and CloudFront sorry page"
}

vpc "Vpc" {
    cidr "10.1.0.0/16"
    nat-gateways 1
    max-azs 2
    subnet "PublicSubnet" type="public" cidr-mask=24 map-public-ip=#true
    subnet "PrivateSubnet" type="private-with-egress" cidr-mask=24
    gateway-endpoint "s3" service="s3"
}

cluster "Cluster"

service "SampleWebService" {
    public-load-balancer #true
    cpu 256
    memory 512
    desired-count 1
    assign-public-ip #false
    task-subnets "private-with-egress"
    image "amazon/amazon-ecs-sample"
}

bucket "sorry-page-bucket" {
    versioned #true
    removal-policy "destroy"
    block-public-access "all"
    cors {
        allowed-methods "GET" "HEAD"
        allowed-origins "*"
        allowed-headers "*"
    }
}

deployment "DeployContents" {
    source "./sorry-page-contents"
    bucket "sorry-page-bucket"
    retain-on-delete #false
}

origin-access-control "OriginAccessControl" {
    name "OriginAccessControlForAppBucket"
    origin-type "s3"
    signing-behavior "always"
    signing-protocol "sigv4"
    description "S3 Access Control"
}

distribution "Distribution" {
    comment "distribution."
    origin-bucket "sorry-page-bucket"
    default-root-object "index.html"
    http-version "http2and3"
    origin-access-control "OriginAccessControl"
}
"#;

struct Fixture {
    _dir: TempDir,
    definition: StackDefinition,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let contents = dir.path().join("sorry-page-contents");
    fs::create_dir(&contents).unwrap();
    fs::write(contents.join("index.html"), "<h1>Sorry, we are under maintenance</h1>").unwrap();
    let path = dir.path().join("stack.kdl");
    fs::write(&path, STACK_KDL).unwrap();

    let definition = load_stack(&path).unwrap();
    Fixture { _dir: dir, definition }
}

fn resources_of<'a>(document: &'a Value, resource_type: &str) -> Vec<(&'a String, &'a Value)> {
    document["Resources"]
        .as_object()
        .unwrap()
        .iter()
        .filter(|(_, r)| r["Type"] == json!(resource_type))
        .collect()
}

fn single<'a>(document: &'a Value, resource_type: &str) -> (&'a String, &'a Value) {
    let found = resources_of(document, resource_type);
    assert_eq!(found.len(), 1, "expected exactly one {resource_type}");
    found[0]
}

#[test]
fn test_bucket_blocks_all_public_access() {
    let fixture = fixture();
    let synthesis = synthesize(&fixture.definition, &ToolkitSettings::default()).unwrap();
    let (_, bucket) = single(&synthesis.document, "AWS::S3::Bucket");

    assert_eq!(
        bucket["Properties"]["PublicAccessBlockConfiguration"],
        json!({
            "BlockPublicAcls": true,
            "BlockPublicPolicy": true,
            "IgnorePublicAcls": true,
            "RestrictPublicBuckets": true,
        })
    );
    assert_eq!(bucket["DeletionPolicy"], json!("Delete"));
}

#[test]
fn test_distribution_uses_origin_access_control() {
    let fixture = fixture();
    let synthesis = synthesize(&fixture.definition, &ToolkitSettings::default()).unwrap();
    let document = &synthesis.document;

    let (oac_id, _) = single(document, "AWS::CloudFront::OriginAccessControl");
    let (_, distribution) = single(document, "AWS::CloudFront::Distribution");
    let origin = &distribution["Properties"]["DistributionConfig"]["Origins"][0];

    assert_eq!(origin["S3OriginConfig"]["OriginAccessIdentity"], json!(""));
    assert_eq!(origin["OriginAccessControlId"], json!({ "Fn::GetAtt": [oac_id, "Id"] }));
    assert!(resources_of(document, "AWS::CloudFront::CloudFrontOriginAccessIdentity").is_empty());
}

#[test]
fn test_bucket_policy_scoped_to_distribution() {
    let fixture = fixture();
    let synthesis = synthesize(&fixture.definition, &ToolkitSettings::default()).unwrap();
    let document = &synthesis.document;

    let (bucket_id, _) = single(document, "AWS::S3::Bucket");
    let (distribution_id, _) = single(document, "AWS::CloudFront::Distribution");
    let (_, policy) = single(document, "AWS::S3::BucketPolicy");

    let statements = policy["Properties"]["PolicyDocument"]["Statement"].as_array().unwrap();
    assert_eq!(statements.len(), 1);
    let statement = &statements[0];

    assert_eq!(statement["Action"], json!("s3:GetObject"));
    assert_eq!(statement["Principal"], json!({ "Service": "cloudfront.amazonaws.com" }));
    assert_eq!(
        statement["Resource"],
        json!({ "Fn::Join": ["", [{ "Fn::GetAtt": [bucket_id, "Arn"] }, "/*"]] })
    );
    assert_eq!(
        statement["Condition"]["StringEquals"]["AWS:SourceArn"],
        json!({
            "Fn::Join": ["", [
                "arn:aws:cloudfront::",
                { "Ref": "AWS::AccountId" },
                ":distribution/",
                { "Ref": distribution_id },
            ]]
        })
    );
}

#[test]
fn test_four_disjoint_subnets() {
    let fixture = fixture();
    let synthesis = synthesize(&fixture.definition, &ToolkitSettings::default()).unwrap();
    let vpc: Ipv4Cidr = "10.1.0.0/16".parse().unwrap();

    let blocks: Vec<Ipv4Cidr> = resources_of(&synthesis.document, "AWS::EC2::Subnet")
        .into_iter()
        .map(|(_, s)| s["Properties"]["CidrBlock"].as_str().unwrap().parse().unwrap())
        .collect();

    assert_eq!(blocks.len(), 4);
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.prefix(), 24);
        assert!(vpc.contains(block));
        for other in &blocks[i + 1..] {
            assert!(!block.overlaps(other), "{block} overlaps {other}");
        }
    }

    assert_eq!(resources_of(&synthesis.document, "AWS::EC2::NatGateway").len(), 1);
    assert_eq!(resources_of(&synthesis.document, "AWS::EC2::VPCEndpoint").len(), 1);
}

#[test]
fn test_synthesis_is_deterministic() {
    let fixture = fixture();
    let settings = ToolkitSettings::default();
    let first = synthesize(&fixture.definition, &settings).unwrap();
    let second = synthesize(&fixture.definition, &settings).unwrap();

    assert_eq!(first.template_json().unwrap(), second.template_json().unwrap());
    assert_eq!(first.artifacts, second.artifacts);
}

#[test]
fn test_deployment_asset_and_service() {
    let fixture = fixture();
    let synthesis = synthesize(&fixture.definition, &ToolkitSettings::default()).unwrap();

    assert_eq!(synthesis.artifacts.len(), 1);
    let artifact = &synthesis.artifacts[0];
    assert!(artifact.source.ends_with("sorry-page-contents"));

    let (_, deployment) = single(&synthesis.document, "Custom::CDKBucketDeployment");
    assert_eq!(
        deployment["Properties"]["SourceObjectKeys"],
        json!([artifact.object_key])
    );
    assert_eq!(deployment["Properties"]["RetainOnDelete"], json!(false));

    let (_, service) = single(&synthesis.document, "AWS::ECS::Service");
    assert_eq!(service["Properties"]["DesiredCount"], json!(1));
    assert_eq!(
        service["Properties"]["NetworkConfiguration"]["AwsvpcConfiguration"]["AssignPublicIp"],
        json!("DISABLED")
    );
    assert_eq!(synthesis.document["Outputs"].as_object().unwrap().len(), 2);
}

#[test]
fn test_dependency_order_is_complete() {
    let fixture = fixture();
    let rendered = build_stack(&fixture.definition, &ToolkitSettings::default()).unwrap();
    let order = rendered.stack.dependency_order().unwrap();
    assert_eq!(order.len(), rendered.stack.resources().count());

    let position = |id: &str| order.iter().position(|o| o == id).unwrap();
    for (id, resource) in rendered.stack.resources() {
        for dep in resource.dependencies() {
            assert!(position(&dep) < position(id), "{dep} must precede {id}");
        }
    }
}

#[test]
fn test_missing_deployment_source() {
    let mut fixture = fixture();
    fixture.definition.deployments[0].sources = vec!["/nonexistent/sorry-page".into()];
    let err = synthesize(&fixture.definition, &ToolkitSettings::default()).unwrap_err();
    assert!(matches!(err, AwsError::Asset { .. }));
}

#[tokio::test]
async fn test_provider_synthesizes_and_plans() {
    let fixture = fixture();
    let provider = AwsProvider::new(fixture.definition.clone(), ToolkitSettings::default());
    assert_eq!(provider.name(), "aws");

    let synthesis = provider.synthesize().await.unwrap();
    let plan = provider
        .plan(&synthesis.resources, &Default::default())
        .await
        .unwrap();
    assert_eq!(plan.actions.len(), synthesis.resources.len());

    let unchanged = provider.plan(&synthesis.resources, &synthesis.resources).await.unwrap();
    assert!(!unchanged.has_changes);
}

#[test]
fn test_shipped_stack_declaration() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../stack.kdl");
    let definition = load_stack(Path::new(path)).unwrap();
    assert_eq!(definition.name, "TestSorryPageStack");

    let synthesis = synthesize(&definition, &ToolkitSettings::default()).unwrap();
    let document = &synthesis.document;

    let (_, vpc) = single(document, "AWS::EC2::VPC");
    assert_eq!(vpc["Properties"]["CidrBlock"], json!("10.1.0.0/16"));
    assert_eq!(vpc["Properties"]["EnableDnsHostnames"], json!(true));
    assert_eq!(vpc["Properties"]["EnableDnsSupport"], json!(true));
    assert_eq!(resources_of(document, "AWS::EC2::NatGateway").len(), 1);
    assert_eq!(resources_of(document, "AWS::EC2::Subnet").len(), 4);

    let (_, deployment) = single(document, "Custom::CDKBucketDeployment");
    assert_eq!(deployment["Properties"]["RetainOnDelete"], json!(false));
    assert_eq!(synthesis.artifacts.len(), 1);
    assert!(synthesis.artifacts[0].source.join("index.html").exists());

    let (_, oac) = single(document, "AWS::CloudFront::OriginAccessControl");
    assert_eq!(
        oac["Properties"]["OriginAccessControlConfig"],
        json!({
            "Name": "OriginAccessControlForAppBucket",
            "OriginAccessControlOriginType": "s3",
            "SigningBehavior": "always",
            "SigningProtocol": "sigv4",
            "Description": "S3 Access Control",
        })
    );

    let (_, distribution) = single(document, "AWS::CloudFront::Distribution");
    let config = &distribution["Properties"]["DistributionConfig"];
    assert_eq!(config["HttpVersion"], json!("http2and3"));
    assert_eq!(config["DefaultRootObject"], json!("index.html"));
    assert_eq!(config["Origins"][0]["S3OriginConfig"]["OriginAccessIdentity"], json!(""));
}
