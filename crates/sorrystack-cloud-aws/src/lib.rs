//! AWS provider for sorrystack
//!
//! This crate implements the CloudProvider trait for AWS by rendering a
//! stack definition into a CloudFormation template.
//!
//! # Features
//!
//! - VPC with public/private subnets, NAT gateways and gateway endpoints
//! - ECS cluster and application-load-balanced Fargate services
//! - S3 buckets with lazy bucket policies and auto-delete support
//! - Bucket deployments backed by content-hashed assets
//! - CloudFront distributions with origin access control
//!
//! # Example
//!
//! ```ignore
//! use sorrystack_cloud::CloudProvider;
//! use sorrystack_cloud_aws::AwsProvider;
//!
//! let definition = sorrystack_core::load_stack(Path::new("stack.kdl"))?;
//! let provider = AwsProvider::new(definition, ToolkitSettings::default());
//!
//! let synthesis = provider.synthesize().await?;
//! synthesis.write_to(Path::new("stack.out")).await?;
//! ```

pub mod asset;
pub mod cloudfront;
pub mod deployment;
pub mod ecs;
pub mod error;
pub mod iam;
pub mod intrinsic;
pub mod naming;
pub mod provider;
pub mod s3;
pub mod sorry_page;
pub mod template;
pub mod vpc;

pub use error::{AwsError, Result};
pub use naming::logical_id;
pub use provider::AwsProvider;
pub use sorry_page::{PROVIDER_NAME, RenderedStack, build_stack, synthesize};
pub use template::{CfnOutput, CfnResource, Stack};
