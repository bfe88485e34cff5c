//! データモデル定義
//!
//! スタック定義で宣言するクラウドリソースの型

mod compute;
mod delivery;
mod network;
mod stack;
mod storage;

pub use compute::{ClusterSpec, FargateServiceSpec, is_valid_fargate_size};
pub use delivery::{
    DistributionSpec, HttpVersion, OriginAccessControlSpec, OriginType, PriceClass,
    SigningBehavior, SigningProtocol,
};
pub use network::{
    GatewayEndpointSpec, GatewayService, PlannedSubnet, SubnetSpec, SubnetType, VpcSpec,
};
pub use stack::{ENV_AGNOSTIC_MAX_AZS, StackDefinition, StackEnv};
pub use storage::{
    BlockPublicAccess, BucketSpec, CorsRule, DeploymentSpec, HttpMethod, RemovalPolicy,
};
