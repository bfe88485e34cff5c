//! スタック定義
//!
//! 1回の合成で評価される宣言の単位

use super::compute::{ClusterSpec, FargateServiceSpec};
use super::delivery::{DistributionSpec, OriginAccessControlSpec};
use super::network::VpcSpec;
use super::storage::{BucketSpec, DeploymentSpec};
use serde::{Deserialize, Serialize};

/// 環境非依存スタックで使う AZ 数の上限
pub const ENV_AGNOSTIC_MAX_AZS: usize = 2;

/// デプロイ先アカウント / リージョン
///
/// 未指定の値は合成時に擬似パラメータ (AWS::AccountId など) になる。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StackEnv {
    pub account: Option<String>,
    pub region: Option<String>,
    /// 明示的な AZ 名（未指定なら Fn::GetAZs で解決）
    pub availability_zones: Vec<String>,
}

impl StackEnv {
    pub fn is_agnostic(&self) -> bool {
        self.account.is_none() && self.region.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefinition {
    pub name: String,
    pub description: Option<String>,
    pub env: StackEnv,
    pub vpc: VpcSpec,
    pub cluster: Option<ClusterSpec>,
    pub services: Vec<FargateServiceSpec>,
    pub buckets: Vec<BucketSpec>,
    pub deployments: Vec<DeploymentSpec>,
    pub origin_access_controls: Vec<OriginAccessControlSpec>,
    pub distributions: Vec<DistributionSpec>,
}

impl StackDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            env: StackEnv::default(),
            vpc: VpcSpec::default(),
            cluster: None,
            services: Vec::new(),
            buckets: Vec::new(),
            deployments: Vec::new(),
            origin_access_controls: Vec::new(),
            distributions: Vec::new(),
        }
    }

    /// 実際に使う AZ の数
    pub fn availability_zone_count(&self) -> usize {
        let max_azs = self.vpc.max_azs as usize;
        if self.env.availability_zones.is_empty() {
            max_azs.min(ENV_AGNOSTIC_MAX_AZS)
        } else {
            max_azs.min(self.env.availability_zones.len())
        }
    }

    pub fn bucket(&self, id: &str) -> Option<&BucketSpec> {
        self.buckets.iter().find(|b| b.id == id)
    }

    pub fn origin_access_control(&self, id: &str) -> Option<&OriginAccessControlSpec> {
        self.origin_access_controls.iter().find(|o| o.id == id)
    }

    /// 宣言された全リソースの構成 id
    pub fn construct_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.vpc.id.as_str()];
        ids.extend(self.cluster.iter().map(|c| c.id.as_str()));
        ids.extend(self.services.iter().map(|s| s.id.as_str()));
        ids.extend(self.buckets.iter().map(|b| b.id.as_str()));
        ids.extend(self.deployments.iter().map(|d| d.id.as_str()));
        ids.extend(self.origin_access_controls.iter().map(|o| o.id.as_str()));
        ids.extend(self.distributions.iter().map(|d| d.id.as_str()));
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_az_count_env_agnostic() {
        let mut stack = StackDefinition::new("Test");
        stack.vpc.max_azs = 3;
        assert_eq!(stack.availability_zone_count(), 2);

        stack.vpc.max_azs = 1;
        assert_eq!(stack.availability_zone_count(), 1);
    }

    #[test]
    fn test_az_count_explicit_zones() {
        let mut stack = StackDefinition::new("Test");
        stack.vpc.max_azs = 3;
        stack.env.availability_zones = vec![
            "ap-northeast-1a".to_string(),
            "ap-northeast-1c".to_string(),
            "ap-northeast-1d".to_string(),
        ];
        assert_eq!(stack.availability_zone_count(), 3);
    }
}
