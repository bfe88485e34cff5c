//! スタック定義の検証
//!
//! 合成前に宣言の整合性を確認し、問題をまとめて報告します。

use crate::error::{Result, StackError};
use crate::model::{StackDefinition, SubnetType, is_valid_fargate_size};
use std::collections::HashSet;
use tracing::{debug, warn};

impl StackDefinition {
    /// 定義全体を検証する
    ///
    /// 見つかった問題はすべて `StackError::Validation` にまとめて返します。
    #[tracing::instrument(skip(self), fields(stack = %self.name))]
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        self.check_ids(&mut problems);
        self.check_network(&mut problems);
        self.check_compute(&mut problems);
        self.check_storage(&mut problems);
        self.check_delivery(&mut problems);

        for bucket in &self.buckets {
            if bucket.leaves_versions_on_destroy() {
                warn!(
                    bucket = %bucket.id,
                    "Versioned bucket with destroy policy keeps noncurrent versions; stack deletion fails unless auto-delete-objects is enabled"
                );
            }
        }

        if problems.is_empty() {
            debug!("Stack definition is valid");
            Ok(())
        } else {
            Err(StackError::Validation(problems))
        }
    }

    fn check_ids(&self, problems: &mut Vec<String>) {
        if self.name.trim().is_empty() {
            problems.push("スタック名が空です".to_string());
        }

        let mut seen = HashSet::new();
        for id in self.construct_ids() {
            if id.trim().is_empty() {
                problems.push("空の id を持つリソースがあります".to_string());
            } else if !id.chars().any(|c| c.is_ascii_alphanumeric()) {
                problems.push(format!("id '{id}' には英数字が含まれていません"));
            } else if !seen.insert(id) {
                problems.push(format!("id '{id}' が重複しています"));
            }
        }
    }

    fn check_network(&self, problems: &mut Vec<String>) {
        let vpc = &self.vpc;
        if vpc.max_azs == 0 {
            problems.push("max-azs は 1 以上にしてください".to_string());
            return;
        }

        if !self.env.availability_zones.is_empty()
            && self.env.availability_zones.len() < vpc.max_azs as usize
        {
            debug!(
                zones = self.env.availability_zones.len(),
                max_azs = vpc.max_azs,
                "Fewer explicit availability zones than max-azs"
            );
        }

        let az_count = self.availability_zone_count();
        let subnets = vpc.effective_subnets();

        let mut names = HashSet::new();
        for subnet in &subnets {
            if !names.insert(subnet.name.as_str()) {
                problems.push(format!("サブネット名 '{}' が重複しています", subnet.name));
            }
            if let Some(mask) = subnet.cidr_mask
                && !(16..=28).contains(&mask)
            {
                problems.push(format!(
                    "サブネット '{}' の cidr-mask /{mask} は 16〜28 の範囲外です",
                    subnet.name
                ));
            }
        }

        let has_type = |t: SubnetType| subnets.iter().any(|s| s.subnet_type == t);
        let nat_gateways = vpc.effective_nat_gateways(az_count);

        if nat_gateways as usize > az_count {
            problems.push(format!(
                "NAT ゲートウェイ数 {nat_gateways} が AZ 数 {az_count} を超えています"
            ));
        }
        if nat_gateways > 0 && !has_type(SubnetType::Public) {
            problems.push("NAT ゲートウェイには public サブネットが必要です".to_string());
        }
        if has_type(SubnetType::PrivateWithEgress) && nat_gateways == 0 {
            problems.push(
                "private-with-egress サブネットには NAT ゲートウェイが必要です".to_string(),
            );
        }

        if let Err(e) = vpc.plan_subnets(az_count) {
            problems.push(e.to_string());
        }

        let mut endpoint_ids = HashSet::new();
        for endpoint in &vpc.gateway_endpoints {
            if !endpoint_ids.insert(endpoint.id.as_str()) {
                problems.push(format!(
                    "ゲートウェイエンドポイント '{}' が重複しています",
                    endpoint.id
                ));
            }
        }
    }

    fn check_compute(&self, problems: &mut Vec<String>) {
        if !self.services.is_empty() && self.cluster.is_none() {
            problems.push("service を宣言するには cluster が必要です".to_string());
        }

        let subnet_types: HashSet<_> = self
            .vpc
            .effective_subnets()
            .iter()
            .map(|s| s.subnet_type)
            .collect();

        for service in &self.services {
            if service.image.trim().is_empty() {
                problems.push(format!("サービス '{}' に image が指定されていません", service.id));
            }
            if !is_valid_fargate_size(service.cpu, service.memory_mib) {
                problems.push(format!(
                    "サービス '{}' の cpu {} / memory {} は Fargate で使えない組み合わせです",
                    service.id, service.cpu, service.memory_mib
                ));
            }
            if !subnet_types.contains(&service.task_subnets) {
                problems.push(format!(
                    "サービス '{}' の task-subnets ({}) に該当するサブネットがありません",
                    service.id, service.task_subnets
                ));
            }
            if service.public_load_balancer && !subnet_types.contains(&SubnetType::Public) {
                problems.push(format!(
                    "サービス '{}' の公開ロードバランサーには public サブネットが必要です",
                    service.id
                ));
            }
            if service.assign_public_ip && service.task_subnets != SubnetType::Public {
                problems.push(format!(
                    "サービス '{}' の assign-public-ip は public サブネットでのみ有効です",
                    service.id
                ));
            }
            if service.container_port == 0 || service.listener_port == 0 {
                problems.push(format!("サービス '{}' のポートに 0 は使えません", service.id));
            }
        }
    }

    fn check_storage(&self, problems: &mut Vec<String>) {
        for bucket in &self.buckets {
            if let Some(name) = &bucket.bucket_name
                && !is_valid_bucket_name(name)
            {
                problems.push(format!("バケット名 '{name}' が不正です"));
            }
            if bucket.auto_delete_objects && bucket.removal_policy != crate::model::RemovalPolicy::Destroy
            {
                problems.push(format!(
                    "バケット '{}' の auto-delete-objects には removal-policy destroy が必要です",
                    bucket.id
                ));
            }
        }

        for deployment in &self.deployments {
            if self.bucket(&deployment.destination_bucket).is_none() {
                problems.push(format!(
                    "デプロイ '{}' の配置先バケット '{}' が見つかりません",
                    deployment.id, deployment.destination_bucket
                ));
            }
            if deployment.sources.is_empty() {
                problems.push(format!("デプロイ '{}' に source がありません", deployment.id));
            }
        }
    }

    fn check_delivery(&self, problems: &mut Vec<String>) {
        for oac in &self.origin_access_controls {
            if oac.name.trim().is_empty() || oac.name.len() > 64 {
                problems.push(format!(
                    "OAC '{}' の name は 1〜64 文字にしてください",
                    oac.id
                ));
            }
        }

        for distribution in &self.distributions {
            if self.bucket(&distribution.origin_bucket).is_none() {
                problems.push(format!(
                    "ディストリビューション '{}' のオリジンバケット '{}' が見つかりません",
                    distribution.id, distribution.origin_bucket
                ));
            }
            if let Some(oac_id) = &distribution.origin_access_control {
                match self.origin_access_control(oac_id) {
                    None => problems.push(format!(
                        "ディストリビューション '{}' の OAC '{oac_id}' が見つかりません",
                        distribution.id
                    )),
                    Some(oac) if oac.origin_type != crate::model::OriginType::S3 => {
                        problems.push(format!(
                            "OAC '{oac_id}' の origin-type は s3 である必要があります"
                        ))
                    }
                    Some(_) => {}
                }
            }
            if let Some(root) = &distribution.default_root_object
                && root.starts_with('/')
            {
                problems.push(format!(
                    "ディストリビューション '{}' の default-root-object は '/' で始められません",
                    distribution.id
                ));
            }
        }
    }
}

/// S3 バケット名の命名規則
fn is_valid_bucket_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;

    fn valid_stack() -> StackDefinition {
        let mut stack = StackDefinition::new("TestSorryPageStack");
        stack.vpc.cidr = "10.1.0.0/16".parse().unwrap();
        stack.vpc.max_azs = 2;
        stack.vpc.nat_gateways = Some(1);
        stack.vpc.subnets = vec![
            SubnetSpec::new("PublicSubnet", SubnetType::Public).with_mask(24),
            SubnetSpec::new("PrivateSubnet", SubnetType::PrivateWithEgress).with_mask(24),
        ];
        stack.cluster = Some(ClusterSpec::new("Cluster"));
        stack
            .services
            .push(FargateServiceSpec::new("SampleWebService", "amazon/amazon-ecs-sample"));
        stack.buckets.push(BucketSpec::new("sorry-page-bucket"));
        let mut deployment = DeploymentSpec::new("DeployContents", "sorry-page-bucket");
        deployment.sources.push("./sorry-page-contents".into());
        stack.deployments.push(deployment);
        stack
            .origin_access_controls
            .push(OriginAccessControlSpec::new("OriginAccessControl", "OacForBucket"));
        let mut distribution = DistributionSpec::new("Distribution", "sorry-page-bucket");
        distribution.origin_access_control = Some("OriginAccessControl".to_string());
        stack.distributions.push(distribution);
        stack
    }

    fn problems(stack: &StackDefinition) -> Vec<String> {
        match stack.validate() {
            Err(StackError::Validation(problems)) => problems,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_stack() {
        valid_stack().validate().unwrap();
    }

    #[test]
    fn test_duplicate_ids() {
        let mut stack = valid_stack();
        stack.buckets.push(BucketSpec::new("Cluster"));
        assert!(problems(&stack).iter().any(|p| p.contains("'Cluster'")));
    }

    #[test]
    fn test_id_without_alphanumerics() {
        let mut stack = valid_stack();
        stack.origin_access_controls.push(OriginAccessControlSpec::new("-", "Other"));
        assert!(problems(&stack).iter().any(|p| p.contains("'-'") && p.contains("英数字")));
    }

    #[test]
    fn test_egress_without_nat() {
        let mut stack = valid_stack();
        stack.vpc.nat_gateways = Some(0);
        assert!(problems(&stack).iter().any(|p| p.contains("NAT")));
    }

    #[test]
    fn test_too_many_nat_gateways() {
        let mut stack = valid_stack();
        stack.vpc.nat_gateways = Some(3);
        assert!(problems(&stack).iter().any(|p| p.contains("AZ 数")));
    }

    #[test]
    fn test_invalid_fargate_size() {
        let mut stack = valid_stack();
        stack.services[0].memory_mib = 4096;
        assert!(problems(&stack).iter().any(|p| p.contains("Fargate")));
    }

    #[test]
    fn test_service_without_cluster() {
        let mut stack = valid_stack();
        stack.cluster = None;
        assert!(problems(&stack).iter().any(|p| p.contains("cluster")));
    }

    #[test]
    fn test_dangling_bucket_and_oac_references() {
        let mut stack = valid_stack();
        stack.deployments[0].destination_bucket = "missing".to_string();
        stack.distributions[0].origin_access_control = Some("nope".to_string());
        let found = problems(&stack);
        assert!(found.iter().any(|p| p.contains("'missing'")));
        assert!(found.iter().any(|p| p.contains("'nope'")));
    }

    #[test]
    fn test_subnet_mask_out_of_range() {
        let mut stack = valid_stack();
        stack.vpc.subnets[0].cidr_mask = Some(30);
        assert!(problems(&stack).iter().any(|p| p.contains("/30")));
    }

    #[test]
    fn test_auto_delete_requires_destroy() {
        let mut stack = valid_stack();
        stack.buckets[0].auto_delete_objects = true;
        assert!(problems(&stack).iter().any(|p| p.contains("auto-delete-objects")));
    }

    #[test]
    fn test_bucket_name_rules() {
        assert!(is_valid_bucket_name("sorry-page-bucket"));
        assert!(!is_valid_bucket_name("Sorry_Page"));
        assert!(!is_valid_bucket_name("ab"));
        assert!(!is_valid_bucket_name("-leading"));
    }
}
