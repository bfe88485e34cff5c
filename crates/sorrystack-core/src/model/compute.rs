//! コンピュートモデル
//!
//! ECS クラスターとロードバランサー付き Fargate サービスの定義

use super::network::SubnetType;
use serde::{Deserialize, Serialize};

/// ECS クラスター
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub id: String,
    /// 省略時はプロビジョニング側で自動命名
    pub cluster_name: Option<String>,
    pub container_insights: bool,
}

impl ClusterSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cluster_name: None,
            container_insights: false,
        }
    }
}

/// Application Load Balancer 付き Fargate サービス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FargateServiceSpec {
    pub id: String,
    pub public_load_balancer: bool,
    /// vCPU 単位 (256 = 0.25 vCPU)
    pub cpu: u32,
    pub memory_mib: u32,
    pub desired_count: u32,
    pub assign_public_ip: bool,
    pub task_subnets: SubnetType,
    pub image: String,
    pub container_name: String,
    pub container_port: u16,
    pub listener_port: u16,
}

impl FargateServiceSpec {
    pub fn new(id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            public_load_balancer: true,
            cpu: 256,
            memory_mib: 512,
            desired_count: 1,
            assign_public_ip: false,
            task_subnets: SubnetType::PrivateWithEgress,
            image: image.into(),
            container_name: "web".to_string(),
            container_port: 80,
            listener_port: 80,
        }
    }
}

/// Fargate が受け付ける CPU / メモリの組み合わせか
pub fn is_valid_fargate_size(cpu: u32, memory_mib: u32) -> bool {
    let in_range = |min: u32, max: u32, step: u32| {
        memory_mib >= min && memory_mib <= max && (memory_mib - min) % step == 0
    };
    match cpu {
        256 => matches!(memory_mib, 512 | 1024 | 2048),
        512 => in_range(1024, 4096, 1024),
        1024 => in_range(2048, 8192, 1024),
        2048 => in_range(4096, 16384, 1024),
        4096 => in_range(8192, 30720, 1024),
        8192 => in_range(16384, 61440, 4096),
        16384 => in_range(32768, 122880, 8192),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fargate_sizes() {
        assert!(is_valid_fargate_size(256, 512));
        assert!(is_valid_fargate_size(1024, 3072));
        assert!(!is_valid_fargate_size(256, 4096));
        assert!(!is_valid_fargate_size(300, 512));
        assert!(!is_valid_fargate_size(8192, 18432));
    }

    #[test]
    fn test_service_defaults() {
        let service = FargateServiceSpec::new("Web", "amazon/amazon-ecs-sample");
        assert_eq!(service.cpu, 256);
        assert_eq!(service.memory_mib, 512);
        assert_eq!(service.desired_count, 1);
        assert_eq!(service.task_subnets, SubnetType::PrivateWithEgress);
        assert!(service.public_load_balancer);
        assert!(!service.assign_public_ip);
    }
}
