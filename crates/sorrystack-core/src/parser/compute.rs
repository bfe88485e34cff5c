//! クラスター / サービスノードのパース

use super::{first_bool, first_integer, first_parsed, first_string, required_id};
use crate::error::{Result, StackError};
use crate::model::{ClusterSpec, FargateServiceSpec};
use kdl::KdlNode;

/// cluster ノードをパース
pub fn parse_cluster(node: &KdlNode) -> Result<ClusterSpec> {
    let mut cluster = ClusterSpec::new(first_string(node).unwrap_or_else(|| "Cluster".to_string()));

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "cluster_name" | "cluster-name" | "name" => cluster.cluster_name = first_string(child),
                "container_insights" | "container-insights" => {
                    cluster.container_insights = first_bool(child)?;
                }
                _ => {}
            }
        }
    }

    Ok(cluster)
}

/// service ノードをパース（ALB 付き Fargate サービス）
pub fn parse_service(node: &KdlNode) -> Result<FargateServiceSpec> {
    let id = required_id(node)?;
    let mut service = FargateServiceSpec::new(id, String::new());

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "image" => {
                    service.image = first_string(child).unwrap_or_default();
                }
                "public_load_balancer" | "public-load-balancer" => {
                    service.public_load_balancer = first_bool(child)?;
                }
                "cpu" => service.cpu = first_integer(child)?,
                "memory" | "memory_limit_mib" | "memory-limit-mib" => {
                    service.memory_mib = first_integer(child)?;
                }
                "desired_count" | "desired-count" => service.desired_count = first_integer(child)?,
                "assign_public_ip" | "assign-public-ip" => {
                    service.assign_public_ip = first_bool(child)?;
                }
                "task_subnets" | "task-subnets" => service.task_subnets = first_parsed(child)?,
                "container_name" | "container-name" => {
                    service.container_name = first_string(child).unwrap_or_default();
                }
                "container_port" | "container-port" => {
                    service.container_port = first_integer(child)?;
                }
                "listener_port" | "listener-port" => service.listener_port = first_integer(child)?,
                _ => {}
            }
        }
    }

    if service.image.is_empty() {
        return Err(StackError::InvalidConfig(format!(
            "サービス '{}' に image が指定されていません",
            service.id
        )));
    }
    if service.container_name.is_empty() {
        service.container_name = "web".to_string();
    }

    Ok(service)
}
