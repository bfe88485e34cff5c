//! ECS cluster and load-balanced Fargate service

use crate::error::Result;
use crate::iam::{PolicyStatement, ServiceRole};
use crate::intrinsic;
use crate::naming::logical_id;
use crate::template::{CfnOutput, CfnResource, Stack};
use crate::vpc::VpcRefs;
use serde_json::json;
use sorrystack_core::{ClusterSpec, FargateServiceSpec, SubnetType};
use tracing::debug;

const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

/// Render the cluster; returns its logical id
pub fn add_cluster(stack: &mut Stack, spec: &ClusterSpec) -> Result<String> {
    let cluster_id = logical_id(&[spec.id.as_str(), "Resource"]);
    let mut properties = json!({});
    if let Some(name) = &spec.cluster_name {
        properties["ClusterName"] = json!(name);
    }
    if spec.container_insights {
        properties["ClusterSettings"] = json!([{ "Name": "containerInsights", "Value": "enabled" }]);
    }
    stack.add_resource(&cluster_id, CfnResource::new("AWS::ECS::Cluster", properties))?;
    Ok(cluster_id)
}

/// Logical ids of a rendered Fargate service
#[derive(Debug, Clone)]
pub struct ServiceRefs {
    pub load_balancer_id: String,
    pub listener_id: String,
    pub target_group_id: String,
    pub task_definition_id: String,
    pub service_id: String,
}

struct Path<'a> {
    service: &'a str,
}

impl Path<'_> {
    fn id(&self, rest: &[&str]) -> String {
        let mut path = vec![self.service];
        path.extend_from_slice(rest);
        logical_id(&path)
    }
}

/// Render an application-load-balanced Fargate service
#[tracing::instrument(skip_all, fields(service = %spec.id))]
pub fn add_load_balanced_fargate_service(
    stack: &mut Stack,
    spec: &FargateServiceSpec,
    cluster_id: &str,
    vpc: &VpcRefs,
) -> Result<ServiceRefs> {
    let path = Path { service: &spec.id };
    let construct_path = format!("{}/{}", stack.name, spec.id);
    let listener_port = spec.listener_port;
    let container_port = spec.container_port;

    // Load balancer
    let lb_sg_id = path.id(&["LB", "SecurityGroup", "Resource"]);
    stack.add_resource(
        &lb_sg_id,
        CfnResource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("Automatically created Security Group for ELB {}LB", alphanumeric(&construct_path)),
                "SecurityGroupIngress": [{
                    "CidrIp": "0.0.0.0/0",
                    "Description": format!("Allow from anyone on port {listener_port}"),
                    "FromPort": listener_port,
                    "IpProtocol": "tcp",
                    "ToPort": listener_port,
                }],
                "VpcId": vpc.vpc_ref(),
            }),
        ),
    )?;

    let (scheme, lb_subnets) = if spec.public_load_balancer {
        ("internet-facing", SubnetType::Public)
    } else {
        ("internal", SubnetType::PrivateWithEgress)
    };
    let load_balancer_id = path.id(&["LB", "Resource"]);
    let mut load_balancer = CfnResource::new(
        "AWS::ElasticLoadBalancingV2::LoadBalancer",
        json!({
            "LoadBalancerAttributes": [{ "Key": "deletion_protection.enabled", "Value": "false" }],
            "Scheme": scheme,
            "SecurityGroups": [intrinsic::get_att(&lb_sg_id, "GroupId")],
            "Subnets": vpc.subnet_refs(lb_subnets),
            "Type": "application",
        }),
    );
    if spec.public_load_balancer {
        for dep in vpc.internet_dependencies() {
            load_balancer = load_balancer.depends_on(dep);
        }
    }
    stack.add_resource(&load_balancer_id, load_balancer)?;

    let target_group_id = path.id(&["LB", "PublicListener", "ECSGroup", "Resource"]);
    stack.add_resource(
        &target_group_id,
        CfnResource::new(
            "AWS::ElasticLoadBalancingV2::TargetGroup",
            json!({
                "Port": container_port,
                "Protocol": "HTTP",
                "TargetGroupAttributes": [{ "Key": "stickiness.enabled", "Value": "false" }],
                "TargetType": "ip",
                "VpcId": vpc.vpc_ref(),
            }),
        ),
    )?;

    let listener_id = path.id(&["LB", "PublicListener", "Resource"]);
    stack.add_resource(
        &listener_id,
        CfnResource::new(
            "AWS::ElasticLoadBalancingV2::Listener",
            json!({
                "DefaultActions": [{
                    "TargetGroupArn": intrinsic::reference(&target_group_id),
                    "Type": "forward",
                }],
                "LoadBalancerArn": intrinsic::reference(&load_balancer_id),
                "Port": listener_port,
                "Protocol": "HTTP",
            }),
        ),
    )?;

    // Task definition
    let log_group_id = path.id(&["TaskDef", spec.container_name.as_str(), "LogGroup", "Resource"]);
    stack.add_resource(
        &log_group_id,
        CfnResource::new("AWS::Logs::LogGroup", json!({})).with_removal_policy("Retain"),
    )?;

    let task_role = ServiceRole::new(&[spec.id.as_str(), "TaskDef", "TaskRole"], ECS_TASKS_PRINCIPAL)
        .add_to_stack(stack)?;

    let mut execution_role =
        ServiceRole::new(&[spec.id.as_str(), "TaskDef", "ExecutionRole"], ECS_TASKS_PRINCIPAL);
    execution_role.add_to_policy(
        PolicyStatement::allow(["logs:CreateLogStream", "logs:PutLogEvents"])
            .on(intrinsic::get_att(&log_group_id, "Arn")),
    );
    let execution_role = execution_role.add_to_stack(stack)?;

    let task_definition_id = path.id(&["TaskDef", "Resource"]);
    stack.add_resource(
        &task_definition_id,
        CfnResource::new(
            "AWS::ECS::TaskDefinition",
            json!({
                "ContainerDefinitions": [{
                    "Essential": true,
                    "Image": spec.image,
                    "LogConfiguration": {
                        "LogDriver": "awslogs",
                        "Options": {
                            "awslogs-group": intrinsic::reference(&log_group_id),
                            "awslogs-region": intrinsic::region(),
                            "awslogs-stream-prefix": spec.id,
                        }
                    },
                    "Name": spec.container_name,
                    "PortMappings": [{ "ContainerPort": container_port, "Protocol": "tcp" }],
                }],
                "Cpu": spec.cpu.to_string(),
                "ExecutionRoleArn": execution_role.arn(),
                "Family": format!("{}{}TaskDef", alphanumeric(&stack.name), alphanumeric(&spec.id)),
                "Memory": spec.memory_mib.to_string(),
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "TaskRoleArn": task_role.arn(),
            }),
        ),
    )?;

    // Service
    let service_sg_id = path.id(&["Service", "SecurityGroup", "Resource"]);
    stack.add_resource(
        &service_sg_id,
        CfnResource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("{construct_path}/Service/SecurityGroup"),
                "SecurityGroupEgress": [{
                    "CidrIp": "0.0.0.0/0",
                    "Description": "Allow all outbound traffic by default",
                    "IpProtocol": "-1",
                }],
                "VpcId": vpc.vpc_ref(),
            }),
        ),
    )?;

    stack.add_resource(
        path.id(&["LB", "SecurityGroup", "ToServiceSecurityGroup"]),
        CfnResource::new(
            "AWS::EC2::SecurityGroupEgress",
            json!({
                "Description": "Load balancer to target",
                "DestinationSecurityGroupId": intrinsic::get_att(&service_sg_id, "GroupId"),
                "FromPort": container_port,
                "GroupId": intrinsic::get_att(&lb_sg_id, "GroupId"),
                "IpProtocol": "tcp",
                "ToPort": container_port,
            }),
        ),
    )?;
    stack.add_resource(
        path.id(&["Service", "SecurityGroup", "FromLoadBalancer"]),
        CfnResource::new(
            "AWS::EC2::SecurityGroupIngress",
            json!({
                "Description": "Load balancer to target",
                "FromPort": container_port,
                "GroupId": intrinsic::get_att(&service_sg_id, "GroupId"),
                "IpProtocol": "tcp",
                "SourceSecurityGroupId": intrinsic::get_att(&lb_sg_id, "GroupId"),
                "ToPort": container_port,
            }),
        ),
    )?;

    let service_id = path.id(&["Service", "Service"]);
    let assign_public_ip = if spec.assign_public_ip { "ENABLED" } else { "DISABLED" };
    let mut service = CfnResource::new(
        "AWS::ECS::Service",
        json!({
            "Cluster": intrinsic::reference(cluster_id),
            "DeploymentConfiguration": {
                "MaximumPercent": 200,
                "MinimumHealthyPercent": 50,
            },
            "DesiredCount": spec.desired_count,
            "EnableECSManagedTags": false,
            "HealthCheckGracePeriodSeconds": 60,
            "LaunchType": "FARGATE",
            "LoadBalancers": [{
                "ContainerName": spec.container_name,
                "ContainerPort": container_port,
                "TargetGroupArn": intrinsic::reference(&target_group_id),
            }],
            "NetworkConfiguration": {
                "AwsvpcConfiguration": {
                    "AssignPublicIp": assign_public_ip,
                    "SecurityGroups": [intrinsic::get_att(&service_sg_id, "GroupId")],
                    "Subnets": vpc.subnet_refs(spec.task_subnets),
                }
            },
            "TaskDefinition": intrinsic::reference(&task_definition_id),
        }),
    )
    .depends_on(listener_id.clone())
    .depends_on(task_role.role_id.clone());
    if let Some(policy) = &execution_role.policy_id {
        service = service.depends_on(policy.clone());
    }
    stack.add_resource(&service_id, service)?;

    let dns = intrinsic::get_att(&load_balancer_id, "DNSName");
    stack.add_output(path.id(&["LoadBalancerDNS"]), CfnOutput::new(dns.clone()));
    stack.add_output(
        path.id(&["ServiceURL"]),
        CfnOutput::new(intrinsic::join("", vec![json!("http://"), dns])),
    );

    debug!(cpu = spec.cpu, memory = spec.memory_mib, "Rendered Fargate service");
    Ok(ServiceRefs {
        load_balancer_id,
        listener_id,
        target_group_id,
        task_definition_id,
        service_id,
    })
}

fn alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vpc::add_vpc;
    use sorrystack_core::{StackEnv, SubnetSpec, VpcSpec};

    fn setup() -> (Stack, VpcRefs, String) {
        let mut stack = Stack::new("TestSorryPageStack");
        let vpc_spec = VpcSpec {
            cidr: "10.1.0.0/16".parse().unwrap(),
            nat_gateways: Some(1),
            max_azs: 2,
            subnets: vec![
                SubnetSpec::new("PublicSubnet", SubnetType::Public).with_mask(24),
                SubnetSpec::new("PrivateSubnet", SubnetType::PrivateWithEgress).with_mask(24),
            ],
            ..VpcSpec::default()
        };
        let vpc = add_vpc(&mut stack, &vpc_spec, &StackEnv::default(), 2).unwrap();
        let cluster = add_cluster(&mut stack, &ClusterSpec::new("Cluster")).unwrap();
        (stack, vpc, cluster)
    }

    fn sample_service() -> FargateServiceSpec {
        let mut spec = FargateServiceSpec::new("SampleWebService", "amazon/amazon-ecs-sample");
        spec.public_load_balancer = true;
        spec.cpu = 256;
        spec.memory_mib = 512;
        spec.desired_count = 1;
        spec.assign_public_ip = false;
        spec.task_subnets = SubnetType::PrivateWithEgress;
        spec
    }

    #[test]
    fn test_fargate_service_properties() {
        let (mut stack, vpc, cluster) = setup();
        let refs = add_load_balanced_fargate_service(&mut stack, &sample_service(), &cluster, &vpc).unwrap();

        let service = stack.resource(&refs.service_id).unwrap();
        assert_eq!(service.properties["DesiredCount"], json!(1));
        assert_eq!(service.properties["LaunchType"], json!("FARGATE"));
        let network = &service.properties["NetworkConfiguration"]["AwsvpcConfiguration"];
        assert_eq!(network["AssignPublicIp"], json!("DISABLED"));
        assert_eq!(
            network["Subnets"],
            json!(vpc.subnet_refs(SubnetType::PrivateWithEgress))
        );
        assert!(service.depends_on.contains(&refs.listener_id));

        let task = stack.resource(&refs.task_definition_id).unwrap();
        assert_eq!(task.properties["Cpu"], json!("256"));
        assert_eq!(task.properties["Memory"], json!("512"));
        assert_eq!(
            task.properties["ContainerDefinitions"][0]["Image"],
            json!("amazon/amazon-ecs-sample")
        );

        let lb = stack.resource(&refs.load_balancer_id).unwrap();
        assert_eq!(lb.properties["Scheme"], json!("internet-facing"));
        assert_eq!(lb.properties["Subnets"], json!(vpc.subnet_refs(SubnetType::Public)));

        stack.validate().unwrap();
    }

    #[test]
    fn test_outputs_reference_load_balancer() {
        let (mut stack, vpc, cluster) = setup();
        let refs = add_load_balanced_fargate_service(&mut stack, &sample_service(), &cluster, &vpc).unwrap();
        let outputs: Vec<_> = stack.outputs().collect();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().any(|(_, o)| o.value
            == json!({ "Fn::GetAtt": [&refs.load_balancer_id, "DNSName"] })));
    }

    #[test]
    fn test_cluster_insights() {
        let mut stack = Stack::new("S");
        let mut spec = ClusterSpec::new("Cluster");
        spec.container_insights = true;
        let id = add_cluster(&mut stack, &spec).unwrap();
        assert_eq!(
            stack.resource(&id).unwrap().properties["ClusterSettings"][0]["Value"],
            json!("enabled")
        );
    }
}
