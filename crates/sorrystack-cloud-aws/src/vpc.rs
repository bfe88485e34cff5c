//! VPC construct
//!
//! Renders the network: VPC, internet gateway, per-AZ subnets with route
//! tables, NAT gateways for private-with-egress subnets and gateway endpoints.

use crate::error::Result;
use crate::intrinsic;
use crate::naming::logical_id;
use crate::template::{CfnResource, Stack};
use serde_json::{Value, json};
use sorrystack_core::{Ipv4Cidr, PlannedSubnet, StackEnv, SubnetType, VpcSpec};
use tracing::debug;

/// A rendered subnet and its routing resources
#[derive(Debug, Clone)]
pub struct SubnetRef {
    pub group: String,
    pub subnet_type: SubnetType,
    pub az_index: usize,
    pub cidr: Ipv4Cidr,
    pub subnet_id: String,
    pub route_table_id: String,
    pub association_id: String,
    pub default_route_id: Option<String>,
}

/// Logical ids of the rendered network
#[derive(Debug, Clone)]
pub struct VpcRefs {
    pub vpc_id: String,
    pub gateway_attachment_id: Option<String>,
    pub subnets: Vec<SubnetRef>,
    pub nat_gateway_ids: Vec<String>,
    pub endpoint_ids: Vec<String>,
}

impl VpcRefs {
    pub fn vpc_ref(&self) -> Value {
        intrinsic::reference(&self.vpc_id)
    }

    pub fn subnets_of(&self, subnet_type: SubnetType) -> impl Iterator<Item = &SubnetRef> {
        self.subnets
            .iter()
            .filter(move |s| s.subnet_type == subnet_type)
    }

    /// `Ref` values of every subnet of the given type
    pub fn subnet_refs(&self, subnet_type: SubnetType) -> Vec<Value> {
        self.subnets_of(subnet_type)
            .map(|s| intrinsic::reference(&s.subnet_id))
            .collect()
    }

    /// Resources that must exist before something is reachable from the internet
    pub fn internet_dependencies(&self) -> Vec<String> {
        self.subnets_of(SubnetType::Public)
            .flat_map(|s| {
                s.default_route_id
                    .iter()
                    .cloned()
                    .chain(std::iter::once(s.association_id.clone()))
            })
            .collect()
    }
}

/// AZ of the given index: literal when the environment lists zones, else Fn::GetAZs
fn availability_zone(env: &StackEnv, index: usize) -> Value {
    match env.availability_zones.get(index) {
        Some(zone) => json!(zone),
        None => intrinsic::select(index, intrinsic::get_azs()),
    }
}

fn name_tag(value: String) -> Value {
    json!({ "Key": "Name", "Value": value })
}

/// Render the VPC into the stack
#[tracing::instrument(skip_all, fields(vpc = %spec.id))]
pub fn add_vpc(
    stack: &mut Stack,
    spec: &VpcSpec,
    env: &StackEnv,
    az_count: usize,
) -> Result<VpcRefs> {
    let vpc_id = logical_id(&[spec.id.as_str(), "Resource"]);
    let vpc_path = format!("{}/{}", stack.name, spec.id);
    stack.add_resource(
        &vpc_id,
        CfnResource::new(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": spec.cidr.to_string(),
                "EnableDnsHostnames": spec.enable_dns_hostnames,
                "EnableDnsSupport": spec.enable_dns_support,
                "InstanceTenancy": "default",
                "Tags": [name_tag(vpc_path.clone())],
            }),
        ),
    )?;

    let planned = spec.plan_subnets(az_count)?;
    let has_public = planned.iter().any(|s| s.subnet_type == SubnetType::Public);

    let gateway_attachment_id = if has_public {
        let igw_id = logical_id(&[spec.id.as_str(), "IGW"]);
        stack.add_resource(
            &igw_id,
            CfnResource::new(
                "AWS::EC2::InternetGateway",
                json!({ "Tags": [name_tag(vpc_path.clone())] }),
            ),
        )?;
        let attachment_id = logical_id(&[spec.id.as_str(), "VPCGW"]);
        stack.add_resource(
            &attachment_id,
            CfnResource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({
                    "InternetGatewayId": intrinsic::reference(&igw_id),
                    "VpcId": intrinsic::reference(&vpc_id),
                }),
            ),
        )?;
        Some((igw_id, attachment_id))
    } else {
        None
    };

    let mut subnets = Vec::with_capacity(planned.len());
    for subnet in &planned {
        subnets.push(add_subnet(stack, spec, env, &vpc_id, &vpc_path, subnet)?);
    }

    // Default routes for public subnets
    if let Some((igw_id, attachment_id)) = &gateway_attachment_id {
        for subnet in subnets
            .iter_mut()
            .filter(|s| s.subnet_type == SubnetType::Public)
        {
            let route_id = logical_id(&[spec.id.as_str(), construct_name(subnet).as_str(), "DefaultRoute"]);
            stack.add_resource(
                &route_id,
                CfnResource::new(
                    "AWS::EC2::Route",
                    json!({
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": intrinsic::reference(igw_id),
                        "RouteTableId": intrinsic::reference(&subnet.route_table_id),
                    }),
                )
                .depends_on(attachment_id.clone()),
            )?;
            subnet.default_route_id = Some(route_id);
        }
    }

    let nat_gateway_ids = add_nat_gateways(stack, spec, &vpc_path, &mut subnets, az_count)?;

    let mut endpoint_ids = Vec::with_capacity(spec.gateway_endpoints.len());
    for endpoint in &spec.gateway_endpoints {
        let endpoint_id = logical_id(&[spec.id.as_str(), endpoint.id.as_str(), "Resource"]);
        let route_tables: Vec<Value> = subnets
            .iter()
            .map(|s| intrinsic::reference(&s.route_table_id))
            .collect();
        stack.add_resource(
            &endpoint_id,
            CfnResource::new(
                "AWS::EC2::VPCEndpoint",
                json!({
                    "RouteTableIds": route_tables,
                    "ServiceName": intrinsic::join("", vec![
                        json!("com.amazonaws."),
                        intrinsic::region(),
                        Value::String(format!(".{}", endpoint.service.service_suffix())),
                    ]),
                    "VpcEndpointType": "Gateway",
                    "VpcId": intrinsic::reference(&vpc_id),
                }),
            ),
        )?;
        endpoint_ids.push(endpoint_id);
    }

    debug!(
        subnets = subnets.len(),
        nat_gateways = nat_gateway_ids.len(),
        endpoints = endpoint_ids.len(),
        "Rendered VPC"
    );

    Ok(VpcRefs {
        vpc_id,
        gateway_attachment_id: gateway_attachment_id.map(|(_, attachment)| attachment),
        subnets,
        nat_gateway_ids,
        endpoint_ids,
    })
}

fn construct_name(subnet: &SubnetRef) -> String {
    format!("{}Subnet{}", subnet.group, subnet.az_index + 1)
}

fn add_subnet(
    stack: &mut Stack,
    spec: &VpcSpec,
    env: &StackEnv,
    vpc_id: &str,
    vpc_path: &str,
    subnet: &PlannedSubnet,
) -> Result<SubnetRef> {
    let name = subnet.construct_name();
    let subnet_id = logical_id(&[spec.id.as_str(), name.as_str(), "Subnet"]);
    stack.add_resource(
        &subnet_id,
        CfnResource::new(
            "AWS::EC2::Subnet",
            json!({
                "AvailabilityZone": availability_zone(env, subnet.az_index),
                "CidrBlock": subnet.cidr.to_string(),
                "MapPublicIpOnLaunch": subnet.map_public_ip_on_launch,
                "Tags": [
                    { "Key": "aws-cdk:subnet-name", "Value": subnet.group },
                    { "Key": "aws-cdk:subnet-type", "Value": subnet.subnet_type.label() },
                    name_tag(format!("{vpc_path}/{name}")),
                ],
                "VpcId": intrinsic::reference(vpc_id),
            }),
        ),
    )?;

    let route_table_id = logical_id(&[spec.id.as_str(), name.as_str(), "RouteTable"]);
    stack.add_resource(
        &route_table_id,
        CfnResource::new(
            "AWS::EC2::RouteTable",
            json!({
                "Tags": [name_tag(format!("{vpc_path}/{name}"))],
                "VpcId": intrinsic::reference(vpc_id),
            }),
        ),
    )?;

    let association_id = logical_id(&[spec.id.as_str(), name.as_str(), "RouteTableAssociation"]);
    stack.add_resource(
        &association_id,
        CfnResource::new(
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "RouteTableId": intrinsic::reference(&route_table_id),
                "SubnetId": intrinsic::reference(&subnet_id),
            }),
        ),
    )?;

    Ok(SubnetRef {
        group: subnet.group.clone(),
        subnet_type: subnet.subnet_type,
        az_index: subnet.az_index,
        cidr: subnet.cidr,
        subnet_id,
        route_table_id,
        association_id,
        default_route_id: None,
    })
}

/// NAT gateways in the first public subnets, plus private default routes
fn add_nat_gateways(
    stack: &mut Stack,
    spec: &VpcSpec,
    vpc_path: &str,
    subnets: &mut [SubnetRef],
    az_count: usize,
) -> Result<Vec<String>> {
    let nat_count = spec.effective_nat_gateways(az_count) as usize;
    if nat_count == 0 {
        return Ok(Vec::new());
    }

    // one per AZ in the first public group
    let Some(first_public_group) = subnets
        .iter()
        .find(|s| s.subnet_type == SubnetType::Public)
        .map(|s| s.group.clone())
    else {
        return Ok(Vec::new());
    };

    let mut gateways: Vec<(usize, String)> = Vec::with_capacity(nat_count);
    for host in subnets
        .iter()
        .filter(|s| s.group == first_public_group)
        .take(nat_count)
    {
        let name = construct_name(host);
        let eip_id = logical_id(&[spec.id.as_str(), name.as_str(), "EIP"]);
        stack.add_resource(
            &eip_id,
            CfnResource::new(
                "AWS::EC2::EIP",
                json!({
                    "Domain": "vpc",
                    "Tags": [name_tag(format!("{vpc_path}/{name}"))],
                }),
            ),
        )?;

        let nat_id = logical_id(&[spec.id.as_str(), name.as_str(), "NATGateway"]);
        let mut nat = CfnResource::new(
            "AWS::EC2::NatGateway",
            json!({
                "AllocationId": intrinsic::get_att(&eip_id, "AllocationId"),
                "SubnetId": intrinsic::reference(&host.subnet_id),
                "Tags": [name_tag(format!("{vpc_path}/{name}"))],
            }),
        )
        .depends_on(host.association_id.clone());
        if let Some(route) = &host.default_route_id {
            nat = nat.depends_on(route.clone());
        }
        stack.add_resource(&nat_id, nat)?;
        gateways.push((host.az_index, nat_id));
    }
    if gateways.is_empty() {
        return Ok(Vec::new());
    }

    for (position, subnet) in subnets
        .iter_mut()
        .filter(|s| s.subnet_type == SubnetType::PrivateWithEgress)
        .enumerate()
    {
        // prefer a NAT in the same AZ, else round-robin
        let nat_id = gateways
            .iter()
            .find(|(az, _)| *az == subnet.az_index)
            .or_else(|| gateways.get(position % gateways.len()))
            .map(|(_, id)| id.clone());
        let Some(nat_id) = nat_id else {
            continue;
        };

        let route_id = logical_id(&[spec.id.as_str(), construct_name(subnet).as_str(), "DefaultRoute"]);
        stack.add_resource(
            &route_id,
            CfnResource::new(
                "AWS::EC2::Route",
                json!({
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": intrinsic::reference(&nat_id),
                    "RouteTableId": intrinsic::reference(&subnet.route_table_id),
                }),
            ),
        )?;
        subnet.default_route_id = Some(route_id);
    }

    Ok(gateways.into_iter().map(|(_, id)| id).collect())
}
