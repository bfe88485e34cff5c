//! ネットワークノードのパース

use super::{first_bool, first_integer, first_parsed, first_string, property, required_id};
use crate::error::{Result, StackError};
use crate::model::{GatewayEndpointSpec, SubnetSpec, SubnetType, VpcSpec};
use kdl::KdlNode;

/// vpc ノードをパース
pub fn parse_vpc(node: &KdlNode) -> Result<VpcSpec> {
    let mut vpc = VpcSpec::default();
    if let Some(id) = first_string(node) {
        vpc.id = id;
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "cidr" | "ip_addresses" | "ip-addresses" => vpc.cidr = first_parsed(child)?,
                "enable_dns_hostnames" | "enable-dns-hostnames" | "dns-hostnames" => {
                    vpc.enable_dns_hostnames = first_bool(child)?;
                }
                "enable_dns_support" | "enable-dns-support" | "dns-support" => {
                    vpc.enable_dns_support = first_bool(child)?;
                }
                "nat_gateways" | "nat-gateways" => {
                    vpc.nat_gateways = Some(first_integer(child)?);
                }
                "max_azs" | "max-azs" => vpc.max_azs = first_integer(child)?,
                "subnet" => vpc.subnets.push(parse_subnet(child)?),
                "gateway_endpoint" | "gateway-endpoint" => {
                    vpc.gateway_endpoints.push(parse_gateway_endpoint(child)?);
                }
                _ => {}
            }
        }
    }

    Ok(vpc)
}

/// subnet ノードをパース
///
/// 例: `subnet "PublicSubnet" type="public" cidr-mask=24 map-public-ip=#true`
fn parse_subnet(node: &KdlNode) -> Result<SubnetSpec> {
    let name = required_id(node)?;

    let subnet_type: SubnetType = property(node, "type")
        .and_then(|v| v.as_string())
        .ok_or_else(|| StackError::InvalidConfig(format!("subnet '{name}' requires type=")))?
        .parse()?;

    let mut subnet = SubnetSpec::new(name, subnet_type);

    if let Some(mask) = property(node, "cidr-mask").or_else(|| property(node, "cidr_mask")) {
        let mask = mask
            .as_integer()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| {
                StackError::InvalidConfig(format!("subnet '{}' の cidr-mask が不正です", subnet.name))
            })?;
        subnet.cidr_mask = Some(mask);
    }

    if let Some(map_ip) =
        property(node, "map-public-ip").or_else(|| property(node, "map_public_ip_on_launch"))
    {
        subnet.map_public_ip_on_launch = map_ip.as_bool();
    }

    // 子ノード形式も許可
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "cidr_mask" | "cidr-mask" => subnet.cidr_mask = Some(first_integer(child)?),
                "map_public_ip_on_launch" | "map-public-ip-on-launch" | "map-public-ip" => {
                    subnet.map_public_ip_on_launch = Some(first_bool(child)?);
                }
                _ => {}
            }
        }
    }

    Ok(subnet)
}

/// gateway-endpoint ノードをパース
///
/// 例: `gateway-endpoint "s3" service="s3"`（service 省略時は id を使う）
fn parse_gateway_endpoint(node: &KdlNode) -> Result<GatewayEndpointSpec> {
    let id = required_id(node)?;
    let service = property(node, "service")
        .and_then(|v| v.as_string())
        .unwrap_or(&id)
        .parse()?;
    Ok(GatewayEndpointSpec { id, service })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GatewayService;

    fn parse(kdl: &str) -> Result<VpcSpec> {
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        parse_vpc(doc.nodes().first().unwrap())
    }

    #[test]
    fn test_parse_vpc() {
        let vpc = parse(
            r#"
            vpc "Vpc" {
                cidr "10.1.0.0/16"
                enable-dns-hostnames #true
                enable-dns-support #true
                nat-gateways 1
                max-azs 2
                subnet "PublicSubnet" type="public" cidr-mask=24 map-public-ip=#true
                subnet "PrivateSubnet" type="private-with-egress" cidr-mask=24
                gateway-endpoint "s3" service="s3"
            }
        "#,
        )
        .unwrap();

        assert_eq!(vpc.id, "Vpc");
        assert_eq!(vpc.cidr.to_string(), "10.1.0.0/16");
        assert_eq!(vpc.nat_gateways, Some(1));
        assert_eq!(vpc.max_azs, 2);
        assert_eq!(vpc.subnets.len(), 2);
        assert_eq!(vpc.subnets[0].subnet_type, SubnetType::Public);
        assert_eq!(vpc.subnets[0].cidr_mask, Some(24));
        assert_eq!(vpc.subnets[0].map_public_ip_on_launch, Some(true));
        assert_eq!(vpc.subnets[1].subnet_type, SubnetType::PrivateWithEgress);
        assert_eq!(vpc.subnets[1].map_public_ip_on_launch, None);
        assert_eq!(vpc.gateway_endpoints[0].service, GatewayService::S3);
    }

    #[test]
    fn test_parse_subnet_child_form() {
        let vpc = parse(
            r#"
            vpc {
                subnet "Db" type="isolated" {
                    cidr-mask 28
                }
            }
        "#,
        )
        .unwrap();
        assert_eq!(vpc.id, "Vpc");
        assert_eq!(vpc.subnets[0].subnet_type, SubnetType::PrivateIsolated);
        assert_eq!(vpc.subnets[0].cidr_mask, Some(28));
    }

    #[test]
    fn test_parse_subnet_requires_type() {
        assert!(parse(r#"vpc { subnet "NoType" cidr-mask=24 }"#).is_err());
    }

    #[test]
    fn test_parse_invalid_cidr() {
        let result = parse(r#"vpc { cidr "10.1.0.0/99" }"#);
        assert!(matches!(result, Err(StackError::InvalidCidr(_))));
    }

    #[test]
    fn test_negative_nat_gateways_rejected() {
        assert!(parse(r#"vpc { nat-gateways -1 }"#).is_err());
    }
}
