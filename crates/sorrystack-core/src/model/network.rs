//! ネットワークモデル
//!
//! VPC、サブネット構成、ゲートウェイエンドポイントの定義

use crate::cidr::{DEFAULT_VPC_CIDR, Ipv4Cidr, SubnetPlanner, ensure_disjoint};
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// サブネットの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetType {
    /// インターネットゲートウェイへのルートを持つ
    Public,
    /// NAT ゲートウェイ経由で外向き通信できる
    PrivateWithEgress,
    /// 外向きのルートを持たない
    PrivateIsolated,
}

impl SubnetType {
    /// 構成パスやタグで使うラベル
    pub fn label(&self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::PrivateWithEgress => "Private",
            SubnetType::PrivateIsolated => "Isolated",
        }
    }
}

impl FromStr for SubnetType {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "public" => Ok(SubnetType::Public),
            "private" | "private-with-egress" => Ok(SubnetType::PrivateWithEgress),
            "isolated" | "private-isolated" => Ok(SubnetType::PrivateIsolated),
            _ => Err(StackError::UnknownValue {
                field: "subnet type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetType::Public => write!(f, "public"),
            SubnetType::PrivateWithEgress => write!(f, "private-with-egress"),
            SubnetType::PrivateIsolated => write!(f, "private-isolated"),
        }
    }
}

/// サブネット構成（AZ ごとに1つずつ作られる）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub name: String,
    pub subnet_type: SubnetType,
    /// 省略時は残りの空間を等分する
    pub cidr_mask: Option<u8>,
    /// 省略時は public のみ true
    pub map_public_ip_on_launch: Option<bool>,
}

impl SubnetSpec {
    pub fn new(name: impl Into<String>, subnet_type: SubnetType) -> Self {
        Self {
            name: name.into(),
            subnet_type,
            cidr_mask: None,
            map_public_ip_on_launch: None,
        }
    }

    pub fn with_mask(mut self, mask: u8) -> Self {
        self.cidr_mask = Some(mask);
        self
    }
}

/// ゲートウェイ型エンドポイントの対象サービス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayService {
    S3,
    DynamoDb,
}

impl GatewayService {
    /// `com.amazonaws.<region>.<suffix>` の末尾
    pub fn service_suffix(&self) -> &'static str {
        match self {
            GatewayService::S3 => "s3",
            GatewayService::DynamoDb => "dynamodb",
        }
    }
}

impl FromStr for GatewayService {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(GatewayService::S3),
            "dynamodb" => Ok(GatewayService::DynamoDb),
            _ => Err(StackError::UnknownValue {
                field: "gateway endpoint service",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEndpointSpec {
    pub id: String,
    pub service: GatewayService,
}

/// VPC 定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcSpec {
    pub id: String,
    pub cidr: Ipv4Cidr,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
    /// 省略時は AZ ごとに1つ
    pub nat_gateways: Option<u32>,
    pub max_azs: u32,
    pub subnets: Vec<SubnetSpec>,
    pub gateway_endpoints: Vec<GatewayEndpointSpec>,
}

impl Default for VpcSpec {
    fn default() -> Self {
        Self {
            id: "Vpc".to_string(),
            cidr: DEFAULT_VPC_CIDR,
            enable_dns_hostnames: true,
            enable_dns_support: true,
            nat_gateways: None,
            max_azs: 3,
            subnets: Vec::new(),
            gateway_endpoints: Vec::new(),
        }
    }
}

/// 割り当て済みのサブネット
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSubnet {
    /// 構成名（PublicSubnet など）
    pub group: String,
    pub subnet_type: SubnetType,
    /// 0 始まりの AZ 番号
    pub az_index: usize,
    pub cidr: Ipv4Cidr,
    pub map_public_ip_on_launch: bool,
}

impl PlannedSubnet {
    /// 構成パス上の名前（PublicSubnetSubnet1 など）
    pub fn construct_name(&self) -> String {
        format!("{}Subnet{}", self.group, self.az_index + 1)
    }
}

impl VpcSpec {
    /// サブネット構成（未指定なら public + private-with-egress）
    pub fn effective_subnets(&self) -> Vec<SubnetSpec> {
        if self.subnets.is_empty() {
            vec![
                SubnetSpec::new("Public", SubnetType::Public),
                SubnetSpec::new("Private", SubnetType::PrivateWithEgress),
            ]
        } else {
            self.subnets.clone()
        }
    }

    /// 実際に作る NAT ゲートウェイの数
    pub fn effective_nat_gateways(&self, az_count: usize) -> u32 {
        let has_egress = self
            .effective_subnets()
            .iter()
            .any(|s| s.subnet_type == SubnetType::PrivateWithEgress);
        match self.nat_gateways {
            Some(n) => n,
            None if has_egress => az_count as u32,
            None => 0,
        }
    }

    /// AZ 数に応じてサブネットのアドレスを割り当てる
    ///
    /// マスク指定のあるサブネットを宣言順に先に割り当て、
    /// マスク未指定のものは残りの空間を等分します。
    pub fn plan_subnets(&self, az_count: usize) -> Result<Vec<PlannedSubnet>> {
        let mut planner = SubnetPlanner::new(self.cidr);
        let mut planned = Vec::new();
        let subnets = self.effective_subnets();

        let (masked, unmasked): (Vec<_>, Vec<_>) =
            subnets.iter().partition(|s| s.cidr_mask.is_some());

        let mut push_group = |spec: &SubnetSpec, mask: u8, planner: &mut SubnetPlanner| {
            for az_index in 0..az_count {
                let cidr = planner.allocate(mask)?;
                planned.push(PlannedSubnet {
                    group: spec.name.clone(),
                    subnet_type: spec.subnet_type,
                    az_index,
                    cidr,
                    map_public_ip_on_launch: spec
                        .map_public_ip_on_launch
                        .unwrap_or(spec.subnet_type == SubnetType::Public),
                });
            }
            Ok::<(), StackError>(())
        };

        for spec in masked {
            let mask = spec.cidr_mask.unwrap_or_default();
            push_group(spec, mask, &mut planner)?;
        }

        if !unmasked.is_empty() {
            let mask = planner.mask_for_remaining(unmasked.len() * az_count)?;
            for spec in unmasked {
                push_group(spec, mask, &mut planner)?;
            }
        }

        let blocks: Vec<_> = planned.iter().map(|s| s.cidr).collect();
        ensure_disjoint(&blocks)?;
        if let Some(outside) = blocks.iter().find(|b| !self.cidr.contains(b)) {
            return Err(StackError::SubnetAllocation(format!(
                "{outside} は VPC {} の範囲外です",
                self.cidr
            )));
        }

        Ok(planned)
    }
}
