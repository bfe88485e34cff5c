//! IPv4 CIDR ブロックとサブネット割り当て
//!
//! VPC のアドレス範囲から各サブネットのブロックを順番に切り出します。
//! 割り当て順はサブネット設定ごと、その中でアベイラビリティゾーンごとです。

use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// IPv4 CIDR ブロック（ホスト部は常に 0）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

/// VPC のデフォルト範囲 (10.0.0.0/16)
pub const DEFAULT_VPC_CIDR: Ipv4Cidr = Ipv4Cidr {
    network: Ipv4Addr::new(10, 0, 0, 0),
    prefix: 16,
};

fn netmask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl Ipv4Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(StackError::InvalidCidr(format!("{addr}/{prefix}")));
        }
        let bits = u32::from(addr);
        if bits & !netmask(prefix) != 0 {
            return Err(StackError::InvalidCidr(format!(
                "{addr}/{prefix} (host bits set)"
            )));
        }
        Ok(Self {
            network: addr,
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// 先頭アドレス
    pub fn first(&self) -> u32 {
        u32::from(self.network)
    }

    /// 末尾アドレス
    pub fn last(&self) -> u32 {
        self.first() | !netmask(self.prefix)
    }

    /// ブロック内のアドレス数
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// `other` がこのブロックに完全に含まれるか
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && other.first() & netmask(self.prefix) == self.first()
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }
}

impl FromStr for Ipv4Cidr {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| StackError::InvalidCidr(s.to_string()))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| StackError::InvalidCidr(s.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| StackError::InvalidCidr(s.to_string()))?;
        Self::new(addr, prefix)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = StackError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// VPC の範囲から順番にサブネットを切り出すアロケータ
#[derive(Debug, Clone)]
pub struct SubnetPlanner {
    network: Ipv4Cidr,
    /// 次に使える先頭アドレス（範囲外に出たことを表せるよう u64）
    next: u64,
}

impl SubnetPlanner {
    pub fn new(network: Ipv4Cidr) -> Self {
        Self {
            network,
            next: u64::from(network.first()),
        }
    }

    /// 残りのアドレス数
    pub fn remaining(&self) -> u64 {
        (u64::from(self.network.last()) + 1).saturating_sub(self.next)
    }

    /// 指定マスクのブロックを1つ割り当てる
    ///
    /// ブロックは自身のサイズ境界に揃えて配置されます。
    pub fn allocate(&mut self, mask: u8) -> Result<Ipv4Cidr> {
        if mask < self.network.prefix() || mask > 32 {
            return Err(StackError::SubnetAllocation(format!(
                "/{mask} は VPC {} に収まりません",
                self.network
            )));
        }

        let size = 1u64 << (32 - u32::from(mask));
        let start = self.next.div_ceil(size) * size;
        let end = start + size - 1;
        if end > u64::from(self.network.last()) {
            return Err(StackError::SubnetAllocation(format!(
                "VPC {} のアドレス空間が不足しています (/{mask} が必要)",
                self.network
            )));
        }

        self.next = end + 1;
        Ipv4Cidr::new(Ipv4Addr::from(start as u32), mask)
    }

    /// 残りの空間を `count` 個で等分するときのマスク
    pub fn mask_for_remaining(&self, count: usize) -> Result<u8> {
        if count == 0 {
            return Err(StackError::SubnetAllocation(
                "割り当て対象のサブネットがありません".to_string(),
            ));
        }
        let per_subnet = self.remaining() / count as u64;
        if per_subnet == 0 {
            return Err(StackError::SubnetAllocation(format!(
                "VPC {} の残り空間を {count} 個に分割できません",
                self.network
            )));
        }
        // per_subnet 以下で最大の2の冪
        let bits = 63 - per_subnet.leading_zeros();
        Ok((32 - bits) as u8)
    }
}

/// ブロック同士が重ならないことを確認
pub fn ensure_disjoint(blocks: &[Ipv4Cidr]) -> Result<()> {
    for (i, a) in blocks.iter().enumerate() {
        for b in &blocks[i + 1..] {
            if a.overlaps(b) {
                return Err(StackError::SubnetAllocation(format!("{a} と {b} が重複しています")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Ipv4Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let block = cidr("10.1.0.0/16");
        assert_eq!(block.prefix(), 16);
        assert_eq!(block.size(), 65536);
        assert_eq!(block.to_string(), "10.1.0.0/16");
        assert_eq!(Ipv4Addr::from(block.last()), Ipv4Addr::new(10, 1, 255, 255));
    }

    #[test]
    fn test_parse_rejects_host_bits_and_garbage() {
        assert!("10.1.0.1/16".parse::<Ipv4Cidr>().is_err());
        assert!("10.1.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.1.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("vpc/16".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_contains_and_overlaps() {
        let vpc = cidr("10.1.0.0/16");
        assert!(vpc.contains(&cidr("10.1.3.0/24")));
        assert!(!vpc.contains(&cidr("10.2.0.0/24")));
        assert!(!cidr("10.1.0.0/24").contains(&vpc));
        assert!(cidr("10.1.0.0/23").overlaps(&cidr("10.1.1.0/24")));
        assert!(!cidr("10.1.0.0/24").overlaps(&cidr("10.1.1.0/24")));
    }

    #[test]
    fn test_sequential_allocation() {
        let mut planner = SubnetPlanner::new(cidr("10.1.0.0/16"));
        let blocks: Vec<_> = (0..4).map(|_| planner.allocate(24).unwrap()).collect();
        let rendered: Vec<_> = blocks.iter().map(|b| b.to_string()).collect();
        assert_eq!(
            rendered,
            ["10.1.0.0/24", "10.1.1.0/24", "10.1.2.0/24", "10.1.3.0/24"]
        );
        ensure_disjoint(&blocks).unwrap();
    }

    #[test]
    fn test_allocation_aligns_larger_blocks() {
        let mut planner = SubnetPlanner::new(cidr("10.0.0.0/16"));
        assert_eq!(planner.allocate(24).unwrap().to_string(), "10.0.0.0/24");
        // /20 は 4096 境界に揃う
        assert_eq!(planner.allocate(20).unwrap().to_string(), "10.0.16.0/20");
    }

    #[test]
    fn test_allocation_exhausted() {
        let mut planner = SubnetPlanner::new(cidr("10.0.0.0/24"));
        planner.allocate(25).unwrap();
        planner.allocate(25).unwrap();
        assert!(matches!(
            planner.allocate(28),
            Err(StackError::SubnetAllocation(_))
        ));
    }

    #[test]
    fn test_mask_larger_than_network_rejected() {
        let mut planner = SubnetPlanner::new(cidr("10.0.0.0/24"));
        assert!(planner.allocate(16).is_err());
    }

    #[test]
    fn test_mask_for_remaining() {
        let planner = SubnetPlanner::new(cidr("10.0.0.0/16"));
        // 65536 / 4 = 16384 -> /18
        assert_eq!(planner.mask_for_remaining(4).unwrap(), 18);
        // 65536 / 6 = 10922 -> 8192 -> /19
        assert_eq!(planner.mask_for_remaining(6).unwrap(), 19);
        assert!(planner.mask_for_remaining(0).is_err());
    }

    #[test]
    fn test_ensure_disjoint_detects_overlap() {
        let blocks = [cidr("10.0.0.0/23"), cidr("10.0.1.0/24")];
        assert!(ensure_disjoint(&blocks).is_err());
    }
}
