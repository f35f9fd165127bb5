//! IPv4 CIDR arithmetic for deterministic subnet allocation.
//!
//! Subnets are carved out of the parent network with a fixed slicing rule:
//! the parent is partitioned into `2^new_bits` equal children and zones are
//! assigned blocks from the top of the address space downward. Adding a zone
//! later can never collide with an already-assigned block.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{StackError, StackResult};

/// An IPv4 network in CIDR notation, normalized to its network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock {
    addr: Ipv4Addr,
    prefix: u8,
}

impl CidrBlock {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> StackResult<Self> {
        if prefix > 32 {
            return Err(StackError::InvalidCidr(format!("{}/{}", addr, prefix)));
        }
        let base = u32::from(addr) & Self::netmask(prefix);
        Ok(Self {
            addr: Ipv4Addr::from(base),
            prefix,
        })
    }

    pub fn parse(s: &str) -> StackResult<Self> {
        let (addr, prefix) = s
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

    /// A host address expressed as a single-address block.
    pub fn host(addr: Ipv4Addr) -> Self {
        Self { addr, prefix: 32 }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn netmask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        }
    }

    fn first(&self) -> u32 {
        u32::from(self.addr)
    }

    fn last(&self) -> u32 {
        self.first() | !Self::netmask(self.prefix)
    }

    /// Whether `other` lies entirely inside this block.
    pub fn contains(&self, other: &CidrBlock) -> bool {
        self.prefix <= other.prefix
            && self.first() <= other.first()
            && other.last() <= self.last()
    }

    /// Whether the two blocks share any address.
    pub fn overlaps(&self, other: &CidrBlock) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }

    /// The `index`-th child block after splitting this block into
    /// `2^new_bits` equal parts. Index 0 is the bottom of the range.
    pub fn subnet(&self, new_bits: u8, index: u32) -> StackResult<CidrBlock> {
        let child_prefix = self.prefix as u32 + new_bits as u32;
        if child_prefix > 32 {
            return Err(StackError::MaskOverflow {
                parent: self.prefix,
                child: child_prefix as u8,
            });
        }
        let count = 1u32 << new_bits.min(31);
        if index >= count {
            return Err(StackError::SubnetIndex { index, count });
        }
        let block_size = 1u64 << (32 - child_prefix);
        let base = self.first() as u64 + index as u64 * block_size;
        CidrBlock::new(Ipv4Addr::from(base as u32), child_prefix as u8)
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for CidrBlock {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = StackError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CidrBlock> for String {
    fn from(c: CidrBlock) -> String {
        c.to_string()
    }
}

/// Allocate one child block per availability zone, taken from the top of the
/// parent's address space downward: the first zone receives the highest
/// block, the second the next one down, and so on.
pub fn allocate_per_zone(
    parent: &CidrBlock,
    new_bits: u8,
    zones: &[String],
) -> StackResult<Vec<(String, CidrBlock)>> {
    let child_prefix = parent.prefix() as u32 + new_bits as u32;
    if child_prefix > 32 {
        return Err(StackError::MaskOverflow {
            parent: parent.prefix(),
            child: child_prefix as u8,
        });
    }
    let count = 1u32 << new_bits.min(31);
    if zones.len() as u32 > count {
        return Err(StackError::AddressSpaceExhausted {
            zones: zones.len(),
            available: count,
        });
    }

    let mut allocated = Vec::with_capacity(zones.len());
    let mut index = count;
    for zone in zones {
        index -= 1;
        allocated.push((zone.clone(), parent.subnet(new_bits, index)?));
    }
    Ok(allocated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_to_network_address() {
        let block = CidrBlock::parse("172.31.5.77/16").unwrap();
        assert_eq!(block.to_string(), "172.31.0.0/16");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(CidrBlock::parse("not-a-cidr").is_err());
        assert!(CidrBlock::parse("10.0.0.0").is_err());
        assert!(CidrBlock::parse("10.0.0.0/40").is_err());
        assert!(CidrBlock::parse("300.0.0.0/8").is_err());
    }

    #[test]
    fn subnet_slices_from_the_bottom_by_index() {
        let parent = CidrBlock::parse("172.31.0.0/16").unwrap();
        assert_eq!(
            parent.subnet(8, 0).unwrap().to_string(),
            "172.31.0.0/24"
        );
        assert_eq!(
            parent.subnet(8, 255).unwrap().to_string(),
            "172.31.255.0/24"
        );
        assert!(parent.subnet(8, 256).is_err());
    }

    #[test]
    fn subnet_rejects_mask_overflow() {
        let parent = CidrBlock::parse("10.0.0.0/28").unwrap();
        assert!(parent.subnet(8, 0).is_err());
    }

    #[test]
    fn zones_get_disjoint_blocks_from_the_top_down() {
        let parent = CidrBlock::parse("172.31.0.0/16").unwrap();
        let zones: Vec<String> = ["eu-west-1a", "eu-west-1b", "eu-west-1c"]
            .iter()
            .map(|z| z.to_string())
            .collect();

        let allocated = allocate_per_zone(&parent, 8, &zones).unwrap();
        assert_eq!(allocated.len(), 3);
        assert_eq!(allocated[0].1.to_string(), "172.31.255.0/24");
        assert_eq!(allocated[1].1.to_string(), "172.31.254.0/24");
        assert_eq!(allocated[2].1.to_string(), "172.31.253.0/24");

        for (_, block) in &allocated {
            assert!(parent.contains(block));
        }
        for i in 0..allocated.len() {
            for j in 0..allocated.len() {
                if i != j {
                    assert!(!allocated[i].1.overlaps(&allocated[j].1));
                }
            }
        }
    }

    #[test]
    fn adding_a_zone_does_not_move_existing_blocks() {
        let parent = CidrBlock::parse("172.31.0.0/16").unwrap();
        let two: Vec<String> = vec!["a".into(), "b".into()];
        let three: Vec<String> = vec!["a".into(), "b".into(), "c".into()];

        let before = allocate_per_zone(&parent, 8, &two).unwrap();
        let after = allocate_per_zone(&parent, 8, &three).unwrap();
        assert_eq!(before[0].1, after[0].1);
        assert_eq!(before[1].1, after[1].1);
    }

    #[test]
    fn allocation_fails_when_the_space_is_exhausted() {
        let parent = CidrBlock::parse("10.0.0.0/24").unwrap();
        let zones: Vec<String> = (0..3).map(|i| format!("zone-{}", i)).collect();
        // Only two /25 blocks exist for three zones.
        assert!(allocate_per_zone(&parent, 1, &zones).is_err());
    }

    #[test]
    fn overlap_and_containment() {
        let a = CidrBlock::parse("10.0.0.0/24").unwrap();
        let b = CidrBlock::parse("10.0.1.0/24").unwrap();
        let parent = CidrBlock::parse("10.0.0.0/16").unwrap();
        assert!(!a.overlaps(&b));
        assert!(parent.contains(&a));
        assert!(!a.contains(&parent));
        assert!(parent.overlaps(&a));
    }
}
