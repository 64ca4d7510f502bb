// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Deterministic per-node address derivation.
//!
//! Addresses are a pure function of a CIDR pool and a node index: there is no allocation table,
//! so re-deriving always yields the same answer on every node of the cluster.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// The rank of a node in the cluster.
pub type NodeIndex = u32;

/// Reasons why an address could not be derived from a pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IpamError {
    /// The pool is not a CIDR.
    #[error("Failed to parse pool '{0}'")]
    InvalidPool(String),
    /// The requested host does not fit in the pool.
    #[error("Offset {offset} is out of range for pool {pool} (capacity {capacity})")]
    OutOfRange {
        /// Requested host offset.
        offset: u128,
        /// The parsed pool.
        pool: IpNet,
        /// Number of addresses in the pool.
        capacity: u128,
    },
}

/// The two ends of the veth pair that links the host to the router namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Veths {
    /// Host leg: unique per node, with the prefix length of the pool.
    pub host_side: IpNet,
    /// Router-namespace leg: identical on every node, always a host prefix.
    pub ns_side: IpNet,
}

/// Parse a CIDR pool. Host bits are discarded so that `10.0.0.7/24` means `10.0.0.0/24`.
///
/// # Errors
///
/// Fails with [`IpamError::InvalidPool`] if `pool` is not in CIDR notation.
pub fn parse_pool(pool: &str) -> Result<IpNet, IpamError> {
    pool.trim()
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|_| IpamError::InvalidPool(pool.to_owned()))
}

/// Number of addresses in `pool`, saturating for an IPv6 /0.
#[must_use]
pub fn capacity(pool: &IpNet) -> u128 {
    let host_bits = u32::from(pool.max_prefix_len() - pool.prefix_len());
    1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
}

/// The `offset`-th address of `pool`, computed by adding to the numeric base address.
fn nth_host(pool: &IpNet, offset: u128) -> Result<IpAddr, IpamError> {
    let capacity = capacity(pool);
    // an IPv6 /0 holds 2^128 addresses, which any u128 offset fits in
    let fits = (pool.prefix_len() == 0 && pool.max_prefix_len() == 128) || offset < capacity;
    if !fits {
        return Err(IpamError::OutOfRange {
            offset,
            pool: *pool,
            capacity,
        });
    }
    Ok(match pool.network() {
        IpAddr::V4(base) => {
            #[allow(clippy::cast_possible_truncation)] // offset < 2^32 checked above
            let offset = offset as u32;
            IpAddr::V4(Ipv4Addr::from(u32::from(base) + offset))
        }
        IpAddr::V6(base) => IpAddr::V6(Ipv6Addr::from(u128::from(base) + offset)),
    })
}

fn with_prefix(address: IpAddr, prefix_len: u8) -> IpNet {
    match address {
        IpAddr::V4(a) => Ipv4Net::new_assert(a, prefix_len).into(),
        IpAddr::V6(a) => Ipv6Net::new_assert(a, prefix_len).into(),
    }
}

fn as_host_prefix(address: IpAddr) -> IpNet {
    IpNet::from(address)
}

/// The VTEP address of node `index`: the `index`-th host of `pool`, as a host prefix.
///
/// # Errors
///
/// Fails if `pool` does not parse or if `index` exceeds the capacity of the pool.
pub fn vtep_address(pool: &str, index: NodeIndex) -> Result<IpNet, IpamError> {
    let pool = parse_pool(pool)?;
    nth_host(&pool, u128::from(index)).map(as_host_prefix)
}

/// The veth addresses of node `index`.
///
/// The namespace side is the 0th host of the pool, as a host prefix, and is shared by all nodes.
/// The host side is host `index + 1`, keeping the prefix length of the pool.
///
/// # Errors
///
/// Fails if `pool` does not parse or if `index + 1` exceeds the capacity of the pool.
pub fn veth_addresses(pool: &str, index: NodeIndex) -> Result<Veths, IpamError> {
    let pool = parse_pool(pool)?;
    let ns_side = as_host_prefix(nth_host(&pool, 0)?);
    let host_side = with_prefix(
        nth_host(&pool, u128::from(index) + 1)?,
        pool.prefix_len(),
    );
    Ok(Veths { host_side, ns_side })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn veth_addresses_of_first_nodes() {
        let first = veth_addresses("192.168.1.0/24", 0).unwrap();
        assert_eq!(first.ns_side, "192.168.1.0/32".parse::<IpNet>().unwrap());
        assert_eq!(first.host_side, "192.168.1.1/24".parse::<IpNet>().unwrap());

        let second = veth_addresses("192.168.1.0/24", 1).unwrap();
        assert_eq!(second.ns_side, "192.168.1.0/32".parse::<IpNet>().unwrap());
        assert_eq!(second.host_side, "192.168.1.2/24".parse::<IpNet>().unwrap());
    }

    #[test]
    fn vtep_is_a_host_prefix() {
        let vtep = vtep_address("100.65.0.0/24", 3).unwrap();
        assert_eq!(vtep, "100.65.0.3/32".parse::<IpNet>().unwrap());
        let vtep = vtep_address("fd00:1::/64", 258).unwrap();
        assert_eq!(vtep, "fd00:1::102/128".parse::<IpNet>().unwrap());
    }

    #[test]
    fn host_bits_of_the_pool_are_ignored() {
        assert_eq!(
            vtep_address("10.1.2.77/24", 5).unwrap(),
            vtep_address("10.1.2.0/24", 5).unwrap()
        );
    }

    #[test]
    fn offsets_carry_across_octets() {
        let vtep = vtep_address("10.0.0.0/16", 256).unwrap();
        assert_eq!(vtep, "10.0.1.0/32".parse::<IpNet>().unwrap());
    }

    #[test]
    fn unparsable_pools_are_rejected() {
        for pool in ["", "10.0.0.0", "10.0.0.0/33", "not-a-cidr/24", "fd00::/129"] {
            assert_eq!(
                vtep_address(pool, 0),
                Err(IpamError::InvalidPool(pool.to_owned()))
            );
            assert!(veth_addresses(pool, 0).is_err());
        }
    }

    #[test]
    fn out_of_range_at_capacity() {
        assert!(vtep_address("192.168.0.0/30", 3).is_ok());
        assert!(matches!(
            vtep_address("192.168.0.0/30", 4),
            Err(IpamError::OutOfRange { capacity: 4, .. })
        ));
        // the host side needs one more address than the index
        assert!(veth_addresses("192.168.0.0/30", 2).is_ok());
        assert!(matches!(
            veth_addresses("192.168.0.0/30", 3),
            Err(IpamError::OutOfRange { offset: 4, .. })
        ));
        assert!(vtep_address("192.168.0.9/32", 0).is_ok());
        assert!(vtep_address("192.168.0.9/32", 1).is_err());
    }

    #[test]
    fn ipv6_whole_space_has_room() {
        assert_eq!(capacity(&"::/0".parse().unwrap()), u128::MAX);
        assert!(vtep_address("::/0", NodeIndex::MAX).is_ok());
    }

    #[test]
    fn host_sides_never_overlap() {
        bolero::check!()
            .with_type()
            .for_each(|&(a, b): &(u16, u16)| {
                let pool = "10.128.0.0/12";
                let va = veth_addresses(pool, u32::from(a)).unwrap();
                let vb = veth_addresses(pool, u32::from(b)).unwrap();
                assert_ne!(va.host_side.addr(), va.ns_side.addr());
                assert_eq!(va.ns_side, vb.ns_side);
                if a == b {
                    assert_eq!(va.host_side, vb.host_side);
                } else {
                    assert_ne!(va.host_side.addr(), vb.host_side.addr());
                }
            });
    }

    #[test]
    fn vtep_is_injective_in_range() {
        bolero::check!()
            .with_type()
            .for_each(|&(prefix_len, index): &(u8, u16)| {
                let prefix_len = 16 + prefix_len % 17;
                let pool = format!("172.16.0.0/{prefix_len}");
                let capacity = 1u128 << (32 - prefix_len);
                match vtep_address(&pool, u32::from(index)) {
                    Ok(vtep) => {
                        assert!(u128::from(index) < capacity);
                        let base = u32::from(Ipv4Addr::new(172, 16, 0, 0));
                        let IpAddr::V4(got) = vtep.addr() else {
                            unreachable!()
                        };
                        assert_eq!(u32::from(got) - base, u32::from(index));
                        assert_eq!(vtep.prefix_len(), 32);
                    }
                    Err(e) => {
                        assert!(u128::from(index) >= capacity);
                        assert!(matches!(e, IpamError::OutOfRange { .. }));
                    }
                }
            });
    }

    #[test]
    fn distinct_vteps_for_a_small_cluster() {
        let vteps: HashSet<_> = (0..64)
            .map(|i| vtep_address("100.64.0.0/26", i).unwrap())
            .collect();
        assert_eq!(vteps.len(), 64);
    }
}
