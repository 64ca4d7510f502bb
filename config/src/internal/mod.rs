// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The validated BGP configuration of a node, as handed to the routing daemon.
//!
//! Values of these types are only built by the compiler, which guarantees their consistency.
//! They derive `PartialEq` so that the reload pipeline can drop snapshots equal to the pending one.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::IpAddr;

use crate::external::DynamicAsnMode;

#[derive(Clone, Copy, Debug, strum::Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum IpFamily {
    Ipv4,
    Ipv6,
}

impl From<&IpAddr> for IpFamily {
    fn from(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpFamily::Ipv4,
            IpAddr::V6(_) => IpFamily::Ipv6,
        }
    }
}

/// How the remote ASN of a session is pinned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteAs {
    Number(u32),
    Internal,
    External,
}

impl Display for RemoteAs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteAs::Number(asn) => write!(f, "{asn}"),
            RemoteAs::Internal => write!(f, "internal"),
            RemoteAs::External => write!(f, "external"),
        }
    }
}

impl From<DynamicAsnMode> for RemoteAs {
    fn from(mode: DynamicAsnMode) -> Self {
        match mode {
            DynamicAsnMode::Internal => RemoteAs::Internal,
            DynamicAsnMode::External => RemoteAs::External,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborConfig {
    /// `<asn>@<address>`
    pub name: String,
    pub remote_as: RemoteAs,
    pub addr: IpAddr,
    pub ip_family: IpFamily,
    pub port: Option<u16>,
    /// Hold time in whole seconds. Set if and only if `keepalive_time` is.
    pub hold_time: Option<u64>,
    pub keepalive_time: Option<u64>,
    pub connect_time: Option<u64>,
    pub password: Option<String>,
    pub bfd_profile: Option<String>,
    pub ebgp_multihop: bool,
}

impl NeighborConfig {
    /// A session with nothing but a pinned ASN.
    #[must_use]
    pub fn plain(asn: u32, addr: IpAddr) -> Self {
        Self {
            name: format!("{asn}@{addr}"),
            remote_as: RemoteAs::Number(asn),
            ip_family: IpFamily::from(&addr),
            addr,
            port: None,
            hold_time: None,
            keepalive_time: None,
            connect_time: None,
            password: None,
            bfd_profile: None,
            ebgp_multihop: false,
        }
    }

    /// Whether the session with a local speaker of ASN `local_asn` is external.
    #[must_use]
    pub fn is_ebgp(&self, local_asn: u32) -> bool {
        match self.remote_as {
            RemoteAs::Number(asn) => asn != local_asn,
            RemoteAs::External => true,
            RemoteAs::Internal => false,
        }
    }

    /// IPv6 eBGP sessions that are not multi-hop peer over link-local next hops,
    /// which the directly-connected check rejects.
    #[must_use]
    pub fn must_disable_connected_check(&self, local_asn: u32) -> bool {
        self.ip_family == IpFamily::Ipv6 && self.is_ebgp(local_asn) && !self.ebgp_multihop
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderlayConfig {
    pub asn: u32,
    /// Host prefix of the local VTEP.
    pub vtep: IpNet,
    pub neighbors: Vec<NeighborConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VniConfig {
    pub asn: u32,
    pub vni: u32,
    pub vrf: String,
    pub local_neighbor: NeighborConfig,
    pub to_advertise: Vec<IpNet>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrrConfig {
    /// Log level, in the vocabulary of the routing daemon.
    pub log_level: String,
    pub hostname: String,
    pub underlay: UnderlayConfig,
    pub vnis: Vec<VniConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_check() {
        let v6: IpAddr = "fd00::1".parse().unwrap();
        let v4: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(NeighborConfig::plain(65001, v6).must_disable_connected_check(65000));
        assert!(!NeighborConfig::plain(65000, v6).must_disable_connected_check(65000));
        assert!(!NeighborConfig::plain(65001, v4).must_disable_connected_check(65000));

        let mut multihop = NeighborConfig::plain(65001, v6);
        multihop.ebgp_multihop = true;
        assert!(!multihop.must_disable_connected_check(65000));

        let mut dynamic = NeighborConfig::plain(0, v6);
        dynamic.remote_as = RemoteAs::External;
        assert!(dynamic.must_disable_connected_check(65000));
    }

    #[test]
    fn remote_as_display() {
        assert_eq!(RemoteAs::Number(64512).to_string(), "64512");
        assert_eq!(RemoteAs::Internal.to_string(), "internal");
        assert_eq!(RemoteAs::from(DynamicAsnMode::External), RemoteAs::External);
    }
}
