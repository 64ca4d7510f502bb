// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BGP instances: the default instance peering over the underlay, and one instance per VRF.

use crate::frr::renderer::builder::{ConfigBuilder, MARKER, Render};
use config::internal::{IpFamily, NeighborConfig, UnderlayConfig, VniConfig};
use ipnet::IpNet;

/* utils to render BGP neighbor configs */
impl Render for NeighborConfig {
    type Context = u32; /* ASN of the local instance */
    type Output = ConfigBuilder;
    fn render(&self, local_asn: &Self::Context) -> Self::Output {
        let mut cfg = ConfigBuilder::new();
        let prefix = format!(" neighbor {}", self.addr);

        cfg += format!("{prefix} remote-as {}", self.remote_as);
        if let Some(port) = self.port {
            cfg += format!("{prefix} port {port}");
        }
        if let Some(password) = &self.password {
            cfg += format!("{prefix} password {password}");
        }
        if self.ebgp_multihop {
            cfg += format!("{prefix} ebgp-multihop");
        }
        if let (Some(keepalive), Some(hold)) = (self.keepalive_time, self.hold_time) {
            cfg += format!("{prefix} timers {keepalive} {hold}");
        }
        if let Some(connect) = self.connect_time {
            cfg += format!("{prefix} timers connect {connect}");
        }
        if let Some(profile) = &self.bfd_profile {
            cfg += format!("{prefix} bfd");
            cfg += format!("{prefix} bfd profile {profile}");
        }
        if self.must_disable_connected_check(*local_asn) {
            cfg += format!("{prefix} disable-connected-check");
        }
        cfg
    }
}

/// Lines common to every instance.
fn bgp_instance_defaults() -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    cfg += " no bgp ebgp-requires-policy";
    cfg += " no bgp network import-check";
    cfg += " no bgp default ipv4-unicast";
    cfg
}

fn family_of(prefix: &IpNet) -> IpFamily {
    match prefix {
        IpNet::V4(_) => IpFamily::Ipv4,
        IpNet::V6(_) => IpFamily::Ipv6,
    }
}

/// An unicast address family stanza, unless there is nothing to put in it.
fn af_unicast(
    family: IpFamily,
    neighbors: &[NeighborConfig],
    networks: &[IpNet],
) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    let neighbors: Vec<_> = neighbors
        .iter()
        .filter(|n| n.ip_family == family)
        .collect();
    let networks: Vec<_> = networks.iter().filter(|p| family_of(p) == family).collect();
    if neighbors.is_empty() && networks.is_empty() {
        return cfg;
    }
    cfg += MARKER;
    cfg += format!(" address-family {family} unicast");
    for neighbor in neighbors {
        cfg += format!("  neighbor {} activate", neighbor.addr);
    }
    for network in networks {
        cfg += format!("  network {network}");
    }
    cfg += " exit-address-family";
    cfg
}

impl Render for UnderlayConfig {
    type Context = ();
    type Output = ConfigBuilder;
    fn render(&self, _: &Self::Context) -> Self::Output {
        let mut cfg = ConfigBuilder::new();
        cfg += format!("router bgp {}", self.asn);
        cfg += bgp_instance_defaults();
        if let IpNet::V4(vtep) = self.vtep {
            cfg += format!(" bgp router-id {}", vtep.addr());
        }
        for neighbor in &self.neighbors {
            cfg += neighbor.render(&self.asn);
        }

        /* the vtep must be reachable from remote nodes */
        let vtep = [self.vtep];
        cfg += af_unicast(IpFamily::Ipv4, &self.neighbors, &vtep);
        cfg += af_unicast(IpFamily::Ipv6, &self.neighbors, &vtep);

        cfg += MARKER;
        cfg += " address-family l2vpn evpn";
        for neighbor in &self.neighbors {
            cfg += format!("  neighbor {} activate", neighbor.addr);
        }
        cfg += "  advertise-all-vni";
        cfg += " exit-address-family";
        cfg += "exit";
        cfg += MARKER;
        cfg
    }
}

/// The BGP instance of the VRF of a VNI, peering with the host over the veth.
pub(crate) fn render_vrf_bgp(vni: &VniConfig) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    let neighbors = std::slice::from_ref(&vni.local_neighbor);
    cfg += format!("router bgp {} vrf {}", vni.asn, vni.vrf);
    cfg += bgp_instance_defaults();
    cfg += vni.local_neighbor.render(&vni.asn);
    cfg += af_unicast(IpFamily::Ipv4, neighbors, &vni.to_advertise);
    cfg += af_unicast(IpFamily::Ipv6, neighbors, &vni.to_advertise);
    cfg += MARKER;
    cfg += " address-family l2vpn evpn";
    cfg += "  advertise ipv4 unicast";
    cfg += " exit-address-family";
    cfg += "exit";
    cfg += MARKER;
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::internal::RemoteAs;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_neighbor_options() {
        let mut neigh = NeighborConfig::plain(65001, "fd00::2".parse().unwrap());
        neigh.port = Some(1790);
        neigh.hold_time = Some(9);
        neigh.keepalive_time = Some(3);
        neigh.connect_time = Some(5);
        neigh.bfd_profile = Some("fast".to_string());
        neigh.password = Some("secret".to_string());
        let rendered = neigh.render(&65000).to_string();
        assert_eq!(
            rendered,
            " neighbor fd00::2 remote-as 65001
 neighbor fd00::2 port 1790
 neighbor fd00::2 password secret
 neighbor fd00::2 timers 3 9
 neighbor fd00::2 timers connect 5
 neighbor fd00::2 bfd
 neighbor fd00::2 bfd profile fast
 neighbor fd00::2 disable-connected-check
"
        );
    }

    #[test]
    fn test_dynamic_remote_as() {
        let mut neigh = NeighborConfig::plain(0, "10.0.0.1".parse().unwrap());
        neigh.remote_as = RemoteAs::Internal;
        assert_eq!(
            neigh.render(&65000).to_string(),
            " neighbor 10.0.0.1 remote-as internal\n"
        );
    }

    #[test]
    fn test_unicast_stanza_skipped_when_empty() {
        let v4 = [NeighborConfig::plain(65001, "10.0.0.1".parse().unwrap())];
        assert!(af_unicast(IpFamily::Ipv6, &v4, &[]).is_empty());
        let lines = af_unicast(IpFamily::Ipv4, &v4, &[]);
        assert_eq!(
            lines.lines(),
            [
                "!",
                " address-family ipv4 unicast",
                "  neighbor 10.0.0.1 activate",
                " exit-address-family"
            ]
        );
    }
}
