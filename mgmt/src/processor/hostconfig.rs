// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Convert the declared underlay and VNIs into the parameters of the dataplane of one node.

use config::ConfigError;
use config::external::{Underlay, Vni, validate_vnis};
use interface_manager::{UnderlayParams, VniParams};
use ipam::NodeIndex;
use std::path::PathBuf;

/// The dataplane a node should have.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostConfig {
    /// Namespace file of the router.
    pub target: PathBuf,
    pub underlay: UnderlayParams,
    pub vnis: Vec<VniParams>,
}

/// Derive the dataplane parameters of node `node_index`.
///
/// Returns `None` when there is nothing to converge: no underlay, or no VNI.
///
/// # Errors
///
/// Fails on more than one underlay and on pools that can't serve `node_index`.
pub fn host_config(
    node_index: NodeIndex,
    target: impl Into<PathBuf>,
    underlays: &[Underlay],
    vnis: &[Vni],
) -> Result<Option<HostConfig>, ConfigError> {
    let underlay = match underlays {
        [] => return Ok(None),
        [underlay] => underlay,
        _ => return Err(ConfigError::TooManyInstances("Underlay", underlays.len())),
    };
    if vnis.is_empty() {
        return Ok(None);
    }
    validate_vnis(vnis)?;
    let vtep = ipam::vtep_address(&underlay.vtep_cidr, node_index)
        .map_err(|e| ConfigError::Ipam(underlay.name.clone(), e))?;

    let vnis = vnis
        .iter()
        .map(|vni| {
            let veths = ipam::veth_addresses(&vni.local_cidr, node_index)
                .map_err(|e| ConfigError::Ipam(vni.name.clone(), e))?;
            Ok(VniParams {
                vrf: vni.vrf.clone(),
                vni: vni.vni,
                vxlan_port: vni.vxlan_port,
                vtep: vtep.addr(),
                veth_host: veths.host_side,
                veth_ns: veths.ns_side,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(Some(HostConfig {
        target: target.into(),
        underlay: UnderlayParams {
            nic: underlay.nic.clone(),
            vtep,
        },
        vnis,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::external::VXLAN_PORT;
    use pretty_assertions::assert_eq;

    fn underlay() -> Underlay {
        Underlay {
            name: "underlay".to_string(),
            asn: 64514,
            vtep_cidr: "100.65.0.0/24".to_string(),
            nic: "eth1".to_string(),
            neighbors: vec![],
        }
    }

    fn vni(vrf: &str, id: u32, cidr: &str) -> Vni {
        Vni {
            name: vrf.to_string(),
            asn: 64514,
            vni: id,
            vrf: vrf.to_string(),
            local_cidr: cidr.to_string(),
            vxlan_port: VXLAN_PORT,
        }
    }

    #[test]
    fn test_host_config() {
        let config = host_config(
            1,
            "/run/netns/perouter",
            &[underlay()],
            &[
                vni("red", 100, "192.168.1.0/24"),
                vni("blue", 200, "192.168.2.0/24"),
            ],
        )
        .unwrap()
        .unwrap();
        assert_eq!(config.target, PathBuf::from("/run/netns/perouter"));
        assert_eq!(
            config.underlay,
            UnderlayParams {
                nic: "eth1".to_string(),
                vtep: "100.65.0.1/32".parse().unwrap(),
            }
        );
        assert_eq!(
            config.vnis[0],
            VniParams {
                vrf: "red".to_string(),
                vni: 100,
                vxlan_port: VXLAN_PORT,
                vtep: "100.65.0.1".parse().unwrap(),
                veth_host: "192.168.1.2/24".parse().unwrap(),
                veth_ns: "192.168.1.0/32".parse().unwrap(),
            }
        );
        assert_eq!(config.vnis[1].vrf, "blue");
        assert_eq!(config.vnis[1].veth_host, "192.168.2.2/24".parse().unwrap());
    }

    #[test]
    fn test_nothing_to_converge() {
        let vnis = [vni("red", 100, "192.168.1.0/24")];
        assert_eq!(host_config(0, "/x", &[], &vnis), Ok(None));
        assert_eq!(host_config(0, "/x", &[underlay()], &[]), Ok(None));
    }

    #[test]
    fn test_too_many_underlays() {
        let vnis = [vni("red", 100, "192.168.1.0/24")];
        assert_eq!(
            host_config(0, "/x", &[underlay(), underlay(), underlay()], &vnis),
            Err(ConfigError::TooManyInstances("Underlay", 3))
        );
    }

    #[test]
    fn test_shared_vrf() {
        let vnis = [
            vni("red", 100, "192.168.1.0/24"),
            vni("red", 200, "192.168.2.0/24"),
        ];
        assert_eq!(
            host_config(0, "/x", &[underlay()], &vnis),
            Err(ConfigError::DuplicateVrf("red".to_string()))
        );
    }

    #[test]
    fn test_exhausted_pool() {
        let vnis = [vni("red", 100, "192.168.1.0/30")];
        let result = host_config(3, "/x", &[underlay()], &vnis);
        assert!(matches!(result, Err(ConfigError::Ipam(name, _)) if name == "red"));
    }
}
