// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The declared state of a router node, as produced by the cluster operator.

pub mod duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use strum::{Display, EnumString};

use crate::errors::{ConfigError, ConfigResult};

/// ASN modes where the remote ASN is not pinned.
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DynamicAsnMode {
    Internal,
    External,
}

/// A BGP peer, either of the underlay or of a VNI.
#[derive(Builder, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into))]
pub struct Neighbor {
    /// Remote ASN. Zero means unset.
    #[serde(default)]
    pub asn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_asn: Option<DynamicAsnMode>,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Name of the secret holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<String>,
    #[serde(default, with = "duration::opt", skip_serializing_if = "Option::is_none")]
    pub hold_time: Option<Duration>,
    #[serde(default, with = "duration::opt", skip_serializing_if = "Option::is_none")]
    pub keepalive_time: Option<Duration>,
    #[serde(default, with = "duration::opt", skip_serializing_if = "Option::is_none")]
    pub connect_time: Option<Duration>,
    #[serde(default)]
    pub ebgp_multi_hop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bfd_profile: Option<String>,
}

impl Neighbor {
    /// Identity of the neighbor for diagnostics: `<asn>@<address>`, where a dynamic mode stands in
    /// for an unset ASN.
    #[must_use]
    pub fn name(&self) -> String {
        match (self.asn, self.dynamic_asn) {
            (0, Some(mode)) => format!("{mode}@{}", self.address),
            (asn, _) => format!("{asn}@{}", self.address),
        }
    }

    /// Check that exactly one of ASN and dynamic ASN mode is set.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingAsn`] or [`ConfigError::ConflictingAsn`].
    pub fn validate_asn(&self) -> ConfigResult {
        match (self.asn, self.dynamic_asn) {
            (0, None) => Err(ConfigError::MissingAsn(self.name())),
            (0, Some(_)) | (_, None) => Ok(()),
            (_, Some(_)) => Err(ConfigError::ConflictingAsn(self.name())),
        }
    }
}

/// The uplink of the node. There is at most one per node.
#[derive(Builder, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into))]
pub struct Underlay {
    pub name: String,
    pub asn: u32,
    /// Pool the VTEP address of every node is derived from.
    #[serde(rename = "vtepcidr")]
    pub vtep_cidr: String,
    /// Physical NIC moved into the router namespace.
    pub nic: String,
    #[serde(default)]
    pub neighbors: Vec<Neighbor>,
}

/// One tenant overlay.
#[derive(Builder, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into))]
pub struct Vni {
    pub name: String,
    pub asn: u32,
    pub vni: u32,
    /// Name of the VRF, unique per node.
    pub vrf: String,
    /// Pool the veth addresses are derived from.
    #[serde(rename = "localcidr")]
    pub local_cidr: String,
    #[serde(default = "default_vxlan_port")]
    pub vxlan_port: u16,
}

/// The IANA VXLAN port.
pub const VXLAN_PORT: u16 = 4789;

/// VNIs are 24-bit.
pub const MAX_VNI: u32 = (1 << 24) - 1;

/// Interface names hold 15 bytes, and the host leg of a VNI is named `host<vrf>`.
pub const MAX_VRF_NAME_LEN: usize = 15 - "host".len();

/// Check that the VNIs of a node can coexist in its dataplane.
///
/// # Errors
///
/// Fails on the first VNI out of range, VRF name too long, or VRF or VNI used twice.
pub fn validate_vnis(vnis: &[Vni]) -> ConfigResult {
    let mut vrfs = BTreeSet::new();
    let mut ids = BTreeSet::new();
    for vni in vnis {
        if vni.vni > MAX_VNI {
            return Err(ConfigError::VniOutOfRange(vni.vni));
        }
        if vni.vrf.len() > MAX_VRF_NAME_LEN {
            return Err(ConfigError::VrfNameTooLong(
                vni.vrf.clone(),
                MAX_VRF_NAME_LEN,
            ));
        }
        if !vrfs.insert(vni.vrf.as_str()) {
            return Err(ConfigError::DuplicateVrf(vni.vrf.clone()));
        }
        if !ids.insert(vni.vni) {
            return Err(ConfigError::DuplicateVni(vni.vni));
        }
    }
    Ok(())
}

fn default_vxlan_port() -> u16 {
    VXLAN_PORT
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn neighbor_names() {
        let n = NeighborBuilder::default()
            .asn(65001u32)
            .address("10.0.0.1")
            .build()
            .unwrap();
        assert_eq!(n.name(), "65001@10.0.0.1");
        let n = NeighborBuilder::default()
            .dynamic_asn(DynamicAsnMode::External)
            .address("fd00::1")
            .build()
            .unwrap();
        assert_eq!(n.name(), "external@fd00::1");
    }

    #[test]
    fn asn_is_exactly_one_of() {
        let mut n = Neighbor {
            address: "10.0.0.1".to_owned(),
            ..Default::default()
        };
        assert_eq!(
            n.validate_asn(),
            Err(ConfigError::MissingAsn("0@10.0.0.1".to_owned()))
        );
        n.dynamic_asn = Some(DynamicAsnMode::Internal);
        assert_eq!(n.validate_asn(), Ok(()));
        n.asn = 64512;
        assert!(matches!(
            n.validate_asn(),
            Err(ConfigError::ConflictingAsn(_))
        ));
        n.dynamic_asn = None;
        assert_eq!(n.validate_asn(), Ok(()));
    }

    #[test]
    fn deserialize_declared_state() {
        let yaml = r"
name: underlay
asn: 64514
vtepcidr: 100.65.0.0/24
nic: eth1
neighbors:
  - asn: 64512
    address: 192.168.11.2
    holdTime: 1m30s
    keepaliveTime: 30s
    bfdProfile: fast
  - dynamicAsn: internal
    address: fd00::2
    passwordSecret: bgp-auth
";
        let underlay: Underlay = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(underlay.vtep_cidr, "100.65.0.0/24");
        assert_eq!(underlay.neighbors.len(), 2);
        let first = &underlay.neighbors[0];
        assert_eq!(first.hold_time, Some(Duration::from_secs(90)));
        assert_eq!(first.keepalive_time, Some(Duration::from_secs(30)));
        assert_eq!(first.bfd_profile.as_deref(), Some("fast"));
        assert_eq!(first.port, None);
        let second = &underlay.neighbors[1];
        assert_eq!(second.dynamic_asn, Some(DynamicAsnMode::Internal));
        assert_eq!(second.password_secret.as_deref(), Some("bgp-auth"));

        let vni: Vni = serde_yaml_ng::from_str(
            "{name: red, asn: 64520, vni: 100, vrf: red, localcidr: 192.169.10.0/24}",
        )
        .unwrap();
        assert_eq!(vni.vxlan_port, VXLAN_PORT);
    }

    fn vni(vrf: &str, id: u32) -> Vni {
        VniBuilder::default()
            .name(vrf)
            .asn(64514u32)
            .vni(id)
            .vrf(vrf)
            .local_cidr("192.168.1.0/24")
            .vxlan_port(VXLAN_PORT)
            .build()
            .unwrap()
    }

    #[test]
    fn vnis_must_coexist() {
        assert_eq!(validate_vnis(&[vni("red", 100), vni("blue", 200)]), Ok(()));
        assert_eq!(
            validate_vnis(&[vni("red", 100), vni("red", 200)]),
            Err(ConfigError::DuplicateVrf("red".to_owned()))
        );
        assert_eq!(
            validate_vnis(&[vni("red", 100), vni("blue", 100)]),
            Err(ConfigError::DuplicateVni(100))
        );
        assert_eq!(
            validate_vnis(&[vni("red", MAX_VNI + 1)]),
            Err(ConfigError::VniOutOfRange(16_777_216))
        );
        assert_eq!(validate_vnis(&[vni("red", MAX_VNI)]), Ok(()));
        assert_eq!(
            validate_vnis(&[vni("tenant-purple", 100)]),
            Err(ConfigError::VrfNameTooLong("tenant-purple".to_owned(), 11))
        );
        assert_eq!(validate_vnis(&[vni("tenant-blue", 100)]), Ok(()));
    }

    #[test]
    fn bad_durations_are_rejected() {
        let yaml = "{address: 10.0.0.1, asn: 1, holdTime: soon}";
        assert!(serde_yaml_ng::from_str::<Neighbor>(yaml).is_err());
    }
}
