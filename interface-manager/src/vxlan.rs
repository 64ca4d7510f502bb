// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The vxlan device of a VNI.
//!
//! Linux can't update most vxlan properties in place: a device that doesn't match is deleted
//! and created again.

use crate::errors::{DataplaneError, Kind, NetlinkContext, Op};
use crate::link::{Link, VxlanInfo};
use crate::{Changes, Manager, manager_of, sysctl};
use rtnetlink::packet_route::link::{
    InfoBridgePort, InfoData, InfoPortData, InfoPortKind, InfoVxlan, LinkAttribute, LinkInfo,
};
use rtnetlink::{LinkUnspec, LinkVxlan};
use std::net::IpAddr;
use tracing::{debug, info};

pub const VXLAN_PREFIX: &str = "vni";

/// Marker for the vxlan operations of a [`Manager`].
#[non_exhaustive]
pub struct Vxlan;

#[must_use]
pub fn vxlan_name(vni: u32) -> String {
    format!("{VXLAN_PREFIX}{vni}")
}

/// The VNI a vxlan device was created for, if `name` is one of ours.
#[must_use]
pub fn vni_of_vxlan(name: &str) -> Option<u32> {
    name.strip_prefix(VXLAN_PREFIX)?.parse().ok()
}

/// The vxlan device we want.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VxlanSpec {
    pub vni: u32,
    pub port: u16,
    /// Source address, the VTEP.
    pub local: IpAddr,
    /// Index of the underlay loopback.
    pub dev: u32,
    /// Index of the bridge of the VNI.
    pub bridge: u32,
}

impl VxlanSpec {
    #[must_use]
    pub fn name(&self) -> String {
        vxlan_name(self.vni)
    }

    /// Whether `link` can be kept as is.
    #[must_use]
    pub fn matches(&self, link: &Link) -> bool {
        let wanted = VxlanInfo {
            vni: Some(self.vni),
            port: Some(self.port),
            learning: Some(false),
            local: Some(self.local),
            dev: Some(self.dev),
        };
        link.vxlan() == Some(&wanted) && link.controller == Some(self.bridge)
    }

    fn info_data(&self) -> InfoData {
        let local = match self.local {
            IpAddr::V4(a) => InfoVxlan::Local(a),
            IpAddr::V6(a) => InfoVxlan::Local6(a),
        };
        InfoData::Vxlan(vec![
            InfoVxlan::Id(self.vni),
            InfoVxlan::Port(self.port),
            InfoVxlan::Learning(false),
            local,
            InfoVxlan::Link(self.dev),
        ])
    }
}

impl Manager<Vxlan> {
    async fn suppress_neighbors(&self, link: &Link) -> Result<Changes, DataplaneError> {
        if link.neigh_suppress == Some(true) {
            return Ok(Changes::NONE);
        }
        let mut message = LinkUnspec::new_with_index(link.index).build();
        message.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::PortKind(InfoPortKind::Bridge),
            LinkInfo::PortData(InfoPortData::BridgePort(vec![
                InfoBridgePort::NeighSupress(true),
            ])),
        ]));
        self.handle
            .link()
            .set_port(message)
            .execute()
            .await
            .context(Op::Update, Kind::Vxlan, &link.name)?;
        Ok(Changes::ONE)
    }

    /// Make sure the vxlan device of `spec` exists with exactly the wanted properties, in the
    /// bridge, up, with neighbor suppression on and no IPv6 address generation.
    ///
    /// Must run on a thread inside the namespace of this manager.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn ensure(&self, spec: &VxlanSpec) -> Result<(Link, Changes), DataplaneError> {
        let links = manager_of::<Link>(self);
        let name = spec.name();
        let mut changes = Changes::NONE;
        let existing = match links.by_name(&name).await? {
            Some(link) if spec.matches(&link) => Some(link),
            Some(stale) => {
                info!("Replacing vxlan {name}: properties differ");
                changes += links.remove(&stale, Kind::Vxlan).await?;
                None
            }
            None => None,
        };
        let vxlan = match existing {
            Some(vxlan) => vxlan,
            None => {
                debug!("Creating vxlan {name}");
                self.handle
                    .link()
                    .add(
                        LinkVxlan::new(&name, spec.vni)
                            .set_info_data(spec.info_data())
                            .controller(spec.bridge)
                            .build(),
                    )
                    .execute()
                    .await
                    .context(Op::Create, Kind::Vxlan, &name)?;
                changes += Changes::ONE;
                links.expect(Kind::Vxlan, &name).await?
            }
        };
        changes += sysctl::disable_addr_gen(&name)?;
        changes += self.suppress_neighbors(&vxlan).await?;
        changes += links.set_up(&vxlan, Kind::Vxlan).await?;
        Ok((vxlan, changes))
    }
}
