// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Observed network interfaces and the operations common to all of them.

use crate::errors::{DataplaneError, Kind, NetlinkContext, Op, is_errno};
use crate::netns::Netns;
use crate::{Changes, Manager};
use futures::{TryStream, TryStreamExt};
use nix::errno::Errno;
use rtnetlink::LinkUnspec;
use rtnetlink::packet_route::link::{
    InfoBridgePort, InfoData, InfoKind, InfoPortData, InfoVrf, InfoVxlan, LinkAttribute,
    LinkFlags, LinkInfo, LinkMessage,
};
use std::net::IpAddr;
use std::os::fd::AsRawFd;
use tracing::debug;

/// The vxlan attributes we manage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VxlanInfo {
    pub vni: Option<u32>,
    pub port: Option<u16>,
    pub learning: Option<bool>,
    pub local: Option<IpAddr>,
    /// Index of the egress device.
    pub dev: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkKind {
    Veth,
    Bridge,
    Vrf { table: Option<u32> },
    Vxlan(VxlanInfo),
    Dummy,
    Other,
}

/// A network interface as reported by the kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub index: u32,
    pub name: String,
    pub kind: LinkKind,
    pub up: bool,
    pub controller: Option<u32>,
    /// For a veth, the index of its peer, in the namespace given by `peer_netnsid`.
    pub peer: Option<u32>,
    /// Set when the peer lives in another namespace.
    pub peer_netnsid: Option<i32>,
    /// Neighbor suppression on a bridge port.
    pub neigh_suppress: Option<bool>,
}

impl Link {
    #[must_use]
    pub fn is_veth(&self) -> bool {
        self.kind == LinkKind::Veth
    }
    #[must_use]
    pub fn is_bridge(&self) -> bool {
        self.kind == LinkKind::Bridge
    }
    #[must_use]
    pub fn is_dummy(&self) -> bool {
        self.kind == LinkKind::Dummy
    }
    #[must_use]
    pub fn vrf_table(&self) -> Option<u32> {
        match self.kind {
            LinkKind::Vrf { table } => table,
            _ => None,
        }
    }
    #[must_use]
    pub fn is_vrf(&self) -> bool {
        matches!(self.kind, LinkKind::Vrf { .. })
    }
    #[must_use]
    pub fn vxlan(&self) -> Option<&VxlanInfo> {
        match &self.kind {
            LinkKind::Vxlan(info) => Some(info),
            _ => None,
        }
    }
}

fn parse_vxlan(attrs: &[InfoVxlan]) -> VxlanInfo {
    let mut info = VxlanInfo::default();
    for attr in attrs {
        match attr {
            InfoVxlan::Id(vni) => info.vni = Some(*vni),
            InfoVxlan::Port(port) => info.port = Some(*port),
            InfoVxlan::Learning(learning) => info.learning = Some(*learning),
            InfoVxlan::Local(local) => info.local = Some(IpAddr::V4(*local)),
            InfoVxlan::Local6(local) => info.local = Some(IpAddr::V6(*local)),
            InfoVxlan::Link(dev) => info.dev = Some(*dev),
            _ => {}
        }
    }
    info
}

impl TryFrom<&LinkMessage> for Link {
    type Error = u32;

    /// Fails, returning the interface index, if the message carries no name.
    fn try_from(message: &LinkMessage) -> Result<Self, Self::Error> {
        let index = message.header.index;
        let mut name = None;
        let mut kind = LinkKind::Other;
        let mut controller = None;
        let mut peer = None;
        let mut peer_netnsid = None;
        let mut neigh_suppress = None;
        let mut vrf_table = None;
        let mut vxlan = None;

        for attr in &message.attributes {
            match attr {
                LinkAttribute::IfName(n) => name = Some(n.clone()),
                LinkAttribute::Controller(c) => controller = Some(*c),
                LinkAttribute::Link(p) => peer = Some(*p),
                LinkAttribute::LinkNetNsId(id) => peer_netnsid = Some(*id),
                LinkAttribute::LinkInfo(infos) => {
                    for info in infos {
                        match info {
                            LinkInfo::Kind(k) => {
                                kind = match k {
                                    InfoKind::Veth => LinkKind::Veth,
                                    InfoKind::Bridge => LinkKind::Bridge,
                                    InfoKind::Vrf => LinkKind::Vrf { table: None },
                                    InfoKind::Vxlan => LinkKind::Vxlan(VxlanInfo::default()),
                                    InfoKind::Dummy => LinkKind::Dummy,
                                    _ => LinkKind::Other,
                                }
                            }
                            LinkInfo::Data(InfoData::Vrf(data)) => {
                                vrf_table = data.iter().find_map(|d| match d {
                                    InfoVrf::TableId(t) => Some(*t),
                                    _ => None,
                                });
                            }
                            LinkInfo::Data(InfoData::Vxlan(data)) => {
                                vxlan = Some(parse_vxlan(data));
                            }
                            LinkInfo::PortData(InfoPortData::BridgePort(data)) => {
                                neigh_suppress = data.iter().find_map(|d| match d {
                                    InfoBridgePort::NeighSupress(on) => Some(*on),
                                    _ => None,
                                });
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        // kind and data come in any order
        match &mut kind {
            LinkKind::Vrf { table } => *table = vrf_table,
            LinkKind::Vxlan(info) => *info = vxlan.unwrap_or_default(),
            _ => {}
        }
        Ok(Link {
            index,
            name: name.ok_or(index)?,
            kind,
            up: message.header.flags.contains(LinkFlags::Up),
            controller,
            peer,
            peer_netnsid,
            neigh_suppress,
        })
    }
}

async fn first_link<S>(mut request: S, name: &str) -> Result<Option<Link>, DataplaneError>
where
    S: TryStream<Ok = LinkMessage, Error = rtnetlink::Error> + Unpin,
{
    match request.try_next().await {
        Ok(Some(message)) => Ok(Link::try_from(&message).ok()),
        Ok(None) => Ok(None),
        Err(e) if is_errno(&e, Errno::ENODEV) => Ok(None),
        Err(e) => Err(e).context(Op::Lookup, Kind::Link, name),
    }
}

impl Manager<Link> {
    /// Look up a link by name.
    ///
    /// # Errors
    ///
    /// Fails on netlink errors other than the link not existing.
    pub async fn by_name(&self, name: &str) -> Result<Option<Link>, DataplaneError> {
        let request = self
            .handle
            .link()
            .get()
            .match_name(name.to_owned())
            .execute();
        first_link(request, name).await
    }

    /// Look up a link by index.
    ///
    /// # Errors
    ///
    /// Fails on netlink errors other than the link not existing.
    pub async fn by_index(&self, index: u32) -> Result<Option<Link>, DataplaneError> {
        let request = self.handle.link().get().match_index(index).execute();
        first_link(request, &format!("#{index}")).await
    }

    /// Look up a link by name and fail if it does not exist.
    ///
    /// # Errors
    ///
    /// [`DataplaneError::NotFound`] if there is no such link.
    pub async fn expect(&self, kind: Kind, name: &str) -> Result<Link, DataplaneError> {
        self.by_name(name)
            .await?
            .ok_or_else(|| DataplaneError::NotFound {
                kind,
                name: name.to_owned(),
            })
    }

    /// All the links of the namespace.
    ///
    /// # Errors
    ///
    /// Fails if the dump fails.
    pub async fn list(&self) -> Result<Vec<Link>, DataplaneError> {
        let mut request = self.handle.link().get().execute();
        let mut links = vec![];
        while let Some(message) = request
            .try_next()
            .await
            .context(Op::Lookup, Kind::Link, "*")?
        {
            match Link::try_from(&message) {
                Ok(link) => links.push(link),
                Err(index) => debug!("Ignoring nameless link #{index}"),
            }
        }
        Ok(links)
    }

    /// Delete a link. Deleting one leg of a veth deletes both.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn remove(&self, link: &Link, kind: Kind) -> Result<Changes, DataplaneError> {
        debug!("Deleting {kind} {}", link.name);
        self.handle
            .link()
            .del(link.index)
            .execute()
            .await
            .context(Op::Delete, kind, &link.name)?;
        Ok(Changes::ONE)
    }

    /// Set a link administratively up, unless it already is.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn set_up(&self, link: &Link, kind: Kind) -> Result<Changes, DataplaneError> {
        if link.up {
            return Ok(Changes::NONE);
        }
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(link.index).up().build())
            .execute()
            .await
            .context(Op::Update, kind, &link.name)?;
        Ok(Changes::ONE)
    }

    /// Enslave a link to `controller`, unless it already is.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn set_controller(
        &self,
        link: &Link,
        kind: Kind,
        controller: &Link,
    ) -> Result<Changes, DataplaneError> {
        if link.controller == Some(controller.index) {
            return Ok(Changes::NONE);
        }
        debug!("Setting {} as controller of {}", controller.name, link.name);
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(link.index)
                    .controller(controller.index)
                    .build(),
            )
            .execute()
            .await
            .context(Op::Update, kind, &link.name)?;
        Ok(Changes::ONE)
    }

    /// Move a link to another namespace. The link loses its addresses and goes down.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn move_to(
        &self,
        link: &Link,
        kind: Kind,
        netns: &Netns,
    ) -> Result<Changes, DataplaneError> {
        debug!("Moving {kind} {} to {}", link.name, netns.path().display());
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(link.index)
                    .setns_by_fd(netns.file().as_raw_fd())
                    .build(),
            )
            .execute()
            .await
            .context(Op::Move, kind, &link.name)?;
        Ok(Changes::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rtnetlink::packet_route::link::InfoPortKind;
    use rtnetlink::{LinkBridge, LinkVrf, LinkVxlan};
    use std::net::Ipv4Addr;

    #[test]
    fn parse_vrf() {
        let mut message = LinkVrf::new("red", 7).up().build();
        message.header.index = 12;
        message.header.flags = LinkFlags::Up;
        let link = Link::try_from(&message).unwrap();
        assert_eq!(link.index, 12);
        assert_eq!(link.name, "red");
        assert_eq!(link.vrf_table(), Some(7));
        assert!(link.up);
        assert!(!link.is_bridge());
    }

    #[test]
    fn parse_vxlan_port() {
        let mut message = LinkVxlan::new("vni100", 100)
            .set_info_data(InfoData::Vxlan(vec![
                InfoVxlan::Id(100),
                InfoVxlan::Port(4789),
                InfoVxlan::Learning(false),
                InfoVxlan::Local(Ipv4Addr::new(100, 65, 0, 1)),
                InfoVxlan::Link(3),
            ]))
            .build();
        message.header.index = 20;
        message.attributes.push(LinkAttribute::Controller(9));
        message.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::PortKind(InfoPortKind::Bridge),
            LinkInfo::PortData(InfoPortData::BridgePort(vec![InfoBridgePort::NeighSupress(
                true,
            )])),
        ]));
        let link = Link::try_from(&message).unwrap();
        assert_eq!(
            link.vxlan(),
            Some(&VxlanInfo {
                vni: Some(100),
                port: Some(4789),
                learning: Some(false),
                local: Some(IpAddr::V4(Ipv4Addr::new(100, 65, 0, 1))),
                dev: Some(3),
            })
        );
        assert_eq!(link.controller, Some(9));
        assert_eq!(link.neigh_suppress, Some(true));
        assert!(!link.up);
    }

    #[test]
    fn nameless_links_are_rejected() {
        let mut message = LinkBridge::new("br1").build();
        message
            .attributes
            .retain(|a| !matches!(a, LinkAttribute::IfName(_)));
        message.header.index = 5;
        assert_eq!(Link::try_from(&message), Err(5));
    }
}
