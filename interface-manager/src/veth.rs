// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The veth pair linking the host to the vrf of a VNI in the router namespace.

use crate::errors::{DataplaneError, Kind, NetlinkContext, Op};
use crate::link::Link;
use crate::{Changes, Manager};
use rtnetlink::LinkVeth;
use tracing::debug;

pub const HOST_VETH_PREFIX: &str = "host";
pub const NS_VETH_PREFIX: &str = "pe";

/// Marker for the veth operations of a [`Manager`].
#[non_exhaustive]
pub struct Veth;

#[must_use]
pub fn host_leg_name(vrf: &str) -> String {
    format!("{HOST_VETH_PREFIX}{vrf}")
}

#[must_use]
pub fn ns_leg_name(vrf: &str) -> String {
    format!("{NS_VETH_PREFIX}{vrf}")
}

/// The vrf served by a host leg, if `name` is one.
#[must_use]
pub fn vrf_of_host_leg(name: &str) -> Option<&str> {
    name.strip_prefix(HOST_VETH_PREFIX).filter(|vrf| !vrf.is_empty())
}

/// Where the other end of a veth is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Peer {
    /// In the same namespace, with this index.
    Local(u32),
    /// In another namespace, with this index there.
    Remote(u32),
}

impl Peer {
    #[must_use]
    pub fn of(link: &Link) -> Option<Peer> {
        if !link.is_veth() {
            return None;
        }
        link.peer.map(|index| match link.peer_netnsid {
            Some(_) => Peer::Remote(index),
            None => Peer::Local(index),
        })
    }
}

impl Manager<Veth> {
    /// Create the pair for `vrf`, both legs in the namespace of this manager.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn create(&self, vrf: &str) -> Result<Changes, DataplaneError> {
        let host = host_leg_name(vrf);
        let ns = ns_leg_name(vrf);
        debug!("Creating veth pair {host} <-> {ns}");
        self.handle
            .link()
            .add(LinkVeth::new(&host, &ns).build())
            .execute()
            .await
            .context(Op::Create, Kind::Veth, &host)?;
        Ok(Changes::ONE)
    }
}
