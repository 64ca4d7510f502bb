// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The underlay of the router namespace: the VTEP loopback and the uplink NIC.
//!
//! The NIC serving as uplink is recognized by a sentinel address assigned when it is moved in.
//! This lets a convergence pass notice that the operator picked another NIC and give the old one
//! back to the host.

use crate::address::Address;
use crate::errors::{DataplaneError, Kind, NetlinkContext, Op};
use crate::link::Link;
use crate::netns::Netns;
use crate::{Changes, Manager, manager_of};
use ipnet::IpNet;
use rtnetlink::LinkDummy;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, info};

/// Dummy device carrying the VTEP address and egressing vxlan traffic.
pub const UNDERLAY_LOOPBACK: &str = "lound";

const SENTINEL: Ipv4Addr = Ipv4Addr::new(172, 16, 1, 1);

/// Host prefix tagging the uplink NIC.
#[must_use]
pub fn sentinel() -> IpNet {
    IpNet::from(IpAddr::V4(SENTINEL))
}

/// Whether an address must follow the NIC across namespaces. Link-local IPv6 addresses are
/// regenerated by the kernel.
#[must_use]
pub fn is_portable(prefix: &IpNet) -> bool {
    match prefix {
        IpNet::V4(_) => true,
        IpNet::V6(net) => !net.addr().is_unicast_link_local(),
    }
}

/// Marker for the underlay operations of a [`Manager`].
#[non_exhaustive]
pub struct Underlay;

impl Manager<Underlay> {
    /// Make sure the underlay loopback exists, carries `vtep` and is up.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn ensure_loopback(&self, vtep: IpNet) -> Result<(Link, Changes), DataplaneError> {
        let links = manager_of::<Link>(self);
        let mut changes = Changes::NONE;
        let existing = match links.by_name(UNDERLAY_LOOPBACK).await? {
            Some(link) if link.is_dummy() => Some(link),
            Some(wrong) => {
                info!("Replacing link {UNDERLAY_LOOPBACK}, which is not a dummy");
                changes += links.remove(&wrong, Kind::Loopback).await?;
                None
            }
            None => None,
        };
        let loopback = match existing {
            Some(loopback) => loopback,
            None => {
                debug!("Creating underlay loopback {UNDERLAY_LOOPBACK}");
                self.handle
                    .link()
                    .add(LinkDummy::new(UNDERLAY_LOOPBACK).build())
                    .execute()
                    .await
                    .context(Op::Create, Kind::Loopback, UNDERLAY_LOOPBACK)?;
                changes += Changes::ONE;
                links.expect(Kind::Loopback, UNDERLAY_LOOPBACK).await?
            }
        };
        changes += manager_of::<Address>(self).ensure(&loopback, vtep).await?;
        changes += links.set_up(&loopback, Kind::Loopback).await?;
        Ok((loopback, changes))
    }

    /// Give back to `host` a NIC that served as uplink but is not `nic`.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn release_stale_nic(
        &self,
        nic: &str,
        host: &Netns,
    ) -> Result<Changes, DataplaneError> {
        let addresses = manager_of::<Address>(self);
        let links = manager_of::<Link>(self);
        let Some(index) = addresses.holder_of(sentinel()).await? else {
            return Ok(Changes::NONE);
        };
        let Some(tagged) = links.by_index(index).await? else {
            return Ok(Changes::NONE);
        };
        if tagged.name == nic {
            return Ok(Changes::NONE);
        }
        info!("Uplink moves to {nic}, releasing {}", tagged.name);
        let mut changes = addresses.remove(&tagged, sentinel()).await?;
        changes += links.move_to(&tagged, Kind::Nic, host).await?;
        Ok(changes)
    }

    /// Whether a link named `nic` is in the namespace.
    ///
    /// # Errors
    ///
    /// Fails if the lookup fails.
    pub async fn has_nic(&self, nic: &str) -> Result<bool, DataplaneError> {
        Ok(manager_of::<Link>(self).by_name(nic).await?.is_some())
    }

    /// Tag `nic` as the uplink, restore the addresses it had before moving and set it up.
    ///
    /// # Errors
    ///
    /// [`DataplaneError::NotFound`] if `nic` is not in the namespace.
    pub async fn adopt_nic(
        &self,
        nic: &str,
        restore: &[IpNet],
    ) -> Result<Changes, DataplaneError> {
        let links = manager_of::<Link>(self);
        let addresses = manager_of::<Address>(self);
        let link = links.expect(Kind::Nic, nic).await?;
        let tag = sentinel();
        let mut changes = Changes::NONE;
        for prefix in restore.iter().chain([&tag]) {
            changes += addresses.ensure(&link, *prefix).await?;
        }
        changes += links.set_up(&link, Kind::Nic).await?;
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_a_host_prefix() {
        assert_eq!(sentinel(), "172.16.1.1/32".parse::<IpNet>().unwrap());
    }

    #[test]
    fn link_local_addresses_stay_behind() {
        assert!(is_portable(&"10.0.0.5/24".parse().unwrap()));
        assert!(is_portable(&"2001:db8::5/64".parse().unwrap()));
        assert!(!is_portable(&"fe80::1/64".parse().unwrap()));
    }
}
