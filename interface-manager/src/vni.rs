// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The object set of one VNI, and its garbage collection.
//!
//! A VNI owns a veth pair between the host and the router namespace, a vrf, a bridge and a
//! vxlan device. The vrf name keys the veth and the vrf; the VNI id keys the bridge and the
//! vxlan device.

use crate::address::Address;
use crate::bridge::{Bridge, vni_of_bridge};
use crate::errors::{DataplaneError, Kind};
use crate::link::Link;
use crate::params::VniParams;
use crate::route::Route;
use crate::underlay::UNDERLAY_LOOPBACK;
use crate::veth::{Peer, Veth, host_leg_name, ns_leg_name, vrf_of_host_leg};
use crate::vrf::Vrf;
use crate::vxlan::{Vxlan, VxlanSpec, vni_of_vxlan};
use crate::{Changes, Manager, manager_of};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Marker for the VNI-level operations of a [`Manager`].
#[non_exhaustive]
pub struct Vni;

/// What the host knows about the host leg of a VNI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostLeg {
    Absent,
    /// A link with the right name that must be replaced.
    Stale(Link),
    /// Both legs are still in the host.
    Local { leg: Link, peer: Link },
    /// The peer lives in another namespace, under this index.
    Remote { leg: Link, peer: u32 },
}

impl Manager<Vni> {
    /// Classify the host leg of `vrf`. A peer in another namespace can't be checked from here.
    ///
    /// # Errors
    ///
    /// Fails if a lookup fails.
    pub async fn host_leg(&self, vrf: &str) -> Result<HostLeg, DataplaneError> {
        let links = manager_of::<Link>(self);
        let Some(leg) = links.by_name(&host_leg_name(vrf)).await? else {
            return Ok(HostLeg::Absent);
        };
        match Peer::of(&leg) {
            Some(Peer::Remote(peer)) => Ok(HostLeg::Remote { leg, peer }),
            Some(Peer::Local(index)) => match links.by_index(index).await? {
                Some(peer) if peer.name == ns_leg_name(vrf) => Ok(HostLeg::Local { leg, peer }),
                _ => Ok(HostLeg::Stale(leg)),
            },
            None => Ok(HostLeg::Stale(leg)),
        }
    }

    /// Create the pair of `vrf` afresh, replacing `stale` if given.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn recreate_pair(
        &self,
        vrf: &str,
        stale: Option<&Link>,
    ) -> Result<(Link, Link, Changes), DataplaneError> {
        let links = manager_of::<Link>(self);
        let mut changes = Changes::NONE;
        if let Some(stale) = stale {
            info!(
                "Replacing {}: not the host leg of a veth to {}",
                stale.name,
                ns_leg_name(vrf)
            );
            changes += links.remove(stale, Kind::Veth).await?;
        }
        changes += manager_of::<Veth>(self).create(vrf).await?;
        let leg = links.expect(Kind::Veth, &host_leg_name(vrf)).await?;
        let peer = links.expect(Kind::Veth, &ns_leg_name(vrf)).await?;
        Ok((leg, peer, changes))
    }

    /// Whether the link with `index` is the namespace leg of `vrf`.
    ///
    /// # Errors
    ///
    /// Fails if the lookup fails.
    pub async fn is_ns_leg(&self, index: u32, vrf: &str) -> Result<bool, DataplaneError> {
        let peer = manager_of::<Link>(self).by_index(index).await?;
        Ok(peer.is_some_and(|peer| peer.name == ns_leg_name(vrf)))
    }

    /// Address the host leg and set it up.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn finish_host_leg(
        &self,
        leg: &Link,
        params: &VniParams,
    ) -> Result<Changes, DataplaneError> {
        let mut changes = manager_of::<Address>(self)
            .ensure(leg, params.veth_host)
            .await?;
        changes += manager_of::<Link>(self).set_up(leg, Kind::Veth).await?;
        Ok(changes)
    }

    /// Everything of the VNI that lives in the router namespace, the namespace leg being already
    /// there.
    ///
    /// # Errors
    ///
    /// Fails on the first kernel operation that fails.
    pub async fn converge_in_router(&self, params: &VniParams) -> Result<Changes, DataplaneError> {
        let links = manager_of::<Link>(self);
        let ns_leg = links.expect(Kind::Veth, &ns_leg_name(&params.vrf)).await?;

        let (vrf, mut changes) = manager_of::<Vrf>(self).ensure(&params.vrf).await?;
        let table = vrf.vrf_table().ok_or_else(|| DataplaneError::NotFound {
            kind: Kind::Vrf,
            name: params.vrf.clone(),
        })?;
        changes += links.set_controller(&ns_leg, Kind::Veth, &vrf).await?;
        changes += manager_of::<Address>(self)
            .ensure(&ns_leg, params.veth_ns)
            .await?;
        changes += links.set_up(&ns_leg, Kind::Veth).await?;

        let (bridge, done) = manager_of::<Bridge>(self).ensure(params.vni, &vrf).await?;
        changes += done;

        let loopback = links.expect(Kind::Loopback, UNDERLAY_LOOPBACK).await?;
        let spec = VxlanSpec {
            vni: params.vni,
            port: params.vxlan_port,
            local: params.vtep,
            dev: loopback.index,
            bridge: bridge.index,
        };
        changes += manager_of::<Vxlan>(self).ensure(&spec).await?.1;

        changes += manager_of::<Route>(self)
            .ensure_host_route(params.veth_host.addr(), table, &ns_leg)
            .await?;
        Ok(changes)
    }

    /// Delete the host legs of the vrfs not in `vrfs`.
    ///
    /// # Errors
    ///
    /// Fails on the first deletion that fails.
    pub async fn remove_stale_host_legs(
        &self,
        vrfs: &BTreeSet<String>,
    ) -> Result<Changes, DataplaneError> {
        let links = manager_of::<Link>(self);
        let mut changes = Changes::NONE;
        for link in links.list().await? {
            let Some(vrf) = vrf_of_host_leg(&link.name) else {
                continue;
            };
            if link.is_veth() && !vrfs.contains(vrf) {
                info!(vrf, "Removing stale veth {}", link.name);
                changes += links.remove(&link, Kind::Veth).await?;
            }
        }
        Ok(changes)
    }

    /// Delete the vxlan devices and bridges of VNIs not in `vnis`, then the vrfs not in `vrfs`.
    ///
    /// # Errors
    ///
    /// Fails on the first deletion that fails.
    pub async fn remove_stale_in_router(
        &self,
        vnis: &BTreeSet<u32>,
        vrfs: &BTreeSet<String>,
    ) -> Result<Changes, DataplaneError> {
        let links = manager_of::<Link>(self);
        let mut changes = Changes::NONE;
        let mut stale_vrfs = vec![];
        for link in links.list().await? {
            let (kind, vni) = if link.vxlan().is_some() {
                (Kind::Vxlan, vni_of_vxlan(&link.name))
            } else if link.is_bridge() {
                (Kind::Bridge, vni_of_bridge(&link.name))
            } else {
                if link.is_vrf() && !vrfs.contains(&link.name) {
                    stale_vrfs.push(link);
                }
                continue;
            };
            match vni {
                Some(vni) if !vnis.contains(&vni) => {
                    info!(vni, "Removing stale {kind} {}", link.name);
                    changes += links.remove(&link, kind).await?;
                }
                Some(_) => {}
                None => debug!("Ignoring {kind} {}: not named after a VNI", link.name),
            }
        }
        for vrf in stale_vrfs {
            info!(vrf = %vrf.name, "Removing stale vrf");
            changes += links.remove(&vrf, Kind::Vrf).await?;
        }
        Ok(changes)
    }
}
