// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Convergence passes over a router namespace.

use crate::address::Address;
use crate::errors::{DataplaneError, Kind};
use crate::link::Link;
use crate::netns::{Netns, NetnsExecutor};
use crate::params::{UnderlayParams, VniParams};
use crate::underlay::{Underlay, is_portable};
use crate::vni::{HostLeg, Vni};
use crate::{Changes, Manager, manager_of};
use dashmap::DashMap;
use ipnet::IpNet;
use rtnetlink::Handle;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Brings router namespaces in line with an underlay and a set of VNIs.
///
/// The builder keeps no record of what it created: each pass observes the kernel and fixes what
/// differs. Passes over the same namespace are serialized; passes over different namespaces may
/// run concurrently.
#[derive(Debug)]
pub struct DataplaneBuilder {
    host: Manager<Link>,
    host_ns: Netns,
    executor: Arc<NetnsExecutor>,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl DataplaneBuilder {
    /// `handle` must be connected in the host namespace, which must be the namespace of the
    /// calling thread.
    ///
    /// # Errors
    ///
    /// Fails if the namespace of the calling thread can't be opened.
    pub fn new(handle: Arc<Handle>, executor: Arc<NetnsExecutor>) -> Result<Self, DataplaneError> {
        Ok(Self {
            host: Manager::new(handle),
            host_ns: Netns::current()?,
            executor,
            locks: DashMap::new(),
        })
    }

    async fn lock(&self, target: &Netns) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(target.path().to_path_buf())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Converge the VTEP loopback and the uplink NIC of `target`.
    ///
    /// # Errors
    ///
    /// Fails on the first kernel operation that fails. What was done stays done.
    pub async fn converge_underlay(
        &self,
        target: &Netns,
        params: &UnderlayParams,
    ) -> Result<Changes, DataplaneError> {
        let _guard = self.lock(target).await;
        self.underlay(target, params).await
    }

    /// Converge the object set of one VNI.
    ///
    /// # Errors
    ///
    /// Fails on the first kernel operation that fails. What was done stays done.
    pub async fn converge_vni(
        &self,
        target: &Netns,
        params: &VniParams,
    ) -> Result<Changes, DataplaneError> {
        let _guard = self.lock(target).await;
        self.vni(target, params).await
    }

    /// Delete the objects of every VNI not in `desired`, in the host and in `target`.
    ///
    /// # Errors
    ///
    /// Fails on the first deletion that fails.
    pub async fn remove_stale(
        &self,
        target: &Netns,
        desired: &[VniParams],
    ) -> Result<Changes, DataplaneError> {
        let _guard = self.lock(target).await;
        self.stale(target, desired).await
    }

    /// A full pass: underlay, every VNI, then garbage collection, without letting another pass
    /// over `target` interleave.
    ///
    /// # Errors
    ///
    /// Fails on the first kernel operation that fails. What was done stays done.
    pub async fn converge(
        &self,
        target: &Netns,
        underlay: &UnderlayParams,
        vnis: &[VniParams],
    ) -> Result<Changes, DataplaneError> {
        let _guard = self.lock(target).await;
        let mut changes = self.underlay(target, underlay).await?;
        for params in vnis {
            changes += self.vni(target, params).await?;
        }
        changes += self.stale(target, vnis).await?;
        info!(
            "Converged {} with {} VNIs: {} changes",
            target.path().display(),
            vnis.len(),
            changes.0
        );
        Ok(changes)
    }

    async fn underlay(
        &self,
        target: &Netns,
        params: &UnderlayParams,
    ) -> Result<Changes, DataplaneError> {
        let nic = params.nic.clone();
        let vtep = params.vtep;
        let host = self.host_ns.clone();
        let (mut changes, in_router) = self
            .executor
            .run_in(target, move |handle| async move {
                let underlay = Manager::<Underlay>::from(handle);
                let (_, mut changes) = underlay.ensure_loopback(vtep).await?;
                changes += underlay.release_stale_nic(&nic, &host).await?;
                let present = underlay.has_nic(&nic).await?;
                Ok::<_, DataplaneError>((changes, present))
            })
            .await?;

        let mut restore: Vec<IpNet> = vec![];
        if !in_router {
            let link = self.host.expect(Kind::Nic, &params.nic).await?;
            restore = manager_of::<Address>(&self.host)
                .list(&link)
                .await?
                .into_iter()
                .filter(is_portable)
                .collect();
            info!("Moving uplink {} into {}", link.name, target.path().display());
            changes += self.host.move_to(&link, Kind::Nic, target).await?;
        }

        let nic = params.nic.clone();
        changes += self
            .executor
            .run_in(target, move |handle| async move {
                Manager::<Underlay>::from(handle)
                    .adopt_nic(&nic, &restore)
                    .await
            })
            .await?;
        debug!(nic = %params.nic, "Underlay converged: {} changes", changes.0);
        Ok(changes)
    }

    /// Create the pair of `vrf` and push its namespace leg into `target`.
    async fn fresh_pair(
        &self,
        target: &Netns,
        vrf: &str,
        stale: Option<&Link>,
    ) -> Result<(Link, Changes), DataplaneError> {
        let (leg, peer, mut changes) = manager_of::<Vni>(&self.host)
            .recreate_pair(vrf, stale)
            .await?;
        changes += self.host.move_to(&peer, Kind::Veth, target).await?;
        Ok((leg, changes))
    }

    async fn vni(&self, target: &Netns, params: &VniParams) -> Result<Changes, DataplaneError> {
        let vnis = manager_of::<Vni>(&self.host);
        let mut changes = Changes::NONE;
        let leg = match vnis.host_leg(&params.vrf).await? {
            HostLeg::Remote { leg, peer } => {
                let vrf = params.vrf.clone();
                let paired = self
                    .executor
                    .run_in(target, move |handle| async move {
                        Manager::<Vni>::from(handle).is_ns_leg(peer, &vrf).await
                    })
                    .await?;
                if paired {
                    leg
                } else {
                    let (leg, done) = self.fresh_pair(target, &params.vrf, Some(&leg)).await?;
                    changes += done;
                    leg
                }
            }
            HostLeg::Local { leg, peer } => {
                changes += self.host.move_to(&peer, Kind::Veth, target).await?;
                leg
            }
            HostLeg::Stale(stale) => {
                let (leg, done) = self.fresh_pair(target, &params.vrf, Some(&stale)).await?;
                changes += done;
                leg
            }
            HostLeg::Absent => {
                let (leg, done) = self.fresh_pair(target, &params.vrf, None).await?;
                changes += done;
                leg
            }
        };
        changes += vnis.finish_host_leg(&leg, params).await?;

        let owned = params.clone();
        changes += self
            .executor
            .run_in(target, move |handle| async move {
                Manager::<Vni>::from(handle).converge_in_router(&owned).await
            })
            .await?;
        debug!(vrf = %params.vrf, vni = params.vni, "VNI converged: {} changes", changes.0);
        Ok(changes)
    }

    async fn stale(
        &self,
        target: &Netns,
        desired: &[VniParams],
    ) -> Result<Changes, DataplaneError> {
        let vrfs: BTreeSet<String> = desired.iter().map(|p| p.vrf.clone()).collect();
        let vnis: BTreeSet<u32> = desired.iter().map(|p| p.vni).collect();
        let mut changes = manager_of::<Vni>(&self.host)
            .remove_stale_host_legs(&vrfs)
            .await?;
        changes += self
            .executor
            .run_in(target, move |handle| async move {
                Manager::<Vni>::from(handle)
                    .remove_stale_in_router(&vnis, &vrfs)
                    .await
            })
            .await?;
        Ok(changes)
    }
}
