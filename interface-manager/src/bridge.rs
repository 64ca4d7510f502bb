// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The bridge of a VNI, enslaved to its vrf.

use crate::errors::{DataplaneError, Kind, NetlinkContext, Op};
use crate::link::Link;
use crate::{Changes, Manager, manager_of, sysctl};
use rtnetlink::LinkBridge;
use tracing::{debug, info};

pub const BRIDGE_PREFIX: &str = "br";

/// Marker for the bridge operations of a [`Manager`].
#[non_exhaustive]
pub struct Bridge;

#[must_use]
pub fn bridge_name(vni: u32) -> String {
    format!("{BRIDGE_PREFIX}{vni}")
}

/// The VNI a bridge was created for, if `name` is one of ours.
#[must_use]
pub fn vni_of_bridge(name: &str) -> Option<u32> {
    name.strip_prefix(BRIDGE_PREFIX)?.parse().ok()
}

impl Manager<Bridge> {
    /// Make sure the bridge of `vni` exists, is enslaved to `vrf`, is up and does not generate
    /// IPv6 link-local addresses.
    ///
    /// Must run on a thread inside the namespace of this manager.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn ensure(&self, vni: u32, vrf: &Link) -> Result<(Link, Changes), DataplaneError> {
        let links = manager_of::<Link>(self);
        let name = bridge_name(vni);
        let mut changes = Changes::NONE;
        let existing = match links.by_name(&name).await? {
            Some(link) if link.is_bridge() => Some(link),
            Some(wrong) => {
                info!("Replacing link {name}, which is not a bridge");
                changes += links.remove(&wrong, Kind::Bridge).await?;
                None
            }
            None => None,
        };
        let bridge = match existing {
            Some(bridge) => bridge,
            None => {
                debug!("Creating bridge {name} in vrf {}", vrf.name);
                self.handle
                    .link()
                    .add(LinkBridge::new(&name).controller(vrf.index).build())
                    .execute()
                    .await
                    .context(Op::Create, Kind::Bridge, &name)?;
                changes += Changes::ONE;
                links.expect(Kind::Bridge, &name).await?
            }
        };
        changes += links.set_controller(&bridge, Kind::Bridge, vrf).await?;
        changes += links.set_up(&bridge, Kind::Bridge).await?;
        changes += sysctl::disable_addr_gen(&name)?;
        Ok((bridge, changes))
    }
}
