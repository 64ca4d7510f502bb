// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VRF devices and their routing tables.

use crate::errors::{DataplaneError, Kind, NetlinkContext, Op};
use crate::link::Link;
use crate::{Changes, Manager, manager_of};
use rtnetlink::LinkVrf;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Marker for the vrf operations of a [`Manager`].
#[non_exhaustive]
pub struct Vrf;

/// Tables with a well-known meaning (default, main, local).
const RESERVED_TABLES: [u32; 3] = [253, 254, 255];

/// The lowest positive table id neither in `used` nor reserved.
///
/// The reserved tables already hold the local, main and default routes of the namespace, and a
/// vrf bound to one of them would mix tenant routes into those.
#[must_use]
pub fn free_table(used: &BTreeSet<u32>) -> Option<u32> {
    (1..=u32::MAX).find(|t| !used.contains(t) && !RESERVED_TABLES.contains(t))
}

impl Manager<Vrf> {
    /// Make sure a vrf named `name` exists and is up. A new vrf gets the lowest table id that no
    /// other vrf of the namespace uses.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses or if no table id is left.
    pub async fn ensure(&self, name: &str) -> Result<(Link, Changes), DataplaneError> {
        let links = manager_of::<Link>(self);
        let mut changes = Changes::NONE;
        let existing = match links.by_name(name).await? {
            Some(link) if link.is_vrf() && link.vrf_table().is_some() => Some(link),
            Some(wrong) => {
                info!("Replacing link {name}, which is not a vrf");
                changes += links.remove(&wrong, Kind::Vrf).await?;
                None
            }
            None => None,
        };
        let vrf = match existing {
            Some(vrf) => vrf,
            None => {
                let used: BTreeSet<u32> = links
                    .list()
                    .await?
                    .iter()
                    .filter_map(Link::vrf_table)
                    .collect();
                let table =
                    free_table(&used).ok_or_else(|| DataplaneError::NoFreeTable(name.to_owned()))?;
                debug!("Creating vrf {name} with table {table}");
                self.handle
                    .link()
                    .add(LinkVrf::new(name, table).build())
                    .execute()
                    .await
                    .context(Op::Create, Kind::Vrf, name)?;
                changes += Changes::ONE;
                links.expect(Kind::Vrf, name).await?
            }
        };
        changes += links.set_up(&vrf, Kind::Vrf).await?;
        Ok((vrf, changes))
    }
}
