// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Host routes in vrf tables.

use crate::errors::{DataplaneError, Kind, NetlinkContext, Op};
use crate::link::Link;
use crate::{Changes, Manager};
use futures::TryStreamExt;
use rtnetlink::RouteMessageBuilder;
use rtnetlink::packet_route::route::{RouteAddress, RouteAttribute, RouteMessage};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// Marker for the route operations of a [`Manager`].
#[non_exhaustive]
pub struct Route;

/// A host route through an interface, in a given table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostRoute {
    pub destination: IpAddr,
    pub table: u32,
    pub oif: u32,
}

impl HostRoute {
    fn prefix_len(&self) -> u8 {
        match self.destination {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    fn message(&self) -> RouteMessage {
        match self.destination {
            IpAddr::V4(destination) => RouteMessageBuilder::<Ipv4Addr>::new()
                .destination_prefix(destination, 32)
                .output_interface(self.oif)
                .table_id(self.table)
                .build(),
            IpAddr::V6(destination) => RouteMessageBuilder::<Ipv6Addr>::new()
                .destination_prefix(destination, 128)
                .output_interface(self.oif)
                .table_id(self.table)
                .build(),
        }
    }

    /// Whether `message` describes this very route.
    fn is(&self, message: &RouteMessage) -> bool {
        let mut destination = None;
        let mut oif = None;
        let mut table = Some(u32::from(message.header.table));
        for attr in &message.attributes {
            match attr {
                RouteAttribute::Destination(RouteAddress::Inet(a)) => {
                    destination = Some(IpAddr::V4(*a));
                }
                RouteAttribute::Destination(RouteAddress::Inet6(a)) => {
                    destination = Some(IpAddr::V6(*a));
                }
                RouteAttribute::Oif(i) => oif = Some(*i),
                // tables above 255 only fit in the attribute
                RouteAttribute::Table(t) => table = Some(*t),
                _ => {}
            }
        }
        message.header.destination_prefix_length == self.prefix_len()
            && destination == Some(self.destination)
            && oif == Some(self.oif)
            && table == Some(self.table)
    }
}

impl Manager<Route> {
    /// Add a host route to `destination` through `link` in `table`, unless an identical one
    /// already exists.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn ensure_host_route(
        &self,
        destination: IpAddr,
        table: u32,
        link: &Link,
    ) -> Result<Changes, DataplaneError> {
        let route = HostRoute {
            destination,
            table,
            oif: link.index,
        };
        let name = format!("{destination} dev {} table {table}", link.name);
        let filter = match destination {
            IpAddr::V4(_) => RouteMessageBuilder::<Ipv4Addr>::new()
                .table_id(table)
                .build(),
            IpAddr::V6(_) => RouteMessageBuilder::<Ipv6Addr>::new()
                .table_id(table)
                .build(),
        };
        let mut existing = self.handle.route().get(filter).execute();
        while let Some(message) = existing
            .try_next()
            .await
            .context(Op::Lookup, Kind::Route, &name)?
        {
            if route.is(&message) {
                return Ok(Changes::NONE);
            }
        }
        debug!("Adding route {name}");
        self.handle
            .route()
            .add(route.message())
            .execute()
            .await
            .context(Op::Create, Kind::Route, &name)?;
        Ok(Changes::ONE)
    }
}
