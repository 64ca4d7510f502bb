// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface addresses.

use crate::errors::{DataplaneError, Kind, NetlinkContext, Op};
use crate::link::Link;
use crate::{Changes, Manager};
use futures::TryStreamExt;
use ipnet::IpNet;
use rtnetlink::packet_route::address::{AddressAttribute, AddressMessage};
use tracing::debug;

/// Marker for the address operations of a [`Manager`].
#[non_exhaustive]
pub struct Address;

fn prefix_of(message: &AddressMessage) -> Option<IpNet> {
    message.attributes.iter().find_map(|attr| match attr {
        AddressAttribute::Address(addr) => IpNet::new(*addr, message.header.prefix_len).ok(),
        _ => None,
    })
}

impl Manager<Address> {
    async fn dump(&self, index: Option<u32>) -> Result<Vec<AddressMessage>, DataplaneError> {
        let mut request = self.handle.address().get();
        if let Some(index) = index {
            request = request.set_link_index_filter(index);
        }
        let mut request = request.execute();
        let mut messages = vec![];
        let name = index.map_or_else(|| "*".to_owned(), |i| format!("#{i}"));
        while let Some(message) = request
            .try_next()
            .await
            .context(Op::Lookup, Kind::Address, &name)?
        {
            // the filter is a hint that the kernel may ignore
            if index.is_none_or(|i| message.header.index == i) {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// The addresses of a link.
    ///
    /// # Errors
    ///
    /// Fails if the dump fails.
    pub async fn list(&self, link: &Link) -> Result<Vec<IpNet>, DataplaneError> {
        Ok(self
            .dump(Some(link.index))
            .await?
            .iter()
            .filter_map(prefix_of)
            .collect())
    }

    /// Assign `prefix` to `link` unless it is already there.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn ensure(&self, link: &Link, prefix: IpNet) -> Result<Changes, DataplaneError> {
        if self.list(link).await?.contains(&prefix) {
            return Ok(Changes::NONE);
        }
        debug!("Adding address {prefix} to {}", link.name);
        self.handle
            .address()
            .add(link.index, prefix.addr(), prefix.prefix_len())
            .execute()
            .await
            .context(Op::Create, Kind::Address, format!("{prefix} on {}", link.name))?;
        Ok(Changes::ONE)
    }

    /// Remove `prefix` from `link` if it is there.
    ///
    /// # Errors
    ///
    /// Fails if the kernel refuses.
    pub async fn remove(&self, link: &Link, prefix: IpNet) -> Result<Changes, DataplaneError> {
        let mut changes = Changes::NONE;
        for message in self.dump(Some(link.index)).await? {
            if prefix_of(&message) == Some(prefix) {
                debug!("Removing address {prefix} from {}", link.name);
                self.handle
                    .address()
                    .del(message)
                    .execute()
                    .await
                    .context(Op::Delete, Kind::Address, format!("{prefix} on {}", link.name))?;
                changes += Changes::ONE;
            }
        }
        Ok(changes)
    }

    /// Index of the first link carrying `prefix`.
    ///
    /// # Errors
    ///
    /// Fails if the dump fails.
    pub async fn holder_of(&self, prefix: IpNet) -> Result<Option<u32>, DataplaneError> {
        Ok(self
            .dump(None)
            .await?
            .iter()
            .find(|message| prefix_of(message) == Some(prefix))
            .map(|message| message.header.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn prefix_from_message() {
        let mut message = AddressMessage::default();
        message.header.prefix_len = 24;
        message.header.index = 4;
        message
            .attributes
            .push(AddressAttribute::Address(IpAddr::V4(Ipv4Addr::new(
                192, 168, 1, 1,
            ))));
        assert_eq!(prefix_of(&message), Some("192.168.1.1/24".parse().unwrap()));
        assert_eq!(prefix_of(&AddressMessage::default()), None);
    }
}
