// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Converge the linux networking stack of a router node with its declared underlay and VNIs.
//!
//! Every operation observes the kernel first and only mutates what differs, so running a
//! convergence twice in a row performs no change the second time. Nothing is remembered between
//! passes.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::module_name_repetitions)]

use std::marker::PhantomData;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

pub mod address;
pub mod bridge;
pub mod builder;
pub mod errors;
pub mod link;
pub mod netns;
pub mod params;
pub mod route;
pub mod sysctl;
pub mod underlay;
pub mod veth;
pub mod vni;
pub mod vrf;
pub mod vxlan;

pub use builder::DataplaneBuilder;
pub use errors::DataplaneError;
pub use netns::{Netns, NetnsError, NetnsExecutor};
pub use params::{UnderlayParams, VniParams};

use rtnetlink::Handle;
use tracectl::{LevelFilter, trace_target};

trace_target!("dataplane", LevelFilter::INFO, &["dataplane"]);

/// `Manager` is the entry point to the logic handling one kind of kernel object.
///
/// It is a newtype wrapper around a netlink handle, with a `PhantomData<R>` selecting the kind
/// of object (links, addresses, vrfs, ...) whose operations are available. The handle is bound to
/// the namespace it was opened in.
#[derive(Clone, Debug)]
pub struct Manager<R: ?Sized> {
    handle: Arc<Handle>,
    _marker: PhantomData<R>,
}

impl<R> Manager<R> {
    /// Create a new `Manager` from an [`Arc<Handle>`].
    #[must_use]
    pub fn new(handle: Arc<Handle>) -> Self {
        Manager {
            handle,
            _marker: PhantomData,
        }
    }
}

/// Convenience method for reducing syntactic noise when creating ephemeral `Manager` structs.
pub fn manager_of<T>(other: impl Into<Manager<T>>) -> Manager<T> {
    other.into()
}

impl<T, U> From<&Manager<T>> for Manager<U> {
    fn from(manager: &Manager<T>) -> Self {
        Self::new(manager.handle.clone())
    }
}

impl<T> From<Handle> for Manager<T> {
    fn from(handle: Handle) -> Self {
        Self::new(Arc::new(handle))
    }
}

/// Number of kernel mutations performed by an operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Changes(pub usize);

impl Changes {
    pub const NONE: Changes = Changes(0);
    pub const ONE: Changes = Changes(1);

    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl Add for Changes {
    type Output = Changes;
    fn add(self, rhs: Self) -> Self::Output {
        Changes(self.0 + rhs.0)
    }
}

impl AddAssign for Changes {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}
