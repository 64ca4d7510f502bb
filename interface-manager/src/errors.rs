// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Dataplane errors.
//!
//! Every failure names the operation and the object it failed on. None of them is fatal to the
//! process: the next convergence pass resumes from whatever state was left behind.

use crate::netns::NetnsError;
use nix::errno::Errno;
use std::num::NonZeroI32;
use std::path::PathBuf;
use strum::Display;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum Op {
    Create,
    Lookup,
    Move,
    Delete,
    Update,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum Kind {
    Link,
    Loopback,
    Nic,
    Veth,
    Vrf,
    Bridge,
    Vxlan,
    Address,
    Route,
}

#[derive(Debug, Error)]
pub enum DataplaneError {
    #[error("Failed to {op} {kind} '{name}': {source}")]
    Netlink {
        op: Op,
        kind: Kind,
        name: String,
        #[source]
        source: rtnetlink::Error,
    },
    #[error("No {kind} named '{name}'")]
    NotFound { kind: Kind, name: String },
    #[error("Failed to disable address generation on {path}: {source}")]
    Sysctl {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No free routing table for vrf '{0}'")]
    NoFreeTable(String),
    #[error(transparent)]
    Netns(#[from] NetnsError),
}

impl DataplaneError {
    /// Whether the current thread may have been left in an unknown namespace.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, DataplaneError::Netns(NetnsError::Restore(_)))
    }
}

/// Attach the failed operation and object to a netlink result.
pub(crate) trait NetlinkContext<T> {
    fn context(self, op: Op, kind: Kind, name: impl Into<String>) -> Result<T, DataplaneError>;
}

impl<T> NetlinkContext<T> for Result<T, rtnetlink::Error> {
    fn context(self, op: Op, kind: Kind, name: impl Into<String>) -> Result<T, DataplaneError> {
        self.map_err(|source| DataplaneError::Netlink {
            op,
            kind,
            name: name.into(),
            source,
        })
    }
}

/// Whether the kernel answered with `errno`.
pub(crate) fn is_errno(err: &rtnetlink::Error, errno: Errno) -> bool {
    match err {
        rtnetlink::Error::NetlinkError(msg) => msg.code.map(NonZeroI32::get) == Some(-(errno as i32)),
        _ => false,
    }
}
