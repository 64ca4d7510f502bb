// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration models of the router.
//!
//! The external model is what the cluster operator declares (underlay, VNIs and their neighbors).
//! The internal model is the validated BGP configuration compiled out of it, ready to be rendered
//! for the routing daemon.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::module_name_repetitions)]

pub mod errors;
pub mod external;
pub mod internal;

pub use errors::{ConfigError, ConfigResult};
