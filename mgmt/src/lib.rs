// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Router node management: compile the declared state into a routing daemon configuration,
//! deliver it, and drive the convergence of the dataplane.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::module_name_repetitions)]

/* Frr configuration: model rendering and delivery */
pub mod frr;

/* Reconciliation passes */
pub mod processor;

/* Process settings */
pub mod settings;

use tracectl::{LevelFilter, trace_target};

trace_target!("mgmt", LevelFilter::INFO, &["mgmt"]);
