// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Map our log levels onto the vocabulary of the routing daemon.

use crate::LevelFilter;
use tracing::Level;

/// The FRR `log` level matching `level`.
#[must_use]
pub fn frr_log_level(level: LevelFilter) -> &'static str {
    match level.into_level() {
        None => "emergencies",
        Some(Level::ERROR) => "errors",
        Some(Level::WARN) => "warnings",
        Some(Level::INFO) => "informational",
        Some(_) => "debugging",
    }
}
