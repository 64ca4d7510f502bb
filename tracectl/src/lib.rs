// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Logging setup and runtime control of log levels for all the crates of the workspace.

pub mod control;
pub mod frr;
pub mod targets;

// re-exports
pub use control::{TraceCtlError, TracingControl, get_trace_ctl};
pub use frr::frr_log_level;
pub use tracing_subscriber::filter::LevelFilter;
