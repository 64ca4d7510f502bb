// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! FRR driver: render the compiled configuration to text, write it where the reloader of the
//! routing daemon expects it and trigger the reload over HTTP.

pub mod reloader;
pub mod renderer;
pub mod updater;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a configuration could not be applied. The coordinator retries on any of these.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Failed to write config to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to connect to reloader at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to build reload request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("Reload request to {address} failed: {source}")]
    Http {
        address: String,
        #[source]
        source: hyper::Error,
    },
    #[error("Reloader at {address} did not answer within {after:?}")]
    Timeout { address: String, after: Duration },
    #[error("Reloader answered with status {0}")]
    Status(u16),
}
