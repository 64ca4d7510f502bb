// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-interface kernel knobs.
//!
//! procfs resolves `/proc/sys/net` against the namespace of the calling thread, so these must
//! run on the thread that is switched into the target namespace, with blocking file I/O only.

use crate::Changes;
use crate::errors::DataplaneError;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// `addr_gen_mode` value disabling IPv6 link-local address generation.
const ADDR_GEN_NONE: &str = "1";

fn addr_gen_mode_path(ifname: &str) -> PathBuf {
    PathBuf::from(format!("/proc/sys/net/ipv6/conf/{ifname}/addr_gen_mode"))
}

/// Stop the kernel from generating IPv6 addresses on `ifname`.
///
/// # Errors
///
/// Fails if the knob can't be read or written. An interface without IPv6 is left alone.
pub fn disable_addr_gen(ifname: &str) -> Result<Changes, DataplaneError> {
    let path = addr_gen_mode_path(ifname);
    match std::fs::read_to_string(&path) {
        Ok(current) if current.trim() == ADDR_GEN_NONE => return Ok(Changes::NONE),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No IPv6 on {ifname}, skipping addr_gen_mode");
            return Ok(Changes::NONE);
        }
        Err(source) => return Err(DataplaneError::Sysctl { path, source }),
    }
    std::fs::write(&path, ADDR_GEN_NONE).map_err(|source| DataplaneError::Sysctl {
        path: path.clone(),
        source,
    })?;
    Ok(Changes::ONE)
}
