// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Type for configuration / validation failures.
//!
//! These errors are not retryable: the operator has to fix the declared state.

use ipam::IpamError;
use std::time::Duration;
use thiserror::Error;

/// The reasons why we may reject a configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Multiple instances of {0} found, expected at most one (got {1})")]
    TooManyInstances(&'static str, usize),
    #[error("Expected exactly one underlay, found 0")]
    NoUnderlay,
    #[error("No VNIs defined")]
    NoVnis,
    #[error("Neighbor {0} has neither an ASN nor a dynamic ASN mode")]
    MissingAsn(String),
    #[error("Neighbor {0} has both an ASN and a dynamic ASN mode")]
    ConflictingAsn(String),
    #[error("Neighbor {0}: hold time and keepalive time must be both set or both unset")]
    TimersMismatch(String),
    #[error("Neighbor {0}: invalid hold time {1:?}, must be 0 or at least 3s")]
    InvalidHoldTime(String, Duration),
    #[error("Neighbor {0}: keepalive time {1:?} exceeds hold time {2:?}")]
    KeepaliveExceedsHold(String, Duration, Duration),
    #[error("VRF '{0}' is used by more than one VNI")]
    DuplicateVrf(String),
    #[error("VNI {0} is declared more than once")]
    DuplicateVni(u32),
    #[error("VNI {0} does not fit in 24 bits")]
    VniOutOfRange(u32),
    #[error("VRF name '{0}' is too long: at most {1} characters")]
    VrfNameTooLong(String, usize),
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
    #[error("Neighbor {0} has both a password and a password secret")]
    ConflictingPassword(String),
    #[error("Neighbor {0} refers to unknown secret '{1}'")]
    MissingSecret(String, String),
    #[error("Address derivation failed for {0}: {1}")]
    Ipam(String, IpamError),
}

/// Result-like type for configurations
pub type ConfigResult = Result<(), ConfigError>;
