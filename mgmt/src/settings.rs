// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Process settings, loaded from YAML. Every field has a default.

use crate::frr::reloader::ReloadTimers;
use crate::frr::updater::HttpReloader;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracectl::LevelFilter;
#[allow(unused)]
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    #[error("Invalid log level '{0}'")]
    LogLevel(String),
    #[error("Failed to read hostname: {0}")]
    Hostname(#[from] nix::errno::Errno),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where the rendered frr config is written.
    pub frr_config_path: PathBuf,
    /// `host:port` of the reloader of the routing daemon.
    pub reload_address: String,
    /// Namespace file of the router.
    pub target_netns: PathBuf,
    pub quiet_period_ms: u64,
    pub retry_period_ms: u64,
    /// Bound on one reload request, connection included.
    pub reload_timeout_ms: u64,
    pub log_level: String,
    /// Overrides the hostname of the machine in the frr config.
    pub hostname: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frr_config_path: PathBuf::from("/etc/perouter/frr/frr.conf"),
            reload_address: "127.0.0.1:9080".to_string(),
            target_netns: PathBuf::from("/var/run/netns/perouter"),
            quiet_period_ms: 3000,
            retry_period_ms: 5000,
            reload_timeout_ms: 30_000,
            log_level: "info".to_string(),
            hostname: None,
        }
    }
}

impl Settings {
    /// Parse settings, checking the log level.
    ///
    /// # Errors
    ///
    /// Fails on malformed YAML, unknown fields and unknown log levels.
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_yaml_ng::from_str(yaml)?;
        settings.log_level()?;
        Ok(settings)
    }

    /// Load settings from file `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be read or if its contents are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_yaml(&yaml)?;
        debug!("Loaded settings from {}: {settings:?}", path.display());
        Ok(settings)
    }

    /// # Errors
    ///
    /// Fails if the configured level is not a tracing level.
    pub fn log_level(&self) -> Result<LevelFilter, SettingsError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| SettingsError::LogLevel(self.log_level.clone()))
    }

    /// The configured hostname, or that of the machine.
    ///
    /// # Errors
    ///
    /// Fails if there is no override and the hostname of the machine can't be read.
    pub fn hostname(&self) -> Result<String, SettingsError> {
        if let Some(hostname) = &self.hostname {
            return Ok(hostname.clone());
        }
        let hostname = nix::unistd::gethostname()?;
        Ok(hostname.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn timers(&self) -> ReloadTimers {
        ReloadTimers {
            quiet_period: Duration::from_millis(self.quiet_period_ms),
            retry_period: Duration::from_millis(self.retry_period_ms),
        }
    }

    #[must_use]
    pub fn reloader(&self) -> HttpReloader {
        HttpReloader::new(&self.frr_config_path, &self.reload_address)
            .with_timeout(Duration::from_millis(self.reload_timeout_ms))
    }
}
