// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Global FRR settings

use crate::frr::renderer::builder::{ConfigBuilder, MARKER};
use config::internal::FrrConfig;

/// Everything that precedes the routing stanzas.
pub(crate) fn render_globals(config: &FrrConfig) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    cfg += "frr defaults datacenter";
    cfg += format!("hostname {}", config.hostname);
    cfg += format!("log stdout {}", config.log_level);
    cfg += "log timestamp precision 3";
    /* the vtep of remote nodes is reached through the default route */
    cfg += "ip nht resolve-via-default";
    cfg += "ipv6 nht resolve-via-default";
    cfg += MARKER;
    cfg
}
