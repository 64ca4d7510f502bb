// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mapping of VRFs to VNIs

use crate::frr::renderer::builder::{ConfigBuilder, MARKER, Render};
use config::internal::VniConfig;

impl Render for VniConfig {
    type Context = ();
    type Output = ConfigBuilder;
    fn render(&self, _: &Self::Context) -> Self::Output {
        let mut cfg = ConfigBuilder::new();
        cfg += format!("vrf {}", self.vrf);
        cfg += format!(" vni {}", self.vni);
        cfg += "exit-vrf";
        cfg += MARKER;
        cfg
    }
}
