// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Render a compiled [`FrrConfig`] into the text loaded by frr-reload.py

pub mod bgp;
pub mod builder;
pub mod frr;
pub mod vrf;

use crate::frr::renderer::bgp::render_vrf_bgp;
use crate::frr::renderer::builder::{ConfigBuilder, Render};
use crate::frr::renderer::frr::render_globals;
use config::internal::FrrConfig;

impl Render for FrrConfig {
    type Context = ();
    type Output = ConfigBuilder;
    fn render(&self, _: &Self::Context) -> Self::Output {
        let mut cfg = render_globals(self);

        /* vrf to vni mappings */
        self.vnis.iter().for_each(|vni| cfg += vni.render(&()));

        /* default instance */
        cfg += self.underlay.render(&());

        /* Vrf BGP instances */
        self.vnis.iter().for_each(|vni| cfg += render_vrf_bgp(vni));

        cfg
    }
}
