// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! One reconciliation pass: from the declared state of the cluster to a routing daemon
//! configuration and a converged dataplane.

use crate::frr::reloader::ReloadHandle;
use crate::processor::confbuild::{CompileContext, compile};
use crate::processor::hostconfig::host_config;
use crate::processor::nodes::{NodeIndexError, NodeInfo, node_index};
use config::ConfigError;
use config::external::{Underlay, Vni};
use interface_manager::{Changes, DataplaneBuilder, DataplaneError, Netns};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracectl::{LevelFilter, frr_log_level};
#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Everything a pass reads, as last observed from the cluster.
#[derive(Clone, Debug, Default)]
pub struct DesiredState {
    pub nodes: Vec<NodeInfo>,
    pub underlays: Vec<Underlay>,
    pub vnis: Vec<Vni>,
    /// Neighbor passwords, by secret name.
    pub secrets: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Dataplane convergence failed: {0}")]
    Dataplane(#[from] DataplaneError),
    #[error("Failed to rank node: {0}")]
    NodeIndex(#[from] NodeIndexError),
}

/// Drives the passes of one node.
pub struct Reconciler {
    node: String,
    hostname: String,
    log_level: LevelFilter,
    target: Netns,
    builder: Arc<DataplaneBuilder>,
    reloads: ReloadHandle,
}

impl Reconciler {
    /// A reconciler for node `node`, whose router lives in namespace `target`.
    pub fn new(
        node: impl Into<String>,
        hostname: impl Into<String>,
        log_level: LevelFilter,
        target: Netns,
        builder: Arc<DataplaneBuilder>,
        reloads: ReloadHandle,
    ) -> Self {
        Self {
            node: node.into(),
            hostname: hostname.into(),
            log_level,
            target,
            builder,
            reloads,
        }
    }

    /// Run one pass.
    ///
    /// The routing daemon configuration is queued for delivery before the dataplane is touched;
    /// its delivery is not awaited.
    ///
    /// # Errors
    ///
    /// Aborts on the first error. Nothing is queued if the declared state is invalid; kernel
    /// changes made before a dataplane error are kept.
    pub async fn reconcile(&self, state: &DesiredState) -> Result<Changes, ProcessorError> {
        /* rank this node */
        let index = node_index(&state.nodes, &self.node)?;
        debug!("Reconciling node {} with index {index}", self.node);

        /* build frr config and hand it over */
        let ctx = CompileContext {
            log_level: frr_log_level(self.log_level).to_owned(),
            hostname: self.hostname.clone(),
            secrets: state.secrets.clone(),
        };
        let frr = compile(index, &state.underlays, &state.vnis, &ctx)?;
        let host = host_config(index, self.target.path(), &state.underlays, &state.vnis)?;
        self.reloads.new_snapshot(frr);

        /* converge the dataplane */
        let Some(host) = host else {
            info!("Nothing to converge for node {}", self.node);
            return Ok(Changes::NONE);
        };
        let changes = self
            .builder
            .converge(&self.target, &host.underlay, &host.vnis)
            .await?;
        info!(
            "Reconciled node {} ({} vnis): {} kernel changes",
            self.node,
            host.vnis.len(),
            changes.0
        );
        Ok(changes)
    }
}
