// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration processor.
//! This module turns the declared state of the cluster into the configuration of the routing
//! daemon and into the dataplane of this node.

pub mod confbuild;
pub mod hostconfig;
pub mod nodes;
pub mod proc;
