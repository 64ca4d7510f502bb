// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! What the dataplane of one node should look like.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// The uplink of the node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderlayParams {
    /// The physical NIC to move into the router namespace.
    pub nic: String,
    /// Host prefix of the VTEP, assigned to the underlay loopback.
    pub vtep: IpNet,
}

/// One tenant overlay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VniParams {
    pub vrf: String,
    pub vni: u32,
    pub vxlan_port: u16,
    /// Source address of the vxlan device.
    pub vtep: IpAddr,
    pub veth_host: IpNet,
    pub veth_ns: IpNet,
}
