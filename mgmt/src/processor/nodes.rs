// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Rank of a node in the cluster.
//!
//! Every node computes the rank of every other node out of the same list, so the ordering must
//! only depend on data all of them see: creation time first, then name.

use chrono::{DateTime, Utc};
use ipam::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// A cluster node, as seen by the rank computation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub created: DateTime<Utc>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeIndexError {
    #[error("Node '{0}' is not part of the cluster")]
    UnknownNode(String),
    #[error("Node name '{0}' appears more than once")]
    DuplicateNode(String),
    #[error("Too many nodes in the cluster: {0}")]
    TooManyNodes(usize),
}

/// The zero-based rank of node `me` in `nodes`, ordered by `(created, name)`.
///
/// # Errors
///
/// Fails if `me` is not in `nodes` or if a name appears twice.
pub fn node_index(nodes: &[NodeInfo], me: &str) -> Result<NodeIndex, NodeIndexError> {
    let mut seen = BTreeSet::new();
    if let Some(dup) = nodes.iter().find(|n| !seen.insert(n.name.as_str())) {
        return Err(NodeIndexError::DuplicateNode(dup.name.clone()));
    }
    let mut ordered: Vec<&NodeInfo> = nodes.iter().collect();
    ordered.sort_by(|a, b| (a.created, &a.name).cmp(&(b.created, &b.name)));
    let rank = ordered
        .iter()
        .position(|n| n.name == me)
        .ok_or_else(|| NodeIndexError::UnknownNode(me.to_owned()))?;
    NodeIndex::try_from(rank).map_err(|_| NodeIndexError::TooManyNodes(nodes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn cluster() -> Vec<NodeInfo> {
        vec![
            NodeInfo::new("worker-2", at(300)),
            NodeInfo::new("control", at(100)),
            NodeInfo::new("worker-1", at(200)),
            NodeInfo::new("worker-0", at(200)),
        ]
    }

    #[test]
    fn test_ranks_follow_creation_time_then_name() {
        let nodes = cluster();
        assert_eq!(node_index(&nodes, "control"), Ok(0));
        assert_eq!(node_index(&nodes, "worker-0"), Ok(1));
        assert_eq!(node_index(&nodes, "worker-1"), Ok(2));
        assert_eq!(node_index(&nodes, "worker-2"), Ok(3));
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut nodes = cluster();
        let before: Vec<_> = nodes
            .iter()
            .map(|n| node_index(&nodes, &n.name).unwrap())
            .collect();
        nodes.reverse();
        let after: Vec<_> = nodes
            .iter()
            .rev()
            .map(|n| node_index(&nodes, &n.name).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_unknown_node() {
        assert_eq!(
            node_index(&cluster(), "stranger"),
            Err(NodeIndexError::UnknownNode("stranger".to_string()))
        );
        assert_eq!(
            node_index(&[], "stranger"),
            Err(NodeIndexError::UnknownNode("stranger".to_string()))
        );
    }

    #[test]
    fn test_duplicate_node() {
        let mut nodes = cluster();
        nodes.push(NodeInfo::new("worker-1", at(500)));
        assert_eq!(
            node_index(&nodes, "control"),
            Err(NodeIndexError::DuplicateNode("worker-1".to_string()))
        );
    }
}
