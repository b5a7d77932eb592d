//! Node and security group naming, and node-type catalog expansion
//!
//! Every provider-side entity belonging to a cluster is named
//! `<cluster>-<plain name>[-<seq>]`. Names are parsed back by splitting on
//! `-`, which is why cluster, node type and group names may not contain one.

use crate::config::NodeTypeSpec;
use serde::{Deserialize, Serialize};

/// Concrete identity of a node derived from its node type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Generated node name (`<cluster>-<type>-<seq>`)
    pub name: String,
    /// Node type name
    pub node_type: String,
    /// Sequence number within the node type, starting at 1
    pub seq: u32,
}

/// Expand a node-type catalog into node identities
///
/// Output order is declaration order, then sequence order.
pub fn expand(cluster: &str, node_types: &[NodeTypeSpec]) -> Vec<NodeIdentity> {
    node_types
        .iter()
        .flat_map(|spec| {
            (1..=spec.replication).map(move |seq| NodeIdentity {
                name: node_name(cluster, &spec.name, seq),
                node_type: spec.name.clone(),
                seq,
            })
        })
        .collect()
}

/// Compose a node name
pub fn node_name(cluster: &str, node_type: &str, seq: u32) -> String {
    format!("{}-{}-{}", cluster, node_type, seq)
}

/// Extract the role (node type) from a node name
pub fn node_role(node_name: &str) -> &str {
    node_name.split('-').nth(1).unwrap_or("")
}

/// Compose a cluster security group name
pub fn group_name(cluster: &str, plain_name: &str) -> String {
    format!("{}-{}", cluster, plain_name)
}

/// Extract the cluster a security group belongs to
pub fn group_cluster(group_name: &str) -> &str {
    group_name.split('-').next().unwrap_or("")
}

/// Strip the cluster prefix from a security group name
pub fn group_plain_name(group_name: &str) -> &str {
    group_name.split('-').nth(1).unwrap_or("")
}
