//! Cluster topology: naming, catalog expansion, fan-out and selection
//!
//! Pure helpers shared by the node, security group and container
//! orchestrators.

pub mod expand;
pub mod fanout;
pub mod selector;

pub use expand::{
    expand, group_cluster, group_name, group_plain_name, node_name, node_role, NodeIdentity,
};
pub use fanout::{fan_out, FanOutMode};
pub use selector::{Selector, Target};
