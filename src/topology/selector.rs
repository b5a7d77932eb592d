//! Selection predicate narrowing which live entities an operation touches

use serde::{Deserialize, Serialize};

/// Filter by node type, node id, or container/image id
///
/// With no criterion set everything is selected. Otherwise an entity is
/// selected as soon as one of the supplied criteria matches it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    /// Node type (role) whose workload images should be processed
    pub node_type: Option<String>,
    /// Provider id of a single node
    pub node_id: Option<String>,
    /// Id of a single container or image
    pub container_id: Option<String>,
}

/// What a selector is matched against
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    /// Role of the node hosting the entity
    pub node_type: &'a str,
    /// Provider id of the node hosting the entity
    pub node_id: &'a str,
    /// Workload image name, when it can be inferred
    pub image_name: Option<&'a str>,
    /// Container or image id, when the entity already exists
    pub entity_id: Option<&'a str>,
    /// Whether the node type declares `image_name` as one of its workloads
    pub image_assigned: bool,
}

impl Selector {
    /// Selector that matches everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Check if no criterion is set
    pub fn is_empty(&self) -> bool {
        self.node_type.is_none() && self.node_id.is_none() && self.container_id.is_none()
    }

    /// Check if the target is selected
    pub fn matches(&self, target: &Target<'_>) -> bool {
        if self.is_empty() {
            return true;
        }

        // Image ids carry a digest prefix the operator usually omits
        let by_entity = match (&self.container_id, target.entity_id) {
            (Some(wanted), Some(id)) => id
                .trim_start_matches("sha256:")
                .starts_with(wanted.trim_start_matches("sha256:")),
            _ => false,
        };
        let by_node = self.node_id.as_deref() == Some(target.node_id);
        let by_type = self.node_type.as_deref() == Some(target.node_type)
            && target.image_name.is_some()
            && target.image_assigned;

        by_entity || by_node || by_type
    }

    /// Short human readable description, used in logs
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "all".to_string();
        }
        let mut parts = Vec::new();
        if let Some(t) = &self.node_type {
            parts.push(format!("nodetype={}", t));
        }
        if let Some(n) = &self.node_id {
            parts.push(format!("nodeid={}", n));
        }
        if let Some(c) = &self.container_id {
            parts.push(format!("containerid={}", c));
        }
        parts.join(",")
    }
}
