//! Compute provider interface and the live node projection

use crate::error::Result;
use crate::topology::node_role;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider status values treated as converged
pub const CONVERGED_STATUSES: &[&str] = &["RUNNING", "ACTIVE"];

/// Runtime projection of a provider-side instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveNode {
    /// Provider instance id
    pub id: String,
    /// Instance name
    pub name: String,
    /// Display address (`<network>: <ipv4>`)
    pub address: String,
    /// First public IPv4 address, empty while unassigned
    pub ipv4: String,
    /// Upper-cased provider status
    pub status: String,
    /// Node type extracted from the name
    pub role: String,
}

impl LiveNode {
    /// Build a projection from raw provider fields
    pub fn new(id: &str, name: &str, network: &str, ipv4: &str, status: &str) -> Self {
        let address = if ipv4.is_empty() {
            String::new()
        } else {
            format!("{}: {}", network, ipv4)
        };

        Self {
            id: id.to_string(),
            name: name.to_string(),
            address,
            ipv4: ipv4.to_string(),
            status: status.to_uppercase(),
            role: node_role(name).to_string(),
        }
    }

    /// Abbreviated id used as progress table key
    pub fn short_id(&self) -> String {
        let prefix: String = self.id.chars().take(5).collect();
        format!("{}..", prefix)
    }

    /// Check if the instance reached its ready state
    pub fn is_converged(&self) -> bool {
        is_converged(&self.status)
    }

    /// Check if the node matches a status filter (`None` matches any)
    pub fn has_status(&self, status: Option<&str>) -> bool {
        match status {
            None => true,
            Some(wanted) => {
                let wanted = wanted.to_uppercase();
                wanted == self.status || (is_converged(&wanted) && self.is_converged())
            }
        }
    }
}

/// Check if a provider status is the converged one
pub fn is_converged(status: &str) -> bool {
    CONVERGED_STATUSES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(status))
}

/// Parameters of a create-instance call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceRequest {
    /// Instance name
    pub name: String,
    /// Tenant (project) the instance is billed to
    pub tenant: String,
    /// Cluster-prefixed security group names
    pub security_groups: Vec<String>,
    /// Boot image reference
    pub image_ref: String,
    /// Flavor reference
    pub flavor_ref: String,
    /// SSH key pair name
    pub key_name: Option<String>,
    /// Availability zone
    pub availability_zone: Option<String>,
    /// Cloud-init payload
    pub user_data: Option<String>,
}

/// Instance listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    /// Instance name prefix
    pub name_prefix: String,
    /// Provider status, `None` for any
    pub status: Option<String>,
}

impl InstanceFilter {
    /// Filter on every instance of a cluster
    pub fn cluster(cluster: &str) -> Self {
        Self {
            name_prefix: format!("{}-", cluster),
            status: None,
        }
    }

    /// Restrict the filter to one status
    pub fn with_status(mut self, status: Option<&str>) -> Self {
        self.status = status.map(|s| s.to_uppercase());
        self
    }

    /// Check if a node passes the filter
    pub fn accepts(&self, node: &LiveNode) -> bool {
        node.name.starts_with(&self.name_prefix) && node.has_status(self.status.as_deref())
    }
}

/// Compute provider client
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Submit an instance creation, returning the provider id
    async fn create_instance(&self, request: &InstanceRequest) -> Result<String>;

    /// Fetch one instance; `CloudockError::InstanceNotFound` once it is gone
    async fn get_instance(&self, id: &str) -> Result<LiveNode>;

    /// List instances matching a filter
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<LiveNode>>;

    /// Request instance deletion
    async fn destroy_instance(&self, id: &str) -> Result<()>;
}
