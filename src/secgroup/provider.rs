//! Network provider interface

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Security group as known by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Fully resolved rule submitted to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteRule {
    pub security_group_id: String,
    pub direction: String,
    pub ethertype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_min: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_max: Option<u16>,
    pub remote_ip_prefix: String,
}

/// Security group provider client
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Create a group, returning its provider id
    async fn create_group(&self, name: &str, description: &str) -> Result<String>;

    async fn destroy_group(&self, id: &str) -> Result<()>;

    /// Every group visible to the tenant
    async fn list_groups(&self) -> Result<Vec<SecurityGroup>>;

    async fn create_rule(&self, rule: &ConcreteRule) -> Result<()>;
}
