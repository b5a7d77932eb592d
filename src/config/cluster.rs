//! Cluster configuration types

use crate::docker::ContainerCreateOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Cluster configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name, prefix of every node and security group
    pub cluster: String,
    /// Cloud provider credentials and server defaults
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Docker engine and registry settings
    #[serde(default)]
    pub docker: DockerConfig,
    /// Security groups keyed by plain name
    #[serde(default)]
    pub security_groups: BTreeMap<String, SecurityGroupSpec>,
    /// Node types to provision
    #[serde(default)]
    pub node_types: Vec<NodeTypeSpec>,
    /// Workload images keyed by name
    #[serde(default)]
    pub images: BTreeMap<String, ImageSpec>,
}

impl ClusterConfig {
    /// Get a node type by name
    pub fn node_type(&self, name: &str) -> Option<&NodeTypeSpec> {
        self.node_types.iter().find(|t| t.name == name)
    }

    /// Workload images assigned to a node type, in catalog order
    pub fn images_for(&self, node_type: &str) -> Vec<(&str, &ImageSpec)> {
        let Some(spec) = self.node_type(node_type) else {
            return Vec::new();
        };
        self.images
            .iter()
            .filter(|(name, _)| spec.images.iter().any(|i| i == *name))
            .map(|(name, image)| (name.as_str(), image))
            .collect()
    }
}

/// OpenStack credentials and server creation defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Keystone endpoint
    #[serde(default)]
    pub auth_url: String,
    /// User name
    #[serde(default)]
    pub username: String,
    /// Password (falls back to `OS_PASSWORD`)
    #[serde(default)]
    pub password: Option<String>,
    /// Project (tenant) name
    #[serde(default)]
    pub tenant_name: String,
    /// User and project domain
    #[serde(default = "default_domain")]
    pub domain_name: String,
    /// Region used to pick catalog endpoints
    #[serde(default)]
    pub region: Option<String>,
    /// SSH key pair injected into servers
    #[serde(default)]
    pub key_name: Option<String>,
    /// Availability zone of new servers
    #[serde(default)]
    pub availability_zone: Option<String>,
    /// Cloud-init payload of new servers
    #[serde(default)]
    pub user_data: Option<String>,
    /// Login used for SSH commands on nodes
    #[serde(default)]
    pub ssh_username: Option<String>,
}

fn default_domain() -> String {
    "Default".to_string()
}

/// Docker engine and registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Engine API scheme
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Engine API port on every node
    #[serde(default = "default_docker_port")]
    pub port: u16,
    /// Registry host prefixed to image repositories
    #[serde(default)]
    pub registry: Option<String>,
    /// Registry credentials forwarded on pull
    #[serde(default)]
    pub auth: Option<RegistryAuth>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            port: default_docker_port(),
            registry: None,
            auth: None,
        }
    }
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_docker_port() -> u16 {
    2375
}

/// Registry credentials (`X-Registry-Auth` payload)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub serveraddress: String,
}

/// Security group declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    /// Description
    #[serde(default)]
    pub description: String,
    /// Rule templates
    #[serde(default)]
    pub rules: Vec<RuleTemplate>,
}

/// Ingress/egress rule template
///
/// `remote_ip_prefix` yields one static rule; `remote_node_roles` yields one
/// rule per live node of those roles. A template may carry both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTemplate {
    #[serde(default = "default_direction")]
    pub direction: String,
    #[serde(default = "default_ethertype")]
    pub ethertype: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub port_range_min: Option<u16>,
    #[serde(default)]
    pub port_range_max: Option<u16>,
    /// Static remote CIDR
    #[serde(default)]
    pub remote_ip_prefix: Option<String>,
    /// Node types whose addresses become remote endpoints
    #[serde(default)]
    pub remote_node_roles: Vec<String>,
}

impl Default for RuleTemplate {
    fn default() -> Self {
        Self {
            direction: default_direction(),
            ethertype: default_ethertype(),
            protocol: None,
            port_range_min: None,
            port_range_max: None,
            remote_ip_prefix: None,
            remote_node_roles: Vec::new(),
        }
    }
}

fn default_direction() -> String {
    "ingress".to_string()
}

fn default_ethertype() -> String {
    "IPv4".to_string()
}

/// Node type declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeTypeSpec {
    /// Node type name (the role)
    pub name: String,
    /// Number of nodes of this type
    #[serde(default = "default_replication")]
    pub replication: u32,
    /// Boot image reference
    #[serde(default)]
    pub image_ref: String,
    /// Flavor reference
    #[serde(default)]
    pub flavor_ref: String,
    /// Plain names of the security groups to attach
    #[serde(default)]
    pub security_groups: Vec<String>,
    /// Workload images deployed on this node type
    #[serde(default)]
    pub images: Vec<String>,
    /// Smoke tests run against every node of this type
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

fn default_replication() -> u32 {
    1
}

/// Workload image declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Repository name
    pub repo: String,
    /// Tag
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Dockerfile the image is built from
    #[serde(default)]
    pub dockerfile: Option<String>,
    /// Build options, kept opaque
    #[serde(default)]
    pub build: Value,
    /// Container run options
    #[serde(default)]
    pub run: RunOptions,
}

fn default_tag() -> String {
    "latest".to_string()
}

impl ImageSpec {
    /// Full image reference (`[registry/]repo:tag`)
    pub fn reference(&self, registry: Option<&str>) -> String {
        match registry {
            Some(registry) if !registry.is_empty() => {
                format!("{}/{}:{}", registry, self.repo, self.tag)
            }
            _ => format!("{}:{}", self.repo, self.tag),
        }
    }
}

/// How containers are created and started from an image
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    /// Creation options
    #[serde(default)]
    pub create: ContainerCreateOptions,
    /// Start options, kept opaque
    #[serde(default)]
    pub start: Value,
    /// Command used when the creation options carry none
    #[serde(default)]
    pub cmd: Vec<String>,
    /// `<node name>:<alias>` entries added to the container hosts
    #[serde(default)]
    pub host_aliases: Vec<String>,
}

/// HTTP smoke test
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: Option<BasicAuth>,
    #[serde(default)]
    pub should_start_with: Option<String>,
    #[serde(default)]
    pub should_contain: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

/// HTTP basic authentication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}
