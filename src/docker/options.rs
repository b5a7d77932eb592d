//! Typed container creation options and host alias wiring
//!
//! Field names follow the Docker Engine API so options declared in the
//! cluster configuration serialize straight onto the wire. Fields this crate
//! does not interpret are kept in the flattened `extra` maps.

use crate::node::LiveNode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Alias resolving to the node a container runs on
pub const DOCKERHOST_ALIAS: &str = "dockerhost";

/// Body of `POST /containers/create`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateOptions {
    /// Container name (sent as query parameter, not in the body)
    #[serde(default, skip_serializing)]
    pub name: Option<String>,
    /// Hostname override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    /// Environment (`KEY=value`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Host configuration
    #[serde(default)]
    pub host_config: HostConfig,
    /// Remaining engine fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `HostConfig` section of a container creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    /// Network mode (`bridge`, `host`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// `/etc/hosts` entries (`name:address`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,
    /// Remaining engine fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContainerCreateOptions {
    /// Check if the container shares the host network stack
    pub fn is_host_network(&self) -> bool {
        self.host_config
            .network_mode
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case("host"))
            .unwrap_or(false)
    }
}

/// Compute the creation options of one workload container on `node`
///
/// `template` is the declared options, `roster` every active cluster node,
/// and `host_aliases` entries of the form `<node name>:<alias>`. Nodes
/// without an address are left out. Aliases naming a node missing from the
/// roster, or one without an address, are returned as warnings.
pub fn container_options(
    template: &ContainerCreateOptions,
    image_ref: &str,
    cmd: &[String],
    host_aliases: &[String],
    node: &LiveNode,
    roster: &[LiveNode],
) -> (ContainerCreateOptions, Vec<String>) {
    let mut options = template.clone();
    let mut warnings = Vec::new();

    options.image = Some(image_ref.to_string());
    if options.cmd.is_empty() {
        options.cmd = cmd.to_vec();
    }

    if options.is_host_network() {
        return (options, warnings);
    }

    let mut hosts: Vec<String> = roster
        .iter()
        .filter(|other| other.name != node.name && !other.ipv4.is_empty())
        .map(|other| format!("{}:{}", other.name, other.ipv4))
        .collect();
    hosts.push(format!("{}:{}", DOCKERHOST_ALIAS, node.ipv4));
    if let Some(hostname) = &options.hostname {
        hosts.push(format!("{}:{}", hostname, node.ipv4));
    }

    for alias in host_aliases {
        let Some((host, name)) = alias.split_once(':') else {
            warnings.push(format!("Host alias '{}' is not of the form <node>:<alias>", alias));
            continue;
        };
        match roster.iter().find(|n| n.name == host) {
            Some(target) if target.ipv4.is_empty() => {
                warnings.push(format!("Host {} has no address yet, alias {} skipped", host, name))
            }
            Some(target) => hosts.push(format!("{}:{}", name, target.ipv4)),
            None => warnings.push(format!(
                "Host {} referenced in host aliases does not seem to exist in the cluster",
                host
            )),
        }
    }

    options.host_config.extra_hosts = hosts;
    (options, warnings)
}
