//! Cluster configuration loading and validation

use super::cluster::ClusterConfig;
use crate::error::{CloudockError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default configuration file names, looked up in the working directory
pub const DEFAULT_CONFIG_FILES: &[&str] = &["cloudock.yaml", "cloudock.yml"];

/// Environment variable consulted when the password is not in the file
pub const PASSWORD_ENV: &str = "OS_PASSWORD";

/// Cluster configuration parser
pub struct ConfigParser;

impl ConfigParser {
    /// Find a configuration file in `dir`, then in the user config directory
    pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
        let local = DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists());
        if local.is_some() {
            return local;
        }

        dirs::config_dir()
            .map(|base| base.join("cloudock").join(DEFAULT_CONFIG_FILES[0]))
            .filter(|path| path.exists())
    }

    /// Parse and validate a configuration file; returns non-fatal warnings
    pub fn load(path: &Path) -> Result<(ClusterConfig, Vec<String>)> {
        let mut config = Self::parse_file(path)?;
        if config.provider.password.is_none() {
            config.provider.password = std::env::var(PASSWORD_ENV).ok();
        }
        let warnings = Self::validate(&config)?;
        Ok((config, warnings))
    }

    /// Parse configuration from path
    pub fn parse_file(path: &Path) -> Result<ClusterConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CloudockError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from string
    pub fn parse_str(content: &str) -> Result<ClusterConfig> {
        serde_yaml::from_str(content)
            .map_err(|e| CloudockError::Config(format!("Failed to parse YAML: {}", e)))
    }

    /// Validate a configuration
    ///
    /// Missing credentials and malformed names are fatal; dangling
    /// references to groups or images are reported as warnings.
    pub fn validate(config: &ClusterConfig) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        check_name("cluster", &config.cluster)?;

        let provider = &config.provider;
        let required = [
            ("provider.auth_url", provider.auth_url.as_str()),
            ("provider.username", provider.username.as_str()),
            ("provider.tenant_name", provider.tenant_name.as_str()),
            (
                "provider.password",
                provider.password.as_deref().unwrap_or(""),
            ),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CloudockError::InvalidConfig(format!(
                    "'{}' is required",
                    field
                )));
            }
        }

        for name in config.security_groups.keys() {
            check_name("security group", name)?;
        }

        let mut seen = HashSet::new();
        for node_type in &config.node_types {
            check_name("node type", &node_type.name)?;
            if !seen.insert(node_type.name.as_str()) {
                return Err(CloudockError::InvalidConfig(format!(
                    "Node type '{}' is declared twice",
                    node_type.name
                )));
            }

            for group in &node_type.security_groups {
                if !config.security_groups.contains_key(group) {
                    warnings.push(format!(
                        "Node type '{}' references undeclared security group '{}'",
                        node_type.name, group
                    ));
                }
            }
            for image in &node_type.images {
                if !config.images.contains_key(image) {
                    warnings.push(format!(
                        "Node type '{}' references undeclared image '{}'",
                        node_type.name, image
                    ));
                }
            }
        }

        for (name, group) in &config.security_groups {
            for rule in &group.rules {
                for role in &rule.remote_node_roles {
                    if config.node_type(role).is_none() {
                        warnings.push(format!(
                            "Security group '{}' addresses undeclared node type '{}'",
                            name, role
                        ));
                    }
                }
            }
        }

        Ok(warnings)
    }
}

/// Names are parsed back by splitting on dashes and end up in server names
fn check_name(kind: &str, name: &str) -> Result<()> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

    if name.trim().is_empty() {
        return Err(CloudockError::InvalidConfig(format!(
            "A {} name must not be empty",
            kind
        )));
    }
    if name.contains('-') {
        return Err(CloudockError::InvalidConfig(format!(
            "The {} name '{}' must not contain dashes",
            kind, name
        )));
    }
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").ok());
    if let Some(pattern) = pattern {
        if !pattern.is_match(name) {
            return Err(CloudockError::InvalidConfig(format!(
                "The {} name '{}' may only contain letters, digits and underscores",
                kind, name
            )));
        }
    }
    Ok(())
}
