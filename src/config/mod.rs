//! Cluster configuration
//!
//! The configuration is loaded once, validated, and then passed by
//! reference to every orchestrator.

pub mod cluster;
pub mod parser;

pub use cluster::{
    BasicAuth, ClusterConfig, DockerConfig, ImageSpec, NodeTypeSpec, ProviderConfig,
    RegistryAuth, RuleTemplate, RunOptions, SecurityGroupSpec, TestCase,
};
pub use parser::ConfigParser;
