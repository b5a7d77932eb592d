//! Container deployment on the cluster nodes
//!
//! Talks to the Docker engine each node exposes over TCP, and runs the
//! declared HTTP smoke tests against what got deployed.

pub mod engine;
pub mod http;
pub mod options;
pub mod pipeline;
pub mod smoke;

pub use engine::{
    consume_pull, ContainerEngine, ContainerSummary, EngineConnector, ImageSummary,
    PullEvent, PullStream,
};
pub use http::{HttpConnector, HttpEngine};
pub use options::{container_options, ContainerCreateOptions, HostConfig, DOCKERHOST_ALIAS};
pub use pipeline::{ContainerOp, Deployer, NodeContainer, NodeImage, PULL_COLUMNS};
