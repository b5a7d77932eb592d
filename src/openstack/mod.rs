//! OpenStack clients: Keystone session, Nova compute, Neutron network

pub mod client;
pub mod compute;
pub mod network;

pub use client::{CatalogEndpoint, CatalogService, Session};
pub use compute::NovaCompute;
pub use network::NeutronNetwork;

use crate::config::ProviderConfig;
use crate::error::{CloudockError, Result};

/// Compute and network providers sharing one authenticated session
pub struct OpenStack {
    pub compute: NovaCompute,
    pub network: NeutronNetwork,
}

impl OpenStack {
    /// Authenticate and resolve the compute and network endpoints
    pub async fn connect(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CloudockError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let session = Session::authenticate(client, config).await?;

        Ok(Self {
            compute: NovaCompute::new(session.clone())?,
            network: NeutronNetwork::new(session)?,
        })
    }
}
