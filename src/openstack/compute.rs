//! Nova servers as a compute provider

use super::client::{error_message, Session};
use crate::error::{CloudockError, Result};
use crate::node::{ComputeProvider, InstanceFilter, InstanceRequest, LiveNode};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Server as returned by `GET /servers/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// Addresses keyed by network name
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<ServerAddress>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerAddress {
    pub addr: String,
    #[serde(default = "default_version")]
    pub version: u8,
}

fn default_version() -> u8 {
    4
}

impl Server {
    /// Project the server onto the live node view
    ///
    /// The address is the first IPv4 of the first network.
    pub fn to_live_node(&self) -> LiveNode {
        let first = self.addresses.iter().find_map(|(network, addrs)| {
            addrs
                .iter()
                .find(|a| a.version == 4)
                .map(|a| (network.as_str(), a.addr.as_str()))
        });
        let (network, ipv4) = first.unwrap_or(("", ""));
        LiveNode::new(&self.id, &self.name, network, ipv4, &self.status)
    }
}

#[derive(Deserialize)]
struct ServerBody {
    server: Server,
}

#[derive(Deserialize)]
struct ServersBody {
    servers: Vec<Server>,
}

#[derive(Deserialize)]
struct CreatedBody {
    server: CreatedServer,
}

#[derive(Deserialize)]
struct CreatedServer {
    id: String,
}

/// Body of `POST /servers`
pub fn server_body(request: &InstanceRequest) -> Value {
    let mut server = json!({
        "name": request.name,
        "imageRef": request.image_ref,
        "flavorRef": request.flavor_ref,
        "security_groups": request
            .security_groups
            .iter()
            .map(|name| json!({ "name": name }))
            .collect::<Vec<_>>(),
    });
    if let Some(key) = &request.key_name {
        server["key_name"] = json!(key);
    }
    if let Some(zone) = &request.availability_zone {
        server["availability_zone"] = json!(zone);
    }
    if let Some(data) = &request.user_data {
        server["user_data"] = json!(STANDARD.encode(data));
    }
    json!({ "server": server })
}

/// Nova client bound to the compute endpoint of a session
pub struct NovaCompute {
    session: Session,
    endpoint: String,
}

impl NovaCompute {
    pub fn new(session: Session) -> Result<Self> {
        let endpoint = session.endpoint("compute")?;
        Ok(Self { session, endpoint })
    }

    async fn check(response: reqwest::Response, id: Option<&str>) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if let (StatusCode::NOT_FOUND, Some(id)) = (status, id) {
            return Err(CloudockError::InstanceNotFound(id.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(CloudockError::Compute(format!(
            "{} {}",
            status,
            error_message(&body)
        )))
    }
}

#[async_trait]
impl ComputeProvider for NovaCompute {
    async fn create_instance(&self, request: &InstanceRequest) -> Result<String> {
        debug!("Creating server {}", request.name);
        let response = self
            .session
            .post(&format!("{}/servers", self.endpoint))
            .json(&server_body(request))
            .send()
            .await?;
        let created: CreatedBody = Self::check(response, None).await?.json().await?;
        Ok(created.server.id)
    }

    async fn get_instance(&self, id: &str) -> Result<LiveNode> {
        let response = self
            .session
            .get(&format!("{}/servers/{}", self.endpoint, id))
            .send()
            .await?;
        let body: ServerBody = Self::check(response, Some(id)).await?.json().await?;
        Ok(body.server.to_live_node())
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<LiveNode>> {
        // Nova treats the name filter as a regular expression
        let response = self
            .session
            .get(&format!("{}/servers/detail", self.endpoint))
            .query(&[("name", format!("^{}", filter.name_prefix))])
            .send()
            .await?;
        let body: ServersBody = Self::check(response, None).await?.json().await?;
        Ok(body
            .servers
            .iter()
            .map(Server::to_live_node)
            .filter(|n| filter.accepts(n))
            .collect())
    }

    async fn destroy_instance(&self, id: &str) -> Result<()> {
        let response = self
            .session
            .delete(&format!("{}/servers/{}", self.endpoint, id))
            .send()
            .await?;
        Self::check(response, Some(id)).await?;
        Ok(())
    }
}
