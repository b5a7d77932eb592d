//! Docker Engine API client over HTTP

use super::engine::{
    ContainerEngine, ContainerSummary, EngineConnector, ImageSummary, PullStream,
};
use super::options::ContainerCreateOptions;
use crate::config::{DockerConfig, RegistryAuth};
use crate::error::{CloudockError, Result};
use crate::node::LiveNode;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Engine client addressing one node
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
    auth: Option<RegistryAuth>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateResponse {
    id: String,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

impl HttpEngine {
    pub fn new(client: reqwest::Client, base_url: String, auth: Option<RegistryAuth>) -> Self {
        Self {
            client,
            base_url,
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success answer into an engine error carrying its status
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());
        Err(CloudockError::engine(status.as_u16(), message))
    }

    fn registry_auth_header(&self) -> Result<Option<String>> {
        match &self.auth {
            Some(auth) => Ok(Some(URL_SAFE.encode(serde_json::to_string(auth)?))),
            None => Ok(None),
        }
    }
}

/// Split `[registry/]repo[:tag]` into image and tag
pub fn split_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((image, tag)) if !tag.contains('/') => (image, tag),
        _ => (reference, "latest"),
    }
}

#[async_trait]
impl ContainerEngine for HttpEngine {
    async fn pull_image(&self, reference: &str) -> Result<PullStream> {
        let (image, tag) = split_reference(reference);
        let mut request = self
            .client
            .post(self.url("/images/create"))
            .query(&[("fromImage", image), ("tag", tag)]);
        if let Some(header) = self.registry_auth_header()? {
            request = request.header("X-Registry-Auth", header);
        }

        let response = Self::check(request.send().await?).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(CloudockError::from)
            })
            .boxed();
        Ok(stream)
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let response = self.client.get(self.url("/images/json")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn remove_image(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/images/{}", id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let response = self
            .client
            .get(self.url("/containers/json"))
            .query(&[("all", if all { "1" } else { "0" })])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create_container(&self, options: &ContainerCreateOptions) -> Result<String> {
        let mut request = self.client.post(self.url("/containers/create")).json(options);
        if let Some(name) = &options.name {
            request = request.query(&[("name", name)]);
        }

        let created: CreateResponse = Self::check(request.send().await?).await?.json().await?;
        for warning in created.warnings.unwrap_or_default() {
            debug!("create {}: {}", created.id, warning);
        }
        Ok(created.id)
    }

    async fn start_container(&self, id: &str, options: &Value) -> Result<()> {
        let mut request = self
            .client
            .post(self.url(&format!("/containers/{}/start", id)));
        if !options.is_null() {
            request = request.json(options);
        }
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/containers/{}/stop", id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/containers/{}", id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Connects to the engine listening on every node's public address
pub struct HttpConnector {
    client: reqwest::Client,
    protocol: String,
    port: u16,
    auth: Option<RegistryAuth>,
}

impl HttpConnector {
    pub fn new(config: &DockerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CloudockError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            protocol: config.protocol.clone(),
            port: config.port,
            auth: config.auth.clone(),
        })
    }
}

impl EngineConnector for HttpConnector {
    fn connect(&self, node: &LiveNode) -> Result<Box<dyn ContainerEngine>> {
        if node.ipv4.is_empty() {
            return Err(CloudockError::Engine {
                status: None,
                message: format!("Node {} has no address yet", node.name),
            });
        }
        let base_url = format!("{}://{}:{}", self.protocol, node.ipv4, self.port);
        Ok(Box::new(HttpEngine::new(
            self.client.clone(),
            base_url,
            self.auth.clone(),
        )))
    }
}
