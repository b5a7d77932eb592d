//! Container engine interface

use super::options::ContainerCreateOptions;
use crate::error::{CloudockError, Result};
use crate::node::LiveNode;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Container as listed by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: String,
}

/// Image as listed by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    pub id: String,
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,
    /// Unix timestamp
    #[serde(default)]
    pub created: i64,
}

impl ImageSummary {
    /// First repository tag, `<none>` for dangling images
    pub fn first_tag(&self) -> &str {
        self.repo_tags
            .as_ref()
            .and_then(|tags| tags.first())
            .map(|t| t.as_str())
            .unwrap_or("<none>")
    }

    /// Every repository tag of the image
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.repo_tags.iter().flatten().map(|t| t.as_str())
    }
}

/// Raw pull progress output, in arbitrary byte chunks
pub type PullStream = BoxStream<'static, Result<Vec<u8>>>;

/// Client of the container engine of one node
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Start pulling `reference` (`[registry/]repo:tag`)
    async fn pull_image(&self, reference: &str) -> Result<PullStream>;

    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    async fn remove_image(&self, id: &str) -> Result<()>;

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    /// Create a container, returning its id
    async fn create_container(&self, options: &ContainerCreateOptions) -> Result<String>;

    async fn start_container(&self, id: &str, options: &Value) -> Result<()>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    async fn remove_container(&self, id: &str) -> Result<()>;
}

/// Builds the engine client of a node from its address
pub trait EngineConnector: Send + Sync {
    fn connect(&self, node: &LiveNode) -> Result<Box<dyn ContainerEngine>>;
}

/// One decoded pull progress message
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullEvent {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl PullEvent {
    /// Decode one line; malformed lines yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    /// Display form (`status progress`)
    pub fn describe(&self) -> String {
        format!("{} {}", self.status, self.progress).trim().to_string()
    }
}

/// Drain a pull stream, reporting every decoded message to `on_event`
///
/// Chunks are re-split on newlines and each complete line is decoded on
/// its own, so a character split across two chunks survives. Undecodable
/// lines, including a truncated last one, are ignored. A message carrying
/// an `error` field aborts the pull.
pub async fn consume_pull(
    mut stream: PullStream,
    mut on_event: impl FnMut(&PullEvent),
) -> Result<()> {
    let mut buffer: Vec<u8> = Vec::new();

    let mut handle = |line: &[u8]| -> Result<()> {
        let line = String::from_utf8_lossy(line);
        debug!("pull: {}", line.trim());
        match PullEvent::parse(&line) {
            Some(PullEvent {
                error: Some(error), ..
            }) => Err(CloudockError::Pull(error)),
            Some(event) => {
                on_event(&event);
                Ok(())
            }
            None => Ok(()),
        }
    };

    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
        while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=end).collect();
            handle(&line)?;
        }
    }
    handle(&buffer)
}
