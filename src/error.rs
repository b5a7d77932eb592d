//! Error types for cloudock

use thiserror::Error;

/// Result type for cloudock operations
pub type Result<T> = std::result::Result<T, CloudockError>;

/// cloudock error types
#[derive(Error, Debug)]
pub enum CloudockError {
    #[error("Compute provider error: {0}")]
    Compute(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Network provider error: {0}")]
    Network(String),

    #[error("Security group not declared: {0}")]
    SecurityGroupNotDeclared(String),

    #[error("Docker engine error ({status:?}): {message}")]
    Engine {
        status: Option<u16>,
        message: String,
    },

    #[error("Image pull failed: {0}")]
    Pull(String),

    #[error("Smoke test failed: {0}")]
    SmokeTest(String),

    #[error("Remote command failed: {0}")]
    Remote(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Aborted by operator")]
    Aborted,

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration file error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CloudockError {
    /// Build an engine error from an HTTP status and body
    pub fn engine(status: u16, message: impl Into<String>) -> Self {
        CloudockError::Engine {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Engine answers that mean the target is already in the requested
    /// state (304) or no longer exists (404)
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            CloudockError::Engine {
                status: Some(304) | Some(404),
                ..
            }
        )
    }

    /// Check if this is a convergence timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, CloudockError::Timeout(_))
    }
}
