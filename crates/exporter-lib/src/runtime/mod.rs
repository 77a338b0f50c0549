//! Container runtime access
//!
//! The sampler only needs two queries from the runtime: the list of container
//! names and the state of a single container. `ContainerRuntime` is that seam;
//! `LxdClient` implements it against the LXD REST API over its unix socket.

mod lxd;


pub use lxd::LxdClient;

use crate::models::ContainerState;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by runtime queries
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to connect to runtime socket {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error talking to runtime: {0}")]
    Http(#[from] hyper::Error),

    #[error("failed to build runtime request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("runtime returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("failed to decode runtime response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("runtime call timed out after {0:?}")]
    Timeout(Duration),
}

/// Read-only queries the exporter issues against the container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Names of all containers known to the runtime
    async fn list_container_names(&self) -> Result<Vec<String>, RuntimeError>;

    /// Current state of a single container
    async fn container_state(&self, name: &str) -> Result<ContainerState, RuntimeError>;
}
