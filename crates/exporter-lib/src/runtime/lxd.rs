//! LXD REST client over the local unix socket
//!
//! Each request opens its own connection, mirroring the LXD client's unix
//! transport which runs without keep-alive.

use super::{ContainerRuntime, RuntimeError};
use crate::models::{ContainerState, ContainerStatus, NetworkCounters};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{header, Method, Request};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use tracing::debug;

const USER_AGENT: &str = concat!("lxd-exporter/", env!("CARGO_PKG_VERSION"));
const CONTAINERS_PATH: &str = "/1.0/containers";

const SNAP_SOCKET: &str = "/var/snap/lxd/common/lxd/unix.socket";
const DEFAULT_SOCKET: &str = "/var/lib/lxd/unix.socket";

/// Client for the LXD daemon's REST API
#[derive(Debug, Clone)]
pub struct LxdClient {
    socket_path: PathBuf,
}

impl LxdClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Locate the LXD socket the same way the `lxc` tooling does:
    /// `LXD_SOCKET`, then `$LXD_DIR/unix.socket`, then the snap and
    /// distribution default locations.
    pub fn from_env() -> Self {
        Self::new(resolve_socket_path(
            std::env::var_os("LXD_SOCKET").map(PathBuf::from),
            std::env::var_os("LXD_DIR").map(PathBuf::from),
            |p| p.exists(),
        ))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Issue a GET and unwrap the LXD response envelope into `T`
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RuntimeError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| RuntimeError::Connect {
                path: self.socket_path.clone(),
                source,
            })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "LXD connection closed with error");
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(header::HOST, "lxd")
            .header(header::USER_AGENT, USER_AGENT)
            .body(Empty::<Bytes>::new())?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        debug!(path = %path, status = status.as_u16(), bytes = body.len(), "LXD response");

        let envelope: ResponseEnvelope = serde_json::from_slice(&body).map_err(|e| {
            if status.is_success() {
                RuntimeError::Decode(e)
            } else {
                RuntimeError::Api {
                    status: status.as_u16(),
                    message: String::from_utf8_lossy(&body).into_owned(),
                }
            }
        })?;

        if envelope.kind == "error" || !status.is_success() {
            let code = if envelope.error_code != 0 {
                envelope.error_code
            } else {
                status.as_u16()
            };
            if code == 404 {
                return Err(RuntimeError::NotFound(path.to_string()));
            }
            return Err(RuntimeError::Api {
                status: code,
                message: envelope.error,
            });
        }

        Ok(serde_json::from_value(envelope.metadata)?)
    }
}

#[async_trait]
impl ContainerRuntime for LxdClient {
    async fn list_container_names(&self) -> Result<Vec<String>, RuntimeError> {
        let urls: Vec<String> = self.get(CONTAINERS_PATH).await?;
        Ok(urls.iter().filter_map(|url| container_name_from_url(url)).collect())
    }

    async fn container_state(&self, name: &str) -> Result<ContainerState, RuntimeError> {
        let state: StateMetadata = self
            .get(&format!("{}/{}/state", CONTAINERS_PATH, name))
            .await?;
        Ok(state.into_container_state(name))
    }
}

pub(crate) fn resolve_socket_path(
    lxd_socket: Option<PathBuf>,
    lxd_dir: Option<PathBuf>,
    exists: impl Fn(&Path) -> bool,
) -> PathBuf {
    if let Some(socket) = lxd_socket.filter(|p| !p.as_os_str().is_empty()) {
        return socket;
    }
    if let Some(dir) = lxd_dir.filter(|p| !p.as_os_str().is_empty()) {
        return dir.join("unix.socket");
    }
    [SNAP_SOCKET, DEFAULT_SOCKET]
        .iter()
        .map(PathBuf::from)
        .find(|p| exists(p))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET))
}

/// `/1.0/containers/web1?project=default` -> `web1`
pub(crate) fn container_name_from_url(url: &str) -> Option<String> {
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Standard LXD response wrapper
#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_code: u16,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StateMetadata {
    status: String,
    cpu: CpuState,
    memory: MemoryState,
    disk: Option<HashMap<String, DiskState>>,
    network: Option<HashMap<String, NetworkState>>,
    pid: i64,
    processes: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CpuState {
    /// Nanoseconds
    usage: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MemoryState {
    usage: i64,
    usage_peak: i64,
    swap_usage: i64,
    swap_usage_peak: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiskState {
    usage: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NetworkState {
    counters: CountersState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CountersState {
    bytes_received: i64,
    bytes_sent: i64,
    packets_received: i64,
    packets_sent: i64,
}

// LXD reports -1 for values it could not read.
fn non_negative(v: i64) -> u64 {
    v.max(0) as u64
}

impl StateMetadata {
    pub(crate) fn into_container_state(self, name: &str) -> ContainerState {
        let disks = self
            .disk
            .unwrap_or_default()
            .into_iter()
            .map(|(device, disk)| (device, non_negative(disk.usage)))
            .collect();

        let network = self
            .network
            .unwrap_or_default()
            .into_iter()
            .map(|(iface, state)| {
                let c = state.counters;
                (
                    iface,
                    NetworkCounters {
                        bytes_received: non_negative(c.bytes_received),
                        bytes_sent: non_negative(c.bytes_sent),
                        packets_received: non_negative(c.packets_received),
                        packets_sent: non_negative(c.packets_sent),
                    },
                )
            })
            .collect();

        ContainerState {
            name: name.to_string(),
            status: ContainerStatus::from(self.status.as_str()),
            cpu_usage_seconds: non_negative(self.cpu.usage) as f64 / 1_000_000_000.0,
            memory_usage_bytes: non_negative(self.memory.usage),
            memory_usage_peak_bytes: non_negative(self.memory.usage_peak),
            swap_usage_bytes: non_negative(self.memory.swap_usage),
            swap_usage_peak_bytes: non_negative(self.memory.swap_usage_peak),
            process_count: non_negative(self.processes),
            pid: non_negative(self.pid),
            disks,
            network,
        }
    }
}
