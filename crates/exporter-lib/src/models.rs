//! Core data models for the exporter

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state reported by the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStatus {
    Running,
    Stopped,
    Frozen,
    Error,
    /// Any state the exporter does not model explicitly (e.g. "Starting")
    Other(String),
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl From<&str> for ContainerStatus {
    fn from(status: &str) -> Self {
        match status {
            "Running" => ContainerStatus::Running,
            "Stopped" => ContainerStatus::Stopped,
            "Frozen" => ContainerStatus::Frozen,
            "Error" => ContainerStatus::Error,
            other => ContainerStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Running => f.write_str("Running"),
            ContainerStatus::Stopped => f.write_str("Stopped"),
            ContainerStatus::Frozen => f.write_str("Frozen"),
            ContainerStatus::Error => f.write_str("Error"),
            ContainerStatus::Other(s) => f.write_str(s),
        }
    }
}

/// Cumulative traffic counters for one network interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
}

/// Snapshot of a single container's resource usage, fetched once per scrape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    pub name: String,
    pub status: ContainerStatus,
    pub cpu_usage_seconds: f64,
    pub memory_usage_bytes: u64,
    pub memory_usage_peak_bytes: u64,
    pub swap_usage_bytes: u64,
    pub swap_usage_peak_bytes: u64,
    pub process_count: u64,
    /// Host PID of the container's init process, 0 when not running
    pub pid: u64,
    /// Disk device name -> usage in bytes
    pub disks: HashMap<String, u64>,
    /// Interface name -> counters
    pub network: HashMap<String, NetworkCounters>,
}

impl ContainerState {
    /// An empty state for a container that reports nothing but its status
    pub fn new(name: impl Into<String>, status: ContainerStatus) -> Self {
        Self {
            name: name.into(),
            status,
            cpu_usage_seconds: 0.0,
            memory_usage_bytes: 0,
            memory_usage_peak_bytes: 0,
            swap_usage_bytes: 0,
            swap_usage_peak_bytes: 0,
            process_count: 0,
            pid: 0,
            disks: HashMap::new(),
            network: HashMap::new(),
        }
    }
}
