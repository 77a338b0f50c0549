//! Metric schema registry
//!
//! Owns the fixed catalog of container metric descriptors and renders a
//! scrape's samples into Prometheus metric families. The catalog is built
//! once at startup and never changes shape afterwards.

use prometheus::{proto::MetricFamily, GaugeVec, Opts, Registry};
use thiserror::Error;

/// Label holding the container name, present on every descriptor
pub const LABEL_CONTAINER_NAME: &str = "container_name";
pub const LABEL_DISK_DEVICE: &str = "disk_device";
pub const LABEL_INTERFACE: &str = "interface";
pub const LABEL_OPERATION: &str = "operation";

const CONTAINER_LABELS: &[&str] = &[LABEL_CONTAINER_NAME];
const DISK_LABELS: &[&str] = &[LABEL_CONTAINER_NAME, LABEL_DISK_DEVICE];
const NETWORK_LABELS: &[&str] = &[LABEL_CONTAINER_NAME, LABEL_INTERFACE, LABEL_OPERATION];

/// Errors raised while rendering samples into metric families
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("prometheus rejected metric: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Key identifying one of the container metric families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    CpuUsage,
    MemUsage,
    MemUsagePeak,
    SwapUsage,
    SwapUsagePeak,
    ProcessCount,
    DiskUsage,
    Pid,
    NetworkUsage,
    RunningStatus,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::CpuUsage,
        Metric::MemUsage,
        Metric::MemUsagePeak,
        Metric::SwapUsage,
        Metric::SwapUsagePeak,
        Metric::ProcessCount,
        Metric::DiskUsage,
        Metric::Pid,
        Metric::NetworkUsage,
        Metric::RunningStatus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::CpuUsage => "container_cpu_usage",
            Metric::MemUsage => "container_mem_usage",
            Metric::MemUsagePeak => "container_mem_usage_peak",
            Metric::SwapUsage => "container_swap_usage",
            Metric::SwapUsagePeak => "container_swap_usage_peak",
            Metric::ProcessCount => "container_process_count",
            Metric::DiskUsage => "container_disk_usage",
            Metric::Pid => "container_pid",
            Metric::NetworkUsage => "container_network_usage",
            Metric::RunningStatus => "container_running_status",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Metric::CpuUsage => "Container CPU usage in seconds",
            Metric::MemUsage => "Container memory usage in bytes",
            Metric::MemUsagePeak => "Container peak memory usage in bytes",
            Metric::SwapUsage => "Container swap usage in bytes",
            Metric::SwapUsagePeak => "Container peak swap usage in bytes",
            Metric::ProcessCount => "Number of processes running in the container",
            Metric::DiskUsage => "Container disk usage in bytes per device",
            Metric::Pid => "Host PID of the container init process",
            Metric::NetworkUsage => "Container network counters per interface and operation",
            Metric::RunningStatus => "Set to 1 when the container is running",
        }
    }

    pub fn label_names(self) -> &'static [&'static str] {
        match self {
            Metric::DiskUsage => DISK_LABELS,
            Metric::NetworkUsage => NETWORK_LABELS,
            _ => CONTAINER_LABELS,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Immutable metadata describing one metric family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub metric: Metric,
    pub name: &'static str,
    pub help: &'static str,
    pub label_names: &'static [&'static str],
}

impl From<Metric> for MetricDescriptor {
    fn from(metric: Metric) -> Self {
        Self {
            metric,
            name: metric.name(),
            help: metric.help(),
            label_names: metric.label_names(),
        }
    }
}

/// One observation produced during a scrape
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Metric,
    pub value: f64,
    /// Label values, in the order of the descriptor's label names
    pub labels: Vec<String>,
}

impl Sample {
    pub fn new(metric: Metric, value: f64, labels: Vec<String>) -> Self {
        debug_assert_eq!(
            labels.len(),
            metric.label_names().len(),
            "label arity mismatch for {}",
            metric.name()
        );
        Self {
            metric,
            value,
            labels,
        }
    }

    /// Look up a label value by label name
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric
            .label_names()
            .iter()
            .position(|l| *l == name)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}

/// Catalog of the container metric descriptors
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    descriptors: Vec<MetricDescriptor>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: Metric::ALL.iter().copied().map(MetricDescriptor::from).collect(),
        }
    }

    /// All descriptors this exporter can emit
    pub fn describe(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, metric: Metric) -> &MetricDescriptor {
        &self.descriptors[metric.index()]
    }

    /// Render one scrape's samples into gauge metric families.
    ///
    /// A fresh registry is built per call so no series outlives the scrape
    /// that produced it. Families without samples are omitted.
    pub fn gather(&self, samples: &[Sample]) -> Result<Vec<MetricFamily>, SchemaError> {
        let registry = Registry::new();
        let mut gauges = Vec::with_capacity(self.descriptors.len());

        for descriptor in &self.descriptors {
            let gauge = GaugeVec::new(
                Opts::new(descriptor.name, descriptor.help),
                descriptor.label_names,
            )?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.push(gauge);
        }

        for sample in samples {
            let labels: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
            gauges[sample.metric.index()]
                .get_metric_with_label_values(&labels)?
                .set(sample.value);
        }

        Ok(registry.gather())
    }
}
