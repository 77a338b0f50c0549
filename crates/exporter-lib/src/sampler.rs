//! Per-scrape sampling of container state
//!
//! On every scrape the sampler lists the containers known to the runtime,
//! fetches each container's state and flattens it into labeled samples for
//! the schema registry. Nothing is cached between scrapes.

use crate::models::{ContainerState, NetworkCounters};
use crate::runtime::{ContainerRuntime, RuntimeError};
use crate::schema::{Metric, Sample};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for a single runtime call
pub const DEFAULT_RUNTIME_TIMEOUT: Duration = Duration::from_secs(5);

/// Counter kinds emitted for every network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkOperation {
    BytesReceived,
    BytesSent,
    PacketsReceived,
    PacketsSent,
}

impl NetworkOperation {
    pub const ALL: [NetworkOperation; 4] = [
        NetworkOperation::BytesReceived,
        NetworkOperation::BytesSent,
        NetworkOperation::PacketsReceived,
        NetworkOperation::PacketsSent,
    ];

    /// Value of the `operation` label
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkOperation::BytesReceived => "BytesReceived",
            NetworkOperation::BytesSent => "BytesSent",
            NetworkOperation::PacketsReceived => "PacketsReceived",
            NetworkOperation::PacketsSent => "PacketsSent",
        }
    }

    pub fn read(self, counters: &NetworkCounters) -> u64 {
        match self {
            NetworkOperation::BytesReceived => counters.bytes_received,
            NetworkOperation::BytesSent => counters.bytes_sent,
            NetworkOperation::PacketsReceived => counters.packets_received,
            NetworkOperation::PacketsSent => counters.packets_sent,
        }
    }
}

/// Result of one scrape
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub samples: Vec<Sample>,
    /// Containers returned by the runtime listing
    pub containers_listed: usize,
    /// Containers skipped because their state could not be fetched
    pub containers_failed: usize,
    /// Set when the container listing itself failed
    pub list_error: Option<RuntimeError>,
}

impl ScrapeOutcome {
    pub fn containers_sampled(&self) -> usize {
        self.containers_listed - self.containers_failed
    }
}

/// Turns runtime state into samples, once per scrape
pub struct Sampler {
    runtime: Arc<dyn ContainerRuntime>,
    timeout: Duration,
}

impl Sampler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            timeout: DEFAULT_RUNTIME_TIMEOUT,
        }
    }

    /// Override the per-call runtime timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take a fresh snapshot of every container.
    ///
    /// Runtime failures never escape: a failed listing yields no samples and
    /// a failed state fetch skips only that container.
    pub async fn collect(&self) -> ScrapeOutcome {
        let mut outcome = ScrapeOutcome::default();

        let names = match self.bounded(self.runtime.list_container_names()).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list containers");
                outcome.list_error = Some(e);
                return outcome;
            }
        };
        outcome.containers_listed = names.len();

        for name in &names {
            match self.bounded(self.runtime.container_state(name)).await {
                Ok(state) => {
                    outcome.samples.extend(container_samples(name, &state));
                }
                Err(e) => {
                    outcome.containers_failed += 1;
                    warn!(container = %name, error = %e, "Skipping container, state fetch failed");
                }
            }
        }

        debug!(
            containers = outcome.containers_listed,
            failed = outcome.containers_failed,
            samples = outcome.samples.len(),
            "Scrape sampled"
        );

        outcome
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RuntimeError>>,
    ) -> Result<T, RuntimeError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(RuntimeError::Timeout(self.timeout)))
    }
}

/// Flatten one container's state into samples.
///
/// `name` is the name the runtime listed; it labels every sample.
pub fn container_samples(name: &str, state: &ContainerState) -> Vec<Sample> {
    let scalar = |metric: Metric, value: f64| Sample::new(metric, value, vec![name.to_string()]);

    let mut samples = vec![
        scalar(Metric::CpuUsage, state.cpu_usage_seconds),
        scalar(Metric::MemUsage, state.memory_usage_bytes as f64),
        scalar(Metric::MemUsagePeak, state.memory_usage_peak_bytes as f64),
        scalar(Metric::SwapUsage, state.swap_usage_bytes as f64),
        scalar(Metric::SwapUsagePeak, state.swap_usage_peak_bytes as f64),
        scalar(Metric::ProcessCount, state.process_count as f64),
        scalar(Metric::Pid, state.pid as f64),
    ];

    for (device, usage) in &state.disks {
        samples.push(Sample::new(
            Metric::DiskUsage,
            *usage as f64,
            vec![name.to_string(), device.clone()],
        ));
    }

    for (iface, counters) in &state.network {
        for op in NetworkOperation::ALL {
            samples.push(Sample::new(
                Metric::NetworkUsage,
                op.read(counters) as f64,
                vec![name.to_string(), iface.clone(), op.as_str().to_string()],
            ));
        }
    }

    // Absence of the series encodes "not running".
    if state.status.is_running() {
        samples.push(scalar(Metric::RunningStatus, 1.0));
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerStatus;
    use crate::schema::{LABEL_CONTAINER_NAME, LABEL_DISK_DEVICE, LABEL_INTERFACE, LABEL_OPERATION};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SCALARS: [Metric; 7] = [
        Metric::CpuUsage,
        Metric::MemUsage,
        Metric::MemUsagePeak,
        Metric::SwapUsage,
        Metric::SwapUsagePeak,
        Metric::ProcessCount,
        Metric::Pid,
    ];

    /// Mock runtime serving fixed states
    #[derive(Default)]
    struct MockRuntime {
        names: Vec<String>,
        states: HashMap<String, ContainerState>,
        fail_list: bool,
        slow: bool,
        state_calls: AtomicUsize,
    }

    impl MockRuntime {
        fn with(states: Vec<ContainerState>) -> Self {
            Self {
                names: states.iter().map(|s| s.name.clone()).collect(),
                states: states.into_iter().map(|s| (s.name.clone(), s)).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for MockRuntime {
        async fn list_container_names(&self) -> Result<Vec<String>, RuntimeError> {
            if self.fail_list {
                return Err(RuntimeError::Api {
                    status: 500,
                    message: "daemon unavailable".to_string(),
                });
            }
            Ok(self.names.clone())
        }

        async fn container_state(&self, name: &str) -> Result<ContainerState, RuntimeError> {
            self.state_calls.fetch_add(1, Ordering::SeqCst);
            if self.slow {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.states
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
        }
    }

    fn web1() -> ContainerState {
        let mut state = ContainerState::new("web1", ContainerStatus::Running);
        state.cpu_usage_seconds = 5.2;
        state.memory_usage_bytes = 1048576;
        state.pid = 1234;
        state.process_count = 12;
        state.disks.insert("vda".to_string(), 500);
        state
            .network
            .insert("eth0".to_string(), NetworkCounters::default());
        state
    }

    fn db1() -> ContainerState {
        ContainerState::new("db1", ContainerStatus::Stopped)
    }

    fn of<'a>(samples: &'a [Sample], metric: Metric, container: &str) -> Vec<&'a Sample> {
        samples
            .iter()
            .filter(|s| s.metric == metric && s.label(LABEL_CONTAINER_NAME) == Some(container))
            .collect()
    }

    #[test]
    fn test_scalar_samples_for_every_container() {
        let samples = container_samples("web1", &web1());

        for metric in SCALARS {
            let found = of(&samples, metric, "web1");
            assert_eq!(found.len(), 1, "expected one {}", metric.name());
        }
        assert_eq!(of(&samples, Metric::CpuUsage, "web1")[0].value, 5.2);
        assert_eq!(of(&samples, Metric::MemUsage, "web1")[0].value, 1048576.0);
        assert_eq!(of(&samples, Metric::Pid, "web1")[0].value, 1234.0);
        assert_eq!(of(&samples, Metric::ProcessCount, "web1")[0].value, 12.0);
    }

    #[test]
    fn test_disk_fan_out() {
        let mut state = ContainerState::new("c1", ContainerStatus::Running);
        state.disks.insert("sda".to_string(), 1000);
        state.disks.insert("sdb".to_string(), 2000);

        let samples = container_samples("c1", &state);
        let disks: HashSet<(String, u64)> = of(&samples, Metric::DiskUsage, "c1")
            .iter()
            .map(|s| {
                (
                    s.label(LABEL_DISK_DEVICE).unwrap().to_string(),
                    s.value as u64,
                )
            })
            .collect();

        let expected: HashSet<(String, u64)> =
            [("sda".to_string(), 1000), ("sdb".to_string(), 2000)]
                .into_iter()
                .collect();
        assert_eq!(disks, expected);
        assert_eq!(of(&samples, Metric::DiskUsage, "c1").len(), 2);
    }

    #[test]
    fn test_network_fan_out() {
        let mut state = ContainerState::new("c1", ContainerStatus::Running);
        state.network.insert(
            "eth0".to_string(),
            NetworkCounters {
                bytes_received: 10,
                bytes_sent: 20,
                packets_received: 1,
                packets_sent: 2,
            },
        );

        let samples = container_samples("c1", &state);
        let network = of(&samples, Metric::NetworkUsage, "c1");
        assert_eq!(network.len(), 4);

        let by_op: HashMap<&str, f64> = network
            .iter()
            .inspect(|s| assert_eq!(s.label(LABEL_INTERFACE), Some("eth0")))
            .map(|s| (s.label(LABEL_OPERATION).unwrap(), s.value))
            .collect();

        assert_eq!(by_op["BytesReceived"], 10.0);
        assert_eq!(by_op["BytesSent"], 20.0);
        assert_eq!(by_op["PacketsReceived"], 1.0);
        assert_eq!(by_op["PacketsSent"], 2.0);
    }

    #[test]
    fn test_running_status_absent_when_not_running() {
        for status in [
            ContainerStatus::Stopped,
            ContainerStatus::Frozen,
            ContainerStatus::Other("Starting".to_string()),
        ] {
            let samples = container_samples("c1", &ContainerState::new("c1", status));
            assert!(of(&samples, Metric::RunningStatus, "c1").is_empty());
        }

        let samples = container_samples("c1", &ContainerState::new("c1", ContainerStatus::Running));
        let running = of(&samples, Metric::RunningStatus, "c1");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].value, 1.0);
    }

    #[tokio::test]
    async fn test_collect_covers_all_containers() {
        let runtime = MockRuntime::with(vec![
            web1(),
            db1(),
            ContainerState::new("cache1", ContainerStatus::Running),
        ]);
        let sampler = Sampler::new(Arc::new(runtime));

        let outcome = sampler.collect().await;

        assert_eq!(outcome.containers_listed, 3);
        for name in ["web1", "db1", "cache1"] {
            for metric in SCALARS {
                assert_eq!(of(&outcome.samples, metric, name).len(), 1);
            }
        }
    }

    #[tokio::test]
    async fn test_collect_isolates_failed_container() {
        let mut runtime = MockRuntime::with(vec![web1(), db1()]);
        runtime.names.insert(1, "broken".to_string());
        let sampler = Sampler::new(Arc::new(runtime));

        let outcome = sampler.collect().await;

        assert_eq!(outcome.containers_listed, 3);
        assert_eq!(outcome.containers_failed, 1);
        assert_eq!(outcome.containers_sampled(), 2);
        assert!(outcome
            .samples
            .iter()
            .all(|s| s.label(LABEL_CONTAINER_NAME) != Some("broken")));
        assert_eq!(of(&outcome.samples, Metric::CpuUsage, "web1").len(), 1);
        assert_eq!(of(&outcome.samples, Metric::CpuUsage, "db1").len(), 1);
    }

    #[tokio::test]
    async fn test_collect_empty_world() {
        let sampler = Sampler::new(Arc::new(MockRuntime::default()));

        let outcome = sampler.collect().await;

        assert!(outcome.samples.is_empty());
        assert_eq!(outcome.containers_listed, 0);
        assert!(outcome.list_error.is_none());
    }

    #[tokio::test]
    async fn test_collect_list_failure_yields_nothing() {
        let runtime = MockRuntime {
            fail_list: true,
            ..MockRuntime::with(vec![web1()])
        };
        let runtime = Arc::new(runtime);
        let sampler = Sampler::new(runtime.clone());

        let outcome = sampler.collect().await;

        assert!(outcome.samples.is_empty());
        assert!(outcome.list_error.is_some());
        assert_eq!(runtime.state_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_collect_times_out_slow_runtime() {
        let runtime = MockRuntime {
            slow: true,
            ..MockRuntime::with(vec![web1()])
        };
        let sampler = Sampler::new(Arc::new(runtime)).with_timeout(Duration::from_millis(50));

        let outcome = sampler.collect().await;

        assert_eq!(outcome.containers_failed, 1);
        assert!(outcome.samples.is_empty());
    }

    #[tokio::test]
    async fn test_two_container_scrape() {
        let sampler = Sampler::new(Arc::new(MockRuntime::with(vec![web1(), db1()])));

        let outcome = sampler.collect().await;
        let count = |name: &str, metric: Metric| of(&outcome.samples, metric, name).len();

        let web1_scalars: usize = SCALARS.iter().map(|m| count("web1", *m)).sum();
        assert_eq!(web1_scalars, 7);
        assert_eq!(count("web1", Metric::DiskUsage), 1);
        assert_eq!(count("web1", Metric::NetworkUsage), 4);
        assert_eq!(count("web1", Metric::RunningStatus), 1);

        let db1_scalars: usize = SCALARS.iter().map(|m| count("db1", *m)).sum();
        assert_eq!(db1_scalars, 7);
        assert_eq!(count("db1", Metric::DiskUsage), 0);
        assert_eq!(count("db1", Metric::NetworkUsage), 0);
        assert_eq!(count("db1", Metric::RunningStatus), 0);

        assert_eq!(outcome.samples.len(), 13 + 7);
    }
}
