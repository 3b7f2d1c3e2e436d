use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::select;
use tokio::sync::{watch, Notify, RwLock};
use tokio::task;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::engine::{Reading, TelemetryEngine, TickReadings, TimedNetworkSample};
use super::types::{Metric, Snapshot};
use crate::config::{MetricFlags, MonitorConfig, SettingsStore};
use crate::source::{Capabilities, CounterError, CounterSource};

pub struct MetricsSamplerHandle {
    snapshot: Arc<RwLock<Snapshot>>,
    updates: watch::Receiver<Snapshot>,
    ready: Arc<AtomicBool>,
    notify_ready: Arc<Notify>,
    cancel: CancellationToken,
    _runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl MetricsSamplerHandle {
    pub fn spawn(
        source: Arc<dyn CounterSource>,
        settings: Arc<dyn SettingsStore>,
        config: &MonitorConfig,
    ) -> Self {
        let config = config.clone().normalized();
        let snapshot = Arc::new(RwLock::new(Snapshot::empty()));
        let (publisher, updates) = watch::channel(Snapshot::empty());
        let ready = Arc::new(AtomicBool::new(false));
        let notify_ready = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let inner = Arc::new(MetricsSamplerInner {
            source,
            settings,
            period: config.sample_interval(),
            read_timeout: config.read_timeout(),
            slots: Arc::new(ReadSlots::default()),
            snapshot: Arc::clone(&snapshot),
            publisher,
            ready: Arc::clone(&ready),
            notify_ready: Arc::clone(&notify_ready),
            cancel: cancel.clone(),
        });

        let fut = MetricsSamplerInner::run(Arc::clone(&inner));

        let runtime_guard = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(fut);
                None
            }
            Err(_) => {
                let runtime = Arc::new(
                    tokio::runtime::Builder::new_multi_thread()
                        .enable_all()
                        .build()
                        .expect("failed to build metrics sampler runtime"),
                );
                runtime.spawn(fut);
                Some(runtime)
            }
        };

        MetricsSamplerHandle {
            snapshot,
            updates,
            ready,
            notify_ready,
            cancel,
            _runtime: runtime_guard,
        }
    }

    pub async fn latest_snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.updates.clone()
    }

    /// Resolves once the first tick has been published.
    pub async fn wait_until_ready(&self) {
        let notified = self.notify_ready.notified();
        if self.ready.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct MetricsSamplerInner {
    source: Arc<dyn CounterSource>,
    settings: Arc<dyn SettingsStore>,
    period: Duration,
    read_timeout: Duration,
    slots: Arc<ReadSlots>,
    snapshot: Arc<RwLock<Snapshot>>,
    publisher: watch::Sender<Snapshot>,
    ready: Arc<AtomicBool>,
    notify_ready: Arc<Notify>,
    cancel: CancellationToken,
}

impl MetricsSamplerInner {
    async fn run(self: Arc<Self>) {
        let capabilities = self.probe_capabilities().await;
        capabilities.log_summary();
        let mut engine = TelemetryEngine::new(capabilities);

        // The first tick fires immediately. Ticks run inline in this task, so
        // one cycle finishes before the next starts; firings missed while a
        // cycle was running are skipped rather than queued.
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                _ = self.cancel.cancelled() => {
                    debug!("metrics sampler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let flags = engine.effective_flags(self.settings.flags());
                    let readings = self.collect(flags).await;
                    let snapshot = engine.ingest(readings);
                    self.store_snapshot(snapshot).await;
                }
            }
        }
    }

    /// Checks the optional readers once, each under the read timeout. A
    /// reader that fails or hangs counts as absent hardware.
    async fn probe_capabilities(&self) -> Capabilities {
        let limit = self.read_timeout;
        let (accelerator, power) = tokio::join!(
            read_bounded(&self.source, &self.slots, Metric::Gpu, true, limit, |source| {
                source
                    .read_accelerator_utilization()
                    .ok_or(CounterError::Unavailable("accelerator utilization"))
            }),
            read_bounded(&self.source, &self.slots, Metric::Power, true, limit, |source| {
                source
                    .read_power_milliwatts()
                    .ok_or(CounterError::Unavailable("power telemetry"))
            }),
        );
        Capabilities {
            accelerator: probed_present(Metric::Gpu, accelerator),
            power: probed_present(Metric::Power, power),
        }
    }

    /// Reads every enabled metric concurrently, each on the blocking pool and
    /// bounded by the read timeout.
    async fn collect(&self, flags: MetricFlags) -> TickReadings {
        let limit = self.read_timeout;
        let (cpu, memory, gpu, power_milliwatts, network) = tokio::join!(
            read_bounded(&self.source, &self.slots, Metric::Cpu, flags.cpu, limit, |source| {
                source.read_cpu_ticks()
            }),
            read_bounded(&self.source, &self.slots, Metric::Memory, flags.memory, limit, |source| {
                source.read_memory_stats()
            }),
            read_bounded(&self.source, &self.slots, Metric::Gpu, flags.gpu, limit, |source| {
                source
                    .read_accelerator_utilization()
                    .ok_or(CounterError::Unavailable("accelerator utilization"))
            }),
            read_bounded(&self.source, &self.slots, Metric::Power, flags.power, limit, |source| {
                source
                    .read_power_milliwatts()
                    .ok_or(CounterError::Unavailable("power telemetry"))
            }),
            read_bounded(&self.source, &self.slots, Metric::Network, flags.network, limit, |source| {
                let sample = source.read_network_byte_counters();
                Ok(TimedNetworkSample {
                    sample,
                    read_at: Instant::now(),
                })
            }),
        );
        TickReadings {
            cpu,
            memory,
            gpu,
            power_milliwatts,
            network,
        }
    }

    async fn store_snapshot(&self, snapshot: Snapshot) {
        {
            let mut guard = self.snapshot.write().await;
            *guard = snapshot.clone();
        }
        self.publisher.send_replace(snapshot);
        if !self.ready.swap(true, Ordering::SeqCst) {
            self.notify_ready.notify_waiters();
        }
    }
}

fn probed_present<T>(metric: Metric, reading: Reading<T>) -> bool {
    match reading {
        Reading::Value(_) => true,
        Reading::Failed(err) if !err.is_unavailable() => {
            warn!("{} probe failed: {}; treating as absent", metric.label(), err);
            false
        }
        _ => false,
    }
}

/// One busy flag per metric. A flag stays set until its reader returns, even
/// when the sampler has already given up waiting on it.
#[derive(Default)]
struct ReadSlots {
    busy: [AtomicBool; Metric::ALL.len()],
}

impl ReadSlots {
    fn index(metric: Metric) -> usize {
        match metric {
            Metric::Cpu => 0,
            Metric::Memory => 1,
            Metric::Gpu => 2,
            Metric::Power => 3,
            Metric::Network => 4,
        }
    }

    fn claim(slots: &Arc<ReadSlots>, metric: Metric) -> Option<SlotGuard> {
        let busy = &slots.busy[Self::index(metric)];
        if busy.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(SlotGuard {
            slots: Arc::clone(slots),
            metric,
        })
    }
}

struct SlotGuard {
    slots: Arc<ReadSlots>,
    metric: Metric,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.busy[ReadSlots::index(self.metric)].store(false, Ordering::Release);
    }
}

/// One counter read on the blocking pool. A read that overruns `limit` is a
/// transient failure for this tick; until that reader returns, later ticks
/// report the metric as timed out instead of starting another read.
async fn read_bounded<T, F>(
    source: &Arc<dyn CounterSource>,
    slots: &Arc<ReadSlots>,
    metric: Metric,
    enabled: bool,
    limit: Duration,
    read: F,
) -> Reading<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn CounterSource) -> Result<T, CounterError> + Send + 'static,
{
    if !enabled {
        return Reading::Disabled;
    }
    let Some(guard) = ReadSlots::claim(slots, metric) else {
        debug!("{} read from an earlier tick still running; skipping", metric.label());
        return Reading::Failed(CounterError::TimedOut(metric));
    };
    let source = Arc::clone(source);
    let handle = task::spawn_blocking(move || {
        let _guard = guard;
        read(source.as_ref())
    });
    match timeout(limit, handle).await {
        Ok(Ok(result)) => Reading::from_result(result),
        Ok(Err(err)) => {
            warn!("{} reader task failed: {}", metric.label(), err);
            Reading::Failed(CounterError::ReaderAborted(metric))
        }
        Err(_) => Reading::Failed(CounterError::TimedOut(metric)),
    }
}

pub type MetricsSampler = MetricsSamplerHandle;

impl Drop for MetricsSamplerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
