use std::time::Instant;

use chrono::Utc;
use log::{debug, warn};

use super::accelerator::milliwatts_to_watts;
use super::cpu::CpuDeltaState;
use super::memory::memory_percent;
use super::network::NetworkRateState;
use super::types::{Metric, RawCpuSample, RawMemorySample, RawNetworkSample, Snapshot};
use crate::config::MetricFlags;
use crate::source::{Capabilities, CounterError, CounterSource};

/// Outcome of one raw-counter read within a tick.
#[derive(Debug)]
pub enum Reading<T> {
    /// The metric was switched off; nothing was read.
    Disabled,
    Failed(CounterError),
    Value(T),
}

impl<T> Reading<T> {
    pub fn from_result(result: Result<T, CounterError>) -> Self {
        match result {
            Ok(value) => Reading::Value(value),
            Err(err) => Reading::Failed(err),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Reading::Disabled)
    }
}

/// Network byte counters together with the instant they were read.
#[derive(Clone, Copy, Debug)]
pub struct TimedNetworkSample {
    pub sample: RawNetworkSample,
    pub read_at: Instant,
}

/// Everything read from the counter source during one tick.
#[derive(Debug)]
pub struct TickReadings {
    pub cpu: Reading<RawCpuSample>,
    pub memory: Reading<RawMemorySample>,
    pub gpu: Reading<f64>,
    pub power_milliwatts: Reading<i64>,
    pub network: Reading<TimedNetworkSample>,
}

impl TickReadings {
    pub fn disabled() -> Self {
        TickReadings {
            cpu: Reading::Disabled,
            memory: Reading::Disabled,
            gpu: Reading::Disabled,
            power_milliwatts: Reading::Disabled,
            network: Reading::Disabled,
        }
    }

    /// Reads every enabled metric from `source`, in place, on this thread.
    /// Disabled metrics are not touched.
    pub fn collect(source: &dyn CounterSource, enabled: MetricFlags) -> Self {
        let mut readings = TickReadings::disabled();
        if enabled.cpu {
            readings.cpu = Reading::from_result(source.read_cpu_ticks());
        }
        if enabled.memory {
            readings.memory = Reading::from_result(source.read_memory_stats());
        }
        if enabled.gpu {
            readings.gpu = Reading::from_result(
                source
                    .read_accelerator_utilization()
                    .ok_or(CounterError::Unavailable("accelerator utilization")),
            );
        }
        if enabled.power {
            readings.power_milliwatts = Reading::from_result(
                source
                    .read_power_milliwatts()
                    .ok_or(CounterError::Unavailable("power telemetry")),
            );
        }
        if enabled.network {
            let sample = source.read_network_byte_counters();
            readings.network = Reading::Value(TimedNetworkSample {
                sample,
                read_at: Instant::now(),
            });
        }
        readings
    }
}

/// Prior-sample state for the delta-based metrics. Memory, GPU and power
/// are derived from a single reading and keep nothing.
#[derive(Clone, Debug, Default)]
pub struct EngineState {
    pub cpu: CpuDeltaState,
    pub network: NetworkRateState,
}

/// Turns raw counter readings into one [`Snapshot`] per tick.
///
/// Owned by the sampling loop; every metric's state is touched only by
/// [`TelemetryEngine::ingest`], so no locking is involved.
#[derive(Debug)]
pub struct TelemetryEngine {
    state: EngineState,
    capabilities: Capabilities,
    ticks: u64,
}

impl TelemetryEngine {
    pub fn new(capabilities: Capabilities) -> Self {
        TelemetryEngine {
            state: EngineState::default(),
            capabilities,
            ticks: 0,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Flags narrowed to hardware that exists on this host.
    pub fn effective_flags(&self, flags: MetricFlags) -> MetricFlags {
        let mut effective = flags;
        for metric in Metric::ALL {
            if !self.capabilities.supports(metric) {
                effective.set(metric, false);
            }
        }
        effective
    }

    /// Reads and derives one tick synchronously.
    pub fn tick(&mut self, source: &dyn CounterSource, flags: MetricFlags) -> Snapshot {
        let readings = TickReadings::collect(source, self.effective_flags(flags));
        self.ingest(readings)
    }

    /// Derives a snapshot from readings. A failure in one metric never
    /// affects another.
    pub fn ingest(&mut self, readings: TickReadings) -> Snapshot {
        self.ticks += 1;

        let cpu_percent = match readings.cpu {
            Reading::Disabled => {
                self.state.cpu.reset();
                None
            }
            Reading::Failed(err) => {
                report_failure(Metric::Cpu, &err);
                None
            }
            Reading::Value(raw) => self.state.cpu.sample(raw),
        };

        let memory_percent = match readings.memory {
            Reading::Disabled => None,
            Reading::Failed(err) => {
                report_failure(Metric::Memory, &err);
                None
            }
            Reading::Value(raw) => memory_percent(&raw),
        };

        let gpu_percent = match readings.gpu {
            Reading::Disabled => None,
            Reading::Failed(err) => {
                report_failure(Metric::Gpu, &err);
                None
            }
            Reading::Value(value) => value.is_finite().then_some(value),
        };

        let power_watts = match readings.power_milliwatts {
            Reading::Disabled => None,
            Reading::Failed(err) => {
                report_failure(Metric::Power, &err);
                None
            }
            Reading::Value(milliwatts) => Some(milliwatts_to_watts(milliwatts)),
        };

        let network = match readings.network {
            Reading::Disabled => {
                self.state.network.reset();
                None
            }
            Reading::Failed(err) => {
                report_failure(Metric::Network, &err);
                None
            }
            Reading::Value(timed) => self.state.network.sample(timed.sample, timed.read_at),
        };

        Snapshot {
            tick: self.ticks,
            captured_at: Utc::now(),
            cpu_percent,
            memory_percent,
            gpu_percent,
            power_watts,
            network,
        }
    }
}

fn report_failure(metric: Metric, err: &CounterError) {
    if err.is_unavailable() {
        debug!("{} unavailable this tick: {}", metric.label(), err);
    } else {
        warn!("{} sampler error: {}", metric.label(), err);
    }
}
