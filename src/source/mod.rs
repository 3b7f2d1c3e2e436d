//! Raw counter readers.
//!
//! [`CounterSource`] is the seam between the telemetry engine and the host:
//! the engine only ever sees cumulative counters and instantaneous gauges,
//! never the platform APIs behind them. [`HostCounters`] is the real
//! implementation for macOS and Linux; tests substitute scripted sources.

pub mod interfaces;
mod ioreg;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

use std::path::PathBuf;
use std::sync::OnceLock;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{Metric, RawCpuSample, RawMemorySample, RawNetworkSample};

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("{0} is not available on this host")]
    Unavailable(&'static str),
    #[error("reading {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },
    #[error("{call} returned {code}")]
    MachCall { call: &'static str, code: i32 },
    #[error("sysctl {name} failed: {source}")]
    Sysctl {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{} read exceeded its deadline", .0.label())]
    TimedOut(Metric),
    #[error("{} reader stopped unexpectedly", .0.label())]
    ReaderAborted(Metric),
}

impl CounterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CounterError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        CounterError::Parse {
            what,
            detail: detail.into(),
        }
    }

    /// Absent hardware, as opposed to a read that went wrong.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CounterError::Unavailable(_))
    }
}

/// Point-in-time readings the telemetry engine depends on.
pub trait CounterSource: Send + Sync {
    fn read_cpu_ticks(&self) -> Result<RawCpuSample, CounterError>;

    fn read_memory_stats(&self) -> Result<RawMemorySample, CounterError>;

    /// Utilization of the first accelerator that reports one.
    fn read_accelerator_utilization(&self) -> Option<f64>;

    fn read_power_milliwatts(&self) -> Option<i64>;

    /// Never fails; a host without qualifying interfaces reports zero totals.
    fn read_network_byte_counters(&self) -> RawNetworkSample;

    /// One-off probe for optional hardware. Called once when sampling starts.
    fn probe_capabilities(&self) -> Capabilities {
        Capabilities {
            accelerator: self.read_accelerator_utilization().is_some(),
            power: self.read_power_milliwatts().is_some(),
        }
    }
}

/// Optional hardware detected at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub accelerator: bool,
    pub power: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Capabilities {
            accelerator: true,
            power: true,
        }
    }

    pub fn supports(&self, metric: Metric) -> bool {
        match metric {
            Metric::Gpu => self.accelerator,
            Metric::Power => self.power,
            Metric::Cpu | Metric::Memory | Metric::Network => true,
        }
    }

    pub fn log_summary(&self) {
        info!(
            "capabilities: accelerator={} power={}",
            self.accelerator, self.power
        );
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::all()
    }
}

/// Counters read from the machine this process runs on.
#[derive(Debug, Default)]
pub struct HostCounters {
    total_memory: OnceLock<u64>,
}

impl HostCounters {
    pub fn new() -> Self {
        HostCounters {
            total_memory: OnceLock::new(),
        }
    }

    /// Total physical memory is constant for the process lifetime; read it
    /// once and reuse it.
    fn cached_total_memory(
        &self,
        read: impl FnOnce() -> Result<u64, CounterError>,
    ) -> Result<u64, CounterError> {
        if let Some(total) = self.total_memory.get() {
            return Ok(*total);
        }
        let total = read()?;
        Ok(*self.total_memory.get_or_init(|| total))
    }
}

#[cfg(target_os = "macos")]
impl CounterSource for HostCounters {
    fn read_cpu_ticks(&self) -> Result<RawCpuSample, CounterError> {
        macos::read_cpu_ticks()
    }

    fn read_memory_stats(&self) -> Result<RawMemorySample, CounterError> {
        let total = self.cached_total_memory(|| macos::read_sysctl_u64("hw.memsize"))?;
        macos::read_memory_stats(total)
    }

    fn read_accelerator_utilization(&self) -> Option<f64> {
        macos::read_accelerator_utilization()
    }

    fn read_power_milliwatts(&self) -> Option<i64> {
        macos::read_power_milliwatts()
    }

    fn read_network_byte_counters(&self) -> RawNetworkSample {
        interfaces::read_active_totals()
    }
}

#[cfg(target_os = "linux")]
impl CounterSource for HostCounters {
    fn read_cpu_ticks(&self) -> Result<RawCpuSample, CounterError> {
        linux::read_cpu_ticks()
    }

    fn read_memory_stats(&self) -> Result<RawMemorySample, CounterError> {
        let sample = linux::read_memory_stats()?;
        let total_bytes = self.cached_total_memory(|| Ok(sample.total_bytes))?;
        Ok(RawMemorySample {
            total_bytes,
            ..sample
        })
    }

    fn read_accelerator_utilization(&self) -> Option<f64> {
        linux::read_accelerator_utilization()
    }

    fn read_power_milliwatts(&self) -> Option<i64> {
        linux::read_power_milliwatts()
    }

    fn read_network_byte_counters(&self) -> RawNetworkSample {
        interfaces::read_active_totals()
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
impl CounterSource for HostCounters {
    fn read_cpu_ticks(&self) -> Result<RawCpuSample, CounterError> {
        Err(CounterError::Unavailable("cpu tick counters"))
    }

    fn read_memory_stats(&self) -> Result<RawMemorySample, CounterError> {
        Err(CounterError::Unavailable("vm statistics"))
    }

    fn read_accelerator_utilization(&self) -> Option<f64> {
        None
    }

    fn read_power_milliwatts(&self) -> Option<i64> {
        None
    }

    fn read_network_byte_counters(&self) -> RawNetworkSample {
        interfaces::read_active_totals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_gate_only_optional_hardware() {
        let caps = Capabilities {
            accelerator: false,
            power: true,
        };
        assert!(!caps.supports(Metric::Gpu));
        assert!(caps.supports(Metric::Power));
        assert!(caps.supports(Metric::Cpu));
        assert!(caps.supports(Metric::Network));
    }

    #[test]
    fn total_memory_is_read_once() {
        let counters = HostCounters::new();
        let mut reads = 0;
        for _ in 0..3 {
            let total = counters
                .cached_total_memory(|| {
                    reads += 1;
                    Ok(8 << 30)
                })
                .unwrap();
            assert_eq!(total, 8 << 30);
        }
        assert_eq!(reads, 1);
    }

    #[test]
    fn failed_total_memory_read_is_retried() {
        let counters = HostCounters::new();
        assert!(counters
            .cached_total_memory(|| Err(CounterError::Unavailable("hw.memsize")))
            .is_err());
        assert_eq!(counters.cached_total_memory(|| Ok(42)).unwrap(), 42);
    }

    #[test]
    fn errors_render_the_metric_name() {
        assert_eq!(
            CounterError::TimedOut(Metric::Network).to_string(),
            "network read exceeded its deadline"
        );
        assert!(CounterError::Unavailable("x").is_unavailable());
    }
}
