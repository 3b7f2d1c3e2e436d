mod accelerator;
mod cpu;
mod engine;
mod memory;
mod network;
mod sampler;
mod severity;
mod types;

pub use accelerator::{first_utilization, milliwatts_to_watts, AcceleratorDevice};
pub use cpu::{core_utilization, CpuDeltaState};
pub use engine::{EngineState, Reading, TelemetryEngine, TickReadings, TimedNetworkSample};
pub use memory::memory_percent;
pub use network::{counter_delta, format_rate, NetworkRateState};
pub use sampler::{MetricsSampler, MetricsSamplerHandle};
pub use severity::{Severity, CRITICAL_THRESHOLD, ELEVATED_THRESHOLD};
pub use types::{
    CpuTicks, Metric, NetworkRates, RawCpuSample, RawMemorySample, RawNetworkSample, Snapshot,
};
