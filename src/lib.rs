mod config;
mod metrics;
mod source;
pub mod status;

pub use config::{
    ConfigError, MetricFlags, MonitorConfig, SettingsStore, SharedSettings, CONFIG_ENV_VAR,
};
pub use metrics::{
    core_utilization, counter_delta, first_utilization, format_rate, memory_percent,
    milliwatts_to_watts, AcceleratorDevice, CpuDeltaState, CpuTicks, EngineState, Metric,
    MetricsSampler, MetricsSamplerHandle, NetworkRateState, NetworkRates, RawCpuSample,
    RawMemorySample, RawNetworkSample, Reading, Severity, Snapshot, TelemetryEngine, TickReadings,
    TimedNetworkSample, CRITICAL_THRESHOLD, ELEVATED_THRESHOLD,
};
pub use source::{interfaces, Capabilities, CounterError, CounterSource, HostCounters};
