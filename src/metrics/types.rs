use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative scheduler ticks for one logical core since boot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTicks {
    pub user: u64,
    pub system: u64,
    pub nice: u64,
    pub idle: u64,
}

impl CpuTicks {
    pub fn new(user: u64, system: u64, nice: u64, idle: u64) -> Self {
        CpuTicks {
            user,
            system,
            nice,
            idle,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCpuSample {
    pub cores: Vec<CpuTicks>,
}

impl RawCpuSample {
    pub fn new(cores: Vec<CpuTicks>) -> Self {
        RawCpuSample { cores }
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }
}

/// Instantaneous VM page accounting. Page counts are in pages, `page_size`
/// and `total_bytes` in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMemorySample {
    pub free: u64,
    pub inactive: u64,
    pub purgeable: u64,
    pub speculative: u64,
    pub page_size: u64,
    pub total_bytes: u64,
}

impl RawMemorySample {
    pub fn reclaimable_pages(&self) -> u64 {
        self.free
            .saturating_add(self.inactive)
            .saturating_add(self.purgeable)
            .saturating_add(self.speculative)
    }
}

/// Byte counters summed over every interface that is up, running and not
/// loopback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNetworkSample {
    pub sent_bytes: u64,
    pub received_bytes: u64,
}

impl RawNetworkSample {
    pub fn new(sent_bytes: u64, received_bytes: u64) -> Self {
        RawNetworkSample {
            sent_bytes,
            received_bytes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cpu,
    Memory,
    Gpu,
    Power,
    Network,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Cpu,
        Metric::Memory,
        Metric::Gpu,
        Metric::Power,
        Metric::Network,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Gpu => "gpu",
            Metric::Power => "power",
            Metric::Network => "network",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkRates {
    pub up_bytes_per_sec: f64,
    pub down_bytes_per_sec: f64,
}

/// Derived values for one tick. A field is `None` when its metric was
/// disabled or no value could be derived this tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub captured_at: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub gpu_percent: Option<f64>,
    pub power_watts: Option<i64>,
    pub network: Option<NetworkRates>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Snapshot {
            tick: 0,
            captured_at: Utc::now(),
            cpu_percent: None,
            memory_percent: None,
            gpu_percent: None,
            power_watts: None,
            network: None,
        }
    }

    pub fn has_value(&self, metric: Metric) -> bool {
        match metric {
            Metric::Cpu => self.cpu_percent.is_some(),
            Metric::Memory => self.memory_percent.is_some(),
            Metric::Gpu => self.gpu_percent.is_some(),
            Metric::Power => self.power_watts.is_some(),
            Metric::Network => self.network.is_some(),
        }
    }
}
