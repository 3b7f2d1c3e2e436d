// src/config.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::Metric;

pub const CONFIG_ENV_VAR: &str = "PULSEBAR_CONFIG";

const MIN_SAMPLE_INTERVAL_MS: u64 = 1_000;
const MAX_SAMPLE_INTERVAL_MS: u64 = 60 * 60 * 1_000;
const MIN_READ_TIMEOUT_MS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Which metrics are sampled. Read once at the start of every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricFlags {
    pub cpu: bool,
    pub memory: bool,
    pub gpu: bool,
    pub power: bool,
    pub network: bool,
}

impl MetricFlags {
    pub fn none() -> Self {
        MetricFlags {
            cpu: false,
            memory: false,
            gpu: false,
            power: false,
            network: false,
        }
    }

    pub fn is_enabled(&self, metric: Metric) -> bool {
        match metric {
            Metric::Cpu => self.cpu,
            Metric::Memory => self.memory,
            Metric::Gpu => self.gpu,
            Metric::Power => self.power,
            Metric::Network => self.network,
        }
    }

    pub fn set(&mut self, metric: Metric, enabled: bool) {
        let slot = match metric {
            Metric::Cpu => &mut self.cpu,
            Metric::Memory => &mut self.memory,
            Metric::Gpu => &mut self.gpu,
            Metric::Power => &mut self.power,
            Metric::Network => &mut self.network,
        };
        *slot = enabled;
    }

    pub fn any_enabled(&self) -> bool {
        Metric::ALL.iter().any(|metric| self.is_enabled(*metric))
    }
}

impl Default for MetricFlags {
    fn default() -> Self {
        MetricFlags {
            cpu: true,
            memory: true,
            gpu: true,
            power: true,
            network: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub flags: MetricFlags,
    pub sample_interval_ms: u64, // Default: 1000, within [1s, 1h]
    pub read_timeout_ms: u64,    // Default: 750, per counter read
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            flags: MetricFlags::default(),
            sample_interval_ms: 1_000,
            read_timeout_ms: 750,
        }
    }
}

impl MonitorConfig {
    /// `$PULSEBAR_CONFIG` if set, otherwise `<config dir>/pulsebar/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|mut path| {
            path.push("pulsebar");
            path.push("config.json");
            path
        })
    }

    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("no config directory on this host; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// A missing file yields defaults; an unreadable or malformed one is an
    /// error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: MonitorConfig =
            serde_json::from_slice(&data).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config.normalized())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, data).map_err(io_err)
    }

    /// Like [`MonitorConfig::load_from`] (or [`MonitorConfig::load`] without a
    /// path), but an unreadable or malformed file is logged and replaced by
    /// defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let loaded = match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        };
        loaded.unwrap_or_else(|err| {
            warn!("{}; using defaults", err);
            Self::default()
        })
    }

    /// Clamps the sampling period to between one second and one hour and
    /// keeps the read timeout strictly inside one period.
    pub fn normalized(mut self) -> Self {
        self.sample_interval_ms = self
            .sample_interval_ms
            .clamp(MIN_SAMPLE_INTERVAL_MS, MAX_SAMPLE_INTERVAL_MS);
        self.read_timeout_ms = self
            .read_timeout_ms
            .clamp(MIN_READ_TIMEOUT_MS, self.sample_interval_ms - 1);
        self
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// The per-metric enable switches, as seen by the sampling loop.
pub trait SettingsStore: Send + Sync {
    fn flags(&self) -> MetricFlags;
}

impl SettingsStore for MetricFlags {
    fn flags(&self) -> MetricFlags {
        *self
    }
}

/// Flags that can be flipped while the sampler runs.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    flags: Arc<RwLock<MetricFlags>>,
}

impl SharedSettings {
    pub fn new(flags: MetricFlags) -> Self {
        SharedSettings {
            flags: Arc::new(RwLock::new(flags)),
        }
    }

    pub fn set(&self, metric: Metric, enabled: bool) {
        let mut guard = self.flags.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.set(metric, enabled);
    }

    /// Flips one metric and returns its new state.
    pub fn toggle(&self, metric: Metric) -> bool {
        let mut guard = self.flags.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let enabled = !guard.is_enabled(metric);
        guard.set(metric, enabled);
        enabled
    }
}

impl SettingsStore for SharedSettings {
    fn flags(&self) -> MetricFlags {
        *self.flags.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
