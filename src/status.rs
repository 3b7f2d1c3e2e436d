//! One-line textual rendering of a [`Snapshot`], in the style of a menu-bar
//! title: `CPU:37% MEM:62% GPU:5% 12W ↑1.2MB/s ↓40KB/s`.

use crate::config::MetricFlags;
use crate::metrics::{format_rate, Metric, Severity, Snapshot};

pub const EMPTY_LINE: &str = "---";

/// Enabled metrics joined by a space. An enabled metric without a value this
/// tick renders its "no data" marker instead of a zero.
pub fn render(snapshot: &Snapshot, flags: &MetricFlags) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(Metric::ALL.len());

    if flags.cpu {
        parts.push(percent_part("CPU", snapshot.cpu_percent));
    }
    if flags.memory {
        parts.push(percent_part("MEM", snapshot.memory_percent));
    }
    if flags.gpu {
        parts.push(percent_part("GPU", snapshot.gpu_percent));
    }
    if flags.power {
        parts.push(match snapshot.power_watts {
            Some(watts) => format!("{}W", watts),
            None => "--W".to_string(),
        });
    }
    if flags.network {
        parts.push(match snapshot.network {
            Some(rates) => format!(
                "↑{} ↓{}",
                format_rate(rates.up_bytes_per_sec),
                format_rate(rates.down_bytes_per_sec)
            ),
            None => "↑-- ↓--".to_string(),
        });
    }

    if parts.is_empty() {
        EMPTY_LINE.to_string()
    } else {
        parts.join(" ")
    }
}

/// Severity of every percentage metric that has a value.
pub fn severity_tags(snapshot: &Snapshot) -> Vec<(Metric, Severity)> {
    [
        (Metric::Cpu, snapshot.cpu_percent),
        (Metric::Memory, snapshot.memory_percent),
        (Metric::Gpu, snapshot.gpu_percent),
    ]
    .into_iter()
    .filter_map(|(metric, value)| value.map(|v| (metric, Severity::classify(v))))
    .collect()
}

fn percent_part(label: &str, value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{}:{:.0}%", label, value),
        None => format!("{}:--%", label),
    }
}
