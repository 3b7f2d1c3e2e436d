use std::time::Instant;

use log::debug;

use super::types::{NetworkRates, RawNetworkSample};

const KIB: f64 = 1024.0;

#[derive(Clone, Debug, Default)]
pub struct NetworkRateState {
    previous: Option<(RawNetworkSample, Instant)>,
}

impl NetworkRateState {
    pub fn new() -> Self {
        NetworkRateState { previous: None }
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Converts the byte counters read at `read_at` into rates against the
    /// stored sample. The stored `(sample, read_at)` is always overwritten.
    pub fn sample(&mut self, raw: RawNetworkSample, read_at: Instant) -> Option<NetworkRates> {
        let (previous, previous_at) = self.previous.replace((raw, read_at))?;

        let elapsed = match read_at.checked_duration_since(previous_at) {
            Some(elapsed) if !elapsed.is_zero() => elapsed.as_secs_f64(),
            _ => {
                debug!("network sample without forward progress in time; skipping rate");
                return None;
            }
        };

        let sent = counter_delta(previous.sent_bytes, raw.sent_bytes);
        let received = counter_delta(previous.received_bytes, raw.received_bytes);
        Some(NetworkRates {
            up_bytes_per_sec: sent as f64 / elapsed,
            down_bytes_per_sec: received as f64 / elapsed,
        })
    }
}

/// Growth of a cumulative counter. A counter that went backwards is assumed
/// to have restarted from zero, so its current value is the delta.
pub fn counter_delta(previous: u64, current: u64) -> u64 {
    if current >= previous {
        current - previous
    } else {
        current
    }
}

/// Renders a byte rate as whole `KB/s` below 1024 KiB/s, `MB/s` with one
/// decimal place above. The unit is picked after rounding, so `1024KB/s` is
/// never printed.
pub fn format_rate(bytes_per_sec: f64) -> String {
    let kib = bytes_per_sec.max(0.0) / KIB;
    if kib.round() < KIB {
        format!("{:.0}KB/s", kib)
    } else {
        format!("{:.1}MB/s", kib / KIB)
    }
}
