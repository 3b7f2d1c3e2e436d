//! Parsers for `ioreg -r -w0 -c <class>` listings.
#![cfg_attr(not(target_os = "macos"), allow(dead_code))]

use lazy_static::lazy_static;
use regex::Regex;

use crate::metrics::AcceleratorDevice;

lazy_static! {
    static ref ENTRY_RE: Regex = Regex::new(r"^[\s|]*\+-o\s+(\S+)").expect("ioreg entry regex");
    static ref UTILIZATION_RE: Regex =
        Regex::new(r#""Device Utilization %"\s*=\s*(\d+)"#).expect("utilization regex");
    static ref SYSTEM_POWER_IN_RE: Regex =
        Regex::new(r#""SystemPowerIn"\s*=\s*(-?\d+)"#).expect("power regex");
}

/// Registry entries in listing order, each with the utilization found in its
/// `PerformanceStatistics`, if any.
pub(crate) fn accelerator_devices(listing: &str) -> Vec<AcceleratorDevice> {
    let mut devices: Vec<AcceleratorDevice> = Vec::new();
    for line in listing.lines() {
        if let Some(caps) = ENTRY_RE.captures(line) {
            devices.push(AcceleratorDevice::new(&caps[1], None));
            continue;
        }
        let Some(device) = devices.last_mut() else {
            continue;
        };
        if device.utilization.is_some() || !line.contains("\"PerformanceStatistics\"") {
            continue;
        }
        device.utilization = UTILIZATION_RE
            .captures(line)
            .and_then(|caps| caps[1].parse::<f64>().ok());
    }
    devices
}

/// `PowerTelemetryData.SystemPowerIn` in milliwatts.
pub(crate) fn system_power_in(listing: &str) -> Option<i64> {
    listing
        .lines()
        .filter(|line| line.contains("\"PowerTelemetryData\""))
        .find_map(|line| SYSTEM_POWER_IN_RE.captures(line))
        .and_then(|caps| caps[1].parse::<i64>().ok())
}
