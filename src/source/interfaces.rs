//! Aggregate byte counters over interfaces that are up, running and not
//! loopback.
//!
//! Interface state comes from `getifaddrs(3)`; the cumulative byte counters
//! come from `sysinfo::Networks`.

use std::collections::HashSet;

use log::warn;
use sysinfo::Networks;

use crate::metrics::RawNetworkSample;

/// Per-interface cumulative counters as reported by the OS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub sent_bytes: u64,
    pub received_bytes: u64,
}

pub fn read_active_totals() -> RawNetworkSample {
    let networks = Networks::new_with_refreshed_list();
    let counters: Vec<InterfaceCounters> = networks
        .iter()
        .map(|(name, data)| InterfaceCounters {
            name: name.clone(),
            sent_bytes: data.total_transmitted(),
            received_bytes: data.total_received(),
        })
        .collect();

    match active_interface_names() {
        Ok(active) => sum_active(&counters, |name| active.contains(name)),
        Err(err) => {
            warn!(
                "interface flags unavailable ({}); falling back to name filter",
                err
            );
            sum_active(&counters, |name| !looks_like_loopback(name))
        }
    }
}

pub fn sum_active<F>(counters: &[InterfaceCounters], is_active: F) -> RawNetworkSample
where
    F: Fn(&str) -> bool,
{
    counters
        .iter()
        .filter(|iface| is_active(&iface.name))
        .fold(RawNetworkSample::default(), |mut total, iface| {
            total.sent_bytes = total.sent_bytes.saturating_add(iface.sent_bytes);
            total.received_bytes = total.received_bytes.saturating_add(iface.received_bytes);
            total
        })
}

#[cfg(unix)]
pub fn is_active_flags(flags: u32) -> bool {
    let flags = flags as libc::c_int;
    flags & libc::IFF_UP != 0 && flags & libc::IFF_RUNNING != 0 && flags & libc::IFF_LOOPBACK == 0
}

fn looks_like_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.starts_with("lo:")
}

#[cfg(unix)]
fn active_interface_names() -> std::io::Result<HashSet<String>> {
    use std::ffi::CStr;
    use std::ptr;

    let mut addrs: *mut libc::ifaddrs = ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut addrs) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let mut names = HashSet::new();
    let mut cursor = addrs;
    while !cursor.is_null() {
        // SAFETY: `cursor` walks the list getifaddrs allocated; freed below.
        let entry = unsafe { &*cursor };
        if !entry.ifa_name.is_null() && is_active_flags(entry.ifa_flags as u32) {
            let name = unsafe { CStr::from_ptr(entry.ifa_name) };
            names.insert(name.to_string_lossy().into_owned());
        }
        cursor = entry.ifa_next;
    }
    unsafe { libc::freeifaddrs(addrs) };
    Ok(names)
}

#[cfg(not(unix))]
fn active_interface_names() -> std::io::Result<HashSet<String>> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "getifaddrs is unix-only",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, sent: u64, received: u64) -> InterfaceCounters {
        InterfaceCounters {
            name: name.to_string(),
            sent_bytes: sent,
            received_bytes: received,
        }
    }

    #[test]
    fn sums_only_active_interfaces() {
        let counters = [
            iface("en0", 1000, 2000),
            iface("lo0", 50_000, 50_000),
            iface("en1", 10, 20),
            iface("utun3", 7, 7),
        ];
        let active: HashSet<&str> = ["en0", "en1"].into_iter().collect();
        let total = sum_active(&counters, |name| active.contains(name));
        assert_eq!(total, RawNetworkSample::new(1010, 2020));
    }

    #[test]
    fn no_interfaces_sum_to_zero() {
        assert_eq!(sum_active(&[], |_| true), RawNetworkSample::default());
    }

    #[cfg(unix)]
    #[test]
    fn flags_require_up_running_and_not_loopback() {
        let up = libc::IFF_UP as u32;
        let running = libc::IFF_RUNNING as u32;
        let loopback = libc::IFF_LOOPBACK as u32;
        assert!(is_active_flags(up | running));
        assert!(!is_active_flags(up));
        assert!(!is_active_flags(running));
        assert!(!is_active_flags(up | running | loopback));
    }

    #[test]
    fn fallback_filter_skips_loopback_names() {
        assert!(looks_like_loopback("lo"));
        assert!(looks_like_loopback("lo0"));
        assert!(!looks_like_loopback("eth0"));
        assert!(!looks_like_loopback("low-latency0"));
    }
}
