use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use super::CounterError;
use crate::metrics::{first_utilization, AcceleratorDevice, CpuTicks, RawCpuSample, RawMemorySample};

const PROC_STAT: &str = "/proc/stat";
const PROC_MEMINFO: &str = "/proc/meminfo";
const DRM_ROOT: &str = "/sys/class/drm";
const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

pub(super) fn read_cpu_ticks() -> Result<RawCpuSample, CounterError> {
    let text = fs::read_to_string(PROC_STAT).map_err(|err| CounterError::io(PROC_STAT, err))?;
    parse_proc_stat(&text)
}

pub(super) fn read_memory_stats() -> Result<RawMemorySample, CounterError> {
    let text =
        fs::read_to_string(PROC_MEMINFO).map_err(|err| CounterError::io(PROC_MEMINFO, err))?;
    let page_size = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        size if size > 0 => size as u64,
        _ => return Err(CounterError::Unavailable("page size")),
    };
    parse_meminfo(&text, page_size)
}

pub(super) fn read_accelerator_utilization() -> Option<f64> {
    first_utilization(drm_devices(Path::new(DRM_ROOT)))
}

pub(super) fn read_power_milliwatts() -> Option<i64> {
    power_supply_milliwatts(Path::new(POWER_SUPPLY_ROOT))
}

/// Per-core `cpuN` lines of `/proc/stat`. Columns are user, nice, system,
/// idle, then buckets this engine does not track.
fn parse_proc_stat(text: &str) -> Result<RawCpuSample, CounterError> {
    let mut cores = Vec::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else {
            continue;
        };
        if !label.starts_with("cpu") || label == "cpu" {
            continue;
        }
        let values = fields
            .take(4)
            .map(|field| field.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CounterError::parse("/proc/stat", format!("{label}: {err}")))?;
        let [user, nice, system, idle] = values[..] else {
            return Err(CounterError::parse("/proc/stat", format!("{label}: short line")));
        };
        cores.push(CpuTicks::new(user, system, nice, idle));
    }
    if cores.is_empty() {
        return Err(CounterError::parse("/proc/stat", "no per-core lines"));
    }
    Ok(RawCpuSample::new(cores))
}

/// Maps `/proc/meminfo` onto page counts: `MemFree` is free,
/// `Inactive(file)` inactive, `SReclaimable` purgeable. Linux has no
/// speculative pages.
fn parse_meminfo(text: &str, page_size: u64) -> Result<RawMemorySample, CounterError> {
    let fields: HashMap<&str, u64> = text
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let kib = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            Some((key.trim(), kib))
        })
        .collect();

    let total_kib = *fields
        .get("MemTotal")
        .ok_or_else(|| CounterError::parse("/proc/meminfo", "MemTotal missing"))?;
    let pages = |key: &str| fields.get(key).map_or(0, |kib| kib * 1024 / page_size);

    Ok(RawMemorySample {
        free: pages("MemFree"),
        inactive: pages("Inactive(file)"),
        purgeable: pages("SReclaimable"),
        speculative: 0,
        page_size,
        total_bytes: total_kib * 1024,
    })
}

/// `cardN` entries under `root`, sorted, with `device/gpu_busy_percent` where
/// the driver exposes it.
fn drm_devices(root: &Path) -> Vec<AcceleratorDevice> {
    let mut cards: Vec<(String, PathBuf)> = match fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let is_card = name.starts_with("card") && !name.contains('-');
                is_card.then(|| (name, entry.path()))
            })
            .collect(),
        Err(err) => {
            debug!("{} unreadable: {}", root.display(), err);
            return Vec::new();
        }
    };
    cards.sort();

    cards
        .into_iter()
        .map(|(name, path)| {
            let utilization = read_number(&path.join("device").join("gpu_busy_percent"))
                .map(|value| value as f64);
            AcceleratorDevice::new(name, utilization)
        })
        .collect()
}

/// First supply under `root` reporting power, in milliwatts. `power_now` is
/// in microwatts; supplies without it fall back to `current_now *
/// voltage_now` (microamps times microvolts).
fn power_supply_milliwatts(root: &Path) -> Option<i64> {
    let mut supplies: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .collect();
    supplies.sort();

    supplies.iter().find_map(|supply| {
        if let Some(microwatts) = read_number(&supply.join("power_now")) {
            return Some(microwatts / 1000);
        }
        let microamps = read_number(&supply.join("current_now"))?;
        let microvolts = read_number(&supply.join("voltage_now"))?;
        Some(microamps.saturating_mul(microvolts) / 1_000_000_000)
    })
}

fn read_number(path: &Path) -> Option<i64> {
    fs::read_to_string(path).ok()?.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STAT: &str = "cpu  10132153 290696 3084719 46828483 16683 0 25195 0 0 0
cpu0 1393280 32966 572056 13343292 6130 0 17875 0 0 0
cpu1 1335566 13567 365220 13375738 2856 0 3262 0 0 0
intr 199292 8 9 0 0
ctxt 3000
";

    const MEMINFO: &str = "MemTotal:       16318412 kB
MemFree:         1048576 kB
MemAvailable:    9000000 kB
Inactive(file):  2097152 kB
SReclaimable:     524288 kB
";

    #[test]
    fn parses_per_core_lines_only() {
        let sample = parse_proc_stat(STAT).unwrap();
        assert_eq!(sample.core_count(), 2);
        assert_eq!(sample.cores[0], CpuTicks::new(1393280, 572056, 32966, 13343292));
    }

    #[test]
    fn rejects_stat_without_cores() {
        assert!(parse_proc_stat("cpu 1 2 3 4\n").is_err());
        assert!(parse_proc_stat("cpu0 1 2\n").is_err());
        assert!(parse_proc_stat("cpu0 1 x 3 4\n").is_err());
    }

    #[test]
    fn maps_meminfo_to_pages() {
        let sample = parse_meminfo(MEMINFO, 4096).unwrap();
        assert_eq!(sample.free, 262_144);
        assert_eq!(sample.inactive, 524_288);
        assert_eq!(sample.purgeable, 131_072);
        assert_eq!(sample.speculative, 0);
        assert_eq!(sample.total_bytes, 16318412 * 1024);
    }

    #[test]
    fn meminfo_without_total_is_an_error() {
        assert!(parse_meminfo("MemFree: 10 kB\n", 4096).is_err());
    }

    #[test]
    fn first_card_with_busy_percent_wins() {
        let root = TempDir::new().unwrap();
        for (card, busy) in [("card0", None), ("card1", Some("23\n")), ("card2", Some("90"))] {
            let device = root.path().join(card).join("device");
            fs::create_dir_all(&device).unwrap();
            if let Some(busy) = busy {
                fs::write(device.join("gpu_busy_percent"), busy).unwrap();
            }
        }
        fs::create_dir_all(root.path().join("card1-HDMI-A-1")).unwrap();

        let devices = drm_devices(root.path());
        assert_eq!(devices.len(), 3);
        assert_eq!(first_utilization(devices), Some(23.0));
    }

    #[test]
    fn missing_drm_root_has_no_devices() {
        let root = TempDir::new().unwrap();
        assert!(drm_devices(&root.path().join("absent")).is_empty());
    }

    #[test]
    fn power_now_is_converted_to_milliwatts() {
        let root = TempDir::new().unwrap();
        let ac = root.path().join("AC");
        let bat = root.path().join("BAT0");
        fs::create_dir_all(&ac).unwrap();
        fs::create_dir_all(&bat).unwrap();
        fs::write(bat.join("power_now"), "12345678\n").unwrap();
        assert_eq!(power_supply_milliwatts(root.path()), Some(12_345));
    }

    #[test]
    fn power_falls_back_to_current_times_voltage() {
        let root = TempDir::new().unwrap();
        let bat = root.path().join("BAT1");
        fs::create_dir_all(&bat).unwrap();
        fs::write(bat.join("current_now"), "1500000").unwrap();
        fs::write(bat.join("voltage_now"), "12000000").unwrap();
        assert_eq!(power_supply_milliwatts(root.path()), Some(18_000));
    }

    #[test]
    fn no_supply_is_unavailable() {
        let root = TempDir::new().unwrap();
        assert_eq!(power_supply_milliwatts(root.path()), None);
    }
}
