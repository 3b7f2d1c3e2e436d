use super::types::RawMemorySample;

/// Physical memory occupancy in percent, using the free-page policy:
/// `1 - (free + inactive + purgeable + speculative) / total_pages`.
///
/// Returns `None` when page size or total memory is unknown (zero).
pub fn memory_percent(raw: &RawMemorySample) -> Option<f64> {
    if raw.page_size == 0 || raw.total_bytes == 0 {
        return None;
    }

    let total_pages = raw.total_bytes as f64 / raw.page_size as f64;
    let reclaimable = raw.reclaimable_pages() as f64;
    let used_ratio = (1.0 - reclaimable / total_pages).clamp(0.0, 1.0);
    let percent = used_ratio * 100.0;
    percent.is_finite().then_some(percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(free: u64, inactive: u64, purgeable: u64, speculative: u64) -> RawMemorySample {
        RawMemorySample {
            free,
            inactive,
            purgeable,
            speculative,
            page_size: 16_384,
            total_bytes: 16_384 * 1_000,
        }
    }

    #[test]
    fn counts_reclaimable_pages_as_free() {
        let value = memory_percent(&raw(100, 50, 25, 25)).unwrap();
        assert!((value - 80.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_reads_are_identical() {
        let sample = raw(312, 41, 7, 3);
        assert_eq!(memory_percent(&sample), memory_percent(&sample));
    }

    #[test]
    fn unknown_totals_are_unavailable() {
        let mut sample = raw(1, 1, 1, 1);
        sample.page_size = 0;
        assert_eq!(memory_percent(&sample), None);

        let mut sample = raw(1, 1, 1, 1);
        sample.total_bytes = 0;
        assert_eq!(memory_percent(&sample), None);
    }

    #[test]
    fn clamps_when_free_exceeds_total() {
        assert_eq!(memory_percent(&raw(5_000, 0, 0, 0)), Some(0.0));
        assert_eq!(memory_percent(&raw(0, 0, 0, 0)), Some(100.0));
    }
}
