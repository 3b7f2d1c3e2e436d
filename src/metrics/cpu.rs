use log::debug;

use super::types::{CpuTicks, RawCpuSample};

/// Prior-sample bookkeeping for the CPU delta engine.
///
/// The first sample (and any sample whose core count differs from the stored
/// one) only establishes a baseline and reports no value. Callers that need
/// the reference "0% on first sample" behaviour can map `None` to `0.0`
/// themselves; the engine keeps warm-up distinct from a confirmed idle CPU.
#[derive(Clone, Debug, Default)]
pub struct CpuDeltaState {
    previous: Option<RawCpuSample>,
}

impl CpuDeltaState {
    pub fn new() -> Self {
        CpuDeltaState { previous: None }
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Diffs `raw` against the stored sample and returns the mean per-core
    /// utilization in percent. The stored sample is always replaced by `raw`.
    pub fn sample(&mut self, raw: RawCpuSample) -> Option<f64> {
        let previous = self.previous.replace(raw);
        let current = self.previous.as_ref()?;

        let previous = match previous {
            Some(previous) => previous,
            None => {
                debug!("cpu baseline captured ({} cores)", current.core_count());
                return None;
            }
        };

        if previous.core_count() != current.core_count() {
            debug!(
                "cpu core count changed {} -> {}; restarting warm-up",
                previous.core_count(),
                current.core_count()
            );
            return None;
        }
        if current.cores.is_empty() {
            return None;
        }

        let total: f64 = previous
            .cores
            .iter()
            .zip(&current.cores)
            .map(|(before, after)| core_utilization(before, after))
            .sum();
        Some(total / current.core_count() as f64)
    }
}

/// Busy share of one core between two samples, in `[0, 100]`.
///
/// A field that went backwards means the counters were reset; that core
/// contributes 0 for this tick.
pub fn core_utilization(before: &CpuTicks, after: &CpuTicks) -> f64 {
    let deltas = (
        after.user.checked_sub(before.user),
        after.system.checked_sub(before.system),
        after.nice.checked_sub(before.nice),
        after.idle.checked_sub(before.idle),
    );
    let (Some(user), Some(system), Some(nice), Some(idle)) = deltas else {
        return 0.0;
    };

    let used = user.saturating_add(system).saturating_add(nice);
    let total = used.saturating_add(idle);
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cores: &[(u64, u64, u64, u64)]) -> RawCpuSample {
        RawCpuSample::new(
            cores
                .iter()
                .map(|&(user, system, nice, idle)| CpuTicks::new(user, system, nice, idle))
                .collect(),
        )
    }

    #[test]
    fn first_sample_is_warm_up() {
        let mut state = CpuDeltaState::new();
        assert_eq!(state.sample(sample(&[(10, 10, 0, 80)])), None);
        assert!(state.has_baseline());
    }

    #[test]
    fn identical_samples_report_zero_not_nan() {
        let mut state = CpuDeltaState::new();
        let raw = sample(&[(10, 10, 0, 80), (5, 5, 5, 5)]);
        state.sample(raw.clone());
        let value = state.sample(raw).expect("second sample has a value");
        assert_eq!(value, 0.0);
    }

    #[test]
    fn averages_cores_equally() {
        let mut state = CpuDeltaState::new();
        state.sample(sample(&[(0, 0, 0, 0), (0, 0, 0, 0)]));
        // core 0: 50/100 busy, core 1: 1/1 busy regardless of tick volume
        let value = state
            .sample(sample(&[(30, 10, 10, 50), (1, 0, 0, 0)]))
            .unwrap();
        assert!((value - 75.0).abs() < 1e-9);
    }

    #[test]
    fn rolled_back_core_contributes_zero() {
        let mut state = CpuDeltaState::new();
        state.sample(sample(&[(100, 100, 0, 100), (0, 0, 0, 0)]));
        let value = state
            .sample(sample(&[(5, 100, 0, 200), (50, 0, 0, 50)]))
            .unwrap();
        assert!((value - 25.0).abs() < 1e-9);
        assert!(value >= 0.0);
    }

    #[test]
    fn core_count_change_restarts_warm_up() {
        let mut state = CpuDeltaState::new();
        state.sample(sample(&[(0, 0, 0, 0)]));
        assert_eq!(state.sample(sample(&[(10, 0, 0, 10), (10, 0, 0, 10)])), None);
        let value = state
            .sample(sample(&[(20, 0, 0, 20), (10, 0, 0, 20)]))
            .unwrap();
        assert!((value - 25.0).abs() < 1e-9);
    }

    #[test]
    fn per_core_utilization_stays_in_range() {
        let before = CpuTicks::new(1, 2, 3, 4);
        for after in [
            CpuTicks::new(1, 2, 3, 4),
            CpuTicks::new(u64::MAX, u64::MAX, u64::MAX, 4),
            CpuTicks::new(1, 2, 3, u64::MAX),
            CpuTicks::new(0, 0, 0, 0),
        ] {
            let value = core_utilization(&before, &after);
            assert!((0.0..=100.0).contains(&value), "{value}");
        }
    }

    #[test]
    fn reset_discards_baseline() {
        let mut state = CpuDeltaState::new();
        state.sample(sample(&[(0, 0, 0, 0)]));
        state.reset();
        assert!(!state.has_baseline());
        assert_eq!(state.sample(sample(&[(10, 0, 0, 10)])), None);
    }
}
