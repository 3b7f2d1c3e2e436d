use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use pulsebar_lib::{
    status, Capabilities, CounterError, CounterSource, CpuTicks, MetricFlags, RawCpuSample,
    RawMemorySample, RawNetworkSample, SettingsStore, SharedSettings, Severity, TelemetryEngine,
};

/// Replays queued CPU and network readings; memory, GPU and power are fixed.
struct ScriptedSource {
    cpu: Mutex<VecDeque<Result<RawCpuSample, CounterError>>>,
    network: Mutex<VecDeque<RawNetworkSample>>,
    accelerator: Option<f64>,
    power_milliwatts: Option<i64>,
}

impl ScriptedSource {
    fn new() -> Self {
        ScriptedSource {
            cpu: Mutex::new(VecDeque::new()),
            network: Mutex::new(VecDeque::new()),
            accelerator: Some(63.0),
            power_milliwatts: Some(4_999),
        }
    }

    fn push_cpu(&self, cores: &[(u64, u64, u64, u64)]) {
        let sample = RawCpuSample::new(
            cores
                .iter()
                .map(|&(user, system, nice, idle)| CpuTicks::new(user, system, nice, idle))
                .collect(),
        );
        self.cpu.lock().unwrap().push_back(Ok(sample));
    }

    fn push_cpu_error(&self) {
        self.cpu
            .lock()
            .unwrap()
            .push_back(Err(CounterError::Unavailable("scripted failure")));
    }

    fn push_network(&self, sent: u64, received: u64) {
        self.network
            .lock()
            .unwrap()
            .push_back(RawNetworkSample::new(sent, received));
    }
}

impl CounterSource for ScriptedSource {
    fn read_cpu_ticks(&self) -> Result<RawCpuSample, CounterError> {
        self.cpu
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CounterError::Unavailable("script exhausted")))
    }

    fn read_memory_stats(&self) -> Result<RawMemorySample, CounterError> {
        Ok(RawMemorySample {
            free: 300,
            inactive: 100,
            purgeable: 50,
            speculative: 50,
            page_size: 16_384,
            total_bytes: 16_384 * 1_000,
        })
    }

    fn read_accelerator_utilization(&self) -> Option<f64> {
        self.accelerator
    }

    fn read_power_milliwatts(&self) -> Option<i64> {
        self.power_milliwatts
    }

    fn read_network_byte_counters(&self) -> RawNetworkSample {
        self.network
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
    }
}

fn pause() {
    thread::sleep(Duration::from_millis(5));
}

#[test]
fn warm_up_then_idle_host_reports_zero() {
    let source = ScriptedSource::new();
    let mut engine = TelemetryEngine::new(source.probe_capabilities());

    source.push_cpu(&[(100, 50, 0, 1000), (80, 20, 5, 900)]);
    source.push_network(10_000, 20_000);
    let first = engine.tick(&source, MetricFlags::default());
    assert_eq!(first.cpu_percent, None);
    assert_eq!(first.network, None);
    assert_eq!(first.memory_percent, Some(50.0));
    assert_eq!(first.gpu_percent, Some(63.0));
    assert_eq!(first.power_watts, Some(4));

    pause();
    source.push_cpu(&[(100, 50, 0, 1000), (80, 20, 5, 900)]);
    source.push_network(10_000, 20_000);
    let second = engine.tick(&source, MetricFlags::default());
    assert_eq!(second.cpu_percent, Some(0.0));
    let rates = second.network.expect("rates after warm-up");
    assert_eq!(rates.up_bytes_per_sec, 0.0);
    assert_eq!(rates.down_bytes_per_sec, 0.0);
    assert_eq!(second.tick, 2);
}

#[test]
fn transient_cpu_failure_resumes_without_new_warm_up() {
    let source = ScriptedSource::new();
    let mut engine = TelemetryEngine::new(Capabilities::all());

    source.push_cpu(&[(0, 0, 0, 0)]);
    source.push_cpu_error();
    source.push_cpu(&[(60, 20, 0, 120)]);

    assert_eq!(engine.tick(&source, MetricFlags::default()).cpu_percent, None);
    let failed = engine.tick(&source, MetricFlags::default());
    assert_eq!(failed.cpu_percent, None);
    assert_eq!(failed.memory_percent, Some(50.0), "other metrics unaffected");

    let resumed = engine
        .tick(&source, MetricFlags::default())
        .cpu_percent
        .expect("delta against the pre-failure sample");
    assert!((resumed - 40.0).abs() < 1e-9);
}

#[test]
fn re_enabling_a_metric_warms_up_afresh() {
    let source = ScriptedSource::new();
    let settings = SharedSettings::new(MetricFlags::default());
    let mut engine = TelemetryEngine::new(Capabilities::all());

    source.push_cpu(&[(0, 0, 0, 0)]);
    source.push_network(0, 0);
    engine.tick(&source, settings.flags());

    settings.toggle(pulsebar_lib::Metric::Cpu);
    settings.toggle(pulsebar_lib::Metric::Network);
    for _ in 0..3 {
        pause();
        let snapshot = engine.tick(&source, settings.flags());
        assert_eq!(snapshot.cpu_percent, None);
        assert_eq!(snapshot.network, None);
    }

    settings.toggle(pulsebar_lib::Metric::Cpu);
    settings.toggle(pulsebar_lib::Metric::Network);
    source.push_cpu(&[(9_000, 0, 0, 1_000)]);
    source.push_network(50_000_000, 50_000_000);
    let snapshot = engine.tick(&source, settings.flags());
    assert_eq!(snapshot.cpu_percent, None, "stale baseline must not be used");
    assert_eq!(snapshot.network, None, "stale baseline must not be used");

    pause();
    source.push_cpu(&[(9_050, 0, 0, 1_050)]);
    source.push_network(50_000_000, 50_000_000);
    let snapshot = engine.tick(&source, settings.flags());
    let cpu = snapshot.cpu_percent.unwrap();
    assert!((cpu - 50.0).abs() < 1e-9);
    assert_eq!(snapshot.network.unwrap().up_bytes_per_sec, 0.0);
}

#[test]
fn absent_hardware_is_skipped_and_rendered_as_no_data() {
    let mut source = ScriptedSource::new();
    source.accelerator = None;
    source.power_milliwatts = None;
    let capabilities = source.probe_capabilities();
    assert!(!capabilities.accelerator && !capabilities.power);

    let mut engine = TelemetryEngine::new(capabilities);
    source.push_cpu(&[(0, 0, 0, 0)]);
    let snapshot = engine.tick(&source, MetricFlags::default());
    assert_eq!(snapshot.gpu_percent, None);
    assert_eq!(snapshot.power_watts, None);

    let line = status::render(&snapshot, &MetricFlags::default());
    assert_eq!(line, "CPU:--% MEM:50% GPU:--% --W ↑-- ↓--");
    assert_eq!(
        status::severity_tags(&snapshot),
        vec![(pulsebar_lib::Metric::Memory, Severity::Elevated)]
    );
}

#[test]
fn core_count_change_is_a_single_tick_discontinuity() {
    let source = ScriptedSource::new();
    let mut engine = TelemetryEngine::new(Capabilities::all());
    let cpu_only = {
        let mut flags = MetricFlags::none();
        flags.cpu = true;
        flags
    };

    source.push_cpu(&[(0, 0, 0, 0), (0, 0, 0, 0)]);
    source.push_cpu(&[(10, 0, 0, 10)]);
    source.push_cpu(&[(20, 0, 0, 30)]);

    assert_eq!(engine.tick(&source, cpu_only).cpu_percent, None);
    assert_eq!(engine.tick(&source, cpu_only).cpu_percent, None);
    let value = engine.tick(&source, cpu_only).cpu_percent.unwrap();
    assert!((value - 33.333_333_333).abs() < 1e-6);
}
