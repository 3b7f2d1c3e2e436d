use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::info;
use tokio::select;

use pulsebar_lib::{
    status, HostCounters, MetricsSampler, MonitorConfig, SettingsStore, SharedSettings, Snapshot,
};

#[derive(Parser)]
#[command(name = "pulsebar")]
#[command(about = "Live CPU, memory, GPU, power and network telemetry, one line per tick")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $PULSEBAR_CONFIG, then <config dir>/pulsebar/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling period in milliseconds (clamped to 1000..=3600000)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Print a single warmed-up sample and exit
    #[arg(long)]
    once: bool,

    /// Emit each snapshot as JSON instead of a status line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = MonitorConfig::load_or_default(cli.config.as_deref());
    if let Some(interval_ms) = cli.interval_ms {
        config.sample_interval_ms = interval_ms;
    }
    let config = config.normalized();
    info!(
        "sampling every {}ms (read timeout {}ms)",
        config.sample_interval_ms, config.read_timeout_ms
    );

    let settings = SharedSettings::new(config.flags);
    let sampler = MetricsSampler::spawn(
        Arc::new(HostCounters::new()),
        Arc::new(settings.clone()),
        &config,
    );
    let mut updates = sampler.subscribe();

    loop {
        select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                // delta metrics need two ticks before they report
                if cli.once && snapshot.tick < 2 {
                    continue;
                }
                emit(&snapshot, &settings, cli.json)?;
                if cli.once {
                    break;
                }
            }
        }
    }

    sampler.shutdown();
    Ok(())
}

fn emit(
    snapshot: &Snapshot,
    settings: &SharedSettings,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{}", status::render(snapshot, &settings.flags()));
    }
    Ok(())
}
