use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use log::{info, warn};
use serde::Deserialize;

use crate::core::{
    config::{ConfigManager, Settings},
    coordinator::Coordinator,
    speech::SpeechBackendKind,
};

/// Longest we wait for queued speech before shutting the narrator down.
const DRAIN_LIMIT: Duration = Duration::from_secs(10);
const TREND_WINDOW: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(author, version, about = "Rainfall threshold alerts with spoken narration")]
struct Cli {
    /// Settings file (defaults to ./settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,
    /// JSON array of {"rainfall": mm, "location": name} steps
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Delay between measurements
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,
    /// Override the speech backend: none, log or chime
    #[arg(long)]
    speech: Option<SpeechBackendKind>,
    /// Override both the global interval and the per-kind cooldown
    #[arg(long)]
    cooldown_secs: Option<u64>,
    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    init_settings: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct ScenarioStep {
    rainfall: f64,
    location: String,
}

fn step(rainfall: f64, location: &str) -> ScenarioStep {
    ScenarioStep {
        rainfall,
        location: location.to_string(),
    }
}

/// Stroll down Orchard Road, then shelter in Tanglin Carpark as a storm hits.
fn demo_scenario() -> Vec<ScenarioStep> {
    let mut steps: Vec<ScenarioStep> = [8.0, 12.0, 18.0, 34.0, 41.0]
        .iter()
        .map(|v| step(*v, "Orchard Road"))
        .collect();
    steps.extend(
        [38.0, 46.0, 57.0, 72.0, 86.0, 95.0, 78.0, 52.0, 27.0, 14.0]
            .iter()
            .map(|v| step(*v, "Tanglin Carpark")),
    );
    steps
}

fn load_scenario(path: &Path) -> anyhow::Result<Vec<ScenarioStep>> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read scenario {}", path.display()))?;
    let steps: Vec<ScenarioStep> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse scenario {}", path.display()))?;
    if let Some(bad) = steps.iter().find(|s| !s.rainfall.is_finite() || s.rainfall < 0.0) {
        bail!("Scenario {} has an invalid rainfall value {}", path.display(), bad.rainfall);
    }
    Ok(steps)
}

fn effective_settings(cli: &Cli, manager: &ConfigManager) -> Settings {
    let mut settings = manager.load();
    if let Some(kind) = cli.speech {
        settings.narrator.backend = kind;
    }
    if let Some(secs) = cli.cooldown_secs {
        settings.alerts.min_global_interval_seconds = secs;
        settings.alerts.per_kind_cooldown_seconds = secs;
    }
    settings
}

async fn drive(coordinator: &Coordinator, steps: Vec<ScenarioStep>, tick: Duration) {
    let mut in_flight = Vec::new();
    for (index, step) in steps.into_iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(tick).await;
        }
        if let Some(dispatch) = coordinator.tick_async(step.rainfall, &step.location) {
            in_flight.push(tokio::spawn(async move {
                if let Some(alert) = dispatch.into_alert().await {
                    println!("{}", alert.chat_line());
                }
            }));
        }
    }
    for task in in_flight {
        if let Err(e) = task.await {
            warn!("Alert task failed: {}", e);
        }
    }

    let narrator = coordinator.narrator();
    let deadline = Instant::now() + DRAIN_LIMIT;
    while (narrator.queue_size() > 0 || narrator.is_playing()) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let manager = match &cli.settings {
        Some(path) => ConfigManager::with_file(path.clone()),
        None => ConfigManager::new(PathBuf::from(".")),
    };
    let settings = effective_settings(&cli, &manager);

    if cli.init_settings {
        manager
            .save(&settings)
            .with_context(|| format!("Failed to write settings {}", manager.path().display()))?;
        info!("Wrote settings to {}", manager.path().display());
        return Ok(());
    }

    let steps = match &cli.scenario {
        Some(path) => load_scenario(path)?,
        None => demo_scenario(),
    };
    info!("Running {} measurements, one every {}ms", steps.len(), cli.tick_ms);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    let coordinator = runtime.block_on(async {
        let coordinator = Coordinator::from_settings(&settings);
        drive(&coordinator, steps, Duration::from_millis(cli.tick_ms)).await;
        coordinator
    });
    coordinator.shutdown();

    let summary = serde_json::json!({
        "engine": coordinator.engine_stats(),
        "narrator": coordinator.narrator_stats(),
        "backend": coordinator.narrator().backend_info(),
        "trend": coordinator.engine().trend(TREND_WINDOW),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
