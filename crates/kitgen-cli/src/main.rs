//! KitGen CLI
//!
//! Runs the campaign media pipeline from the command line.
//!
//! ```text
//! kitgen-cli run --brief brief.json --assets assets.json --campaign-id spring-matcha
//! kitgen-cli run --brief brief.json --simulate=video,avatar --no-cinematic
//! kitgen-cli settings --init
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kitgen_core::fs::read_json_file;
use kitgen_core::health::{ProviderHealth, ProviderHealthTracker};
use kitgen_core::logging::{init_logging, LogConfig};
use kitgen_core::pipeline::{
    AggregateStatus, AvailableAssets, CampaignBrief, EnabledSteps, InMemoryAssetRegistry,
    OrchestratorConfig, PipelineOrchestrator, PipelineResult, PipelineStep, RegisteredAsset,
    StepProviders,
};
use kitgen_core::settings::{PipelineSettings, SettingsManager};
use kitgen_core::{encode_progress_line, BroadcastProgressSink};

const DEFAULT_SETTINGS_DIR: &str = ".kitgen";

#[derive(Debug, Parser)]
#[command(name = "kitgen-cli", version, about = "Headless campaign media generation")]
struct Cli {
    /// Write rolling log files to this directory
    #[arg(long, global = true, env = "KITGEN_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the pipeline for one campaign
    Run(RunArgs),
    /// Show or initialize the settings file
    Settings(SettingsArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Campaign brief (JSON)
    #[arg(long)]
    brief: PathBuf,

    /// Available source images (JSON)
    #[arg(long)]
    assets: Option<PathBuf>,

    #[arg(long, default_value = "cli-campaign")]
    campaign_id: String,

    #[arg(long, env = "KITGEN_SETTINGS_DIR", default_value = DEFAULT_SETTINGS_DIR)]
    settings_dir: PathBuf,

    #[arg(long)]
    no_voiceover: bool,

    #[arg(long)]
    no_video: bool,

    #[arg(long)]
    no_cinematic: bool,

    #[arg(long)]
    no_avatar: bool,

    /// Use mock providers for the listed steps, or for every step when none are listed
    #[arg(long, num_args = 0.., value_delimiter = ',', require_equals = true)]
    simulate: Option<Vec<PipelineStep>>,

    /// Artificial latency of simulated providers
    #[arg(long, default_value_t = 0)]
    simulate_latency_ms: u64,
}

#[derive(Debug, Args)]
struct SettingsArgs {
    #[arg(long, env = "KITGEN_SETTINGS_DIR", default_value = DEFAULT_SETTINGS_DIR)]
    settings_dir: PathBuf,

    /// Write the normalized settings back to disk
    #[arg(long)]
    init: bool,
}

/// What `run` prints on stdout
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport {
    result: PipelineResult,
    registered_assets: Vec<RegisteredAsset>,
    provider_health: Vec<ProviderHealth>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::default().with_level(if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    });
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    init_logging(log_config);

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Settings(args) => settings(args),
    }
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let brief: CampaignBrief = read_json(&args.brief).context("Failed to read campaign brief")?;
    let assets: AvailableAssets = match &args.assets {
        Some(path) => read_json(path).context("Failed to read available assets")?,
        None => AvailableAssets::default(),
    };
    let enabled = EnabledSteps::all()
        .with(PipelineStep::Voiceover, !args.no_voiceover)
        .with(PipelineStep::VideoAd, !args.no_video)
        .with(PipelineStep::CinematicVideo, !args.no_cinematic)
        .with(PipelineStep::AvatarVideo, !args.no_avatar);

    let settings = SettingsManager::new(&args.settings_dir).load();
    let providers = build_providers(&settings, args.simulate.as_deref(), args.simulate_latency_ms)?;
    info!(?providers, "Providers selected");

    let tracker = Arc::new(ProviderHealthTracker::new(settings.breaker_config()));
    let registry = Arc::new(InMemoryAssetRegistry::new());
    let sink = Arc::new(BroadcastProgressSink::default());
    let mut updates = sink.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => match encode_progress_line(&update) {
                    Ok(line) => eprintln!("{}", line),
                    Err(e) => warn!("{}", e),
                },
                Err(RecvError::Lagged(missed)) => warn!("Skipped {} progress updates", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the pipeline run");
            on_interrupt.cancel();
        }
    });

    let orchestrator = PipelineOrchestrator::new(tracker.clone(), providers, sink, registry.clone())
        .with_config(OrchestratorConfig::from_settings(&settings));
    let result = orchestrator
        .run_with_cancellation(&args.campaign_id, &brief, &assets, enabled, &cancel)
        .await?;

    // Dropping the orchestrator closes the progress channel.
    drop(orchestrator);
    join_printer(printer).await;

    let status = result.status;
    let report = RunReport {
        registered_assets: registry.list(&args.campaign_id),
        provider_health: tracker.snapshot_all(),
        result,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(match status {
        AggregateStatus::Complete => ExitCode::SUCCESS,
        AggregateStatus::Partial => ExitCode::from(2),
        AggregateStatus::Failed => ExitCode::from(3),
    })
}

async fn join_printer(printer: tokio::task::JoinHandle<()>) {
    if let Err(e) = printer.await {
        warn!("Progress printer task failed: {}", e);
    }
}

fn build_providers(
    settings: &PipelineSettings,
    simulate: Option<&[PipelineStep]>,
    latency_ms: u64,
) -> Result<StepProviders> {
    let simulated = StepProviders::simulated(Duration::from_millis(latency_ms));
    match simulate {
        Some([]) => Ok(simulated),
        Some(steps) => {
            let mut providers = StepProviders::from_settings(&settings.providers)
                .context("Failed to build providers from settings")?;
            for step in steps {
                providers = providers.with_provider(*step, simulated.for_step(*step).clone())?;
            }
            Ok(providers)
        }
        None => StepProviders::from_settings(&settings.providers)
            .context("Failed to build providers from settings"),
    }
}

fn settings(args: SettingsArgs) -> Result<ExitCode> {
    let manager = SettingsManager::new(&args.settings_dir);
    let settings = if args.init {
        let saved = manager
            .save(&manager.load())
            .context("Failed to write settings")?;
        eprintln!("Settings written to {}", manager.settings_path().display());
        saved
    } else {
        manager.try_load().context("Failed to load settings")?
    };

    println!("{}", serde_json::to_string_pretty(&redacted(settings))?);
    Ok(ExitCode::SUCCESS)
}

/// Masks API keys before printing
fn redacted(mut settings: PipelineSettings) -> PipelineSettings {
    let mask = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some("***".to_string());
        }
    };
    let providers = &mut settings.providers;
    mask(&mut providers.elevenlabs.api_key);
    mask(&mut providers.runway.api_key);
    mask(&mut providers.runway_cinematic.api_key);
    mask(&mut providers.did.api_key);
    settings
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    read_json_file(path).with_context(|| format!("Cannot load {}", path.display()))
}
