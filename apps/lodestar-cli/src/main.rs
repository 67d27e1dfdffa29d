use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use lodestar_updater::{
    Collaborators, ProgressSink, ReqwestTransport, RolloutBucket, UpdateOrchestrator, UpdateState,
    UpdateStep, UpdaterConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lodestar-update", about = "Install or repair the Lodestar hook payload")]
struct Args {
    /// JSON config file (fields not set keep their defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Install root (defaults to the per-user data dir)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Staged track to request when a beta key is given
    #[arg(long)]
    beta_track: Option<String>,

    #[arg(long)]
    beta_key: Option<String>,

    /// Force a rollout bucket (canary | control)
    #[arg(long)]
    bucket: Option<RolloutBucket>,

    /// Use this runner instead of the managed payload
    #[arg(long)]
    runner: Option<PathBuf>,

    /// After a successful run, check the payload supports this game install
    #[arg(long)]
    game_path: Option<PathBuf>,
}

/// Terminal progress bar for the current download.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Result<Self> {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template("{msg:>8} [{bar:40}] {bytes}/{total_bytes} ({eta})")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar })
    }
}

impl ProgressSink for BarProgress {
    fn set_step(&self, step: UpdateStep) {
        self.bar.reset();
        self.bar.set_message(match step {
            UpdateStep::Payload => "payload",
            UpdateStep::Runtime => "runtime",
            UpdateStep::Assets => "assets",
        });
        tracing::info!(?step, "update step");
    }

    fn set_visible(&self) {
        self.bar.set_draw_target(ProgressDrawTarget::stderr());
    }

    fn set_invisible(&self) {
        self.bar.finish_and_clear();
    }

    fn report_progress(&self, total: Option<u64>, downloaded: u64, _fraction: Option<f64>) {
        if let Some(t) = total {
            self.bar.set_length(t);
        }
        self.bar.set_position(downloaded);
    }
}

fn build_config(args: &Args) -> Result<UpdaterConfig> {
    let mut cfg = match &args.config {
        Some(p) => UpdaterConfig::load(p).with_context(|| format!("load {}", p.display()))?,
        None => UpdaterConfig::default(),
    };
    cfg.apply_env();

    if let Some(h) = &args.home {
        cfg.install_root = h.clone();
    }
    if let Some(t) = &args.beta_track {
        cfg.beta_track = Some(t.clone());
    }
    if let Some(k) = &args.beta_key {
        cfg.beta_key = Some(k.clone());
    }
    if args.bucket.is_some() {
        cfg.rollout_bucket = args.bucket;
    }
    if let Some(r) = &args.runner {
        cfg.runner_override = Some(r.clone());
    }
    Ok(cfg)
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = build_config(&args)?;
    tracing::info!("install root: {}", cfg.install_root.display());

    let transport = Arc::new(ReqwestTransport::new()?);
    let collaborators = Collaborators {
        progress: Arc::new(BarProgress::new()?),
        ..Collaborators::default()
    };
    let orchestrator = Arc::new(UpdateOrchestrator::new(cfg, transport, collaborators));

    let handle = orchestrator.clone().spawn().context("spawn update thread")?;
    let outcome = handle
        .join()
        .map_err(|_| anyhow::anyhow!("update thread panicked"))?;

    match outcome {
        UpdateState::Done => {
            if let Some(installed) = orchestrator.state().installed() {
                println!("runner:  {}", installed.runner.display());
                println!("payload: {}", installed.version_directory.display());
                println!("runtime: {}", installed.runtime_directory.display());
                println!(
                    "assets:  {} (v{})",
                    installed.asset_directory.display(),
                    installed.asset_version
                );
            }
            if let Some(game) = &args.game_path {
                match orchestrator.recheck_version(game) {
                    Some(true) => println!("game version supported"),
                    _ => {
                        eprintln!("payload does not support the game at {}", game.display());
                        return Ok(ExitCode::from(2));
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        other => {
            let cause = orchestrator
                .state()
                .fatal_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".into());
            eprintln!("update failed ({other:?}): {cause}");
            Ok(ExitCode::FAILURE)
        }
    }
}
