//! Binary entrypoint for slow-movie.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use slow_movie::catalog::{self, MediaCatalog};
use slow_movie::config::Configuration;
use slow_movie::engine::PlaybackMode;
use slow_movie::platform::{ffmpeg::Ffmpeg, panel};
use slow_movie::store::{FileStore, ProgressStore};
use slow_movie::tasks::player::{Player, PlayerOptions};

#[derive(Debug, Parser)]
#[command(
    name = "slow-movie",
    version,
    about = "Plays videos one frame every few minutes on an e-paper panel"
)]
struct Args {
    /// Random mode: chooses a random frame every refresh
    #[arg(short, long)]
    random: bool,
    /// Start playing a specific film from the video folder (.mp4 or .mkv)
    #[arg(short, long, value_name = "NAME", value_parser = parse_video_name)]
    file: Option<String>,
    /// Delay between screen updates, in seconds
    #[arg(short, long, value_name = "SECONDS", value_parser = parse_delay)]
    delay: Option<Duration>,
    /// Number of frames skipped between screen updates
    #[arg(short, long, value_name = "FRAMES")]
    inc: Option<u64>,
    /// Start at a specific frame
    #[arg(short, long, value_name = "FRAME")]
    start: Option<u64>,
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn parse_video_name(raw: &str) -> Result<String, String> {
    catalog::check_video_name(raw).map_err(|e| e.to_string())
}

fn parse_delay(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{raw} is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid delay {raw}: {e}"))
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("slow_movie={level}").parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let mut cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if args.random {
        cfg.mode = PlaybackMode::Random;
    }
    if let Some(delay) = args.delay {
        cfg.refresh_delay = delay;
    }
    if let Some(inc) = args.inc {
        cfg.increment = inc;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;

    info!(
        delay = %humantime::format_duration(cfg.refresh_delay),
        increment = cfg.increment,
        mode = %cfg.mode,
        "settings"
    );
    match &args.file {
        Some(file) => info!(file = %file, "trying to start playing requested file"),
        None => info!("continuing with the saved video"),
    }

    let mut ffmpeg = Ffmpeg::new(&cfg.ffmpeg);
    if cfg.convert_mkv && cfg.video_library_path.is_dir() {
        let converted = catalog::convert_mkv_files(&cfg.video_library_path, &mut ffmpeg)
            .context("failed to convert mkv files")?;
        if converted > 0 {
            info!(converted, "mkv files converted to mp4");
        }
    }
    let catalog = MediaCatalog::scan(&cfg.video_library_path)?;
    if catalog.is_empty() {
        return Err(slow_movie::Error::EmptyCatalog(cfg.video_library_path.clone()).into());
    }

    let store = FileStore::open(&cfg.state_path)
        .with_context(|| format!("failed to open state directory {}", cfg.state_path.display()))?;
    let rng = match cfg.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let sink = panel::from_config(&cfg.display, cfg.panel)?;

    let player = Player::start(
        PlayerOptions::from(&cfg),
        catalog,
        ProgressStore::new(store),
        ffmpeg,
        sink,
        args.file.as_deref(),
        args.start,
        rng,
    )?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_some() {
                        tracing::info!("SIGTERM received; initiating shutdown");
                        cancel.cancel();
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    player.run(cancel).await.context("player failed")?;
    Ok(())
}
