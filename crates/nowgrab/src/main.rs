use std::path::{Path, PathBuf};
use std::sync::Arc;

use nowgrab::coordinator::{Coordinator, CoordinatorError, CoordinatorSettings, Providers};
use nowgrab::providers::{LoftyTagWriter, YoutubeSearch, YtDlpFetcher};
use nowgrab::session_log::{DisplayUpdate, SessionLog};
use nowgrab::{console, ingest};
use nowgrab_proto::config::Config;
use nowgrab_proto::platform;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    // stdout belongs to the operator console, so tracing goes to a file.
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("nowgrab.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,nowgrab=debug,hyper_util=warn,reqwest=warn")
            }),
        )
        .with_ansi(false)
        .init();

    eprintln!("nowgrab log: {}", log_path.display());
    info!("nowgrab starting");

    // ── Config ───────────────────────────────────────────────────────────────
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("failed to load config, using defaults: {:#}", e);
            Config::default()
        }
    };
    std::fs::create_dir_all(&config.paths.output_dir)?;
    info!("output directory: {}", config.paths.output_dir.display());

    // ── Providers ────────────────────────────────────────────────────────────
    let api_key = config.search.resolved_api_key();
    if api_key.is_none() {
        warn!("no YouTube API key configured; every search will fail");
        eprintln!("warning: set YOUTUBE_API_KEY or search.api_key in the config");
    }
    let yt_dlp = configured(&config.fetch.yt_dlp_path).or_else(platform::find_yt_dlp_binary);
    if yt_dlp.is_none() {
        warn!("yt-dlp not found; fetches will fail");
    }

    let providers = Providers {
        search: Arc::new(YoutubeSearch::new(api_key, config.search.max_results)),
        fetch: Arc::new(YtDlpFetcher::new(yt_dlp, config.fetch.audio_format.clone())),
        tags: Arc::new(LoftyTagWriter),
    };
    let settings = CoordinatorSettings {
        max_search_attempts: config.search.max_attempts,
        output_dir: config.paths.output_dir.clone(),
    };

    // ── Channels ─────────────────────────────────────────────────────────────
    let (display_tx, display_rx) = broadcast::channel::<DisplayUpdate>(1024);
    let (event_tx, event_rx) = mpsc::channel(256);

    let log = SessionLog::new(display_tx);
    let display = console::spawn_display(display_rx);
    let coordinator = Coordinator::new(providers, settings, log.clone(), event_tx.clone());

    // ── Poller ───────────────────────────────────────────────────────────────
    let poller_binary = configured(&config.poller.binary)
        .or_else(platform::find_poller_binary)
        .ok_or_else(|| anyhow::anyhow!("nowgrab-poller binary not found"))?;
    let poller = ingest::spawn_poller(&poller_binary, event_tx.clone())?;

    let _input = console::spawn_operator_input(event_tx);

    // ── Run ──────────────────────────────────────────────────────────────────
    let outcome = coordinator.run(event_rx).await;
    poller.shutdown().await;

    let exit_code = match &outcome {
        Ok(()) => 0,
        Err(CoordinatorError::SourceFatal(message)) => {
            error!("metadata source lost: {}", message);
            1
        }
        Err(e) => {
            error!("coordinator failed: {}", e);
            1
        }
    };

    // ── Flush the session log ────────────────────────────────────────────────
    let session_path = data_dir.join("session.jsonl");
    match log.flush_to(&session_path) {
        Ok(count) => info!("wrote {} session records to {}", count, session_path.display()),
        Err(e) => warn!("failed to write {}: {:#}", session_path.display(), e),
    }
    let records = log.records();
    drop(log);
    // last clone of the log is gone, so the display drains and stops
    let _ = tokio::time::timeout(std::time::Duration::from_millis(200), display).await;
    println!("{}", serde_json::to_string_pretty(&records)?);

    if let Err(e) = outcome {
        eprintln!("nowgrab: {}", e);
    }
    std::process::exit(exit_code);
}

/// An explicitly configured path, if one was given.
fn configured(path: &Path) -> Option<PathBuf> {
    (!path.as_os_str().is_empty()).then(|| path.to_path_buf())
}
