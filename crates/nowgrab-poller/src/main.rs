//! Now-playing poller.
//!
//! Samples the active media player's metadata on a fixed interval and writes
//! one JSON line to stdout per observed track change. stdout is the data
//! channel to the coordinator, so all logging goes to a file.

mod player;

use nowgrab_proto::config::Config;
use nowgrab_proto::PollerMessage;
use player::{ChangeDetector, Playerctl};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = nowgrab_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("poller.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nowgrab_poller=debug")),
        )
        .with_ansi(false)
        .init();

    let config = Config::load().unwrap_or_default();
    let interval = Duration::from_millis(config.poller.poll_interval_ms.max(100));
    info!("poller starting, interval {:?}", interval);

    let mut stdout = tokio::io::stdout();

    let Some(binary) = nowgrab_proto::platform::find_playerctl_binary() else {
        error!("playerctl not found on PATH");
        emit(&mut stdout, &PollerMessage::error("playerctl not found on PATH")).await?;
        return Ok(());
    };

    let player = Playerctl::new(binary);
    let mut detector = ChangeDetector::new(config.poller.max_source_failures);

    loop {
        let message = match player.current_track().await {
            Ok(track) => detector.observe(track.trimmed()),
            Err(e) => {
                warn!("poll failed: {}", e);
                detector.fail(&e)
            }
        };

        if let Some(message) = message {
            let fatal = matches!(message, PollerMessage::Error { .. });
            if let Err(e) = emit(&mut stdout, &message).await {
                // Coordinator closed the pipe; nobody left to tell.
                info!("stdout closed ({}), exiting", e);
                return Ok(());
            }
            if fatal {
                error!("metadata source lost, exiting");
                return Ok(());
            }
        }

        tokio::time::sleep(interval).await;
    }
}

async fn emit(stdout: &mut tokio::io::Stdout, message: &PollerMessage) -> anyhow::Result<()> {
    let line = message.encode_line()?;
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
