//! Line-oriented operator console.
//!
//! Operator input is read from stdin, one command per line. Display updates
//! from the session log are rendered as plain text on stdout.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::coordinator::CoordinatorEvent;
use crate::session_log::{DisplayUpdate, SessionEvent, SessionRecord};

/// Forward stdin lines to the coordinator. EOF shuts it down.
pub fn spawn_operator_input(event_tx: mpsc::Sender<CoordinatorEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if event_tx.send(CoordinatorEvent::Operator(line)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    let _ = event_tx.send(CoordinatorEvent::Shutdown).await;
                    return;
                }
                Err(e) => {
                    warn!("stdin read error: {}", e);
                    let _ = event_tx.send(CoordinatorEvent::Shutdown).await;
                    return;
                }
            }
        }
    })
}

/// Print display updates until the session log goes away.
pub fn spawn_display(mut updates: broadcast::Receiver<DisplayUpdate>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            let mut text = match updates.recv().await {
                Ok(update) => render(&update),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    format!("({} display updates dropped)", n)
                }
                Err(broadcast::error::RecvError::Closed) => return,
            };
            text.push('\n');
            if stdout.write_all(text.as_bytes()).await.is_err() {
                return;
            }
            let _ = stdout.flush().await;
        }
    })
}

pub fn render(update: &DisplayUpdate) -> String {
    match update {
        DisplayUpdate::Record(record) => render_record(record),
        DisplayUpdate::Progress { percentage, .. } => {
            format!("[Progress] {}%", percentage.clamp(0.0, 100.0) as u32)
        }
        DisplayUpdate::Queue(keys) if keys.is_empty() => "Queue: (empty)".to_string(),
        DisplayUpdate::Queue(keys) => format!(
            "Queue:\n{}",
            keys.iter()
                .map(|k| format!("  {}", k))
                .collect::<Vec<_>>()
                .join("\n")
        ),
    }
}

fn render_record(record: &SessionRecord) -> String {
    let time = record.at.format("%H:%M:%S");
    let body = match &record.event {
        SessionEvent::Waiting => "Waiting for a track...".to_string(),
        SessionEvent::Current { key } => format!("Now: {}", key),
        SessionEvent::Queued { key } => format!("Queued: {}", key),
        SessionEvent::Searching { query } => format!("Searching: {}", query),
        SessionEvent::SearchRetry { query, attempt } => {
            format!("Search attempt {} for {} failed, retrying", attempt, query)
        }
        SessionEvent::Candidates { results, .. } => {
            let mut lines: Vec<String> = results
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}.  {}\n     {}", i + 1, c.title, c.link))
                .collect();
            lines.push(command_help());
            lines.join("\n")
        }
        SessionEvent::NoResults { .. } => format!("No results found\n{}", command_help()),
        SessionEvent::SearchFailed { query, error } => {
            format!("Search failed for {}: {}", query, error)
        }
        SessionEvent::Selected { id, candidate, .. } => match candidate {
            Some(c) => format!("Downloading... {} ({})", c.title, c.link),
            None => format!("Downloading... {}", id),
        },
        SessionEvent::FetchRejected {
            requested,
            in_flight,
        } => format!(
            "Cannot fetch {} while {} is still downloading",
            requested, in_flight
        ),
        SessionEvent::Fetched { title, .. } => format!("Downloaded: {}", title),
        SessionEvent::Tagged { file, .. } => format!("Success: {}", file),
        SessionEvent::TagFailed { id, title, error } => {
            format!("Could not set metadata for {} | {}: {}", id, title, error)
        }
        SessionEvent::FetchFailed { id, error } => {
            format!("Download error for {}: {}", id, error)
        }
        SessionEvent::MetadataMissing { id, title } => {
            format!("Could not get metadata for {} | {}", id, title)
        }
        SessionEvent::Skipped { key } => format!("Skipped: {}", key),
        SessionEvent::Discarded { key } => format!("Removed from queue: {}", key),
        SessionEvent::InvalidCommand { input, reason } => {
            format!("Unknown command {:?}: {}", input, reason)
        }
        SessionEvent::UnrecognizedMessage { detail } => format!("Error: {}", detail),
        SessionEvent::SourceFatal { message } => format!("Fatal: {}", message),
    };
    format!("{} {}", time, body)
}

fn command_help() -> String {
    [
        "s   Skip this track",
        "p   Pop most recent item off queue",
        "q   Quit",
        "    Anything else will be treated as a custom video ID",
    ]
    .join("\n")
}
