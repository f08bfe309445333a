//! Transport from the now-playing poller into the coordinator.
//!
//! The poller runs as a child process and writes one JSON message per line
//! on stdout. Each line becomes a `CoordinatorEvent`; deciding what a track
//! change means is the coordinator's job.

use anyhow::Context;
use nowgrab_proto::{PollerMessage, ProtocolError};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::CoordinatorEvent;

pub struct PollerHandle {
    child: Child,
    reader: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn shutdown(mut self) {
        self.reader.abort();
        if let Err(e) = self.child.kill().await {
            debug!("poller already gone: {}", e);
        }
    }
}

/// Spawn the poller and start forwarding its messages.
pub fn spawn_poller(
    binary: &Path,
    event_tx: mpsc::Sender<CoordinatorEvent>,
) -> anyhow::Result<PollerHandle> {
    info!("spawning poller {}", binary.display());
    let mut child = Command::new(binary)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn poller {}", binary.display()))?;

    let stdout = child
        .stdout
        .take()
        .context("poller stdout was not captured")?;
    let reader = tokio::spawn(forward_lines(stdout, event_tx));

    Ok(PollerHandle { child, reader })
}

/// Forward every line of `reader` until EOF, then report the poller gone.
pub async fn forward_lines<R>(reader: R, event_tx: mpsc::Sender<CoordinatorEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let reason = match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(event) = event_for_line(&line) else {
                    continue;
                };
                if event_tx.send(event).await.is_err() {
                    debug!("coordinator gone, poller reader stopping");
                    return;
                }
                continue;
            }
            Ok(None) => "poller exited".to_string(),
            Err(e) => format!("poller read error: {}", e),
        };
        warn!("{}", reason);
        let _ = event_tx.send(CoordinatorEvent::PollerExited(reason)).await;
        return;
    }
}

/// Decode one line. Blank lines carry nothing.
pub fn event_for_line(line: &str) -> Option<CoordinatorEvent> {
    if line.trim().is_empty() {
        return None;
    }
    Some(match PollerMessage::decode_line(line) {
        Ok(message) => CoordinatorEvent::Poller(message),
        Err(ProtocolError::UnknownType(kind)) => {
            CoordinatorEvent::PollerGarbage(format!("invalid message type {}", kind))
        }
        Err(e) => CoordinatorEvent::PollerGarbage(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_for_line() {
        let line = r#"{"type":"track","data":{"artist":"A","title":"X","album":"","discNumber":1,"trackNumber":1}}"#;
        assert!(matches!(
            event_for_line(line),
            Some(CoordinatorEvent::Poller(PollerMessage::Track { .. }))
        ));
        assert!(matches!(
            event_for_line(r#"{"type":"error","errorMessage":"gone"}"#),
            Some(CoordinatorEvent::Poller(PollerMessage::Error { .. }))
        ));
        match event_for_line(r#"{"type":"volume"}"#) {
            Some(CoordinatorEvent::PollerGarbage(detail)) => {
                assert_eq!(detail, "invalid message type volume")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(event_for_line("   ").is_none());
    }

    #[tokio::test]
    async fn test_forward_lines_reports_exit_at_eof() {
        let input: &[u8] = b"{\"type\":\"track\",\"data\":{\"artist\":\"A\",\"title\":\"X\",\"album\":\"\",\"discNumber\":1,\"trackNumber\":1}}\n\ngarbage\n";
        let (tx, mut rx) = mpsc::channel(8);
        forward_lines(input, tx).await;

        assert!(matches!(
            rx.recv().await,
            Some(CoordinatorEvent::Poller(PollerMessage::Track { .. }))
        ));
        assert!(matches!(
            rx.recv().await,
            Some(CoordinatorEvent::PollerGarbage(_))
        ));
        assert!(matches!(
            rx.recv().await,
            Some(CoordinatorEvent::PollerExited(_))
        ));
        assert!(rx.recv().await.is_none());
    }
}
