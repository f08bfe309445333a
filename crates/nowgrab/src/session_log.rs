//! Append-only record of everything notable that happened in a session.
//!
//! Every record is emitted through `tracing`, pushed to the display channel,
//! and kept in memory until the session ends, when it is flushed.

use chrono::{DateTime, Local};
use nowgrab_proto::{QueryKey, Track};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::providers::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Waiting,
    Current { key: QueryKey },
    Queued { key: QueryKey },
    Searching { query: String },
    SearchRetry { query: String, attempt: u32 },
    Candidates { query: String, results: Vec<Candidate> },
    NoResults { query: String },
    SearchFailed { query: String, error: String },
    Selected { id: String, candidate: Option<Candidate>, track: Track },
    FetchRejected { requested: String, in_flight: String },
    Fetched { id: String, title: String },
    Tagged { id: String, file: String },
    TagFailed { id: String, title: String, error: String },
    FetchFailed { id: String, error: String },
    MetadataMissing { id: String, title: String },
    Skipped { key: QueryKey },
    Discarded { key: QueryKey },
    InvalidCommand { input: String, reason: String },
    UnrecognizedMessage { detail: String },
    SourceFatal { message: String },
}

impl SessionEvent {
    pub fn level(&self) -> Level {
        match self {
            Self::SearchRetry { .. }
            | Self::FetchRejected { .. }
            | Self::InvalidCommand { .. }
            | Self::MetadataMissing { .. }
            | Self::UnrecognizedMessage { .. } => Level::Warn,
            Self::SearchFailed { .. }
            | Self::TagFailed { .. }
            | Self::FetchFailed { .. }
            | Self::SourceFatal { .. } => Level::Error,
            _ => Level::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub at: DateTime<Local>,
    pub level: Level,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// What the display collaborator receives.
#[derive(Debug, Clone)]
pub enum DisplayUpdate {
    Record(SessionRecord),
    Progress { id: String, percentage: f32 },
    Queue(Vec<QueryKey>),
}

/// Cheaply cloneable handle; all clones append to the same log.
#[derive(Clone)]
pub struct SessionLog {
    records: Arc<Mutex<Vec<SessionRecord>>>,
    display_tx: broadcast::Sender<DisplayUpdate>,
}

impl SessionLog {
    pub fn new(display_tx: broadcast::Sender<DisplayUpdate>) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            display_tx,
        }
    }

    /// A log whose display updates go nowhere.
    pub fn detached() -> Self {
        let (display_tx, _) = broadcast::channel(16);
        Self::new(display_tx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayUpdate> {
        self.display_tx.subscribe()
    }

    pub fn record(&self, event: SessionEvent) {
        let level = event.level();
        match level {
            Level::Info => info!(?event, "session"),
            Level::Warn => warn!(?event, "session"),
            Level::Error => error!(?event, "session"),
        }

        let record = SessionRecord {
            at: Local::now(),
            level,
            event,
        };
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        // no receivers is fine
        let _ = self.display_tx.send(DisplayUpdate::Record(record));
    }

    /// Progress goes to the display only; it is not a notable event.
    pub fn progress(&self, id: &str, percentage: f32) {
        let _ = self.display_tx.send(DisplayUpdate::Progress {
            id: id.to_string(),
            percentage,
        });
    }

    pub fn queue_changed(&self, keys: Vec<QueryKey>) {
        let _ = self.display_tx.send(DisplayUpdate::Queue(keys));
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.records().into_iter().map(|r| r.event).collect()
    }

    /// Append every record as a JSON line to `path`.
    pub fn flush_to(&self, path: &Path) -> anyhow::Result<usize> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let records = self.records();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        for record in &records {
            serde_json::to_writer(&mut file, record)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_are_appended_in_order() {
        let log = SessionLog::detached();
        log.record(SessionEvent::Waiting);
        log.record(SessionEvent::NoResults {
            query: "A X".to_string(),
        });
        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SessionEvent::Waiting);
    }

    #[test]
    fn test_clones_share_the_log() {
        let log = SessionLog::detached();
        let other = log.clone();
        other.record(SessionEvent::Waiting);
        assert_eq!(log.records().len(), 1);
    }

    #[test]
    fn test_levels() {
        assert_eq!(SessionEvent::Waiting.level(), Level::Info);
        assert_eq!(
            SessionEvent::MetadataMissing {
                id: "a".into(),
                title: "t".into()
            }
            .level(),
            Level::Warn
        );
        assert_eq!(
            SessionEvent::SourceFatal {
                message: "gone".into()
            }
            .level(),
            Level::Error
        );
    }

    #[tokio::test]
    async fn test_display_receives_records_and_progress() {
        let log = SessionLog::detached();
        let mut rx = log.subscribe();
        log.record(SessionEvent::Waiting);
        log.progress("abc", 42.0);
        assert!(matches!(rx.recv().await.unwrap(), DisplayUpdate::Record(_)));
        match rx.recv().await.unwrap() {
            DisplayUpdate::Progress { id, percentage } => {
                assert_eq!(id, "abc");
                assert_eq!(percentage, 42.0);
            }
            other => panic!("unexpected update {:?}", other),
        }
        // progress is not recorded
        assert_eq!(log.records().len(), 1);
    }

    #[test]
    fn test_flush_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("session.jsonl");
        let log = SessionLog::detached();
        log.record(SessionEvent::Fetched {
            id: "abc".into(),
            title: "Song".into(),
        });
        log.record(SessionEvent::FetchFailed {
            id: "def".into(),
            error: "exit 1".into(),
        });

        assert_eq!(log.flush_to(&path).unwrap(), 2);
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""event":"fetched""#));
        assert!(lines[1].contains(r#""level":"error""#));
    }
}
