//! playerctl-backed metadata reader and change detection.

use nowgrab_proto::{PollerMessage, QueryKey, Track};
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to run playerctl: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("playerctl metadata {prop} failed: {stderr}")]
    Query { prop: &'static str, stderr: String },
}

/// Reads the active player's metadata through `playerctl metadata <prop>`.
pub struct Playerctl {
    binary: PathBuf,
}

impl Playerctl {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    async fn get(&self, prop: &'static str) -> Result<String, PlayerError> {
        let output = Command::new(&self.binary)
            .arg("metadata")
            .arg(prop)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(PlayerError::Query {
                prop,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn current_track(&self) -> Result<Track, PlayerError> {
        let track = Track {
            album: self.get("album").await?,
            artist: self.get("artist").await?,
            disc_number: parse_number(&self.get("xesam:discNumber").await?),
            title: self.get("title").await?,
            track_number: parse_number(&self.get("xesam:trackNumber").await?),
        };
        debug!("playerctl: {:?}", track);
        Ok(track)
    }
}

/// Numbers the player doesn't report come back empty; treat them as 0.
fn parse_number(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(0)
}

/// Turns a stream of poll results into the messages worth announcing.
///
/// A track is announced only when its key differs from the last announced
/// one. `max_failures` consecutive failed polls produce one fatal error.
pub struct ChangeDetector {
    prior: Option<QueryKey>,
    failures: u32,
    max_failures: u32,
}

impl ChangeDetector {
    pub fn new(max_failures: u32) -> Self {
        Self {
            prior: None,
            failures: 0,
            max_failures: max_failures.max(1),
        }
    }

    pub fn observe(&mut self, track: Track) -> Option<PollerMessage> {
        self.failures = 0;
        let key = track.query_key();
        if self.prior.as_ref() == Some(&key) {
            return None;
        }
        self.prior = Some(key);
        Some(PollerMessage::track(track))
    }

    pub fn fail(&mut self, err: &PlayerError) -> Option<PollerMessage> {
        self.failures += 1;
        if self.failures >= self.max_failures {
            Some(PollerMessage::error(format!(
                "lost metadata source after {} attempts: {}",
                self.failures, err
            )))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(artist: &str, title: &str) -> Track {
        Track {
            title: title.to_string(),
            artist: artist.to_string(),
            album: "Album".to_string(),
            disc_number: 1,
            track_number: 2,
        }
    }

    fn query_err() -> PlayerError {
        PlayerError::Query {
            prop: "title",
            stderr: "No players found".to_string(),
        }
    }

    #[test]
    fn test_announces_only_changes() {
        let mut detector = ChangeDetector::new(3);
        assert!(detector.observe(track("A", "X")).is_some());
        assert!(detector.observe(track("A", "X")).is_none());
        assert!(detector.observe(track("A", "Y")).is_some());
        assert!(detector.observe(track("A", "X")).is_some());
    }

    #[test]
    fn test_reports_fatal_after_consecutive_failures() {
        let mut detector = ChangeDetector::new(3);
        assert!(detector.fail(&query_err()).is_none());
        assert!(detector.fail(&query_err()).is_none());
        match detector.fail(&query_err()) {
            Some(PollerMessage::Error { error_message }) => {
                assert!(error_message.contains("No players found"))
            }
            other => panic!("expected error message, got {:?}", other),
        }
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut detector = ChangeDetector::new(2);
        assert!(detector.fail(&query_err()).is_none());
        detector.observe(track("A", "X"));
        assert!(detector.fail(&query_err()).is_none());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("7\n"), 7);
        assert_eq!(parse_number(""), 0);
        assert_eq!(parse_number("n/a"), 0);
    }
}
