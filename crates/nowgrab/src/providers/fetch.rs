//! yt-dlp wrapper for fetching audio

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::search::watch_url;
use super::{FetchError, FetchProvider, FetchedFile};

/// Prefix of the line we ask yt-dlp to print once the file is in place.
const DONE_MARKER: &str = "__nowgrab_done__";

pub struct YtDlpFetcher {
    /// `None` when yt-dlp could not be found at startup; every fetch then fails.
    binary: Option<PathBuf>,
    audio_format: String,
}

impl YtDlpFetcher {
    pub fn new(binary: Option<PathBuf>, audio_format: impl Into<String>) -> Self {
        Self {
            binary,
            audio_format: audio_format.into(),
        }
    }
}

#[async_trait]
impl FetchProvider for YtDlpFetcher {
    async fn fetch(
        &self,
        id: &str,
        destination: &Path,
        progress: mpsc::Sender<f32>,
    ) -> Result<FetchedFile, FetchError> {
        let binary = self.binary.as_ref().ok_or(FetchError::BinaryNotFound)?;
        let output_dir = destination.parent().unwrap_or_else(|| Path::new("."));
        let stem = destination
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(id)
            .to_string();

        tokio::fs::create_dir_all(output_dir).await?;

        // yt-dlp expands %(...)s in the template, so literal percents are doubled
        let output_template = format!(
            "{}/{}.%(ext)s",
            output_dir.display(),
            stem.replace('%', "%%")
        );
        let source = source_url(id);

        info!("Starting fetch of {} to {}", source, output_template);

        let mut child = Command::new(binary)
            .arg("--newline")
            .arg("--progress")
            .arg("--no-playlist")
            .arg("-x")
            .arg("--audio-format")
            .arg(&self.audio_format)
            .arg("-o")
            .arg(&output_template)
            .arg("--print")
            .arg(format!("after_move:{}%(id)s\t%(title)s", DONE_MARKER))
            .arg("--")
            .arg(&source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("yt-dlp stderr: {}", line);
                }
            });
        }

        let mut reported: Option<(String, String)> = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(done) = parse_done_line(&line) {
                    reported = Some(done);
                } else if let Some(percent) = parse_progress_line(&line) {
                    // receiver gone just means nobody is watching progress
                    let _ = progress.send(percent).await;
                } else {
                    debug!("yt-dlp: {}", line);
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(FetchError::Exit(status.code()));
        }

        let path = if tokio::fs::try_exists(destination).await.unwrap_or(false) {
            destination.to_path_buf()
        } else {
            // a different --audio-format leaves another extension behind
            find_fetched_file(output_dir, &stem)
                .await
                .ok_or_else(|| FetchError::OutputMissing(stem.clone()))?
        };

        let (reported_id, title) = reported.unwrap_or_else(|| (id.to_string(), stem.clone()));
        info!("Fetch complete: {}", path.display());

        Ok(FetchedFile {
            id: reported_id,
            title,
            path,
        })
    }
}

/// Bare ids become watch URLs; anything that already looks like a URL is
/// passed through.
fn source_url(id: &str) -> String {
    if id.contains("://") {
        id.to_string()
    } else {
        watch_url(id)
    }
}

/// Parse yt-dlp progress output line into a percentage.
fn parse_progress_line(line: &str) -> Option<f32> {
    // Example: [download]  45.3% of ~50.12MiB at  2.56MiB/s ETA 00:12
    if !line.contains("[download]") || !line.contains('%') {
        return None;
    }
    line.split_whitespace()
        .find(|part| part.ends_with('%'))
        .and_then(|part| part.trim_end_matches('%').parse::<f32>().ok())
}

fn parse_done_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix(DONE_MARKER)?;
    let (id, title) = rest.split_once('\t')?;
    Some((id.to_string(), title.to_string()))
}

/// Find the fetched file by base name
async fn find_fetched_file(output_dir: &Path, stem: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(output_dir).await.ok()?;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.file_stem().and_then(|n| n.to_str()) == Some(stem) {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(
            parse_progress_line("[download]  45.3% of ~50.12MiB at  2.56MiB/s ETA 00:12"),
            Some(45.3)
        );
        assert_eq!(
            parse_progress_line("[download] 100% of 3.20MiB in 00:01"),
            Some(100.0)
        );
        assert_eq!(parse_progress_line("[download] Destination: x.webm"), None);
        assert_eq!(parse_progress_line("[ExtractAudio] 50% done"), None);
    }

    #[test]
    fn test_parse_done_line() {
        assert_eq!(
            parse_done_line("__nowgrab_done__abc123\tSong (Official Audio)"),
            Some(("abc123".to_string(), "Song (Official Audio)".to_string()))
        );
        assert_eq!(parse_done_line("[download] 10%"), None);
    }

    #[test]
    fn test_source_url() {
        assert_eq!(source_url("abc"), "https://www.youtube.com/watch?v=abc");
        assert_eq!(
            source_url("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
    }

    #[tokio::test]
    async fn test_find_fetched_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("[A] X.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("[A] Y.mp3"), b"").unwrap();
        let found = find_fetched_file(dir.path(), "[A] X").await.unwrap();
        assert_eq!(found, dir.path().join("[A] X.mp3"));
        assert!(find_fetched_file(dir.path(), "[B] X").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_fails() {
        let fetcher = YtDlpFetcher::new(None, "mp3");
        let (tx, _rx) = mpsc::channel(1);
        let result = fetcher.fetch("abc", Path::new("/tmp/[A] X.mp3"), tx).await;
        assert!(matches!(result, Err(FetchError::BinaryNotFound)));
    }
}
