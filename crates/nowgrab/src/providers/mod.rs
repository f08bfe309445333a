//! External capabilities the coordinator consumes: search, fetch, tag-write.

pub mod fetch;
pub mod search;
pub mod tags;

use async_trait::async_trait;
use nowgrab_proto::Track;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

pub use fetch::YtDlpFetcher;
pub use search::YoutubeSearch;
pub use tags::LoftyTagWriter;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub link: String,
}

/// What a fetch provider reports on success. `id` and `title` are the
/// provider's own view of the item, which may differ from what was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedFile {
    pub id: String,
    pub title: String,
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no YouTube API key configured")]
    MissingApiKey,
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("yt-dlp not found")]
    BinaryNotFound,
    #[error("failed to run yt-dlp: {0}")]
    Io(#[from] std::io::Error),
    #[error("yt-dlp exited with status {0:?}")]
    Exit(Option<i32>),
    #[error("fetched file not found for {0}")]
    OutputMissing(String),
}

#[derive(Debug, Error)]
pub enum TagError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("tag write failed: {0}")]
    Lofty(#[from] lofty::error::LoftyError),
    #[error("tag writing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ranked candidates for `query`; an empty list is a valid answer.
    async fn search(&self, query: &str) -> Result<Vec<Candidate>, SearchError>;
}

#[async_trait]
pub trait FetchProvider: Send + Sync {
    /// Fetch `id` to `destination`, sending percentages (0-100) on
    /// `progress` while the transfer runs.
    async fn fetch(
        &self,
        id: &str,
        destination: &Path,
        progress: mpsc::Sender<f32>,
    ) -> Result<FetchedFile, FetchError>;
}

#[async_trait]
pub trait TagWriter: Send + Sync {
    async fn write_tags(&self, path: &Path, track: &Track) -> Result<(), TagError>;
}
