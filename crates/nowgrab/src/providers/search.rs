//! YouTube Data API search client

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Candidate, SearchError, SearchProvider};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

/// YouTube API search response
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub struct SearchItem {
    pub id: ItemId,
    pub snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
pub struct ItemId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Snippet {
    pub title: String,
}

pub struct YoutubeSearch {
    client: reqwest::Client,
    api_key: Option<String>,
    max_results: u32,
}

impl YoutubeSearch {
    pub fn new(api_key: Option<String>, max_results: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            max_results: max_results.max(1),
        }
    }
}

#[async_trait]
impl SearchProvider for YoutubeSearch {
    async fn search(&self, query: &str) -> Result<Vec<Candidate>, SearchError> {
        let key = self.api_key.as_deref().ok_or(SearchError::MissingApiKey)?;
        let max_results = self.max_results.to_string();

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("q", query),
                ("key", key),
            ])
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status()));
        }

        let data: SearchResponse = response.json().await?;
        let candidates = candidates_from(data);
        debug!("search {:?}: {} candidates", query, candidates.len());
        Ok(candidates)
    }
}

/// Keep only video results, in API rank order.
pub fn candidates_from(response: SearchResponse) -> Vec<Candidate> {
    response
        .items
        .into_iter()
        .filter_map(|item| {
            let id = item.id.video_id?;
            let title = item
                .snippet
                .map(|s| unescape_html(&s.title))
                .unwrap_or_else(|| id.clone());
            Some(Candidate {
                link: watch_url(&id),
                id,
                title,
            })
        })
        .collect()
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// The API returns snippet titles HTML-escaped.
fn unescape_html(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_from_response() {
        let json = r#"{
            "kind": "youtube#searchListResponse",
            "items": [
                {"id": {"kind": "youtube#video", "videoId": "abc123"},
                 "snippet": {"title": "Artist - Song (Official Video)"}},
                {"id": {"kind": "youtube#channel", "channelId": "UCxyz"},
                 "snippet": {"title": "Artist Channel"}},
                {"id": {"kind": "youtube#video", "videoId": "def456"},
                 "snippet": {"title": "Artist &amp; Friends &#39;Song&#39;"}}
            ]
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        let candidates = candidates_from(response);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "abc123");
        assert_eq!(candidates[0].link, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(candidates[1].title, "Artist & Friends 'Song'");
    }

    #[test]
    fn test_empty_response() {
        let response: SearchResponse = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(candidates_from(response).is_empty());
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(candidates_from(response).is_empty());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let search = YoutubeSearch::new(None, 3);
        assert!(matches!(
            search.search("A X").await,
            Err(SearchError::MissingApiKey)
        ));
    }
}
