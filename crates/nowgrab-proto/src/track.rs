//! Track metadata as observed from the media player, plus the derived query key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A song as announced by the now-playing poller.
///
/// Tracks are never mutated after being observed; a track change is always a
/// fresh value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub disc_number: u32,
    pub track_number: u32,
}

/// Canonical comparison key for a track.
///
/// Two tracks are the same logical track iff their keys are equal. Only
/// `artist` and `title` contribute, so different recordings of the same song
/// collapse into one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueryKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the query key for a track. Total and stable.
pub fn query_key(track: &Track) -> QueryKey {
    QueryKey(format!("{} {}", track.artist.trim(), track.title.trim()))
}

impl Track {
    pub fn query_key(&self) -> QueryKey {
        query_key(self)
    }

    /// Destination file name for this track: `[Artist] Title.mp3`.
    ///
    /// Two different tracks that sanitize to the same name will collide; that
    /// is accepted.
    pub fn file_name(&self) -> String {
        format!("{}.mp3", self.file_stem())
    }

    /// Base name without the extension (used as the yt-dlp output stem).
    pub fn file_stem(&self) -> String {
        format!(
            "[{}] {}",
            safe_filename(self.artist.trim()),
            safe_filename(self.title.trim())
        )
    }

    /// Copy of this track with every text field trimmed.
    pub fn trimmed(&self) -> Track {
        Track {
            title: self.title.trim().to_string(),
            artist: self.artist.trim().to_string(),
            album: self.album.trim().to_string(),
            disc_number: self.disc_number,
            track_number: self.track_number,
        }
    }
}

/// Make a name safe for the filesystem.
pub fn safe_filename(name: &str) -> String {
    name.replace(['/', '\\', ':'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(artist: &str, title: &str, album: &str) -> Track {
        Track {
            title: title.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
            disc_number: 1,
            track_number: 1,
        }
    }

    #[test]
    fn test_query_key_uses_artist_and_title_only() {
        let a = track("Boards of Canada", "Roygbiv", "Music Has the Right to Children");
        let b = Track {
            disc_number: 2,
            track_number: 9,
            ..track("Boards of Canada", "Roygbiv", "Peel Session")
        };
        assert_eq!(query_key(&a), query_key(&b));
        assert_eq!(a.query_key().as_str(), "Boards of Canada Roygbiv");
    }

    #[test]
    fn test_query_key_ignores_trailing_newlines() {
        let raw = track("Autechre\n", "Gantz Graf\n", "");
        let clean = track("Autechre", "Gantz Graf", "");
        assert_eq!(raw.query_key(), clean.query_key());
    }

    #[test]
    fn test_query_key_distinguishes_artists() {
        let a = track("A", "X", "");
        let b = track("B", "X", "");
        assert_ne!(a.query_key(), b.query_key());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(track("A", "X", "").file_name(), "[A] X.mp3");
        assert_eq!(
            track("AC/DC", "T.N.T.", "").file_name(),
            "[AC-DC] T.N.T..mp3"
        );
        assert_eq!(track("AC/DC", "T.N.T.", "").file_stem(), "[AC-DC] T.N.T.");
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let json = r#"{"title":"X","artist":"A","album":"","discNumber":1,"trackNumber":3}"#;
        let t: Track = serde_json::from_str(json).unwrap();
        assert_eq!(t.track_number, 3);
        let back = serde_json::to_string(&t).unwrap();
        assert!(back.contains("\"discNumber\":1"));
    }
}
