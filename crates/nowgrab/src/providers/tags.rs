//! Audio metadata tagging using lofty

use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag, TagType};
use nowgrab_proto::Track;
use std::path::Path;

use super::{TagError, TagWriter};

/// Writes the player's metadata (not the fetch provider's) into the file.
pub struct LoftyTagWriter;

#[async_trait]
impl TagWriter for LoftyTagWriter {
    async fn write_tags(&self, path: &Path, track: &Track) -> Result<(), TagError> {
        // Use blocking task for file I/O
        let path = path.to_path_buf();
        let track = track.clone();
        tokio::task::spawn_blocking(move || write_tags_blocking(&path, &track)).await??;
        Ok(())
    }
}

fn write_tags_blocking(file_path: &Path, track: &Track) -> Result<(), TagError> {
    let tag_type = guess_tag_type(file_path)?;
    let tagged_file = Probe::open(file_path)?.read()?;

    let mut tag = tagged_file
        .primary_tag()
        .cloned()
        .unwrap_or_else(|| Tag::new(tag_type));

    tag.insert_text(ItemKey::TrackTitle, track.title.clone());
    tag.insert_text(ItemKey::TrackArtist, track.artist.clone());
    if !track.album.is_empty() {
        tag.insert_text(ItemKey::AlbumTitle, track.album.clone());
    }
    if track.track_number > 0 {
        tag.set_track(track.track_number);
    }
    if track.disc_number > 0 {
        tag.set_disk(track.disc_number);
    }

    tag.save_to_path(file_path, WriteOptions::default())?;
    Ok(())
}

/// Guess the appropriate tag type for file extension
fn guess_tag_type(file_path: &Path) -> Result<TagType, TagError> {
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "mp3" => Ok(TagType::Id3v2),
        "m4a" | "mp4" | "aac" => Ok(TagType::Mp4Ilst),
        "flac" | "ogg" | "opus" => Ok(TagType::VorbisComments),
        _ => Err(TagError::UnsupportedFormat(ext)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_tag_type() {
        assert_eq!(guess_tag_type(Path::new("[A] X.mp3")).unwrap(), TagType::Id3v2);
        assert_eq!(guess_tag_type(Path::new("a.M4A")).unwrap(), TagType::Mp4Ilst);
        assert_eq!(
            guess_tag_type(Path::new("a.opus")).unwrap(),
            TagType::VorbisComments
        );
        assert!(matches!(
            guess_tag_type(Path::new("a.wav")),
            Err(TagError::UnsupportedFormat(ext)) if ext == "wav"
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track {
            title: "X".to_string(),
            artist: "A".to_string(),
            ..Default::default()
        };
        let result = LoftyTagWriter
            .write_tags(&dir.path().join("[A] X.mp3"), &track)
            .await;
        assert!(matches!(result, Err(TagError::Lofty(_))));
    }
}
