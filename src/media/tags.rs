//! Audio tag and property extraction
//!
//! A [TagReader] pulls raw tags and stream properties out of a file;
//! [AudioTags::from_raw] turns them into the values stored on a song,
//! substituting placeholders for missing names and rejecting files whose
//! stream properties could not be determined.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub const UNKNOWN_ALBUM_ARTIST: &str = "UNKNOWN ALBUM ARTIST";
pub const UNKNOWN_ALBUM_TITLE: &str = "UNKNOWN ALBUM TITLE";
pub const UNKNOWN_SONG_TITLE: &str = "UNKNOWN SONG TITLE";
pub const DEFAULT_DISC: &str = "01/01";

#[derive(Debug, Error)]
pub enum TagError {
    #[error("failed to read tags from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("required audio properties could not be extracted from {0}")]
    MissingProperties(PathBuf),
}

/// Tags and properties exactly as found in the file
#[derive(Debug, Clone, Default)]
pub struct RawTags {
    pub album_artist: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub year: Option<u32>,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    pub disc_total: Option<u32>,
    pub bitrate: u32,
    pub channels: u32,
    pub sample_rate: u32,
    pub duration: Duration,
}

/// Reads tags from an audio file. Implementations are blocking.
pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<RawTags, TagError>;
}

/// Tag reader backed by lofty
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<RawTags, TagError> {
        use lofty::prelude::*;
        use lofty::probe::Probe;

        let read_error = |e: lofty::error::LoftyError| TagError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let tagged_file = Probe::open(path)
            .map_err(read_error)?
            .read()
            .map_err(read_error)?;

        let properties = tagged_file.properties();
        let mut raw = RawTags {
            bitrate: properties.audio_bitrate().unwrap_or(0),
            channels: properties.channels().map(u32::from).unwrap_or(0),
            sample_rate: properties.sample_rate().unwrap_or(0),
            duration: properties.duration(),
            ..Default::default()
        };

        if let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        {
            raw.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(str::to_string);
            raw.artist = tag.artist().map(|s| s.to_string());
            raw.album = tag.album().map(|s| s.to_string());
            raw.title = tag.title().map(|s| s.to_string());
            raw.genre = tag.genre().map(|s| s.to_string());
            raw.comment = tag.comment().map(|s| s.to_string());
            raw.year = tag.year();
            raw.track = tag.track();
            raw.disc = tag.disk();
            raw.disc_total = tag.disk_total();
        }

        Ok(raw)
    }
}

/// Song values derived from a file's tags
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTags {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub year: Option<i32>,
    pub track_number: u32,
    pub disc: String,
    pub bitrate: u32,
    pub channels: u32,
    pub sample_rate: u32,
    pub length_secs: u64,
    /// Non-fatal problems, e.g. a placeholder had to be used
    pub warnings: Vec<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AudioTags {
    pub fn from_raw(path: &Path, raw: RawTags) -> Result<Self, TagError> {
        let length_secs = raw.duration.as_secs();
        if raw.bitrate == 0 || raw.channels == 0 || raw.sample_rate == 0 || length_secs == 0 {
            return Err(TagError::MissingProperties(path.to_path_buf()));
        }

        let mut warnings = Vec::new();

        let artist = non_empty(raw.album_artist)
            .or_else(|| non_empty(raw.artist))
            .unwrap_or_else(|| {
                warnings.push("No album artist provided".to_string());
                UNKNOWN_ALBUM_ARTIST.to_string()
            });
        let album = non_empty(raw.album).unwrap_or_else(|| {
            warnings.push("No album title provided".to_string());
            UNKNOWN_ALBUM_TITLE.to_string()
        });
        let title = non_empty(raw.title).unwrap_or_else(|| {
            warnings.push("No song title provided".to_string());
            UNKNOWN_SONG_TITLE.to_string()
        });

        let track_number = match raw.track {
            Some(n) => n,
            None => {
                warnings.push("Song missing track number property".to_string());
                1
            }
        };

        let disc = match (raw.disc, raw.disc_total) {
            (Some(n), Some(total)) => format!("{:02}/{:02}", n, total),
            (Some(n), None) => format!("{:02}", n),
            (None, _) => DEFAULT_DISC.to_string(),
        };

        Ok(Self {
            artist,
            album,
            title,
            genre: non_empty(raw.genre),
            comment: non_empty(raw.comment),
            year: raw.year.and_then(|y| i32::try_from(y).ok()).filter(|y| *y > 0),
            track_number,
            disc,
            bitrate: raw.bitrate,
            channels: raw.channels,
            sample_rate: raw.sample_rate,
            length_secs,
            warnings,
        })
    }
}

/// Read and validate the tags of one file
pub fn read_audio_tags(reader: &dyn TagReader, path: &Path) -> Result<AudioTags, TagError> {
    let raw = reader.read(path)?;
    AudioTags::from_raw(path, raw)
}
