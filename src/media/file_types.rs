//! File classification for library scanning

use std::path::Path;

/// Image extensions picked up as cover art (lowercase, no dot)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Audio extensions indexed as songs (lowercase, no dot)
pub const AUDIO_EXTENSIONS: &[&str] = &["ape", "flac", "m4a", "mp3", "mpc", "ogg", "wma", "wv"];

/// File name of the per-folder metadata sidecar
pub const METADATA_FILE_NAME: &str = "metadata";

/// Audio container of an indexed song
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Ape,
    Flac,
    M4a,
    Mp3,
    Mpc,
    Ogg,
    Wma,
    Wv,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ape" => Some(Self::Ape),
            "flac" => Some(Self::Flac),
            "m4a" => Some(Self::M4a),
            "mp3" => Some(Self::Mp3),
            "mpc" => Some(Self::Mpc),
            "ogg" => Some(Self::Ogg),
            "wma" => Some(Self::Wma),
            "wv" => Some(Self::Wv),
            _ => None,
        }
    }

    /// Codec name stored on the song record
    pub fn codec(&self) -> &'static str {
        match self {
            Self::Ape => "APE",
            Self::Flac => "FLAC",
            Self::M4a => "M4A",
            Self::Mp3 => "MP3",
            Self::Mpc => "MPC",
            Self::Ogg => "OGG",
            Self::Wma => "WMA",
            Self::Wv => "WV",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Ape => "audio/ape",
            Self::Flac => "audio/flac",
            Self::M4a => "audio/aac",
            Self::Mp3 => "audio/mpeg",
            Self::Mpc => "audio/mpc",
            Self::Ogg => "audio/ogg",
            Self::Wma => "audio/wma",
            Self::Wv => "audio/wv",
        }
    }
}

/// What a scanned path is, as far as the library cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio(FileType),
    Metadata,
}

/// Classify a path by file name and extension. `None` for anything the
/// scanner ignores, directories included.
pub fn classify(path: &Path) -> Option<MediaKind> {
    if path.file_name().and_then(|n| n.to_str()) == Some(METADATA_FILE_NAME) {
        return Some(MediaKind::Metadata);
    }

    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Some(MediaKind::Image);
    }
    FileType::from_extension(&ext).map(MediaKind::Audio)
}
