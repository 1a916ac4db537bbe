//! Media file handling: classification and tag extraction

pub mod file_types;
pub mod tags;

pub use file_types::{FileType, METADATA_FILE_NAME, MediaKind, classify};
pub use tags::{AudioTags, LoftyTagReader, RawTags, TagError, TagReader, read_audio_tags};
