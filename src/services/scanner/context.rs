//! Per-scan caches, counters and deferred attachments

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use uuid::Uuid;

use crate::db::{AlbumRecord, ArtistRecord, FolderRecord};

/// Records created or updated by one media scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounts {
    pub art: u64,
    pub artists: u64,
    pub albums: u64,
    pub songs: u64,
    pub folders: u64,
    pub metadata: u64,
    pub updated_songs: u64,
}

impl ScanCounts {
    pub fn total(&self) -> u64 {
        self.art
            + self.artists
            + self.albums
            + self.songs
            + self.folders
            + self.metadata
            + self.updated_songs
    }
}

/// Art and metadata found in a folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attachables {
    pub art: Option<Uuid>,
    pub metadata: Option<Uuid>,
}

impl Attachables {
    pub fn is_empty(&self) -> bool {
        self.art.is_none() && self.metadata.is_none()
    }
}

/// A record that takes the art and metadata of its folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachTarget {
    Artist(Uuid),
    Album(Uuid),
}

/// State owned by a single media scan. Dropped when the scan ends.
#[derive(Debug, Default)]
pub struct ScanContext {
    /// Folders by path
    pub folders: HashMap<PathBuf, FolderRecord>,
    /// Artists by normalized title
    pub artists: HashMap<String, ArtistRecord>,
    /// Albums by artist and title
    pub albums: HashMap<(Uuid, String), AlbumRecord>,
    /// Art and metadata seen per folder id
    pub attachables: HashMap<Uuid, Attachables>,
    /// Artists and albums owning each folder id
    pub targets: HashMap<Uuid, HashSet<AttachTarget>>,
    pub counts: ScanCounts,
}

impl ScanContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_art(&mut self, folder_id: Uuid, art_id: Uuid) {
        self.attachables.entry(folder_id).or_default().art = Some(art_id);
    }

    pub fn record_metadata(&mut self, folder_id: Uuid, metadata_id: Uuid) {
        self.attachables.entry(folder_id).or_default().metadata = Some(metadata_id);
    }

    pub fn add_target(&mut self, folder_id: Uuid, target: AttachTarget) {
        self.targets.entry(folder_id).or_default().insert(target);
    }

    /// Targets paired with the attachables of their folder
    pub fn pending_attachments(&self) -> Vec<(AttachTarget, Attachables)> {
        let mut pending = Vec::new();
        for (folder_id, targets) in &self.targets {
            let Some(found) = self.attachables.get(folder_id) else {
                continue;
            };
            if found.is_empty() {
                continue;
            }
            pending.extend(targets.iter().map(|t| (*t, *found)));
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_total() {
        let counts = ScanCounts {
            art: 1,
            artists: 1,
            albums: 1,
            songs: 3,
            folders: 2,
            metadata: 1,
            updated_songs: 2,
        };
        assert_eq!(counts.total(), 11);
    }

    #[test]
    fn test_artist_and_album_share_folder() {
        let mut ctx = ScanContext::new();
        let folder = Uuid::new_v4();
        let artist = Uuid::new_v4();
        let album = Uuid::new_v4();
        let art = Uuid::new_v4();

        ctx.add_target(folder, AttachTarget::Artist(artist));
        ctx.add_target(folder, AttachTarget::Album(album));
        ctx.add_target(folder, AttachTarget::Album(album));
        ctx.record_art(folder, art);

        let mut pending = ctx.pending_attachments();
        pending.sort_by_key(|(t, _)| matches!(t, AttachTarget::Album(_)));
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].0, AttachTarget::Artist(artist));
        assert_eq!(pending[1].1.art, Some(art));
        assert_eq!(pending[1].1.metadata, None);
    }

    #[test]
    fn test_targets_without_attachables_are_skipped() {
        let mut ctx = ScanContext::new();
        ctx.add_target(Uuid::new_v4(), AttachTarget::Album(Uuid::new_v4()));
        let other = Uuid::new_v4();
        ctx.attachables.entry(other).or_default();
        ctx.add_target(other, AttachTarget::Album(Uuid::new_v4()));

        assert!(ctx.pending_attachments().is_empty());
    }
}
