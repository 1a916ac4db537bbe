//! Integration tests for the indexing pipeline
//!
//! These drive the public API end to end over a real folder tree:
//! - media scan of a fresh library, then an idle rescan
//! - orphan scans after files and folders disappear
//! - the task queue running the startup scans

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use media_indexer::db::Database;
use media_indexer::media::{RawTags, TagError, TagReader};
use media_indexer::services::{Scanner, Task, TaskManager};

/// Tags keyed on the file stem: `<artist>_<album>_<track>`
struct StemTags;

impl TagReader for StemTags {
    fn read(&self, path: &Path) -> Result<RawTags, TagError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() != 3 {
            return Err(TagError::Read {
                path: path.to_path_buf(),
                message: "unparseable".to_string(),
            });
        }

        Ok(RawTags {
            album_artist: Some(parts[0].to_string()),
            album: Some(parts[1].to_string()),
            title: Some(format!("Track {}", parts[2])),
            track: parts[2].parse().ok(),
            bitrate: 256,
            channels: 2,
            sample_rate: 48_000,
            duration: Duration::from_secs(240),
            ..Default::default()
        })
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `<root>/Band/Record/{Band_Record_1.mp3, Band_Record_2.mp3, cover.jpg}`
fn library() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let album = dir.path().join("Band").join("Record");
    fs::create_dir_all(&album).unwrap();
    fs::write(album.join("Band_Record_1.mp3"), b"audio one").unwrap();
    fs::write(album.join("Band_Record_2.mp3"), b"audio two").unwrap();
    fs::write(album.join("cover.jpg"), b"image").unwrap();
    dir
}

async fn run(scanner: &Scanner, task: Task) -> u64 {
    let outcome = scanner.run(&task, &CancellationToken::new()).await.unwrap();
    assert!(!outcome.cancelled);
    outcome.changes
}

#[tokio::test]
async fn test_scan_rescan_and_orphan_cleanup() {
    let dir = library();
    let root = dir.path();
    let album_dir = root.join("Band").join("Record");
    let db = Database::connect_in_memory().await.unwrap();
    let scanner = Scanner::new(db.clone(), Arc::new(StemTags));

    // three folders, one art, one artist, one album, two songs
    assert_eq!(run(&scanner, Task::media_scan(root).verbose(true)).await, 8);
    for folder in [root.to_path_buf(), root.join("Band"), album_dir.clone()] {
        assert!(folder.join("metadata").exists());
    }

    let song = db
        .songs()
        .get_by_path(&key(&album_dir.join("Band_Record_2.mp3")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(song.track_number, 2);
    assert_eq!(song.title, "Track 2");

    let album = db.albums().get_by_id(song.album_id).await.unwrap().unwrap();
    assert!(album.art_id.is_some());
    assert!(album.metadata_id.is_some());

    assert_eq!(run(&scanner, Task::media_scan(root)).await, 0);

    // a single deleted file only drops its song
    fs::remove_file(album_dir.join("Band_Record_2.mp3")).unwrap();
    assert_eq!(
        run(&scanner, Task::orphan_scan(album_dir.join("Band_Record_2.mp3"))).await,
        1
    );
    assert!(
        db.albums()
            .get_by_id(song.album_id)
            .await
            .unwrap()
            .is_some()
    );

    // the whole artist folder going away takes everything below it
    fs::remove_dir_all(root.join("Band")).unwrap();
    // art, song, two folders, album, artist
    assert_eq!(run(&scanner, Task::retain_only(root).verbose(true)).await, 6);
    assert!(db.artists().get_by_normalized_title("Band").await.unwrap().is_none());
    assert!(db.folders().get_by_path(&key(root)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_moved_album_is_reindexed_under_new_path() {
    let dir = library();
    let root = dir.path();
    let db = Database::connect_in_memory().await.unwrap();
    let scanner = Scanner::new(db.clone(), Arc::new(StemTags));
    run(&scanner, Task::media_scan(root)).await;

    let old = root.join("Band").join("Record");
    let new = root.join("Band").join("Record (Remaster)");
    fs::rename(&old, &new).unwrap();

    // what the watch queues for a move
    run(&scanner, Task::orphan_scan(&old)).await;
    run(&scanner, Task::media_scan(&new)).await;

    assert!(
        db.songs()
            .get_by_path(&key(&old.join("Band_Record_1.mp3")))
            .await
            .unwrap()
            .is_none()
    );
    let moved = db
        .songs()
        .get_by_path(&key(&new.join("Band_Record_1.mp3")))
        .await
        .unwrap()
        .unwrap();
    let artist = db
        .artists()
        .get_by_normalized_title("Band")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.artist_id, artist.id);
}

#[tokio::test]
async fn test_task_manager_runs_startup_scans() {
    let dir = library();
    let db = Database::connect_in_memory().await.unwrap();
    let manager = TaskManager::new(Scanner::new(db.clone(), Arc::new(StemTags)), 10);

    manager.queue_initial_scans(dir.path()).await.unwrap();
    manager.start().unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(10), manager.initial_scans().wait())
        .await
        .unwrap();
    assert!(finished);
    assert!(manager.last_change().is_some());

    let pending = db.albums().list_needing_reconciliation().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].artist_title, "Band");
    assert_eq!(pending[0].album.title, "Record");

    manager.shutdown().await;
    assert!(!manager.is_running());
}
