//! Reconciliation of local albums against MusicBrainz and Discogs
//!
//! Albums still missing a provider id (or sharing one with another album)
//! are looked up on both providers concurrently. Found ids are written back
//! to the album and its artist, and provider metadata is merged into the
//! folder sidecars.

pub mod scoring;
pub mod sidecar;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::db::{AlbumForReconciliation, ArtistRecord, Database};
use crate::services::concurrency::{available_workers, stream_concurrent};
use crate::services::discogs::{self, DiscogsClient};
use crate::services::musicbrainz::{self, MusicBrainzClient};
use crate::services::text_utils::is_similar;

use scoring::{LocalTrack, best_release};
use sidecar::{AlbumMetadata, ArtistMetadata, DiscogsMetadata, MusicBrainzMetadata};

/// Albums reconciled at the same time
pub const DEFAULT_ALBUM_WORKERS: usize = 5;

#[derive(Debug, Clone)]
pub struct IntegratorConfig {
    pub album_workers: usize,
    /// Workers scoring candidate releases of one album
    pub scoring_workers: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            album_workers: DEFAULT_ALBUM_WORKERS,
            scoring_workers: available_workers(),
        }
    }
}

/// Totals of one reconciliation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntegratorReport {
    pub albums: usize,
    pub musicbrainz_matches: usize,
    pub discogs_matches: usize,
}

/// Provider results for one album
#[derive(Debug)]
pub struct AlbumLookup {
    pub entry: AlbumForReconciliation,
    pub release: Option<musicbrainz::Release>,
    pub master: Option<discogs::Master>,
}

#[derive(Clone)]
pub struct Integrator {
    db: Database,
    musicbrainz: Option<Arc<MusicBrainzClient>>,
    discogs: Option<Arc<DiscogsClient>>,
    config: IntegratorConfig,
}

impl Integrator {
    pub fn new(
        db: Database,
        musicbrainz: Option<MusicBrainzClient>,
        discogs: Option<DiscogsClient>,
        config: IntegratorConfig,
    ) -> Self {
        Self {
            db,
            musicbrainz: musicbrainz.map(Arc::new),
            discogs: discogs.map(Arc::new),
            config,
        }
    }

    pub fn has_providers(&self) -> bool {
        self.musicbrainz.is_some() || self.discogs.is_some()
    }

    /// Reconcile every album that still needs it
    pub async fn run_once(&self) -> Result<IntegratorReport> {
        let mut report = IntegratorReport::default();

        if !self.has_providers() {
            info!("No metadata providers configured, skipping reconciliation");
            return Ok(report);
        }

        let albums = self
            .db
            .albums()
            .list_needing_reconciliation()
            .await
            .context("Failed to list albums for reconciliation")?;
        let total = albums.len();
        info!(albums = total, "Starting metadata reconciliation");

        let lookups = stream_concurrent(albums, self.config.album_workers, |entry| {
            let this = self.clone();
            async move { this.lookup(entry).await }
        });
        let mut lookups = std::pin::pin!(lookups);

        while let Some(lookup) = lookups.next().await {
            report.albums += 1;
            info!(
                "{}",
                progress_line(
                    report.albums,
                    total,
                    &lookup.entry.artist_title,
                    &lookup.entry.album.title,
                    lookup.release.as_ref().map(|r| r.id.as_str()),
                    lookup.master.as_ref().map(|m| m.id),
                )
            );

            report.musicbrainz_matches += usize::from(lookup.release.is_some());
            report.discogs_matches += usize::from(lookup.master.is_some());

            if let Err(e) = self.apply(&lookup).await {
                warn!(album = %lookup.entry.album.title, error = %e, "Failed to store reconciliation result");
            }
        }

        if let Err(e) = self.db.checkpoint_wal().await {
            warn!(error = %e, "WAL checkpoint failed");
        }

        info!(
            albums = report.albums,
            musicbrainz = report.musicbrainz_matches,
            discogs = report.discogs_matches,
            "Metadata reconciliation complete"
        );
        Ok(report)
    }

    /// Query both providers for one album
    pub async fn lookup(&self, entry: AlbumForReconciliation) -> AlbumLookup {
        let (release, master) = tokio::join!(self.find_release(&entry), self.find_master(&entry));

        let release = release.unwrap_or_else(|e| {
            warn!(album = %entry.album.title, error = %e, "MusicBrainz lookup failed");
            None
        });
        let master = master.unwrap_or_else(|e| {
            warn!(album = %entry.album.title, error = %e, "Discogs lookup failed");
            None
        });

        AlbumLookup {
            entry,
            release,
            master,
        }
    }

    async fn find_release(
        &self,
        entry: &AlbumForReconciliation,
    ) -> Result<Option<musicbrainz::Release>> {
        let Some(client) = &self.musicbrainz else {
            return Ok(None);
        };
        let album = &entry.album;

        let groups = client
            .search_release_groups(&album.title, &entry.artist_title)
            .await?;

        let mut candidates = Vec::new();
        for group in &groups {
            for release in &group.releases {
                if is_similar(&album.title, &release.title) {
                    candidates.push(client.lookup_release(&release.id).await?);
                }
            }
        }
        debug!(album = %album.title, candidates = candidates.len(), "Scoring MusicBrainz releases");

        if candidates.is_empty() {
            return Ok(None);
        }

        let songs = match self.db.songs().list_for_album(album.id).await {
            Ok(songs) => Some(Arc::new(
                songs
                    .iter()
                    .map(|song| LocalTrack {
                        disc: song.disc_number(),
                        track: u32::try_from(song.track_number).unwrap_or(0),
                        title: song.title.clone(),
                    })
                    .collect::<Vec<_>>(),
            )),
            Err(e) => {
                warn!(album = %album.title, error = %e, "Failed to load songs for scoring");
                None
            }
        };

        let best = best_release(
            candidates,
            &album.title,
            &entry.artist_title,
            songs,
            self.config.scoring_workers,
        )
        .await;

        Ok(best.map(|scored| scored.release))
    }

    async fn find_master(&self, entry: &AlbumForReconciliation) -> Result<Option<discogs::Master>> {
        let Some(client) = &self.discogs else {
            return Ok(None);
        };

        let Some(hit) = client
            .search_master(&entry.artist_title, &entry.album.title)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(client.get_master(hit.master()).await?))
    }

    /// Write provider ids and sidecar metadata for one album
    pub async fn apply(&self, lookup: &AlbumLookup) -> Result<()> {
        let album = &lookup.entry.album;
        let release = lookup.release.as_ref();
        let master = lookup.master.as_ref();

        if release.is_none() && master.is_none() {
            return Ok(());
        }

        self.db
            .albums()
            .update_external_ids(
                album.id,
                release.map(|r| r.id.as_str()),
                master.map(|m| m.id),
            )
            .await?;

        let artist = self.db.artists().get_by_id(album.artist_id).await?;

        if let Some(artist) = &artist {
            let mb_ids = release
                .map(|r| matched_musicbrainz_artists(r, &artist.title))
                .unwrap_or_default();
            let discogs_ids = master
                .map(|m| matched_discogs_artists(m, &artist.title))
                .unwrap_or_default();

            if !mb_ids.is_empty() || !discogs_ids.is_empty() {
                self.db
                    .artists()
                    .update_external_ids(
                        artist.id,
                        Some(mb_ids.as_str()).filter(|s| !s.is_empty()),
                        Some(discogs_ids.as_str()).filter(|s| !s.is_empty()),
                    )
                    .await?;
            }
        }

        if let Some(metadata_id) = album.metadata_id
            && let Some(record) = self.db.metadata().get_by_id(metadata_id).await?
        {
            let path = Path::new(&record.path);
            let doc: AlbumMetadata = sidecar::read_document(path)?;
            let doc = doc.merge(&album.title, release, master);
            sidecar::write_document(path, &doc)?;
        }

        if let Some(artist) = &artist
            && artist.metadata_id.is_some()
            && artist.metadata_id != album.metadata_id
        {
            self.write_artist_metadata(artist, release, master).await?;
        }

        Ok(())
    }

    async fn write_artist_metadata(
        &self,
        artist: &ArtistRecord,
        release: Option<&musicbrainz::Release>,
        master: Option<&discogs::Master>,
    ) -> Result<()> {
        let Some(metadata_id) = artist.metadata_id else {
            return Ok(());
        };
        let Some(record) = self.db.metadata().get_by_id(metadata_id).await? else {
            return Ok(());
        };
        let path = Path::new(&record.path);

        let mut doc: ArtistMetadata = sidecar::read_document(path)?;
        doc.artist_name = artist.title.clone();

        if !doc.has_musicbrainz()
            && let (Some(client), Some(release)) = (&self.musicbrainz, release)
        {
            let mut details = Vec::new();
            for credited in credited_artists(release, &artist.title) {
                match client.lookup_artist(&credited.id).await {
                    Ok(detail) => details.push(detail),
                    Err(e) => warn!(artist = %credited.name, error = %e, "MusicBrainz artist lookup failed"),
                }
            }
            if !details.is_empty() {
                doc.musicbrainz = MusicBrainzMetadata::from_artists(&details);
            }
        }

        if !doc.has_discogs()
            && let (Some(client), Some(master)) = (&self.discogs, master)
        {
            let mut artists = Vec::new();
            for source in &master.artists {
                match client.get_artist(source.id).await {
                    Ok(found) => artists.push(found),
                    Err(e) => warn!(artist = %source.name, error = %e, "Discogs artist lookup failed"),
                }
            }
            if !artists.is_empty() {
                doc.discogs = DiscogsMetadata::from_artists(&artists);
            }
        }

        sidecar::write_document(path, &doc)
    }
}

/// Credited artists whose name appears verbatim in the local artist title.
///
/// Case matters: "Fleetwood Mac" names "Fleetwood Mac & Friends" but not
/// "FLEETWOOD MAC".
pub fn credited_artists<'a>(
    release: &'a musicbrainz::Release,
    local_artist: &str,
) -> Vec<&'a musicbrainz::Artist> {
    release
        .artist_credit
        .iter()
        .map(|credit| &credit.artist)
        .filter(|artist| local_artist.contains(artist.name.as_str()))
        .collect()
}

/// Comma separated MusicBrainz ids of the credits naming the local artist
pub fn matched_musicbrainz_artists(release: &musicbrainz::Release, local_artist: &str) -> String {
    let mut ids: Vec<&str> = Vec::new();
    for credit in &release.artist_credit {
        let id = credit.artist.id.as_str();
        if is_similar(&credit.artist.name, local_artist) && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids.join(",")
}

/// Comma separated Discogs ids of the master's artists naming the local artist
pub fn matched_discogs_artists(master: &discogs::Master, local_artist: &str) -> String {
    let mut ids: Vec<String> = Vec::new();
    for artist in &master.artists {
        let id = artist.id.to_string();
        if is_similar(&artist.name, local_artist) && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids.join(",")
}

/// Fit `value` into exactly `width` characters, truncating with "..."
pub fn format_field(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let kept: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        format!("{value:<width$}")
    }
}

fn progress_line(
    index: usize,
    total: usize,
    artist: &str,
    album: &str,
    musicbrainz_id: Option<&str>,
    discogs_id: Option<i64>,
) -> String {
    let discogs = discogs_id.map_or_else(|| "none".to_string(), |id| id.to_string());
    format!(
        "({index} of {total}) {} - {} MBID: {}\tDiscogsID: {discogs}",
        format_field(artist, 18),
        format_field(album, 18),
        format_field(musicbrainz_id.unwrap_or("none"), 13),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::{CreateAlbum, CreateArtist, CreateFolder, CreateMetadata, SongData};
    use crate::services::rate_limiter::RetryConfig;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn release() -> musicbrainz::Release {
        serde_json::from_str(
            r#"{
                "id": "3c7c4d6f-rumours",
                "title": "Rumours",
                "status": "Official",
                "artist-credit": [
                    {"artist": {"id": "mb-fm", "name": "Fleetwood Mac"}},
                    {"artist": {"id": "mb-other", "name": "Session Players"}}
                ],
                "media": [{"track-count": 1, "tracks": [{"id": "t1", "position": 1, "title": "Dreams"}]}]
            }"#,
        )
        .unwrap()
    }

    fn master() -> discogs::Master {
        serde_json::from_str(
            r#"{"id": 11, "title": "Rumours", "year": 1977, "artists": [{"id": 2, "name": "Fleetwood Mac"}]}"#,
        )
        .unwrap()
    }

    async fn library(dir: &Path) -> (Database, AlbumForReconciliation, uuid::Uuid) {
        let db = Database::connect_in_memory().await.unwrap();

        let artist_dir = dir.join("Fleetwood Mac");
        let album_dir = artist_dir.join("Rumours");
        std::fs::create_dir_all(&album_dir).unwrap();
        std::fs::write(artist_dir.join("metadata"), b"").unwrap();
        std::fs::write(album_dir.join("metadata"), b"").unwrap();

        let artist_folder = db
            .folders()
            .create(CreateFolder {
                parent_id: None,
                title: "Fleetwood Mac".to_string(),
                path: artist_dir.to_string_lossy().into_owned(),
            })
            .await
            .unwrap();
        let album_folder = db
            .folders()
            .create(CreateFolder {
                parent_id: Some(artist_folder.id),
                title: "Rumours".to_string(),
                path: album_dir.to_string_lossy().into_owned(),
            })
            .await
            .unwrap();

        let mut metadata_ids = Vec::new();
        for (folder, path) in [(&artist_folder, &artist_dir), (&album_folder, &album_dir)] {
            let record = db
                .metadata()
                .create(CreateMetadata {
                    folder_id: folder.id,
                    path: path.join("metadata").to_string_lossy().into_owned(),
                    file_size: 0,
                    modified_at: Utc::now(),
                })
                .await
                .unwrap();
            metadata_ids.push(record.id);
        }

        let artist = db
            .artists()
            .create(CreateArtist {
                title: "Fleetwood Mac".to_string(),
                normalized_title: "Fleetwood Mac".to_string(),
                folder_id: Some(artist_folder.id),
            })
            .await
            .unwrap();
        db.artists()
            .set_attachments(artist.id, None, Some(metadata_ids[0]))
            .await
            .unwrap();

        let album = db
            .albums()
            .create(CreateAlbum {
                artist_id: artist.id,
                folder_id: album_folder.id,
                title: "Rumours".to_string(),
                normalized_title: "Rumours".to_string(),
                year: Some(1977),
            })
            .await
            .unwrap();
        db.albums()
            .set_attachments(album.id, None, Some(metadata_ids[1]))
            .await
            .unwrap();

        let entry = db
            .albums()
            .list_needing_reconciliation()
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        (db, entry, artist.id)
    }

    #[test]
    fn test_format_field_pads_and_truncates() {
        assert_eq!(format_field("abc", 6), "abc   ");
        assert_eq!(format_field("Fleetwood Mac and Friends", 18), "Fleetwood Mac a...");
        assert_eq!(format_field("Fleetwood Mac and Friends", 18).chars().count(), 18);
        assert_eq!(format_field("Sigur Rósóóóóóóóóóóóóó", 10), "Sigur R...");
    }

    #[test]
    fn test_progress_line_without_ids() {
        let line = progress_line(1, 3, "Band", "Record", None, None);
        let expected = format!(
            "(1 of 3) {:<18} - {:<18} MBID: {:<13}\tDiscogsID: none",
            "Band", "Record", "none"
        );
        assert_eq!(line, expected);

        let line = progress_line(2, 3, "Band", "Record", Some("abc"), Some(42));
        assert!(line.ends_with("MBID: abc          \tDiscogsID: 42"));
    }

    #[test]
    fn test_matched_artist_ids() {
        assert_eq!(matched_musicbrainz_artists(&release(), "Fleetwood Mac"), "mb-fm");
        assert_eq!(matched_discogs_artists(&master(), "Fleetwood Mac"), "2");
        assert_eq!(matched_discogs_artists(&master(), "Someone Else"), "");
    }

    #[test]
    fn test_credited_artists_match_case_sensitively() {
        let names = |local: &str| {
            credited_artists(&release(), local)
                .into_iter()
                .map(|a| a.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names("Fleetwood Mac & Session Players"), vec!["mb-fm", "mb-other"]);
        assert_eq!(names("Fleetwood Mac"), vec!["mb-fm"]);
        assert!(names("FLEETWOOD MAC").is_empty());
    }

    #[tokio::test]
    async fn test_run_without_providers_does_nothing() {
        let db = Database::connect_in_memory().await.unwrap();
        let integrator = Integrator::new(db, None, None, IntegratorConfig::default());

        let report = integrator.run_once().await.unwrap();
        assert_eq!(report, IntegratorReport::default());
    }

    #[tokio::test]
    async fn test_apply_stores_ids_and_album_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let (db, entry, artist_id) = library(dir.path()).await;
        let album_id = entry.album.id;
        let integrator = Integrator::new(db.clone(), None, None, IntegratorConfig::default());

        let lookup = AlbumLookup {
            entry,
            release: Some(release()),
            master: Some(master()),
        };
        integrator.apply(&lookup).await.unwrap();

        let album = db.albums().get_by_id(album_id).await.unwrap().unwrap();
        assert_eq!(album.musicbrainz_id.as_deref(), Some("3c7c4d6f-rumours"));
        assert_eq!(album.discogs_id, Some(11));
        assert!(!album.needs_reconciliation);

        let artist = db.artists().get_by_id(artist_id).await.unwrap().unwrap();
        assert_eq!(artist.musicbrainz_id.as_deref(), Some("mb-fm"));
        assert_eq!(artist.discogs_id.as_deref(), Some("2"));

        let doc: AlbumMetadata =
            sidecar::read_document(&dir.path().join("Fleetwood Mac/Rumours/metadata")).unwrap();
        assert_eq!(doc.album_name, "Rumours");
        assert_eq!(doc.musicbrainz.release.id, "3c7c4d6f-rumours");
        assert_eq!(doc.discogs.year, 1977);

        // Artist sections need provider lookups, so only the name is filled
        let artist_doc: ArtistMetadata =
            sidecar::read_document(&dir.path().join("Fleetwood Mac/metadata")).unwrap();
        assert_eq!(artist_doc.artist_name, "Fleetwood Mac");
        assert!(!artist_doc.has_musicbrainz());
    }

    #[tokio::test]
    async fn test_apply_without_results_leaves_album_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (db, entry, _) = library(dir.path()).await;
        let album_id = entry.album.id;
        let integrator = Integrator::new(db.clone(), None, None, IntegratorConfig::default());

        integrator
            .apply(&AlbumLookup {
                entry,
                release: None,
                master: None,
            })
            .await
            .unwrap();

        let album = db.albums().get_by_id(album_id).await.unwrap().unwrap();
        assert!(album.needs_reconciliation);
        assert!(album.musicbrainz_id.is_none());
        let text = std::fs::read_to_string(dir.path().join("Fleetwood Mac/Rumours/metadata")).unwrap();
        assert!(text.is_empty());
    }

    async fn add_song(db: &Database, entry: &AlbumForReconciliation, dir: &Path, title: &str) {
        db.songs()
            .create(&SongData {
                artist_id: entry.album.artist_id,
                album_id: entry.album.id,
                folder_id: entry.album.folder_id,
                title: title.to_string(),
                normalized_title: title.to_string(),
                path: dir.join("01.mp3").to_string_lossy().into_owned(),
                file_size: 1024,
                file_type: "MP3".to_string(),
                modified_at: Utc::now(),
                bitrate: 320,
                channels: 2,
                sample_rate: 44_100,
                length_secs: 257,
                track_number: 1,
                disc: "01/01".to_string(),
                year: Some(1977),
                genre: None,
                comment: None,
            })
            .await
            .unwrap();
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            max_retries: 1,
            delay: Duration::from_millis(10),
        }
    }

    fn integrator_for(db: &Database, mb: &MockServer, dg: &MockServer) -> Integrator {
        let musicbrainz = MusicBrainzClient::new("tests@example.com", retry())
            .unwrap()
            .with_base_url(mb.uri());
        let discogs = DiscogsClient::new("secret", retry())
            .unwrap()
            .with_base_url(dg.uri());
        Integrator::new(
            db.clone(),
            Some(musicbrainz),
            Some(discogs),
            IntegratorConfig {
                album_workers: 2,
                scoring_workers: 2,
            },
        )
    }

    /// Search hit listing one matching and one unrelated release
    async fn mount_musicbrainz_match(mb: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/release-group"))
            .and(query_param("fmt", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "release-groups": [{
                    "id": "rg-1",
                    "title": "Rumours",
                    "releases": [
                        {"id": "rel-1", "title": "Rumours"},
                        {"id": "rel-2", "title": "Tusk"}
                    ]
                }]
            })))
            .expect(1)
            .mount(mb)
            .await;

        Mock::given(method("GET"))
            .and(path("/release/rel-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "rel-1",
                "title": "Rumours",
                "status": "Official",
                "artist-credit": [
                    {"name": "Fleetwood Mac", "artist": {"id": "mb-fm", "name": "Fleetwood Mac"}}
                ],
                "media": [{
                    "position": 1,
                    "track-count": 1,
                    "tracks": [{"id": "t-1", "position": 1, "title": "Dreams"}]
                }]
            })))
            .expect(1)
            .mount(mb)
            .await;

        Mock::given(method("GET"))
            .and(path("/release/rel-2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(mb)
            .await;

        Mock::given(method("GET"))
            .and(path("/artist/mb-fm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "mb-fm",
                "name": "Fleetwood Mac",
                "sort-name": "Fleetwood Mac",
                "tags": [{"name": "rock"}]
            })))
            .mount(mb)
            .await;
    }

    async fn mount_discogs_search(dg: &MockServer, results: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/database/search"))
            .and(header("Authorization", "Discogs token=secret"))
            .and(query_param("type", "master"))
            .and(query_param("release_title", "Rumours"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": results })))
            .expect(1)
            .mount(dg)
            .await;
    }

    #[tokio::test]
    async fn test_run_matches_both_providers() {
        let dir = tempfile::tempdir().unwrap();
        let (db, entry, artist_id) = library(dir.path()).await;
        add_song(&db, &entry, dir.path(), "Dreams").await;
        let (mb, dg) = (MockServer::start().await, MockServer::start().await);

        mount_musicbrainz_match(&mb).await;
        mount_discogs_search(&dg, json!([{"id": 11, "master_id": 11, "title": "Fleetwood Mac - Rumours"}]))
            .await;
        Mock::given(method("GET"))
            .and(path("/masters/11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 11,
                "title": "Rumours",
                "year": 1977,
                "artists": [{"id": 2, "name": "Fleetwood Mac"}],
                "tracklist": [{"position": "A1", "title": "Dreams", "duration": "4:17"}]
            })))
            .expect(1)
            .mount(&dg)
            .await;
        Mock::given(method("GET"))
            .and(path("/artists/2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "Fleetwood Mac"})),
            )
            .mount(&dg)
            .await;

        let report = integrator_for(&db, &mb, &dg).run_once().await.unwrap();
        assert_eq!(
            report,
            IntegratorReport {
                albums: 1,
                musicbrainz_matches: 1,
                discogs_matches: 1,
            }
        );

        let album = db.albums().get_by_id(entry.album.id).await.unwrap().unwrap();
        assert_eq!(album.musicbrainz_id.as_deref(), Some("rel-1"));
        assert_eq!(album.discogs_id, Some(11));
        assert!(!album.needs_reconciliation);

        let artist = db.artists().get_by_id(artist_id).await.unwrap().unwrap();
        assert_eq!(artist.musicbrainz_id.as_deref(), Some("mb-fm"));
        assert_eq!(artist.discogs_id.as_deref(), Some("2"));

        let doc: AlbumMetadata =
            sidecar::read_document(&dir.path().join("Fleetwood Mac/Rumours/metadata")).unwrap();
        assert_eq!(doc.musicbrainz.release.id, "rel-1");
        assert_eq!(doc.discogs.title, "Rumours");

        let artist_doc: ArtistMetadata =
            sidecar::read_document(&dir.path().join("Fleetwood Mac/metadata")).unwrap();
        assert!(artist_doc.has_musicbrainz());
        assert!(artist_doc.has_discogs());
    }

    #[tokio::test]
    async fn test_no_discogs_master_keeps_album_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (db, entry, _) = library(dir.path()).await;
        add_song(&db, &entry, dir.path(), "Dreams").await;
        let (mb, dg) = (MockServer::start().await, MockServer::start().await);

        mount_musicbrainz_match(&mb).await;
        mount_discogs_search(&dg, json!([])).await;

        let report = integrator_for(&db, &mb, &dg).run_once().await.unwrap();
        assert_eq!(report.musicbrainz_matches, 1);
        assert_eq!(report.discogs_matches, 0);

        let album = db.albums().get_by_id(entry.album.id).await.unwrap().unwrap();
        assert_eq!(album.musicbrainz_id.as_deref(), Some("rel-1"));
        assert!(album.discogs_id.is_none());
        assert!(album.needs_reconciliation);
    }

    #[tokio::test]
    async fn test_ambiguous_discogs_search_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (db, entry, _) = library(dir.path()).await;
        add_song(&db, &entry, dir.path(), "Dreams").await;
        let (mb, dg) = (MockServer::start().await, MockServer::start().await);

        mount_musicbrainz_match(&mb).await;
        mount_discogs_search(
            &dg,
            json!([
                {"id": 11, "master_id": 11, "title": "Fleetwood Mac - Rumours"},
                {"id": 12, "master_id": 12, "title": "Fleetwood Mac - Rumours Live"}
            ]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/masters/11"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&dg)
            .await;

        let report = integrator_for(&db, &mb, &dg).run_once().await.unwrap();
        assert_eq!(report.discogs_matches, 0);

        let album = db.albums().get_by_id(entry.album.id).await.unwrap().unwrap();
        assert!(album.discogs_id.is_none());
        assert!(album.needs_reconciliation);
    }

    #[tokio::test]
    async fn test_server_errors_leave_album_for_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (db, entry, _) = library(dir.path()).await;
        add_song(&db, &entry, dir.path(), "Dreams").await;
        let (mb, dg) = (MockServer::start().await, MockServer::start().await);

        // one attempt plus one retry on each provider
        Mock::given(method("GET"))
            .and(path("/release-group"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&mb)
            .await;
        Mock::given(method("GET"))
            .and(path("/database/search"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&dg)
            .await;

        let report = integrator_for(&db, &mb, &dg).run_once().await.unwrap();
        assert_eq!(
            report,
            IntegratorReport {
                albums: 1,
                musicbrainz_matches: 0,
                discogs_matches: 0,
            }
        );

        let album = db.albums().get_by_id(entry.album.id).await.unwrap().unwrap();
        assert!(album.musicbrainz_id.is_none());
        assert!(album.needs_reconciliation);
        let text =
            std::fs::read_to_string(dir.path().join("Fleetwood Mac/Rumours/metadata")).unwrap();
        assert!(text.is_empty());

        let pending = db.albums().list_needing_reconciliation().await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_release_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (db, entry, _) = library(dir.path()).await;
        let (mb, dg) = (MockServer::start().await, MockServer::start().await);

        Mock::given(method("GET"))
            .and(path("/release-group"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mb)
            .await;
        mount_discogs_search(&dg, json!([])).await;

        let lookup = integrator_for(&db, &mb, &dg).lookup(entry).await;
        assert!(lookup.release.is_none());
        assert!(lookup.master.is_none());
    }
}
