//! Provider metadata written to the per-folder `metadata` sidecar
//!
//! Sections are filled once: a section already populated by an earlier run
//! is kept as is.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::discogs;
use crate::services::musicbrainz;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumMetadata {
    pub album_name: String,
    pub musicbrainz: MusicBrainzMetadata,
    pub discogs: DiscogsMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistMetadata {
    pub artist_name: String,
    pub musicbrainz: MusicBrainzMetadata,
    pub discogs: DiscogsMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicBrainzMetadata {
    pub artists: Vec<MusicBrainzArtist>,
    pub associated_acts: Vec<AssociatedAct>,
    pub related_urls: Vec<RelatedUrl>,
    pub related_tags: Vec<String>,
    pub release: MusicBrainzRelease,
    pub release_groups: Vec<MusicBrainzReleaseGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicBrainzArtist {
    pub id: String,
    pub name: String,
    pub disambiguation: String,
    pub sort_name: String,
    #[serde(rename = "type")]
    pub artist_type: String,
    pub aliases: Vec<MusicBrainzAlias>,
    pub area: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicBrainzAlias {
    pub name: String,
    #[serde(rename = "type")]
    pub alias_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociatedAct {
    pub id: String,
    pub name: String,
    pub disambiguation: String,
    #[serde(rename = "type")]
    pub act_type: String,
    pub relation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedUrl {
    #[serde(rename = "type")]
    pub url_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicBrainzRelease {
    pub id: String,
    pub title: String,
    pub disambiguation: String,
    pub status: String,
    pub disc_count: u32,
    pub track_count: u32,
    pub tracks: Vec<MusicBrainzTrack>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicBrainzTrack {
    pub id: String,
    pub title: String,
    pub number: u32,
    /// Milliseconds
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicBrainzReleaseGroup {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub group_type: String,
    pub release_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscogsMetadata {
    pub styles: Vec<String>,
    pub genres: Vec<String>,
    pub title: String,
    pub year: i32,
    pub tracklist: Vec<DiscogsTrack>,
    pub artists: Vec<DiscogsArtist>,
    pub images: Vec<DiscogsImage>,
    pub videos: Vec<DiscogsVideo>,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscogsTrack {
    pub duration: String,
    pub position: String,
    pub title: String,
    #[serde(rename = "type")]
    pub track_type: String,
    pub extra_artists: Vec<DiscogsArtist>,
    pub artists: Vec<DiscogsArtist>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscogsArtist {
    pub id: i64,
    pub name: String,
    pub real_name: String,
    pub resource_url: String,
    pub role: String,
    pub tracks: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscogsImage {
    pub height: u32,
    pub width: u32,
    pub resource_url: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscogsVideo {
    pub description: String,
    pub duration: u32,
    pub title: String,
    pub uri: String,
}

impl From<&musicbrainz::Artist> for MusicBrainzArtist {
    fn from(artist: &musicbrainz::Artist) -> Self {
        Self {
            id: artist.id.clone(),
            name: artist.name.clone(),
            disambiguation: artist.disambiguation.clone(),
            sort_name: artist.sort_name.clone(),
            artist_type: artist.artist_type.clone().unwrap_or_default(),
            aliases: artist
                .aliases
                .iter()
                .map(|a| MusicBrainzAlias {
                    name: a.name.clone(),
                    alias_type: a.alias_type.clone().unwrap_or_default(),
                })
                .collect(),
            area: artist
                .area
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            country: artist.country.clone().unwrap_or_default(),
        }
    }
}

fn related_urls(relations: &[musicbrainz::Relation]) -> impl Iterator<Item = RelatedUrl> + '_ {
    relations.iter().filter_map(|rel| {
        rel.url.as_ref().map(|url| RelatedUrl {
            url_type: rel.relation_type.clone(),
            url: url.resource.clone(),
        })
    })
}

impl MusicBrainzMetadata {
    /// Album section built from a resolved release
    pub fn from_release(release: &musicbrainz::Release) -> Self {
        let tracks: Vec<MusicBrainzTrack> = release
            .media
            .iter()
            .flat_map(|medium| &medium.tracks)
            .map(|track| MusicBrainzTrack {
                id: track.id.clone(),
                title: track.display_title().to_string(),
                number: track.position,
                length: track.length.unwrap_or_default(),
            })
            .collect();

        Self {
            artists: release
                .artist_credit
                .iter()
                .map(|credit| MusicBrainzArtist::from(&credit.artist))
                .collect(),
            associated_acts: Vec::new(),
            related_urls: related_urls(&release.relations).collect(),
            related_tags: Vec::new(),
            release: MusicBrainzRelease {
                id: release.id.clone(),
                title: release.title.clone(),
                disambiguation: release.disambiguation.clone(),
                status: release
                    .status
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
                disc_count: release.media.len() as u32,
                track_count: release.media.iter().map(|m| m.track_count).sum(),
                tracks,
            },
            release_groups: release
                .release_group
                .iter()
                .map(|group| MusicBrainzReleaseGroup {
                    id: group.id.clone(),
                    title: group.title.clone(),
                    group_type: group.primary_type.clone().unwrap_or_default(),
                    release_date: String::new(),
                })
                .collect(),
        }
    }

    /// Artist section built from artist lookups
    pub fn from_artists(details: &[musicbrainz::ArtistDetail]) -> Self {
        let mut section = Self::default();
        let mut tags = BTreeSet::new();

        for detail in details {
            section.artists.push(MusicBrainzArtist::from(&detail.artist));

            for rel in &detail.relations {
                if let Some(act) = &rel.artist {
                    section.associated_acts.push(AssociatedAct {
                        id: act.id.clone(),
                        name: act.name.clone(),
                        disambiguation: act.disambiguation.clone(),
                        act_type: act.artist_type.clone().unwrap_or_default(),
                        relation: rel.relation_type.clone(),
                    });
                }
            }
            section.related_urls.extend(related_urls(&detail.relations));

            section
                .release_groups
                .extend(detail.release_groups.iter().map(|group| MusicBrainzReleaseGroup {
                    id: group.id.clone(),
                    title: group.title.clone(),
                    group_type: group.primary_type.clone().unwrap_or_default(),
                    release_date: group.first_release_date.clone().unwrap_or_default(),
                }));

            tags.extend(detail.tags.iter().map(|t| t.name.clone()));
        }

        section.related_tags = tags.into_iter().collect();
        section
    }
}

impl From<&discogs::ArtistSource> for DiscogsArtist {
    fn from(source: &discogs::ArtistSource) -> Self {
        Self {
            id: source.id,
            name: source.name.clone(),
            resource_url: source.resource_url.clone(),
            role: source.role.clone(),
            tracks: source.tracks.clone(),
            ..Default::default()
        }
    }
}

impl DiscogsMetadata {
    /// Album section built from a master release
    pub fn from_master(master: &discogs::Master) -> Self {
        Self {
            styles: master.styles.clone(),
            genres: master.genres.clone(),
            title: master.title.clone(),
            year: master.year,
            tracklist: master
                .tracklist
                .iter()
                .map(|track| DiscogsTrack {
                    duration: track.duration.clone(),
                    position: track.position.clone(),
                    title: track.title.clone(),
                    track_type: track.track_type.clone(),
                    extra_artists: track.extraartists.iter().map(DiscogsArtist::from).collect(),
                    artists: track.artists.iter().map(DiscogsArtist::from).collect(),
                })
                .collect(),
            artists: master.artists.iter().map(DiscogsArtist::from).collect(),
            images: master
                .images
                .iter()
                .map(|img| DiscogsImage {
                    height: img.height,
                    width: img.width,
                    resource_url: img.resource_url.clone(),
                    image_type: img.image_type.clone(),
                    uri: img.uri.clone(),
                })
                .collect(),
            videos: master
                .videos
                .iter()
                .map(|video| DiscogsVideo {
                    description: video.description.clone(),
                    duration: video.duration,
                    title: video.title.clone(),
                    uri: video.uri.clone(),
                })
                .collect(),
            uri: master.uri.clone(),
        }
    }

    /// Artist section built from artist lookups
    pub fn from_artists(artists: &[discogs::Artist]) -> Self {
        Self {
            artists: artists
                .iter()
                .map(|artist| DiscogsArtist {
                    id: artist.id,
                    name: artist.name.clone(),
                    real_name: artist.realname.clone(),
                    resource_url: artist.resource_url.clone(),
                    members: artist.members.iter().map(|m| m.name.clone()).collect(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

impl AlbumMetadata {
    pub fn has_musicbrainz(&self) -> bool {
        !self.musicbrainz.release.title.is_empty()
    }

    pub fn has_discogs(&self) -> bool {
        !self.discogs.title.is_empty()
    }

    /// Fill the sections that are still empty
    pub fn merge(
        mut self,
        album_name: &str,
        release: Option<&musicbrainz::Release>,
        master: Option<&discogs::Master>,
    ) -> Self {
        self.album_name = album_name.to_string();
        if !self.has_musicbrainz()
            && let Some(release) = release
        {
            self.musicbrainz = MusicBrainzMetadata::from_release(release);
        }
        if !self.has_discogs()
            && let Some(master) = master
        {
            self.discogs = DiscogsMetadata::from_master(master);
        }
        self
    }
}

impl ArtistMetadata {
    pub fn has_musicbrainz(&self) -> bool {
        !self.musicbrainz.artists.is_empty()
    }

    pub fn has_discogs(&self) -> bool {
        !self.discogs.artists.is_empty()
    }
}

/// Read a sidecar document. An empty or unreadable document reads as default.
pub fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read metadata file {}", path.display()))?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    match serde_json::from_slice(&bytes) {
        Ok(doc) => Ok(doc),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unparseable metadata file, starting over");
            Ok(T::default())
        }
    }
}

/// Write a sidecar document as 2-space indented JSON
pub fn write_document<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(doc).context("Failed to serialize metadata")?;
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write metadata file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn release() -> musicbrainz::Release {
        serde_json::from_str(
            r#"{
                "id": "rel-1",
                "title": "Rumours",
                "disambiguation": "",
                "status": "Official",
                "artist-credit": [{"name": "Fleetwood Mac", "artist": {"id": "mb-fm", "name": "Fleetwood Mac", "sort-name": "Fleetwood Mac"}}],
                "media": [{"position": 1, "track-count": 2, "tracks": [
                    {"id": "t1", "number": "1", "position": 1, "title": "Second Hand News", "length": 163000},
                    {"id": "t2", "number": "2", "position": 2, "title": "", "recording": {"id": "r2", "title": "Dreams"}}
                ]}],
                "release-group": {"id": "rg-1", "title": "Rumours", "primary-type": "Album"},
                "relations": [{"type": "discogs", "target-type": "url", "url": {"resource": "https://www.discogs.com/master/11"}}]
            }"#,
        )
        .unwrap()
    }

    fn master() -> discogs::Master {
        serde_json::from_str(
            r#"{
                "id": 11, "title": "Rumours", "year": 1977, "uri": "https://www.discogs.com/master/11",
                "genres": ["Rock"],
                "tracklist": [{"position": "A1", "type_": "track", "title": "Second Hand News", "duration": "2:43"}],
                "artists": [{"id": 2, "name": "Fleetwood Mac"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_album_section_from_release() {
        let section = MusicBrainzMetadata::from_release(&release());
        assert_eq!(section.release.track_count, 2);
        assert_eq!(section.release.disc_count, 1);
        assert_eq!(section.release.tracks[1].title, "Dreams");
        assert_eq!(section.release_groups[0].group_type, "Album");
        assert_eq!(section.related_urls[0].url_type, "discogs");
        assert_eq!(section.artists[0].area, "Unknown");
    }

    #[test]
    fn test_discogs_tracklist_is_kept() {
        let section = DiscogsMetadata::from_master(&master());
        assert_eq!(section.tracklist.len(), 1);
        assert_eq!(section.tracklist[0].position, "A1");
        assert_eq!(section.artists[0].name, "Fleetwood Mac");
    }

    #[test]
    fn test_merge_keeps_populated_sections() {
        let existing = AlbumMetadata {
            album_name: "Rumours".to_string(),
            discogs: DiscogsMetadata {
                title: "Hand Edited".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = existing.merge("Rumours", Some(&release()), Some(&master()));
        assert!(merged.has_musicbrainz());
        assert_eq!(merged.discogs.title, "Hand Edited");
    }

    #[test]
    fn test_merge_without_results_is_unchanged() {
        let merged = AlbumMetadata::default().merge("Rumours", None, None);
        assert_eq!(merged.album_name, "Rumours");
        assert!(!merged.has_musicbrainz());
        assert!(!merged.has_discogs());
    }

    #[test]
    fn test_document_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata");
        std::fs::write(&path, b"").unwrap();

        let empty: AlbumMetadata = read_document(&path).unwrap();
        assert_eq!(empty, AlbumMetadata::default());

        let doc = empty.merge("Rumours", Some(&release()), None);
        write_document(&path, &doc).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"album_name\": \"Rumours\""));
        let read_back: AlbumMetadata = read_document(&path).unwrap();
        assert_eq!(read_back, doc);
    }

    #[test]
    fn test_garbage_document_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata");
        std::fs::write(&path, b"not json").unwrap();

        let doc: ArtistMetadata = read_document(&path).unwrap();
        assert!(!doc.has_musicbrainz());
    }
}
