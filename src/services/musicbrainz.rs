//! MusicBrainz API client for album reconciliation
//!
//! MusicBrainz is a free, open music encyclopedia that provides metadata.
//! Base URL: https://musicbrainz.org/ws/2
//!
//! Rate limiting: MusicBrainz requires at least 1 second between requests.
//! User-Agent header is required with app name, version, and contact.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::rate_limiter::{RateLimitedClient, ResponseExt, RetryConfig, retry_async};
use super::text_utils::strip_all_parentheses;

/// Release groups requested per search
pub const SEARCH_LIMIT: u32 = 10;

const RELEASE_INCLUDES: &str = "recordings+artists+release-groups+url-rels";
const ARTIST_INCLUDES: &str = "tags+aliases+release-groups+artist-rels+url-rels";

/// MusicBrainz API client with rate limiting
pub struct MusicBrainzClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    user_agent: String,
    retry_config: RetryConfig,
}

/// Release group search result
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseGroupSearch {
    #[serde(rename = "release-groups", default)]
    pub release_groups: Vec<ReleaseGroupHit>,
}

/// Release group as returned by search, with its releases listed
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseGroupHit {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub releases: Vec<ReleaseRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseRef {
    pub id: String,
    pub title: String,
}

/// Fully resolved release
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Release {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub disambiguation: String,
    pub status: Option<String>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    pub media: Vec<Medium>,
    #[serde(rename = "release-group")]
    pub release_group: Option<ReleaseGroupRef>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistCredit {
    /// Name as credited on this release
    pub name: Option<String>,
    pub artist: Artist,
}

/// Artist as embedded in credits and relations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(rename = "sort-name", default)]
    pub sort_name: String,
    #[serde(default)]
    pub disambiguation: String,
    #[serde(rename = "type")]
    pub artist_type: Option<String>,
    pub country: Option<String>,
    pub area: Option<Area>,
    #[serde(default)]
    pub aliases: Vec<Alias>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Area {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alias {
    pub name: String,
    #[serde(rename = "type")]
    pub alias_type: Option<String>,
}

/// Medium (disc) in a release
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Medium {
    pub position: Option<u32>,
    #[serde(rename = "track-count", default)]
    pub track_count: u32,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Track position on a medium
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub number: String,
    pub position: u32,
    #[serde(default)]
    pub title: String,
    pub length: Option<u64>, // milliseconds
    pub recording: Option<Recording>,
}

impl Track {
    /// The track title, falling back to the recording's title
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            self.recording
                .as_ref()
                .map(|r| r.title.as_str())
                .unwrap_or_default()
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recording {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseGroupRef {
    pub id: String,
    pub title: String,
    #[serde(rename = "primary-type")]
    pub primary_type: Option<String>,
}

/// Relationship entry; `target-type` decides which payload is present
#[derive(Debug, Clone, Deserialize)]
pub struct Relation {
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(rename = "target-type")]
    pub target_type: Option<String>,
    pub url: Option<UrlTarget>,
    pub artist: Option<Artist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlTarget {
    pub resource: String,
}

/// Artist lookup with tags, aliases, release groups and relations
#[derive(Debug, Clone, Deserialize)]
pub struct ArtistDetail {
    #[serde(flatten)]
    pub artist: Artist,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(rename = "release-groups", default)]
    pub release_groups: Vec<ArtistReleaseGroup>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistReleaseGroup {
    pub id: String,
    pub title: String,
    #[serde(rename = "primary-type")]
    pub primary_type: Option<String>,
    #[serde(rename = "first-release-date")]
    pub first_release_date: Option<String>,
}

/// Build the release group search query for an album.
///
/// Matches the parenthetical-free title accent-insensitively, the exact
/// release title, or the artist.
pub fn release_group_query(album_title: &str, artist: &str) -> String {
    format!(
        r#"releasegroupaccent:"{}" OR release:"{}" OR artist:"{}""#,
        escape_phrase(&strip_all_parentheses(album_title)),
        escape_phrase(album_title),
        escape_phrase(artist)
    )
}

/// Escape the characters that would end a quoted Lucene phrase
fn escape_phrase(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl MusicBrainzClient {
    /// Create a new MusicBrainz client
    pub fn new(contact: &str, retry_config: RetryConfig) -> Result<Self> {
        Ok(Self {
            client: Arc::new(RateLimitedClient::for_musicbrainz()?),
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            user_agent: format!(
                "{}/{} ( {} )",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                contact
            ),
            retry_config,
        })
    }

    /// Point the client at another API root, e.g. a mirror
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Search release groups for an album
    pub async fn search_release_groups(
        &self,
        album_title: &str,
        artist: &str,
    ) -> Result<Vec<ReleaseGroupHit>> {
        let query = release_group_query(album_title, artist);
        debug!(query = %query, "Searching MusicBrainz release groups");

        let results: ReleaseGroupSearch = self
            .get_json(
                "release-group",
                vec![
                    ("query", query),
                    ("limit", SEARCH_LIMIT.to_string()),
                ],
                "musicbrainz_search_release_groups",
            )
            .await?;

        debug!(
            count = results.release_groups.len(),
            "MusicBrainz release group search returned results"
        );
        Ok(results.release_groups)
    }

    /// Resolve a release with recordings, artist credits, release group and URLs
    pub async fn lookup_release(&self, id: &str) -> Result<Release> {
        self.get_json(
            &format!("release/{}", id),
            vec![("inc", RELEASE_INCLUDES.to_string())],
            "musicbrainz_lookup_release",
        )
        .await
    }

    /// Resolve an artist with tags, aliases, release groups and relations
    pub async fn lookup_artist(&self, id: &str) -> Result<ArtistDetail> {
        self.get_json(
            &format!("artist/{}", id),
            vec![("inc", ARTIST_INCLUDES.to_string())],
            "musicbrainz_lookup_artist",
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        mut query: Vec<(&'static str, String)>,
        operation: &str,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        query.push(("fmt", "json".to_string()));

        retry_async(
            || {
                let url = url.clone();
                let query = query.clone();
                async move {
                    let response = self
                        .client
                        .get_with_headers_and_query(
                            &url,
                            &[("User-Agent", self.user_agent.as_str())],
                            &query,
                        )
                        .await
                        .map_err(backoff::Error::transient)?;

                    if !response.status().is_success() {
                        return Err(response.into_retry_error("MusicBrainz"));
                    }

                    response
                        .json::<T>()
                        .await
                        .context("Failed to parse MusicBrainz response")
                        .map_err(backoff::Error::permanent)
                }
            },
            &self.retry_config,
            operation,
        )
        .await
    }
}
