//! Discogs API client for album reconciliation
//!
//! Base URL: https://api.discogs.com
//!
//! Searching the database requires a personal access token. Authenticated
//! clients may make 60 requests per minute.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::rate_limiter::{RateLimitedClient, ResponseExt, RetryConfig, retry_async};
use super::text_utils::strip_all_parentheses;

/// Discogs API client with rate limiting
pub struct DiscogsClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    user_agent: String,
    authorization: String,
    retry_config: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub id: i64,
    pub master_id: Option<i64>,
    #[serde(default)]
    pub title: String,
}

impl SearchResult {
    /// Master id of a master search hit
    pub fn master(&self) -> i64 {
        self.master_id.filter(|id| *id > 0).unwrap_or(self.id)
    }
}

/// Master release
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Master {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub tracklist: Vec<MasterTrack>,
    #[serde(default)]
    pub artists: Vec<ArtistSource>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub videos: Vec<Video>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MasterTrack {
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type_", default)]
    pub track_type: String,
    #[serde(default)]
    pub extraartists: Vec<ArtistSource>,
    #[serde(default)]
    pub artists: Vec<ArtistSource>,
}

/// Artist credit on a master or track
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistSource {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub resource_url: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub tracks: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub resource_url: String,
    #[serde(rename = "type", default)]
    pub image_type: String,
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Video {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uri: String,
}

/// Artist lookup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub realname: String,
    #[serde(default)]
    pub resource_url: String,
    #[serde(default)]
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub id: i64,
    pub name: String,
}

impl DiscogsClient {
    /// Create a new Discogs client authenticated with a personal access token
    pub fn new(token: &str, retry_config: RetryConfig) -> Result<Self> {
        Ok(Self {
            client: Arc::new(RateLimitedClient::for_discogs()?),
            base_url: "https://api.discogs.com".to_string(),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            authorization: format!("Discogs token={}", token),
            retry_config,
        })
    }

    /// Point the client at another API root, e.g. a mirror
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Search for the master of an album.
    ///
    /// Parentheticals are stripped from the title first. Only a search that
    /// returns exactly one result is accepted.
    pub async fn search_master(&self, artist: &str, album_title: &str) -> Result<Option<SearchResult>> {
        let release_title = strip_all_parentheses(album_title);
        debug!(artist = %artist, release_title = %release_title, "Searching Discogs masters");

        let response: SearchResponse = self
            .get_json(
                "database/search",
                vec![
                    ("artist", artist.to_string()),
                    ("release_title", release_title),
                    ("type", "master".to_string()),
                    ("per_page", "1".to_string()),
                ],
                "discogs_search_master",
            )
            .await?;

        Ok(single_result(response.results))
    }

    pub async fn get_master(&self, id: i64) -> Result<Master> {
        self.get_json(&format!("masters/{}", id), Vec::new(), "discogs_get_master")
            .await
    }

    pub async fn get_artist(&self, id: i64) -> Result<Artist> {
        self.get_json(&format!("artists/{}", id), Vec::new(), "discogs_get_artist")
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(&'static str, String)>,
        operation: &str,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);

        retry_async(
            || {
                let url = url.clone();
                let query = query.clone();
                async move {
                    let response = self
                        .client
                        .get_with_headers_and_query(
                            &url,
                            &[
                                ("User-Agent", self.user_agent.as_str()),
                                ("Authorization", self.authorization.as_str()),
                            ],
                            &query,
                        )
                        .await
                        .map_err(backoff::Error::transient)?;

                    if !response.status().is_success() {
                        return Err(response.into_retry_error("Discogs"));
                    }

                    response
                        .json::<T>()
                        .await
                        .context("Failed to parse Discogs response")
                        .map_err(backoff::Error::permanent)
                }
            },
            &self.retry_config,
            operation,
        )
        .await
    }
}

/// The only result of a search, if there is exactly one
fn single_result(mut results: Vec<SearchResult>) -> Option<SearchResult> {
    if results.len() == 1 { results.pop() } else { None }
}
