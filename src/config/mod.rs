//! Application configuration management

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::services::concurrency::available_workers;
use crate::services::integrator::{DEFAULT_ALBUM_WORKERS, IntegratorConfig};
use crate::services::rate_limiter::RetryConfig;

const DEFAULT_CONTACT: &str = "https://github.com/media-indexer/media-indexer";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Media library root path
    pub media_path: PathBuf,

    /// SQLite database file
    pub database_url: String,

    pub database_max_connections: u32,

    /// Discogs personal access token. Discogs lookups are disabled without one.
    pub discogs_token: Option<String>,

    /// Contact part of the MusicBrainz user agent
    pub musicbrainz_contact: String,

    /// MusicBrainz API root override, e.g. a local mirror
    pub musicbrainz_url: Option<String>,

    pub discogs_url: Option<String>,

    pub integrator_interval: Duration,

    pub integrator_workers: usize,

    pub scoring_workers: usize,

    pub request_max_retries: u32,

    pub request_retry_delay: Duration,

    pub task_queue_capacity: usize,
}

impl Config {
    /// Load configuration from `.env` and the environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "./data/media-indexer.db".to_string());

        let media_path = expand_home(
            &env::var("MEDIA_PATH").unwrap_or_else(|_| "~/Music".to_string()),
        );

        Ok(Self {
            media_path,
            database_url,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            discogs_token: env::var("DISCOGS_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            musicbrainz_contact: env::var("MUSICBRAINZ_CONTACT")
                .unwrap_or_else(|_| DEFAULT_CONTACT.to_string()),
            musicbrainz_url: env::var("MUSICBRAINZ_URL").ok().filter(|u| !u.trim().is_empty()),
            discogs_url: env::var("DISCOGS_URL").ok().filter(|u| !u.trim().is_empty()),
            integrator_interval: Duration::from_secs(
                parse_var::<u64>("INTEGRATOR_INTERVAL_HOURS", 24)? * 3600,
            ),
            integrator_workers: parse_var("INTEGRATOR_WORKERS", DEFAULT_ALBUM_WORKERS)?.max(1),
            scoring_workers: parse_var("SCORING_WORKERS", available_workers())?.max(1),
            request_max_retries: parse_var("REQUEST_MAX_RETRIES", 20)?,
            request_retry_delay: Duration::from_secs(parse_var("REQUEST_RETRY_DELAY_SECS", 3)?),
            task_queue_capacity: parse_var("TASK_QUEUE_CAPACITY", 10)?,
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.request_max_retries,
            delay: self.request_retry_delay,
        }
    }

    pub fn integrator_config(&self) -> IntegratorConfig {
        IntegratorConfig {
            album_workers: self.integrator_workers,
            scoring_workers: self.scoring_workers,
        }
    }
}

/// Read a numeric variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", name, value)),
        Err(_) => Ok(default),
    }
}

/// Expand a leading `~` to the user's home directory
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}
