//! Media indexer daemon
//!
//! Indexes the library root, watches it for changes and periodically
//! reconciles albums against MusicBrainz and Discogs until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_indexer::config::Config;
use media_indexer::db::Database;
use media_indexer::jobs::IntegratorService;
use media_indexer::media::LoftyTagReader;
use media_indexer::services::discogs::DiscogsClient;
use media_indexer::services::musicbrainz::MusicBrainzClient;
use media_indexer::services::{
    FilesystemService, FilesystemServiceConfig, Integrator, Scanner, Service, ServicesManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_indexer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(media_path = %config.media_path.display(), "Starting media indexer");

    let db = Database::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to open database")?;
    tracing::info!("Database connected");

    let scanner = Scanner::new(db.clone(), Arc::new(LoftyTagReader));
    let filesystem = Arc::new(FilesystemService::new(
        scanner,
        FilesystemServiceConfig {
            media_path: config.media_path.clone(),
            queue_capacity: config.task_queue_capacity,
        },
    ));

    let mut musicbrainz = MusicBrainzClient::new(&config.musicbrainz_contact, config.retry_config())?;
    if let Some(url) = &config.musicbrainz_url {
        musicbrainz = musicbrainz.with_base_url(url.as_str());
    }
    let discogs = match &config.discogs_token {
        Some(token) => {
            let client = DiscogsClient::new(token, config.retry_config())?;
            Some(match &config.discogs_url {
                Some(url) => client.with_base_url(url.as_str()),
                None => client,
            })
        }
        None => {
            tracing::warn!("DISCOGS_TOKEN not set, Discogs lookups disabled");
            None
        }
    };
    let integrator = Integrator::new(
        db.clone(),
        Some(musicbrainz),
        discogs,
        config.integrator_config(),
    );
    let integrator = Arc::new(IntegratorService::new(
        integrator,
        config.integrator_interval,
        filesystem.initial_scans(),
    ));

    let services = ServicesManager::builder()
        .add_service(filesystem as Arc<dyn Service>)
        .add_service(integrator as Arc<dyn Service>)
        .start()
        .await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    services.log_health().await;
    services.stop_all().await?;
    if let Err(e) = db.checkpoint_wal().await {
        tracing::warn!(error = %e, "WAL checkpoint failed");
    }
    tracing::info!("Stopped");

    Ok(())
}
