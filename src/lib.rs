//! Media library indexer
//!
//! Indexes a music folder tree into SQLite, keeps the index in step with the
//! filesystem, and reconciles albums and artists against MusicBrainz and
//! Discogs.

pub mod config;
pub mod db;
pub mod jobs;
pub mod media;
pub mod services;
