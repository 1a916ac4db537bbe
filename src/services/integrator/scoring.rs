//! Candidate release scoring
//!
//! A MusicBrainz release is scored against a local album in three
//! independent dimensions (disambiguation, artist credits, track list) and
//! the dimensions are summed. The best scoring release wins if its score is
//! positive.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::services::concurrency::process_concurrent;
use crate::services::musicbrainz::{ArtistCredit, Medium, Release};
use crate::services::text_utils::{album_disambiguation, is_similar};

pub const EXACT_DISAMBIGUATION: i64 = 20;
pub const EDITION_DISAMBIGUATION: i64 = 5;
pub const MATCHING_ARTIST: i64 = 50;
pub const MISMATCHED_ARTIST: i64 = -5;
pub const TRACK_AT_POSITION: i64 = 5;
pub const TRACK_ELSEWHERE: i64 = 2;
/// Track score of a release sharing no tracks with the album
pub const NO_MATCHING_TRACKS: i64 = -1000;

static EDITION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.* edition|.* version|.* exclusive)").unwrap());

/// Known disambiguations, most preferred first
const DISAMBIGUATION_PRIORITY: &[(&str, i64)] = &[
    ("deluxe", 4),
    ("explicit", 3),
    ("mastered for itunes", 2),
    ("bonus tracks", 1),
];

/// A song of the local album, as far as scoring is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub disc: u32,
    pub track: u32,
    pub title: String,
}

/// Compare the album title's trailing parenthetical with a release's disambiguation
pub fn disambiguation_score(album_title: &str, release_disambiguation: &str) -> i64 {
    let album = album_disambiguation(album_title);
    let release = release_disambiguation.to_lowercase();

    if album == release {
        return EXACT_DISAMBIGUATION;
    }
    if EDITION_PATTERN.is_match(&release) && EDITION_PATTERN.is_match(&album) {
        return EDITION_DISAMBIGUATION;
    }

    DISAMBIGUATION_PRIORITY
        .iter()
        .find(|(name, _)| *name == release)
        .map(|(_, score)| *score)
        .unwrap_or(0)
}

pub fn artist_score(credits: &[ArtistCredit], local_artist: &str) -> i64 {
    credits
        .iter()
        .map(|credit| {
            if is_similar(&credit.artist.name.to_lowercase(), local_artist) {
                MATCHING_ARTIST
            } else {
                MISMATCHED_ARTIST
            }
        })
        .sum()
}

/// Score the release's track list against the local songs.
///
/// `None` means the local songs could not be loaded, which scores a neutral 0.
pub fn track_score(media: &[Medium], songs: Option<&[LocalTrack]>) -> i64 {
    let Some(songs) = songs else {
        return 0;
    };

    let mut by_position: HashMap<(u32, u32), &str> = HashMap::new();
    for (index, medium) in media.iter().enumerate() {
        let disc = index as u32 + 1;
        for track in &medium.tracks {
            by_position.insert((disc, track.position), track.display_title());
        }
    }

    let mut score = 0;
    for song in songs {
        let at_position = by_position
            .get(&(song.disc, song.track))
            .is_some_and(|title| is_similar(&song.title, title));

        if at_position {
            score += TRACK_AT_POSITION;
        } else if by_position.values().any(|title| is_similar(&song.title, title)) {
            score += TRACK_ELSEWHERE;
        }
    }

    if score == 0 { NO_MATCHING_TRACKS } else { score }
}

/// Total score of one candidate release
pub fn score_release(
    album_title: &str,
    local_artist: &str,
    songs: Option<&[LocalTrack]>,
    release: &Release,
) -> i64 {
    disambiguation_score(album_title, &release.disambiguation)
        + artist_score(&release.artist_credit, local_artist)
        + track_score(&release.media, songs)
}

#[derive(Debug, Clone)]
pub struct ScoredRelease {
    pub release: Release,
    pub score: i64,
}

/// Highest scoring candidate, if any scores above zero.
///
/// Ties go to the candidate that came first in `scored`.
pub fn select_best(scored: Vec<(usize, ScoredRelease)>) -> Option<ScoredRelease> {
    let mut best: Option<(usize, ScoredRelease)> = None;

    for (index, candidate) in scored {
        let better = match &best {
            None => true,
            Some((best_index, current)) => {
                candidate.score > current.score
                    || (candidate.score == current.score && index < *best_index)
            }
        };
        if better {
            best = Some((index, candidate));
        }
    }

    best.map(|(_, candidate)| candidate)
        .filter(|candidate| candidate.score > 0)
}

/// Score every candidate on a pool of `workers` and pick the best
pub async fn best_release(
    candidates: Vec<Release>,
    album_title: &str,
    local_artist: &str,
    songs: Option<Arc<Vec<LocalTrack>>>,
    workers: usize,
) -> Option<ScoredRelease> {
    let album_title: Arc<str> = Arc::from(album_title);
    let local_artist: Arc<str> = Arc::from(local_artist);

    let scored = process_concurrent(candidates.into_iter().enumerate(), workers, |(index, release)| {
        let album_title = album_title.clone();
        let local_artist = local_artist.clone();
        let songs = songs.clone();
        async move {
            let scored = tokio::task::spawn_blocking(move || {
                let score = score_release(
                    &album_title,
                    &local_artist,
                    songs.as_deref().map(Vec::as_slice),
                    &release,
                );
                ScoredRelease { release, score }
            })
            .await;

            match scored {
                Ok(scored) => Some((index, scored)),
                Err(e) => {
                    warn!(error = %e, "Scoring task failed");
                    None
                }
            }
        }
    })
    .await;

    let scored: Vec<_> = scored.into_iter().flatten().collect();
    for (_, candidate) in &scored {
        debug!(release = %candidate.release.id, score = candidate.score, "Scored release");
    }
    select_best(scored)
}
