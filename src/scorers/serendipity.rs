//! Unfamiliar artists inside familiar territory.

use super::sanitize;
use crate::session::UserProfile;
use crate::track::Track;
use std::collections::HashSet;

const NEW_ARTIST_KNOWN_GENRE: f64 = 0.4;
const MULTI_GENRE_MATCH: f64 = 0.3;

/// Rewards tracks that are new but likely to land.
///
/// +0.4 when the primary artist is new to the user and the primary genre
/// matches a top genre; +0.3 when the track declares at least two genres
/// that match two distinct top genres.
#[must_use]
pub fn serendipity_score(track: &Track, profile: &UserProfile) -> f64 {
    let mut score = 0.0;

    let new_artist = track.primary_artist().is_some_and(|a| profile.is_new_artist(a));
    let genre_matches = track
        .primary_genre()
        .is_some_and(|g| profile.matching_top_genre(g).is_some());
    if new_artist && genre_matches {
        score += NEW_ARTIST_KNOWN_GENRE;
    }

    if track.genres.len() >= 2 {
        let matched: HashSet<usize> = track
            .genres
            .iter()
            .filter_map(|g| profile.matching_top_genre(g))
            .collect();
        if matched.len() >= 2 {
            score += MULTI_GENRE_MATCH;
        }
    }

    sanitize(score, 0.0)
}
