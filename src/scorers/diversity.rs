//! Artist and genre variety within the session.

use super::sanitize;
use crate::config::DiversityConfig;
use crate::session::SessionState;
use crate::track::Track;

const SATURATED_ARTIST_PENALTY: f64 = 0.4;
const PER_OCCURRENCE_PENALTY: f64 = 0.1;
const NEW_GENRE_BONUS: f64 = 0.2;
const DOMINANT_GENRE_PENALTY: f64 = 0.2;
const DOMINANT_GENRE_SHARE: f64 = 0.4;

/// Starts at 1.0 and adjusts for artist repetition and genre balance.
///
/// The primary artist costs 0.4 once it already appears `max_same_artist`
/// times, 0.1 per occurrence before that. A primary genre not yet in the
/// session earns 0.2 while the session has fewer than
/// `target_genre_variety` genres; a genre holding more than 40% of the
/// session costs 0.2.
#[must_use]
pub fn diversity_score(track: &Track, session: &SessionState, config: &DiversityConfig) -> f64 {
    let mut score = 1.0;

    if let Some(artist) = track.primary_artist() {
        let occurrences = session.artist_occurrences(artist);
        if occurrences >= config.max_same_artist {
            score -= SATURATED_ARTIST_PENALTY;
        } else {
            score -= PER_OCCURRENCE_PENALTY * occurrences as f64;
        }
    }

    if let Some(genre) = track.primary_genre() {
        let genre_count = session.genre_occurrences(genre);
        if genre_count == 0 {
            if session.distinct_genres() < config.target_genre_variety {
                score += NEW_GENRE_BONUS;
            }
        } else if !session.is_empty()
            && genre_count as f64 / session.len() as f64 > DOMINANT_GENRE_SHARE
        {
            score -= DOMINANT_GENRE_PENALTY;
        }
    }

    sanitize(score, 1.0)
}
