//! Epsilon-greedy exploration bonus.
//!
//! With probability ε a candidate gets a flat boost regardless of history.
//! Otherwise unfamiliar artists and genres earn a bonus that decays with
//! every play.

use super::sanitize;
use crate::session::UserProfile;
use crate::track::Track;

/// Score given on the random branch.
pub const RANDOM_BOOST: f64 = 0.5;

const NEW_ARTIST_BONUS: f64 = 0.3;
const KNOWN_ARTIST_BASE: f64 = 0.15;
const KNOWN_ARTIST_DECAY: f64 = 0.9;
const NEW_GENRE_BONUS: f64 = 0.2;
const KNOWN_GENRE_BASE: f64 = 0.10;
const KNOWN_GENRE_DECAY: f64 = 0.95;

/// Probability of the random branch for this profile.
///
/// An exploration level of 0.5 (or none) keeps `epsilon` as configured;
/// 0 halves it and 1 scales it by 1.5.
#[must_use]
pub fn effective_epsilon(epsilon: f64, profile: &UserProfile) -> f64 {
    let level = profile
        .exploration_level
        .filter(|l| l.is_finite())
        .map_or(0.5, |l| l.clamp(0.0, 1.0));
    sanitize(epsilon * (0.5 + level), 0.0)
}

/// Exploration bonus for `track`.
///
/// `roll` is a uniform draw in `[0, 1)` supplied by the caller; a roll
/// below `epsilon` takes the random branch.
///
/// A track without an artist earns no artist term and one without a genre
/// no genre term: unknown metadata is not evidence of novelty.
#[must_use]
pub fn exploration_score(track: &Track, profile: &UserProfile, epsilon: f64, roll: f64) -> f64 {
    if roll < epsilon {
        return RANDOM_BOOST;
    }

    let artist_term = track.primary_artist().map_or(0.0, |artist| {
        match profile.artist_plays(artist) {
            0 => NEW_ARTIST_BONUS,
            plays => KNOWN_ARTIST_BASE * KNOWN_ARTIST_DECAY.powi(plays.min(i32::MAX as u32) as i32),
        }
    });

    let genre_term = track.primary_genre().map_or(0.0, |genre| {
        match profile.genre_plays(genre) {
            0 => NEW_GENRE_BONUS,
            plays => KNOWN_GENRE_BASE * KNOWN_GENRE_DECAY.powi(plays.min(i32::MAX as u32) as i32),
        }
    });

    sanitize(artist_term + genre_term, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn track() -> Track {
        Track::new("t", "T").with_artist("artist", "Artist").with_genre("ambient")
    }

    #[test]
    fn test_random_branch_is_flat() {
        let profile = UserProfile::default();
        assert_eq!(exploration_score(&track(), &profile, 0.15, 0.1), RANDOM_BOOST);
    }

    #[test]
    fn test_unknown_artist_and_genre() {
        let profile = UserProfile::default();
        let score = exploration_score(&track(), &profile, 0.15, 0.9);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_metadata_earns_no_bonus() {
        let profile = UserProfile::default();
        let bare = Track::new("b", "B");
        assert_eq!(exploration_score(&bare, &profile, 0.0, 0.5), 0.0);

        let no_genre = Track::new("n", "N").with_artist("artist", "Artist");
        assert!((exploration_score(&no_genre, &profile, 0.0, 0.5) - NEW_ARTIST_BONUS).abs() < 1e-9);

        let no_artist = Track::new("g", "G").with_genre("ambient");
        assert!((exploration_score(&no_artist, &profile, 0.0, 0.5) - NEW_GENRE_BONUS).abs() < 1e-9);
    }

    #[test]
    fn test_known_artist_and_genre_decay() {
        let mut profile = UserProfile::default();
        profile.artist_play_counts.insert("artist".to_string(), 2);
        profile.genre_play_counts.insert("Ambient".to_string(), 1);

        let score = exploration_score(&track(), &profile, 0.0, 0.5);
        let expected = 0.15 * 0.81 + 0.10 * 0.95;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_epsilon_never_random() {
        let mut profile = UserProfile::default();
        profile.artist_play_counts.insert("artist".to_string(), 50);
        profile.genre_play_counts.insert("ambient".to_string(), 50);
        assert!(exploration_score(&track(), &profile, 0.0, 0.0) < RANDOM_BOOST);
    }

    #[test]
    fn test_seeded_rolls_are_reproducible() {
        let profile = UserProfile::default();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .map(|_| exploration_score(&track(), &profile, 0.5, rng.gen::<f64>()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_effective_epsilon_scales_with_level() {
        let mut profile = UserProfile::default();
        assert!((effective_epsilon(0.15, &profile) - 0.15).abs() < 1e-12);
        profile.exploration_level = Some(1.0);
        assert!((effective_epsilon(0.15, &profile) - 0.225).abs() < 1e-12);
        profile.exploration_level = Some(f64::NAN);
        assert!((effective_epsilon(0.15, &profile) - 0.15).abs() < 1e-12);
    }
}
