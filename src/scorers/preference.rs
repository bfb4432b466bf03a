//! Taste, mood and activity fit.

use super::recency::recency_score;
use super::sanitize;
use crate::session::{Activity, MoodTarget, UserProfile};
use crate::track::{AudioFeatures, Track};
use chrono::{DateTime, Utc};

const LIKED_BONUS: f64 = 0.4;
const ARTIST_AFFINITY: f64 = 0.3;
const GENRE_AFFINITY: f64 = 0.2;
const REDISCOVERY: f64 = 0.1;

/// How well `track` matches the user's long-term taste.
///
/// Liked tracks get 0.4, the primary artist contributes up to 0.3 in
/// proportion to its play count relative to the most played artist, a
/// primary genre among the top genres adds 0.2, and a track heard before
/// earns up to 0.1 for not having been heard recently.
///
/// Returns `None` for a profile without any history.
#[must_use]
pub fn base_preference(
    track: &Track,
    profile: &UserProfile,
    now: DateTime<Utc>,
    half_life_days: f64,
) -> Option<f64> {
    if profile.is_empty() {
        return None;
    }

    let mut score = 0.0;

    if profile.liked_tracks.contains(&track.id) {
        score += LIKED_BONUS;
    }

    let max_plays = profile.max_artist_plays();
    if max_plays > 0 {
        let plays = track.primary_artist().map_or(0, |a| profile.artist_plays(a));
        score += ARTIST_AFFINITY * f64::from(plays) / f64::from(max_plays);
    }

    if track
        .primary_genre()
        .is_some_and(|g| profile.matching_top_genre(g).is_some())
    {
        score += GENRE_AFFINITY;
    }

    if let Some(last) = profile.last_played_at(&track.id) {
        let days = (now - last).num_seconds().max(0) as f64 / 86_400.0;
        score += REDISCOVERY * (1.0 - recency_score(days, half_life_days));
    }

    Some(sanitize(score, 0.5))
}

/// Closeness to a target mood in (valence, energy) space.
///
/// `None` when the track lacks valence or energy.
#[must_use]
pub fn mood_match(features: &AudioFeatures, target: MoodTarget) -> Option<f64> {
    let valence = features.valence?;
    let energy = features.energy?;
    let distance = ((valence - target.valence).powi(2) + (energy - target.energy).powi(2)).sqrt();
    Some(sanitize(1.0 - distance / std::f64::consts::SQRT_2, 0.5))
}

fn range_fit(value: f64, (low, high): (f64, f64), slope: f64) -> f64 {
    let outside = if value < low {
        low - value
    } else if value > high {
        value - high
    } else {
        0.0
    };
    (1.0 - outside * slope).max(0.0)
}

/// Fit of a track's energy (and tempo, where relevant) to an activity.
///
/// Inside a range scores 1; outside, energy decays by twice the distance
/// and tempo by 1/40 per BPM. The available checks are averaged. `None`
/// when no check can be made.
#[must_use]
pub fn activity_match(features: &AudioFeatures, activity: Activity) -> Option<f64> {
    let checks: Vec<f64> = [
        features.energy.map(|e| range_fit(e, activity.energy_range(), 2.0)),
        features
            .bpm
            .zip(activity.bpm_range())
            .map(|(bpm, range)| range_fit(bpm, range, 1.0 / 40.0)),
    ]
    .into_iter()
    .flatten()
    .collect();

    if checks.is_empty() {
        return None;
    }
    Some(sanitize(checks.iter().sum::<f64>() / checks.len() as f64, 0.5))
}
