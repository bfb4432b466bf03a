//! Recently-played penalty and freshness decay.

use chrono::{DateTime, Utc};

/// Step penalty on hours since the last play, on the 0-100 score scale.
///
/// | hours since last play | penalty |
/// |-----------------------|---------|
/// | < 1                   | 30      |
/// | < 4                   | 20      |
/// | < 24                  | 10      |
/// | < 72                  | 5       |
/// | otherwise / never     | 0       |
#[must_use]
pub fn recency_penalty(hours_since_last_play: Option<f64>) -> f64 {
    match hours_since_last_play {
        Some(h) if h.is_nan() => 0.0,
        Some(h) if h < 1.0 => 30.0,
        Some(h) if h < 4.0 => 20.0,
        Some(h) if h < 24.0 => 10.0,
        Some(h) if h < 72.0 => 5.0,
        _ => 0.0,
    }
}

/// `exp(-days / half_life)`: 1 for a track heard just now, towards 0 as it ages.
#[must_use]
pub fn recency_score(days_since_last_play: f64, half_life_days: f64) -> f64 {
    if !days_since_last_play.is_finite() || half_life_days <= 0.0 {
        return 0.0;
    }
    (-days_since_last_play.max(0.0) / half_life_days).exp()
}

/// Hours between `last_played` and `now`; negative spans count as zero.
#[must_use]
pub fn hours_since(last_played: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<f64> {
    last_played.map(|at| ((now - at).num_seconds().max(0)) as f64 / 3600.0)
}
