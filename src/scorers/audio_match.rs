//! Audio similarity and harmonic mixing compatibility.
//!
//! Keys are placed on the circle of fifths (the Camelot wheel used by DJs):
//! every major key and its relative minor share a wheel position, and
//! neighbouring positions are a fifth apart.

use super::sanitize;
use crate::config::AudioMatchWeights;
use crate::session::SessionState;
use crate::track::{AudioFeatures, Mode};

/// Neutral similarity, used when a comparison yields a non-finite value.
pub const NEUTRAL_MATCH: f64 = 0.5;

const BPM_TOLERANCE: f64 = 30.0;

/// Camelot wheel position (1..=12) of a key.
#[must_use]
pub fn camelot_position(key: u8, mode: Mode) -> u8 {
    let relative_major = match mode {
        Mode::Major => key % 12,
        Mode::Minor => (key % 12 + 3) % 12,
    };
    // C major sits at 8, every fifth up moves one step clockwise
    ((relative_major * 7 % 12 + 7) % 12) + 1
}

/// Compatibility of two keys for a smooth transition, in `[0, 1]`.
///
/// | relation                        | score |
/// |---------------------------------|-------|
/// | same key and mode               | 1.0   |
/// | relative major/minor            | 0.9   |
/// | a fifth apart, same mode        | 0.8   |
/// | a fifth apart, mode change      | 0.6   |
/// | two fifths apart                | 0.4   |
/// | anything else                   | 0.2   |
#[must_use]
pub fn harmonic_compatibility(a: (u8, Mode), b: (u8, Mode)) -> f64 {
    let pa = camelot_position(a.0, a.1);
    let pb = camelot_position(b.0, b.1);
    let raw = pa.abs_diff(pb);
    let steps = raw.min(12 - raw);
    let same_mode = a.1 == b.1;

    match (steps, same_mode) {
        (0, true) => 1.0,
        (0, false) => 0.9,
        (1, true) => 0.8,
        (1, false) => 0.6,
        (2, _) => 0.4,
        _ => 0.2,
    }
}

fn key_of(features: &AudioFeatures) -> Option<(u8, Mode)> {
    features.key.map(|k| (k, features.mode.unwrap_or(Mode::Major)))
}

/// Weighted similarity between two feature sets.
///
/// Feature pairs missing on either side are dropped from both the sum and
/// the weight total. `None` when either set is absent or no pair can be
/// compared; callers wanting a number use [`NEUTRAL_MATCH`] as fallback.
#[must_use]
pub fn audio_match(
    a: Option<&AudioFeatures>,
    b: Option<&AudioFeatures>,
    weights: &AudioMatchWeights,
) -> Option<f64> {
    let (a, b) = a.zip(b)?;

    let pairs = [
        (
            weights.bpm,
            a.bpm
                .zip(b.bpm)
                .map(|(x, y)| (1.0 - (x - y).abs() / BPM_TOLERANCE).max(0.0)),
        ),
        (weights.energy, a.energy.zip(b.energy).map(|(x, y)| 1.0 - (x - y).abs())),
        (
            weights.key,
            key_of(a).zip(key_of(b)).map(|(x, y)| harmonic_compatibility(x, y)),
        ),
        (weights.valence, a.valence.zip(b.valence).map(|(x, y)| 1.0 - (x - y).abs())),
    ];

    let (sum, total) = pairs
        .iter()
        .filter(|(w, _)| w.is_finite() && *w > 0.0)
        .filter_map(|(w, similarity)| similarity.filter(|s| s.is_finite()).map(|s| (s * w, *w)))
        .fold((0.0, 0.0), |(sum, total), (value, w)| (sum + value, total + w));

    (total > 0.0).then(|| sanitize(sum / total, NEUTRAL_MATCH))
}

/// Harmonic compatibility with the last session track.
///
/// `None` when either key is unknown.
#[must_use]
pub fn harmonic_flow(features: &AudioFeatures, session: &SessionState) -> Option<f64> {
    let previous = session.last()?.features.as_ref().and_then(key_of)?;
    let current = key_of(features)?;
    Some(harmonic_compatibility(previous, current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionEntry;

    #[test]
    fn test_camelot_positions() {
        assert_eq!(camelot_position(0, Mode::Major), 8); // C
        assert_eq!(camelot_position(7, Mode::Major), 9); // G
        assert_eq!(camelot_position(9, Mode::Minor), 8); // Am
        assert_eq!(camelot_position(4, Mode::Minor), 9); // Em
        assert_eq!(camelot_position(5, Mode::Major), 7); // F
        assert_eq!(camelot_position(11, Mode::Major), 1); // B
    }

    #[test]
    fn test_harmonic_table() {
        assert_eq!(harmonic_compatibility((0, Mode::Major), (0, Mode::Major)), 1.0);
        assert_eq!(harmonic_compatibility((0, Mode::Major), (9, Mode::Minor)), 0.9);
        assert_eq!(harmonic_compatibility((0, Mode::Major), (7, Mode::Major)), 0.8);
        assert_eq!(harmonic_compatibility((0, Mode::Major), (4, Mode::Minor)), 0.6);
        assert_eq!(harmonic_compatibility((0, Mode::Major), (2, Mode::Major)), 0.4);
        assert_eq!(harmonic_compatibility((0, Mode::Major), (6, Mode::Major)), 0.2);
    }

    #[test]
    fn test_wheel_wraps_around() {
        // B (1) and E (12) are neighbours
        assert_eq!(harmonic_compatibility((11, Mode::Major), (4, Mode::Major)), 0.8);
    }

    #[test]
    fn test_absent_side_has_no_match() {
        let weights = AudioMatchWeights::default();
        let known = AudioFeatures {
            energy: Some(0.4),
            ..AudioFeatures::default()
        };
        assert_eq!(audio_match(None, None, &weights), None);
        assert_eq!(audio_match(Some(&known), None, &weights), None);
        assert_eq!(audio_match(None, Some(&known), &weights), None);
    }

    #[test]
    fn test_no_comparable_pair_has_no_match() {
        let a = AudioFeatures {
            bpm: Some(120.0),
            ..AudioFeatures::default()
        };
        let b = AudioFeatures {
            valence: Some(0.3),
            ..AudioFeatures::default()
        };
        assert_eq!(audio_match(Some(&a), Some(&b), &AudioMatchWeights::default()), None);
    }

    #[test]
    fn test_missing_pairs_are_excluded() {
        let a = AudioFeatures {
            bpm: Some(120.0),
            energy: Some(0.8),
            ..AudioFeatures::default()
        };
        let b = AudioFeatures {
            bpm: Some(135.0),
            valence: Some(0.1),
            ..AudioFeatures::default()
        };
        // only bpm is comparable: 1 - 15/30
        let score = audio_match(Some(&a), Some(&b), &AudioMatchWeights::default()).unwrap();
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_similarity() {
        let a = AudioFeatures {
            bpm: Some(100.0),
            energy: Some(0.5),
            key: Some(0),
            mode: Some(Mode::Major),
            valence: Some(0.5),
            ..AudioFeatures::default()
        };
        let b = AudioFeatures {
            bpm: Some(100.0),
            energy: Some(0.7),
            key: Some(7),
            mode: Some(Mode::Major),
            valence: Some(0.5),
            ..AudioFeatures::default()
        };
        // 0.3*1 + 0.3*0.8 + 0.2*0.8 + 0.2*1 = 0.9
        let score = audio_match(Some(&a), Some(&b), &AudioMatchWeights::default()).unwrap();
        assert!((score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_harmonic_flow_needs_both_keys() {
        let mut session = SessionState::default();
        session.push(SessionEntry {
            track_id: "p".to_string(),
            artist_ids: vec![],
            genres: vec![],
            features: Some(AudioFeatures {
                key: Some(9),
                mode: Some(Mode::Minor),
                ..AudioFeatures::default()
            }),
        });

        let c_major = AudioFeatures {
            key: Some(0),
            mode: Some(Mode::Major),
            ..AudioFeatures::default()
        };
        assert_eq!(harmonic_flow(&c_major, &session), Some(0.9));
        assert_eq!(harmonic_flow(&AudioFeatures::default(), &session), None);
        assert_eq!(harmonic_flow(&c_major, &SessionState::default()), None);
    }
}
