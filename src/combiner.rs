//! # Weighted Combiner
//!
//! Folds the per-dimension sub-scores of a track into one score in
//! `[0, 100]` and derives the short explanations shown next to a
//! recommendation.
//!
//! ## Combination Rule
//!
//! ```text
//! base  = Σ(score · weight) / Σ(weight) · 100     (positive dimensions, weight > 0)
//!       = 50                                      (when Σ(weight) == 0)
//! final = clamp(base - Σ(penalty · penalty_weight), 0, 100)
//! ```
//!
//! A dimension that is missing from [`ScoreComponents`] does not count
//! towards the denominator, so a scorer without data never drags the
//! result down. 50 means "neutral / unknown" to every consumer of these
//! scores and must stay the fallback.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Score returned when nothing carries weight.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Upper bound of a combined score.
pub const MAX_SCORE: f64 = 100.0;

/// Every signal the combiner knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    BasePreference,
    MlPrediction,
    AudioMatch,
    MoodMatch,
    HarmonicFlow,
    TemporalFit,
    SessionFlow,
    ActivityMatch,
    ExplorationBonus,
    SerendipityScore,
    DiversityScore,
    RecentPlayPenalty,
    DislikePenalty,
    RepetitionPenalty,
    FatiguePenalty,
}

impl Dimension {
    #[must_use]
    pub const fn is_penalty(self) -> bool {
        matches!(
            self,
            Self::RecentPlayPenalty
                | Self::DislikePenalty
                | Self::RepetitionPenalty
                | Self::FatiguePenalty
        )
    }

    /// Name as it appears in config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BasePreference => "basePreference",
            Self::MlPrediction => "mlPrediction",
            Self::AudioMatch => "audioMatch",
            Self::MoodMatch => "moodMatch",
            Self::HarmonicFlow => "harmonicFlow",
            Self::TemporalFit => "temporalFit",
            Self::SessionFlow => "sessionFlow",
            Self::ActivityMatch => "activityMatch",
            Self::ExplorationBonus => "explorationBonus",
            Self::SerendipityScore => "serendipityScore",
            Self::DiversityScore => "diversityScore",
            Self::RecentPlayPenalty => "recentPlayPenalty",
            Self::DislikePenalty => "dislikePenalty",
            Self::RepetitionPenalty => "repetitionPenalty",
            Self::FatiguePenalty => "fatiguePenalty",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-scores of one track, keyed by dimension.
///
/// Non-finite values are never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents(BTreeMap<Dimension, f64>);

impl ScoreComponents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value; NaN and infinities are dropped.
    pub fn set(&mut self, dimension: Dimension, value: f64) {
        if value.is_finite() {
            self.0.insert(dimension, value);
        } else {
            log::trace!("Dropping non-finite {dimension} value");
        }
    }

    /// Record a value only when there is one.
    pub fn set_opt(&mut self, dimension: Dimension, value: Option<f64>) {
        if let Some(value) = value {
            self.set(dimension, value);
        }
    }

    #[must_use]
    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        self.0.get(&dimension).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.0.iter().map(|(d, v)| (*d, *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Dimension, f64)> for ScoreComponents {
    fn from_iter<I: IntoIterator<Item = (Dimension, f64)>>(iter: I) -> Self {
        let mut components = Self::new();
        for (dimension, value) in iter {
            components.set(dimension, value);
        }
        components
    }
}

/// Non-negative weight per dimension.
///
/// Positive dimensions without a weight (or with weight 0) are left out of
/// the weighted mean. Penalties without a weight apply at full strength;
/// an explicit 0 switches a penalty off.
///
/// When read from a config file the given entries are laid over
/// [`ScoringWeights::default`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScoringWeights(BTreeMap<Dimension, f64>);

impl<'de> Deserialize<'de> for ScoringWeights {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let overrides = BTreeMap::<Dimension, f64>::deserialize(deserializer)?;
        let mut weights = Self::default();
        weights.0.extend(overrides);
        Ok(weights)
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        [
            (Dimension::BasePreference, 0.25),
            (Dimension::MlPrediction, 0.15),
            (Dimension::AudioMatch, 0.10),
            (Dimension::MoodMatch, 0.05),
            (Dimension::HarmonicFlow, 0.05),
            (Dimension::TemporalFit, 0.10),
            (Dimension::SessionFlow, 0.10),
            (Dimension::ActivityMatch, 0.05),
            (Dimension::ExplorationBonus, 0.10),
            (Dimension::SerendipityScore, 0.05),
            (Dimension::DiversityScore, 0.10),
            (Dimension::RecentPlayPenalty, 1.0),
            (Dimension::DislikePenalty, 1.0),
            (Dimension::RepetitionPenalty, 1.0),
            (Dimension::FatiguePenalty, 1.0),
        ]
        .into_iter()
        .collect()
    }
}

impl FromIterator<(Dimension, f64)> for ScoringWeights {
    fn from_iter<I: IntoIterator<Item = (Dimension, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ScoringWeights {
    /// Weights with nothing set at all.
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, dimension: Dimension, weight: f64) {
        self.0.insert(dimension, weight);
    }

    #[must_use]
    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        self.0.get(&dimension).copied()
    }

    /// Effective multiplier of a penalty dimension.
    #[must_use]
    pub fn penalty_weight(&self, dimension: Dimension) -> f64 {
        self.get(dimension)
            .filter(|w| w.is_finite())
            .map_or(1.0, |w| w.max(0.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.0.iter().map(|(d, w)| (*d, *w))
    }
}

/// Read a positive sub-score as a unit value.
///
/// Callers report either `[0, 1]` or `[0, 100]`; anything above 1 is
/// taken as a percentage.
#[must_use]
pub fn normalize_component(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let unit = if value > 1.0 { value / MAX_SCORE } else { value };
    unit.clamp(0.0, 1.0)
}

/// Combine sub-scores into a final score in `[0, 100]`.
#[must_use]
pub fn combine(components: &ScoreComponents, weights: &ScoringWeights) -> f64 {
    let (weighted_sum, total_weight) = components
        .iter()
        .filter(|(dimension, _)| !dimension.is_penalty())
        .filter_map(|(dimension, score)| {
            weights
                .get(dimension)
                .filter(|w| w.is_finite() && *w > 0.0)
                .map(|w| (normalize_component(score) * w, w))
        })
        .fold((0.0, 0.0), |(sum, total), (value, w)| (sum + value, total + w));

    let base = if total_weight > 0.0 {
        weighted_sum / total_weight * MAX_SCORE
    } else {
        NEUTRAL_SCORE
    };

    let penalty: f64 = components
        .iter()
        .filter(|(dimension, _)| dimension.is_penalty())
        .map(|(dimension, magnitude)| magnitude.max(0.0) * weights.penalty_weight(dimension))
        .sum();

    clamp_score(base - penalty)
}

/// One input of [`combine_scores`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedScore {
    pub score: f64,
    pub weight: f64,
}

impl WeightedScore {
    #[must_use]
    pub const fn new(score: f64, weight: f64) -> Self {
        Self { score, weight }
    }
}

/// Weighted mean of arbitrary scores on a shared scale.
///
/// Used for ad hoc blends such as base + advanced scoring. Returns
/// [`NEUTRAL_SCORE`] when the weights sum to zero. Entries with a
/// non-finite score or a non-positive weight are ignored.
#[must_use]
pub fn combine_scores(scores: &[WeightedScore]) -> f64 {
    let (sum, total) = scores
        .iter()
        .filter(|s| s.score.is_finite() && s.weight.is_finite() && s.weight > 0.0)
        .fold((0.0, 0.0), |(sum, total), s| (sum + s.score * s.weight, total + s.weight));

    if total > 0.0 {
        sum / total
    } else {
        NEUTRAL_SCORE
    }
}

/// Clamp into `[0, 100]`, mapping NaN to 0.
#[must_use]
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, MAX_SCORE)
}

/// Explanation checks in display order.
const EXPLANATIONS: [(Dimension, &str); 11] = [
    (Dimension::BasePreference, "Matches your taste"),
    (Dimension::MlPrediction, "Predicted to be a good fit"),
    (Dimension::TemporalFit, "Perfect for this time of day"),
    (Dimension::SessionFlow, "Flows well with recent tracks"),
    (Dimension::ExplorationBonus, "Something new to discover"),
    (Dimension::SerendipityScore, "A pleasant surprise"),
    (Dimension::DiversityScore, "Adds variety to your queue"),
    (Dimension::MoodMatch, "Matches your current mood"),
    (Dimension::HarmonicFlow, "Harmonically compatible"),
    (Dimension::RecentPlayPenalty, "Recently played"),
    (Dimension::RepetitionPenalty, "Artist already in queue"),
];

const POSITIVE_THRESHOLD: f64 = 0.7;
const PENALTY_THRESHOLD: f64 = 10.0;

/// Human-readable reasons for a score, always in the same order.
#[must_use]
pub fn explain(components: &ScoreComponents) -> Vec<&'static str> {
    EXPLANATIONS
        .iter()
        .filter(|(dimension, _)| {
            components.get(*dimension).is_some_and(|value| {
                if dimension.is_penalty() {
                    value > PENALTY_THRESHOLD
                } else {
                    normalize_component(value) > POSITIVE_THRESHOLD
                }
            })
        })
        .map(|(_, text)| *text)
        .collect()
}
