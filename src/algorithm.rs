//! Track scoring pipeline.
//!
//! Runs every component scorer for a candidate, folds the results with the
//! weighted combiner and ranks batches of candidates.

use crate::combiner::{self, Dimension, ScoreComponents};
use crate::config::EngineConfig;
use crate::scorers::{self, exploration::effective_epsilon, recency::hours_since};
use crate::session::{Activity, MoodTarget, SessionState, UserProfile};
use crate::track::{AudioFeatures, QueueEntry, Track};
use chrono::{DateTime, Local, Timelike, Utc};
use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;

/// Everything a scorer may look at besides the candidate itself.
#[derive(Debug, Clone)]
pub struct ScoringContext<'a> {
    pub profile: &'a UserProfile,
    pub session: &'a SessionState,
    /// Entries still waiting in the queue.
    pub upcoming: &'a [QueueEntry],
    pub config: &'a EngineConfig,
    pub now: DateTime<Utc>,
    /// Local hour of day, 0-23.
    pub hour: u32,
    pub mood: Option<MoodTarget>,
    pub activity: Option<Activity>,
}

impl<'a> ScoringContext<'a> {
    /// Context for "now" in local time with an empty upcoming queue.
    #[must_use]
    pub fn new(profile: &'a UserProfile, session: &'a SessionState, config: &'a EngineConfig) -> Self {
        Self {
            profile,
            session,
            upcoming: &[],
            config,
            now: Utc::now(),
            hour: Local::now().hour(),
            mood: None,
            activity: None,
        }
    }

    #[must_use]
    pub fn with_upcoming(mut self, upcoming: &'a [QueueEntry]) -> Self {
        self.upcoming = upcoming;
        self
    }

    /// Pin the clock, e.g. for reproducible rankings.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>, hour: u32) -> Self {
        self.now = now;
        self.hour = hour % 24;
        self
    }

    #[must_use]
    pub fn with_mood(mut self, mood: Option<MoodTarget>) -> Self {
        self.mood = mood;
        self
    }

    #[must_use]
    pub fn with_activity(mut self, activity: Option<Activity>) -> Self {
        self.activity = activity;
        self
    }

    fn epsilon(&self) -> f64 {
        effective_epsilon(self.config.exploration.epsilon, self.profile)
    }
}

/// A candidate plus whatever the providers returned for it.
#[derive(Debug, Clone)]
pub struct ScoringInput {
    pub track: Track,
    pub features: Option<AudioFeatures>,
    pub ml_score: Option<f64>,
}

impl ScoringInput {
    #[must_use]
    pub fn new(track: Track) -> Self {
        Self {
            track,
            features: None,
            ml_score: None,
        }
    }

    #[must_use]
    pub fn with_features(mut self, features: Option<AudioFeatures>) -> Self {
        self.features = features;
        self
    }

    #[must_use]
    pub fn with_ml_score(mut self, ml_score: Option<f64>) -> Self {
        self.ml_score = ml_score;
        self
    }

    /// The track with provider features merged over its embedded ones.
    fn resolved_track(self) -> Track {
        let Self { mut track, features, .. } = self;
        let merged = match (features, track.features.take()) {
            (Some(fetched), Some(embedded)) => Some(fetched.merged_with(&embedded)),
            (fetched, embedded) => fetched.or(embedded),
        };
        track.features = merged.map(AudioFeatures::normalized).filter(|f| !f.is_empty());
        track
    }
}

/// A candidate with its sub-scores, final score and explanations.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredTrack {
    pub track: Track,
    pub components: ScoreComponents,
    pub score: f64,
    pub explanations: Vec<&'static str>,
}

/// Score one candidate. `roll` is the uniform draw for the exploration branch.
#[must_use]
pub fn score_track(input: ScoringInput, context: &ScoringContext<'_>, roll: f64) -> ScoredTrack {
    let ml_score = input.ml_score;
    let track = input.resolved_track();
    let components = compute_components(&track, ml_score, context, roll);
    let score = combiner::combine(&components, &context.config.weights);
    let explanations = combiner::explain(&components);

    log::trace!("{} scored {score:.1} from {} components", track.id, components.len());

    ScoredTrack {
        track,
        components,
        score,
        explanations,
    }
}

fn compute_components(
    track: &Track,
    ml_score: Option<f64>,
    context: &ScoringContext<'_>,
    roll: f64,
) -> ScoreComponents {
    let config = context.config;
    let features = track.features.as_ref();
    let energy = track.energy();
    let mut components = ScoreComponents::new();

    components.set_opt(
        Dimension::BasePreference,
        scorers::base_preference(track, context.profile, context.now, config.recency.half_life_days),
    );
    components.set_opt(Dimension::MlPrediction, ml_score);

    if let Some(last) = context.session.last() {
        components.set_opt(
            Dimension::AudioMatch,
            scorers::audio_match(features, last.features.as_ref(), &config.audio_match),
        );
    }

    if let Some(features) = features {
        components.set_opt(Dimension::HarmonicFlow, scorers::harmonic_flow(features, context.session));
        if let Some(mood) = context.mood {
            components.set_opt(Dimension::MoodMatch, scorers::mood_match(features, mood));
        }
        if let Some(activity) = context.activity {
            components.set_opt(Dimension::ActivityMatch, scorers::activity_match(features, activity));
        }
        if config.temporal.enhanced {
            components.set_opt(
                Dimension::TemporalFit,
                scorers::enhanced_temporal_fit(features, context.hour, config.temporal.curve()),
            );
        }
    }

    if let Some(energy) = energy {
        if !config.temporal.enhanced {
            components.set(
                Dimension::TemporalFit,
                scorers::temporal_fit(energy, context.hour, config.temporal.curve()),
            );
        }
        components.set_opt(
            Dimension::SessionFlow,
            scorers::session_flow_score(energy, context.session, config.session_flow.max_energy_jump),
        );
    }

    components.set(
        Dimension::ExplorationBonus,
        scorers::exploration_score(track, context.profile, context.epsilon(), roll),
    );
    components.set(Dimension::SerendipityScore, scorers::serendipity_score(track, context.profile));
    components.set(
        Dimension::DiversityScore,
        scorers::diversity_score(track, context.session, &config.diversity),
    );

    let hours = hours_since(context.profile.last_played_at(&track.id), context.now);
    components.set(Dimension::RecentPlayPenalty, scorers::recency_penalty(hours));
    components.set(Dimension::DislikePenalty, scorers::dislike_penalty(track, context.profile));
    components.set(
        Dimension::RepetitionPenalty,
        scorers::repetition_penalty(track, context.upcoming, context.session),
    );
    components.set(Dimension::FatiguePenalty, scorers::fatigue_penalty(track, context.session));

    components
}

/// Score a batch in parallel.
///
/// Exploration rolls are drawn from `rng` in input order before the
/// parallel part, so a seeded generator yields identical results no matter
/// how rayon schedules the work. Output order matches input order.
#[must_use = "scored tracks should be ranked or inspected"]
pub fn batch_calculate_scores<R: Rng>(
    inputs: Vec<ScoringInput>,
    context: &ScoringContext<'_>,
    rng: &mut R,
) -> Vec<ScoredTrack> {
    let rolls: Vec<f64> = inputs.iter().map(|_| rng.gen()).collect();
    inputs
        .into_par_iter()
        .zip(rolls)
        .map(|(input, roll)| score_track(input, context, roll))
        .collect()
}

/// Sort by descending score; equal scores keep a stable order by track id.
#[must_use]
pub fn rank_tracks(mut scored: Vec<ScoredTrack>) -> Vec<ScoredTrack> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.track.id.cmp(&b.track.id)));
    scored
}

/// Score distribution summaries for tuning and CLI output.
pub mod statistics {
    use super::ScoredTrack;

    #[derive(Debug, Clone, PartialEq)]
    pub struct ScoreStatistics {
        pub mean: f64,
        pub std_deviation: f64,
        pub min: f64,
        pub max: f64,
        pub count: usize,
    }

    /// `None` for an empty batch.
    #[must_use]
    pub fn analyze_score_distribution(scored: &[ScoredTrack]) -> Option<ScoreStatistics> {
        if scored.is_empty() {
            return None;
        }
        let count = scored.len();
        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        let mean = scored.iter().map(|s| s.score).sum::<f64>() / n;
        let variance = scored.iter().map(|s| (s.score - mean).powi(2)).sum::<f64>() / n;

        Some(ScoreStatistics {
            mean,
            std_deviation: variance.sqrt(),
            min: scored.iter().map(|s| s.score).fold(f64::INFINITY, f64::min),
            max: scored.iter().map(|s| s.score).fold(f64::NEG_INFINITY, f64::max),
            count,
        })
    }
}
