//! # Component Scorers
//!
//! Pure functions that each rate one aspect of a candidate track. Positive
//! scorers return a unit value in `[0, 1]`; penalties return a magnitude on
//! the 0-100 scale of the final score.
//!
//! None of these functions touch shared state, so the pipeline in
//! [`crate::algorithm`] runs them in parallel. Randomness (the
//! epsilon-greedy branch of [`exploration`]) is passed in as a pre-drawn
//! roll so a seeded RNG fully determines the outcome.
//!
//! Scorers that can lack data return `Option`; `None` means "leave this
//! dimension out of the weighted mean", never "score it zero".

pub mod audio_match;
pub mod diversity;
pub mod exploration;
pub mod penalties;
pub mod preference;
pub mod recency;
pub mod serendipity;
pub mod session_flow;
pub mod temporal;

pub use audio_match::{audio_match, harmonic_compatibility, harmonic_flow};
pub use diversity::diversity_score;
pub use exploration::exploration_score;
pub use penalties::{dislike_penalty, fatigue_penalty, repetition_penalty};
pub use preference::{activity_match, base_preference, mood_match};
pub use recency::{recency_penalty, recency_score};
pub use serendipity::serendipity_score;
pub use session_flow::session_flow_score;
pub use temporal::{enhanced_temporal_fit, temporal_fit, TimeOfDay};

/// Clamp a raw score into `[0, 1]`, mapping non-finite values to `fallback`.
#[inline]
#[must_use]
pub fn sanitize(score: f64, fallback: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        fallback
    }
}
