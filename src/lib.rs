//! Scored music recommendations and a play queue that refills itself.
//!
//! Core modules:
//! - [`algorithm`] - Scoring pipeline: context, batch scoring, ranking
//! - [`scorers`] - One pure function per scoring dimension
//! - [`combiner`] - Weighted combination of sub-scores into `[0, 100]`
//! - [`selection`] - Softmax sampling and artist variety
//! - [`queue`] - Queue storage and the smart queue controller
//!
//! ### Supporting Modules
//!
//! - [`track`] / [`session`] - Tracks, audio features, session and profile state
//! - [`providers`] - Async feature, ML and candidate providers
//! - [`cache`] - Bounded feature cache with request dedup
//! - [`history`] - Listening history access and JSON loaders
//! - [`config`] - Configuration and its on-disk location
//! - [`cli`] / [`completion`] - Command-line definitions and shell completion
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use segue::algorithm::{rank_tracks, batch_calculate_scores, ScoringContext, ScoringInput};
//! use segue::config::EngineConfig;
//! use segue::session::{SessionState, UserProfile};
//! use segue::track::Track;
//! use rand::SeedableRng;
//!
//! let config = EngineConfig::default();
//! let profile = UserProfile::default();
//! let session = SessionState::with_capacity(50);
//! let context = ScoringContext::new(&profile, &session, &config);
//!
//! let library = vec![
//!     Track::new("t1", "Blue in Green").with_artist("miles", "Miles Davis").with_genre("jazz"),
//!     Track::new("t2", "Windowlicker").with_artist("aphex", "Aphex Twin").with_genre("electronic"),
//! ];
//! let inputs = library.into_iter().map(ScoringInput::new).collect();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! for scored in rank_tracks(batch_calculate_scores(inputs, &context, &mut rng)) {
//!     println!("{:>5.1} {}", scored.score, scored.track.display_name());
//! }
//! ```
//!
//! ## Scores
//!
//! Every score lives on a 0-100 scale where 50 means "neutral / no data".
//! Scorers return `None` when they lack the inputs they need; such
//! dimensions are left out of the weighted average instead of counting as
//! zero. Penalties are subtracted after the average and the result is
//! clamped.
//!
//! ## Smart Queue
//!
//! [`queue::SmartQueueController`] watches how many tracks are left after
//! the current one and, at or below the configured threshold, gathers
//! candidates from its sources, scores them and appends a varied batch.
//! Overlapping triggers collapse into one replenishment.
//!
//! ## Error Handling
//!
//! Provider and queue seams return typed errors ([`providers::ProviderError`],
//! [`queue::QueueError`]); file loading and configuration use
//! `anyhow::Result` with context. Missing data never fails a score.

pub mod algorithm;
pub mod cache;
pub mod cli;
pub mod combiner;
pub mod completion;
pub mod config;
pub mod history;
pub mod providers;
pub mod queue;
pub mod scorers;
pub mod selection;
pub mod session;
pub mod track;
