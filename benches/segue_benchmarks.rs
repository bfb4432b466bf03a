//! # Segue Performance Benchmarks
//!
//! Benchmarks for the hot paths of the recommendation pipeline.
//!
//! ## Benchmark Categories
//!
//! - **Scoring**: Single-track scoring, parallel batch scoring and ranking
//! - **Selection**: Softmax, weighted sampling and variety enforcement
//! - **Combiner**: Folding sub-scores into the final score
//! - **Queue**: A full replenishment against in-memory providers
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark group
//! cargo bench scoring
//! cargo bench selection
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use segue::algorithm::{self, ScoringContext, ScoringInput};
use segue::cache::FeatureCache;
use segue::combiner::{self, Dimension, ScoreComponents};
use segue::config::EngineConfig;
use segue::history::{InMemoryHistoryStore, UserHistoryStore};
use segue::providers::{FeatureGateway, FeatureProvider, SeedTracksSource, StaticFeatureProvider};
use segue::queue::{InMemoryQueueStore, SmartQueueController};
use segue::selection;
use segue::session::{SessionEntry, SessionState, UserProfile};
use segue::track::{AudioFeatures, Mode, Provenance, SourceType, Track};
use std::hint::black_box;
use std::sync::Arc;

/// Tracks spread over 20 artists and 4 genres with varied audio analysis.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn create_test_tracks(count: usize) -> Vec<Track> {
    const GENRES: [&str; 4] = ["rock", "jazz", "electronic", "folk"];
    (0..count)
        .map(|i| {
            let artist = i % 20;
            Track::new(format!("track{i:05}"), format!("Song {i:05}"))
                .with_artist(format!("artist{artist}"), format!("Artist {artist}"))
                .with_genre(GENRES[i % GENRES.len()])
                .with_features(AudioFeatures {
                    bpm: Some(80.0 + (i % 80) as f64),
                    key: Some((i % 12) as u8),
                    mode: Some(if i % 3 == 0 { Mode::Minor } else { Mode::Major }),
                    energy: Some((i % 10) as f64 / 10.0),
                    valence: Some((i % 7) as f64 / 7.0),
                    ..AudioFeatures::default()
                })
        })
        .collect()
}

fn create_profile() -> UserProfile {
    let mut profile = UserProfile::default();
    profile.top_artists = (0..5).map(|i| format!("artist{i}")).collect();
    profile.top_genres = vec!["rock".to_string(), "jazz".to_string()];
    for i in 0..10u32 {
        profile.artist_play_counts.insert(format!("artist{i}"), 10 * (i + 1));
    }
    profile
}

fn create_session(tracks: &[Track]) -> SessionState {
    let mut session = SessionState::with_capacity(50);
    for track in tracks.iter().take(10) {
        session.push(SessionEntry::from(track));
    }
    session
}

/// Benchmark scoring performance
fn benchmark_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");

    let config = EngineConfig::default();
    let profile = create_profile();
    let history = create_test_tracks(10);
    let session = create_session(&history);
    let context = ScoringContext::new(&profile, &session, &config);

    let track = create_test_tracks(1).remove(0);
    group.bench_function("single_track_score", |b| {
        b.iter_batched(
            || ScoringInput::new(track.clone()),
            |input| algorithm::score_track(input, black_box(&context), black_box(0.5)),
            BatchSize::SmallInput,
        )
    });

    for size in [10, 100, 1000] {
        let tracks = create_test_tracks(size);
        group.bench_with_input(BenchmarkId::new("batch_scoring", size), &tracks, |b, tracks| {
            let mut rng = StdRng::seed_from_u64(7);
            b.iter_batched(
                || tracks.iter().cloned().map(ScoringInput::new).collect::<Vec<_>>(),
                |inputs| algorithm::batch_calculate_scores(inputs, black_box(&context), &mut rng),
                BatchSize::SmallInput,
            )
        });
    }

    let mut rng = StdRng::seed_from_u64(7);
    let scored = algorithm::batch_calculate_scores(
        create_test_tracks(1000).into_iter().map(ScoringInput::new).collect(),
        &context,
        &mut rng,
    );
    group.bench_function("rank_1000_tracks", |b| {
        b.iter_batched(|| scored.clone(), algorithm::rank_tracks, BatchSize::SmallInput)
    });

    group.finish();
}

/// Benchmark softmax sampling and variety enforcement
fn benchmark_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    #[allow(clippy::cast_precision_loss)]
    let scores: Vec<f64> = (0..300).map(|i| (i * 37 % 100) as f64).collect();
    group.bench_function("softmax_300", |b| {
        b.iter(|| selection::softmax(black_box(&scores), black_box(10.0)))
    });

    let items: Vec<usize> = (0..scores.len()).collect();
    for count in [10, 50] {
        group.bench_with_input(BenchmarkId::new("weighted_select", count), &count, |b, count| {
            let mut rng = StdRng::seed_from_u64(11);
            b.iter(|| selection::weighted_random_select(&items, &scores, *count, 10.0, &mut rng))
        });
    }

    let tracks = create_test_tracks(60);
    group.bench_function("enforce_variety_30_of_60", |b| {
        b.iter_batched(
            || (tracks[..30].to_vec(), tracks[30..].to_vec()),
            |(batch, reserve)| {
                selection::enforce_variety(batch, reserve, 2, |t: &Track| t.primary_artist().map(str::to_string))
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

/// Benchmark the weighted combiner
fn benchmark_combiner(c: &mut Criterion) {
    let weights = EngineConfig::default().weights;
    let components: ScoreComponents = [
        (Dimension::BasePreference, 0.8),
        (Dimension::TemporalFit, 0.6),
        (Dimension::SessionFlow, 0.9),
        (Dimension::ExplorationBonus, 0.3),
        (Dimension::DiversityScore, 0.5),
        (Dimension::RecentPlayPenalty, 10.0),
        (Dimension::RepetitionPenalty, 15.0),
    ]
    .into_iter()
    .collect();

    c.bench_function("combine_components", |b| {
        b.iter(|| combiner::combine(black_box(&components), black_box(&weights)))
    });
}

/// Benchmark a full replenishment from an empty queue
fn benchmark_replenish(c: &mut Criterion) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => panic!("Failed to start tokio runtime: {e}"),
    };
    let library = create_test_tracks(500);
    let mut config = EngineConfig::default();
    config.auto_queue.seed = Some(5);

    c.bench_function("replenish_from_500_candidates", |b| {
        b.iter_batched(
            || {
                let provider: Arc<dyn FeatureProvider> =
                    Arc::new(StaticFeatureProvider::from_tracks("library", 0, &library));
                let cache = Arc::new(FeatureCache::new(config.cache.capacity, config.cache.ttl()));
                let gateway = FeatureGateway::new(vec![provider], cache, config.auto_queue.provider_timeout());
                let history: Arc<dyn UserHistoryStore> =
                    Arc::new(InMemoryHistoryStore::new(create_profile(), library.clone()));
                SmartQueueController::new(InMemoryQueueStore::new(), gateway, history, config.clone()).with_source(
                    Arc::new(SeedTracksSource::new(
                        "library",
                        Provenance::new(SourceType::Radio, "Library"),
                        library.clone(),
                    )),
                )
            },
            |controller| runtime.block_on(async move { controller.replenish_if_needed().await.is_ok() }),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    benchmark_scoring,
    benchmark_selection,
    benchmark_combiner,
    benchmark_replenish
);
criterion_main!(benches);
