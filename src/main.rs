//! # Segue - Scored Recommendations & Smart Queue
//!
//! Command-line front end for the Segue library. It ranks a library of
//! tracks for a listener, or simulates a listening session in which the
//! smart queue keeps itself stocked.
//!
//! ## Usage
//!
//! ```bash
//! # Rank a library for 9 in the morning, with explanations
//! segue rank --library tracks.json --profile me.json --hour 9 --explain
//!
//! # Play 30 tracks through the self-replenishing queue
//! segue queue --library tracks.json --profile me.json --plays 30 --seed 1
//!
//! # Where does the configuration come from?
//! segue config path
//! ```
//!
//! Set `RUST_LOG=segue=debug` to follow the pipeline decisions.

use anyhow::{Context, Result};
use chrono::{Timelike, Utc};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use segue::algorithm::statistics::analyze_score_distribution;
use segue::algorithm::{batch_calculate_scores, rank_tracks, ScoredTrack, ScoringContext, ScoringInput};
use segue::cache::FeatureCache;
use segue::cli::{self, ConfigAction, LibraryArgs};
use segue::completion;
use segue::config::{self, EngineConfig};
use segue::history::{self, InMemoryHistoryStore, LikedTracksSource, UserHistoryStore};
use segue::providers::{FeatureGateway, FeatureProvider, SeedTracksSource, StaticFeatureProvider};
use segue::queue::{InMemoryQueueStore, QueueEvent, SmartQueueController};
use segue::session::{MoodTarget, SessionState};
use segue::track::{Provenance, QueueEntry, SourceType};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    debug!("Parsed arguments: {args:?}");

    match args.command {
        cli::Command::Rank {
            input,
            hour,
            limit,
            explain,
        } => {
            let config = load_config(args.config.as_deref(), input.seed)?;
            rank(&config, &input, hour, limit, explain)?;
        }
        cli::Command::Queue { input, plays, optimize } => {
            let config = load_config(args.config.as_deref(), input.seed)?;
            simulate_queue(config, &input, plays, optimize).await?;
        }
        cli::Command::Config { action } => match action {
            ConfigAction::Show => {
                let config = config::load_config(args.config.as_deref())?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Path => {
                let path = match args.config {
                    Some(path) => path,
                    None => config::get_config_path()?,
                };
                println!("{}", path.display());
            }
        },
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>, seed: Option<u64>) -> Result<EngineConfig> {
    let mut config = config::load_config(path)?;
    if seed.is_some() {
        config.auto_queue.seed = seed;
    }
    Ok(config)
}

fn mood_of(input: &LibraryArgs) -> Option<MoodTarget> {
    input.mood.map(|(valence, energy)| MoodTarget { valence, energy })
}

fn rank(config: &EngineConfig, input: &LibraryArgs, hour: Option<u32>, limit: Option<usize>, explain: bool) -> Result<()> {
    let library = history::load_library(&input.library)?;
    let profile = history::load_profile(&input.profile)?;
    let session = SessionState::with_capacity(config.auto_queue.session_capacity);

    let now = Utc::now();
    let hour = hour.unwrap_or_else(|| chrono::Local::now().hour());
    let context = ScoringContext::new(&profile, &session, config)
        .at(now, hour)
        .with_mood(mood_of(input))
        .with_activity(input.activity);

    let mut rng = config
        .auto_queue
        .seed
        .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let inputs: Vec<ScoringInput> = library.into_iter().map(ScoringInput::new).collect();
    let ranked = rank_tracks(batch_calculate_scores(inputs, &context, &mut rng));
    info!("Ranked {} tracks for hour {hour}", ranked.len());

    for (position, scored) in ranked.iter().take(limit.unwrap_or(usize::MAX)).enumerate() {
        print_scored(position + 1, scored, explain);
    }

    if explain {
        if let Some(stats) = analyze_score_distribution(&ranked) {
            println!();
            println!(
                "{} tracks: mean {:.1}, std dev {:.1}, min {:.1}, max {:.1}",
                stats.count, stats.mean, stats.std_deviation, stats.min, stats.max
            );
        }
    }
    Ok(())
}

fn print_scored(rank: usize, scored: &ScoredTrack, explain: bool) {
    println!("{rank:>3}. {:>5.1}  {}", scored.score, scored.track.display_name());
    if !explain {
        return;
    }
    for (dimension, value) in scored.components.iter() {
        println!("         {dimension:<18} {value:.3}");
    }
    for reason in &scored.explanations {
        println!("         * {reason}");
    }
}

fn print_entry(entry: &QueueEntry) {
    let provenance = entry.provenance();
    println!(
        "    + {} [{}: {}]",
        entry.track.display_name(),
        provenance.source,
        provenance.label
    );
}

async fn simulate_queue(config: EngineConfig, input: &LibraryArgs, plays: usize, optimize: bool) -> Result<()> {
    let library = history::load_library(&input.library)?;
    let profile = history::load_profile(&input.profile)?;
    info!("Simulating {plays} plays over a library of {} tracks", library.len());

    let embedded: Arc<dyn FeatureProvider> = Arc::new(StaticFeatureProvider::from_tracks("library", 0, &library));
    let cache = Arc::new(FeatureCache::new(config.cache.capacity, config.cache.ttl()));
    let gateway = FeatureGateway::new(vec![embedded], cache, config.auto_queue.provider_timeout());

    let history = Arc::new(InMemoryHistoryStore::new(profile, library.clone()));
    let history_store: Arc<dyn UserHistoryStore> = history.clone();
    let radio = SeedTracksSource::new(
        "library",
        Provenance::new(SourceType::Radio, "From your library"),
        library,
    );

    let controller = SmartQueueController::new(InMemoryQueueStore::new(), gateway, Arc::clone(&history_store), config)
        .with_source(Arc::new(LikedTracksSource::new(history_store)))
        .with_source(Arc::new(radio));
    controller.set_mood(mood_of(input));
    controller.set_activity(input.activity);
    controller.subscribe(Arc::new(|event: &QueueEvent| match event {
        QueueEvent::ReplenishStarted { upcoming } => println!("~ replenishing ({upcoming} upcoming)"),
        QueueEvent::ReplenishFailed { error } => eprintln!("~ replenish failed: {error}"),
        QueueEvent::Optimized { moved } => println!("~ optimized, {moved} moved"),
        QueueEvent::ReplenishCompleted { .. } | QueueEvent::ReplenishSkipped { .. } => {}
    }));

    let mut known = 0;
    controller
        .replenish_if_needed()
        .await
        .context("Failed to fill the initial queue")?;

    for play in 1..=plays {
        known = report_new_entries(&controller, known, optimize).await?;
        let Some(track) = controller.advance().await? else {
            println!("Queue ran dry after {} plays", play - 1);
            return Ok(());
        };
        history.record_play(&track, Utc::now());
        println!("{play:>3}. > {}", track.display_name());
    }
    report_new_entries(&controller, known, optimize).await?;
    Ok(())
}

/// Print entries appended since the last call; returns the new queue length.
async fn report_new_entries(
    controller: &SmartQueueController<InMemoryQueueStore>,
    known: usize,
    optimize: bool,
) -> Result<usize> {
    let queue = controller.queue_snapshot().await;
    if queue.len() <= known {
        return Ok(known);
    }
    for entry in &queue[known..] {
        print_entry(entry);
    }
    if optimize {
        controller.optimize().await?;
    }
    Ok(queue.len())
}
