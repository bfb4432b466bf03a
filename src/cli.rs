//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `segue` binary.
//!
//! ## Commands
//!
//! - `rank`: Score and rank a library of tracks against a listener profile
//! - `queue`: Simulate playback through the self-replenishing queue
//! - `config`: Show the effective configuration or where it is read from
//! - `completion`: Generate shell completion scripts
//!
//! ## Examples
//!
//! ```bash
//! segue rank --library tracks.json --profile me.json --limit 10 --explain
//! segue queue --library tracks.json --profile me.json --plays 25 --seed 7
//! segue config show
//! ```

use crate::session::Activity;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// Everything is reached through a subcommand; `--config` applies to all
/// of them.
#[derive(Parser, Debug)]
#[command(name = "segue")]
#[command(about = "Segue: scored track recommendations & a self-replenishing play queue")]
#[command(version)]
pub struct Args {
    /// Read the configuration from this file instead of the default location
    #[arg(long, global = true, env = "SEGUE_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Inputs shared by the commands that work on a library.
#[derive(clap::Args, Debug, Clone)]
pub struct LibraryArgs {
    /// JSON file with the track library
    ///
    /// Either a bare array of tracks or an object with a `tracks` array.
    /// Audio features embedded in the tracks are used as the feature source.
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub library: PathBuf,

    /// JSON file with the listener profile (play counts, likes, dislikes)
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub profile: PathBuf,

    /// Seed for the random number generator, for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Target mood as VALENCE,ENERGY, both within [0, 1]
    #[arg(long, value_parser = parse_mood, value_name = "VALENCE,ENERGY")]
    pub mood: Option<(f64, f64)>,

    /// Activity the music should fit
    #[arg(long, value_enum)]
    pub activity: Option<Activity>,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score and rank every track in a library
    ///
    /// Runs the full scoring pipeline (preference, temporal fit, diversity,
    /// exploration, serendipity, recency and the penalties) for each track
    /// and prints them best first.
    Rank {
        #[command(flatten)]
        input: LibraryArgs,

        /// Hour of day (0-23) to score for instead of the local time
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: Option<u32>,

        /// Only print the best N tracks
        #[arg(short, long)]
        limit: Option<usize>,

        /// Show the per-dimension breakdown and the reasons behind each score
        #[arg(short, long)]
        explain: bool,
    },

    /// Simulate listening through the smart queue
    ///
    /// Starts with an empty queue, lets the controller fill it from the
    /// library and the listener's liked tracks, then plays N tracks. Every
    /// replenishment is printed with the provenance of the queued tracks.
    Queue {
        #[command(flatten)]
        input: LibraryArgs,

        /// Number of tracks to play
        #[arg(long, default_value_t = 20)]
        plays: usize,

        /// Re-rank the upcoming tracks after each replenishment
        #[arg(long)]
        optimize: bool,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    ///
    /// Usage: segue completion bash > ~/.local/share/bash-completion/completions/segue
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,

    /// Print the path the configuration is read from
    Path,
}

fn parse_mood(raw: &str) -> Result<(f64, f64), String> {
    let (valence, energy) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected VALENCE,ENERGY, got '{raw}'"))?;
    let parse = |value: &str| -> Result<f64, String> {
        let parsed: f64 = value
            .trim()
            .parse()
            .map_err(|_| format!("'{value}' is not a number"))?;
        if (0.0..=1.0).contains(&parsed) {
            Ok(parsed)
        } else {
            Err(format!("{parsed} is outside [0, 1]"))
        }
    };
    Ok((parse(valence)?, parse(energy)?))
}
