//! # Configuration Module
//!
//! Tunables for every scorer, the selection engine and the auto-queue
//! controller, plus the platform-appropriate location of the config file.
//!
//! ## Config File
//!
//! Segue reads `config.json` from the platform-standard config directory:
//! - Linux: `~/.config/segue/config.json`
//! - macOS: `~/Library/Application Support/segue/config.json`
//! - Windows: `%APPDATA%\segue\config.json`
//!
//! Every key is optional; anything left out keeps its default. Keys use
//! camelCase:
//!
//! ```json
//! {
//!   "weights": { "basePreference": 0.4, "explorationBonus": 0.0 },
//!   "exploration": { "epsilon": 0.05 },
//!   "autoQueue": { "threshold": 3, "batchSize": 15 }
//! }
//! ```

use crate::combiner::ScoringWeights;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Preferred energy per hour of day, midnight first.
pub const DEFAULT_ENERGY_CURVE: [f64; 24] = [
    0.20, 0.15, 0.10, 0.10, 0.15, 0.25, // 00-05
    0.40, 0.50, 0.60, 0.65, 0.65, 0.70, // 06-11
    0.65, 0.60, 0.60, 0.65, 0.70, 0.75, // 12-17
    0.70, 0.65, 0.55, 0.45, 0.35, 0.25, // 18-23
];

/// Returns the path of the config file, creating its directory.
///
/// # Errors
///
/// Fails when the platform has no config directory or the `segue`
/// subdirectory cannot be created.
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system config directory. Please pass --config explicitly."
        )
    })?;

    let segue_dir = config_dir.join("segue");
    fs::create_dir_all(&segue_dir).with_context(|| {
        format!(
            "Failed to create Segue config directory at {}. Please check file permissions.",
            segue_dir.display()
        )
    })?;

    Ok(segue_dir.join("config.json"))
}

/// Load the configuration from `path`, or from the default location.
///
/// A missing default file yields [`EngineConfig::default`]; an explicitly
/// requested file must exist.
///
/// # Errors
///
/// Fails on unreadable or malformed files and on values rejected by
/// [`EngineConfig::validate`].
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (get_config_path()?, false),
    };

    if !path.exists() {
        if required {
            anyhow::bail!("Config file {} does not exist", path.display());
        }
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(EngineConfig::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: EngineConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Everything the engine can be tuned with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub weights: ScoringWeights,
    pub diversity: DiversityConfig,
    pub session_flow: SessionFlowConfig,
    pub exploration: ExplorationConfig,
    pub recency: RecencyConfig,
    pub temporal: TemporalConfig,
    pub audio_match: AudioMatchWeights,
    pub auto_queue: AutoQueueConfig,
    pub cache: CacheConfig,
}

impl EngineConfig {
    /// Reject values the scorers cannot work with.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending value.
    pub fn validate(&self) -> Result<()> {
        if let Some((dimension, weight)) = self
            .weights
            .iter()
            .find(|(_, w)| !w.is_finite() || *w < 0.0)
        {
            anyhow::bail!("Weight for {dimension} must be a non-negative number, got {weight}");
        }
        if !(0.0..=1.0).contains(&self.exploration.epsilon) {
            anyhow::bail!("exploration.epsilon must be within [0, 1]");
        }
        if self.recency.half_life_days <= 0.0 {
            anyhow::bail!("recency.halfLifeDays must be positive");
        }
        if self.session_flow.max_energy_jump <= 0.0 {
            anyhow::bail!("sessionFlow.maxEnergyJump must be positive");
        }
        if self.auto_queue.batch_size == 0 {
            anyhow::bail!("autoQueue.batchSize must be at least 1");
        }
        if self.diversity.max_same_artist == 0 {
            anyhow::bail!("diversity.maxSameArtist must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiversityConfig {
    pub max_same_artist: usize,
    pub target_genre_variety: usize,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            max_same_artist: 2,
            target_genre_variety: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionFlowConfig {
    pub max_energy_jump: f64,
}

impl Default for SessionFlowConfig {
    fn default() -> Self {
        Self {
            max_energy_jump: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExplorationConfig {
    /// Probability of the flat random boost.
    pub epsilon: f64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self { epsilon: 0.15 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecencyConfig {
    pub half_life_days: f64,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            half_life_days: 7.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemporalConfig {
    /// Preferred energy per hour. Anything but 24 values means "use the default".
    pub energy_curve: Vec<f64>,
    /// Use the hour-label mood rules on top of the energy curve.
    pub enhanced: bool,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            energy_curve: DEFAULT_ENERGY_CURVE.to_vec(),
            enhanced: false,
        }
    }
}

impl TemporalConfig {
    /// The configured curve, or the default one when it is not 24 entries long.
    #[must_use]
    pub fn curve(&self) -> &[f64] {
        if self.energy_curve.len() == 24 {
            &self.energy_curve
        } else {
            &DEFAULT_ENERGY_CURVE
        }
    }
}

/// Relative weights of the AudioMatch similarity terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioMatchWeights {
    pub bpm: f64,
    pub energy: f64,
    pub key: f64,
    pub valence: f64,
}

impl Default for AudioMatchWeights {
    fn default() -> Self {
        Self {
            bpm: 0.3,
            energy: 0.3,
            key: 0.2,
            valence: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoQueueConfig {
    /// Replenish when this many tracks or fewer are left after the current one.
    pub threshold: usize,
    pub batch_size: usize,
    /// Tracks played within this many hours are not queued again.
    pub exclusion_window_hours: f64,
    /// Softmax temperature applied to 0-100 scores when sampling a batch.
    pub temperature: f64,
    pub provider_timeout_ms: u64,
    /// How many candidates each source is asked for.
    pub candidates_per_source: usize,
    pub session_capacity: usize,
    /// Fixed seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for AutoQueueConfig {
    fn default() -> Self {
        Self {
            threshold: 2,
            batch_size: 10,
            exclusion_window_hours: 4.0,
            temperature: 10.0,
            provider_timeout_ms: 2_000,
            candidates_per_source: 100,
            session_capacity: crate::session::DEFAULT_SESSION_CAPACITY,
            seed: None,
        }
    }
}

impl AutoQueueConfig {
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 2_048,
            ttl_secs: 3_600,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
