//! # Track Model
//!
//! Tracks, their audio features and the provenance attached to queue entries.
//!
//! Audio features arrive from heterogeneous providers, so every value is
//! optional and [`AudioFeatures::normalized`] is the single place where
//! out-of-range or non-finite values are dropped before they reach a scorer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a track across providers and stores.
pub type TrackId = String;

/// Major or minor tonality of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

/// Audio analysis of a single track.
///
/// `bpm` is a positive real, `key` a pitch class in `0..=11` (C = 0) and the
/// remaining values are normalized to `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioFeatures {
    pub bpm: Option<f64>,
    pub key: Option<u8>,
    pub mode: Option<Mode>,
    pub energy: Option<f64>,
    pub valence: Option<f64>,
    pub danceability: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub loudness: Option<f64>,
    pub speechiness: Option<f64>,
}

impl AudioFeatures {
    /// Drop values that would poison a scorer.
    ///
    /// Non-finite values and out-of-range keys/tempos become `None`; unit
    /// features are clamped into `[0, 1]`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            bpm: self.bpm.filter(|bpm| bpm.is_finite() && *bpm > 0.0),
            key: self.key.filter(|key| *key < 12),
            mode: self.mode,
            energy: unit(self.energy),
            valence: unit(self.valence),
            danceability: unit(self.danceability),
            acousticness: unit(self.acousticness),
            instrumentalness: unit(self.instrumentalness),
            loudness: unit(self.loudness),
            speechiness: unit(self.speechiness),
        }
    }

    /// Fill every missing value in `self` from `other`.
    #[must_use]
    pub fn merged_with(self, other: &Self) -> Self {
        Self {
            bpm: self.bpm.or(other.bpm),
            key: self.key.or(other.key),
            mode: self.mode.or(other.mode),
            energy: self.energy.or(other.energy),
            valence: self.valence.or(other.valence),
            danceability: self.danceability.or(other.danceability),
            acousticness: self.acousticness.or(other.acousticness),
            instrumentalness: self.instrumentalness.or(other.instrumentalness),
            loudness: self.loudness.or(other.loudness),
            speechiness: self.speechiness.or(other.speechiness),
        }
    }

    /// True when no field carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn unit(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(|v| v.clamp(0.0, 1.0))
}

/// A playable track as seen by the scoring layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist_ids: Vec<String>,
    pub artist_names: Vec<String>,
    /// Genre tags; the first one is treated as the primary genre.
    pub genres: Vec<String>,
    pub duration_secs: u32,
    pub features: Option<AudioFeatures>,
}

impl Track {
    #[must_use]
    pub fn new(id: impl Into<TrackId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_artist(mut self, artist_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.artist_ids.push(artist_id.into());
        self.artist_names.push(name.into());
        self
    }

    #[must_use]
    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genres.push(genre.into());
        self
    }

    #[must_use]
    pub fn with_features(mut self, features: AudioFeatures) -> Self {
        self.features = Some(features);
        self
    }

    #[must_use]
    pub fn primary_artist(&self) -> Option<&str> {
        self.artist_ids.first().map(String::as_str)
    }

    #[must_use]
    pub fn primary_genre(&self) -> Option<&str> {
        self.genres.first().map(String::as_str)
    }

    /// Energy from the embedded features, if known.
    #[must_use]
    pub fn energy(&self) -> Option<f64> {
        self.features.as_ref().and_then(|f| f.energy)
    }

    /// "Artist - Title" label used by the CLI and logs.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.artist_names.first() {
            Some(artist) => format!("{artist} - {}", self.title),
            None => self.title.clone(),
        }
    }
}

/// Where a queued track came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Artist,
    Album,
    Genre,
    Similar,
    Radio,
    Auto,
    Manual,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Genre => "genre",
            Self::Similar => "similar",
            Self::Radio => "radio",
            Self::Auto => "auto",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Source type plus the human label shown next to the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: SourceType,
    pub label: String,
}

impl Provenance {
    #[must_use]
    pub fn new(source: SourceType, label: impl Into<String>) -> Self {
        Self {
            source,
            label: label.into(),
        }
    }

    #[must_use]
    pub fn manual() -> Self {
        Self::new(SourceType::Manual, "Added by you")
    }
}

/// One slot of the play queue.
///
/// Provenance is fixed when the entry is created; there is no setter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub track: Track,
    provenance: Provenance,
}

impl QueueEntry {
    #[must_use]
    pub fn new(track: Track, provenance: Provenance) -> Self {
        Self { track, provenance }
    }

    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.track.id
    }
}
