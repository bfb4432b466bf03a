//! User history access.
//!
//! The scoring core reads a [`UserProfile`] snapshot and the liked tracks
//! through [`UserHistoryStore`]. [`InMemoryHistoryStore`] backs the CLI and
//! the tests; it also records simulated plays so exclusion windows and
//! recency penalties evolve during a session.

use crate::providers::{CandidateSource, ProviderError};
use crate::session::UserProfile;
use crate::track::{Provenance, SourceType, Track, TrackId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

#[async_trait]
pub trait UserHistoryStore: Send + Sync {
    /// Current snapshot of the listener's profile.
    async fn profile(&self) -> Result<UserProfile, ProviderError>;

    /// Liked tracks, most relevant first.
    async fn liked_tracks(&self, limit: usize) -> Result<Vec<Track>, ProviderError>;
}

/// Library of tracks as stored in a JSON file: either a bare array or
/// `{ "tracks": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LibraryFile {
    Bare(Vec<Track>),
    Wrapped { tracks: Vec<Track> },
}

/// Read a track library from a JSON file.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed.
pub fn load_library(path: &Path) -> Result<Vec<Track>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read library file {}", path.display()))?;
    let library: LibraryFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse library file {}", path.display()))?;
    let tracks = match library {
        LibraryFile::Bare(tracks) | LibraryFile::Wrapped { tracks } => tracks,
    };
    log::debug!("Loaded {} tracks from {}", tracks.len(), path.display());
    Ok(tracks)
}

/// Read a [`UserProfile`] from a JSON file.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed.
pub fn load_profile(path: &Path) -> Result<UserProfile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse profile file {}", path.display()))
}

/// Profile plus a track library, held in memory.
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    profile: RwLock<UserProfile>,
    library: HashMap<TrackId, Track>,
}

impl InMemoryHistoryStore {
    #[must_use]
    pub fn new(profile: UserProfile, library: Vec<Track>) -> Self {
        Self {
            profile: RwLock::new(profile),
            library: library.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Register a play of `track` at `at`: last-played time and play counts.
    pub fn record_play(&self, track: &Track, at: DateTime<Utc>) {
        let mut profile = self.profile.write().unwrap_or_else(PoisonError::into_inner);
        profile.last_played.insert(track.id.clone(), at);
        for artist in &track.artist_ids {
            *profile.artist_play_counts.entry(artist.clone()).or_insert(0) += 1;
        }
        if let Some(genre) = track.primary_genre() {
            *profile.genre_play_counts.entry(genre.to_string()).or_insert(0) += 1;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> UserProfile {
        self.profile.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl UserHistoryStore for InMemoryHistoryStore {
    async fn profile(&self) -> Result<UserProfile, ProviderError> {
        Ok(self.snapshot())
    }

    async fn liked_tracks(&self, limit: usize) -> Result<Vec<Track>, ProviderError> {
        let profile = self.snapshot();
        let mut liked: Vec<&Track> = profile
            .liked_tracks
            .iter()
            .filter_map(|id| self.library.get(id))
            .collect();
        let plays = |t: &Track| t.primary_artist().map_or(0, |artist| profile.artist_plays(artist));
        // most played artists first, ids break ties for a stable order
        liked.sort_by(|a, b| plays(*b).cmp(&plays(*a)).then_with(|| a.id.cmp(&b.id)));
        Ok(liked.into_iter().take(limit).cloned().collect())
    }
}

/// Candidate source drawing on the listener's liked tracks.
pub struct LikedTracksSource {
    store: Arc<dyn UserHistoryStore>,
}

impl LikedTracksSource {
    #[must_use]
    pub fn new(store: Arc<dyn UserHistoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CandidateSource for LikedTracksSource {
    fn name(&self) -> &str {
        "liked-tracks"
    }

    fn provenance(&self) -> Provenance {
        Provenance::new(SourceType::Auto, "From your liked tracks")
    }

    async fn candidates(&self, limit: usize) -> Result<Vec<Track>, ProviderError> {
        self.store.liked_tracks(limit).await
    }
}
