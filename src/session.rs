//! # Session & Profile State
//!
//! The context shapes the scorers read: what has been played in this
//! session, what the listener's long-term taste looks like, and the
//! optional mood/activity the listener asked for.
//!
//! [`SessionState`] is only ever mutated by the queue controller when the
//! playing track changes. [`UserProfile`] is a read-only snapshot handed
//! out by a [`crate::history::UserHistoryStore`].

use crate::track::{AudioFeatures, Track, TrackId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Default number of entries a session remembers.
pub const DEFAULT_SESSION_CAPACITY: usize = 50;

/// What the scorers need to know about one session track.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub track_id: TrackId,
    pub artist_ids: Vec<String>,
    pub genres: Vec<String>,
    pub features: Option<AudioFeatures>,
}

impl SessionEntry {
    #[must_use]
    pub fn energy(&self) -> Option<f64> {
        self.features.as_ref().and_then(|f| f.energy)
    }

    #[must_use]
    pub fn primary_artist(&self) -> Option<&str> {
        self.artist_ids.first().map(String::as_str)
    }

    #[must_use]
    pub fn primary_genre(&self) -> Option<&str> {
        self.genres.first().map(String::as_str)
    }
}

impl From<&Track> for SessionEntry {
    fn from(track: &Track) -> Self {
        Self {
            track_id: track.id.clone(),
            artist_ids: track.artist_ids.clone(),
            genres: track.genres.clone(),
            features: track.features.clone().map(AudioFeatures::normalized),
        }
    }
}

/// Ordered, bounded history of the tracks played in this session.
#[derive(Debug, Clone)]
pub struct SessionState {
    entries: VecDeque<SessionEntry>,
    capacity: usize,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SESSION_CAPACITY)
    }
}

impl SessionState {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one when full.
    pub fn push(&mut self, entry: SessionEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Replace the features of the newest entry if it is still `track_id`.
    ///
    /// Returns false when the session has moved on.
    pub fn attach_features(&mut self, track_id: &str, features: AudioFeatures) -> bool {
        match self.entries.back_mut() {
            Some(last) if last.track_id == track_id => {
                let merged = features.normalized();
                last.features = Some(match last.features.take() {
                    Some(existing) => existing.merged_with(&merged),
                    None => merged,
                });
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn last(&self) -> Option<&SessionEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SessionEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains_track(&self, track_id: &str) -> bool {
        self.entries.iter().any(|e| e.track_id == track_id)
    }

    /// How many session entries list `artist_id` as an artist.
    #[must_use]
    pub fn artist_occurrences(&self, artist_id: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.artist_ids.iter().any(|a| a == artist_id))
            .count()
    }

    /// How many session entries have `genre` as primary genre (case-insensitive).
    #[must_use]
    pub fn genre_occurrences(&self, genre: &str) -> usize {
        self.entries
            .iter()
            .filter_map(SessionEntry::primary_genre)
            .filter(|g| g.eq_ignore_ascii_case(genre))
            .count()
    }

    /// Number of distinct primary genres (case-insensitive).
    #[must_use]
    pub fn distinct_genres(&self) -> usize {
        self.entries
            .iter()
            .filter_map(SessionEntry::primary_genre)
            .map(str::to_lowercase)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Long-term listening profile of the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    pub top_artists: Vec<String>,
    pub top_genres: Vec<String>,
    pub artist_play_counts: HashMap<String, u32>,
    pub genre_play_counts: HashMap<String, u32>,
    pub last_played: HashMap<TrackId, DateTime<Utc>>,
    pub liked_tracks: HashSet<TrackId>,
    pub disliked_tracks: HashSet<TrackId>,
    pub disliked_artists: HashSet<String>,
    /// 0 = stick to the familiar, 1 = always explore. 0.5 is neutral.
    pub exploration_level: Option<f64>,
}

impl UserProfile {
    #[must_use]
    pub fn artist_plays(&self, artist_id: &str) -> u32 {
        self.artist_play_counts.get(artist_id).copied().unwrap_or(0)
    }

    /// Genre plays, matched case-insensitively.
    #[must_use]
    pub fn genre_plays(&self, genre: &str) -> u32 {
        self.genre_play_counts
            .iter()
            .filter(|(g, _)| g.eq_ignore_ascii_case(genre))
            .map(|(_, count)| *count)
            .sum()
    }

    #[must_use]
    pub fn max_artist_plays(&self) -> u32 {
        self.artist_play_counts.values().copied().max().unwrap_or(0)
    }

    /// True when the profile carries no history at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top_artists.is_empty()
            && self.top_genres.is_empty()
            && self.artist_play_counts.is_empty()
            && self.genre_play_counts.is_empty()
            && self.liked_tracks.is_empty()
            && self.last_played.is_empty()
    }

    #[must_use]
    pub fn is_new_artist(&self, artist_id: &str) -> bool {
        self.artist_plays(artist_id) == 0 && !self.top_artists.iter().any(|a| a == artist_id)
    }

    /// Index of the first top genre that textually matches `genre`.
    ///
    /// Matching is a case-insensitive substring test in either direction,
    /// so "indie rock" matches a top genre "rock".
    #[must_use]
    pub fn matching_top_genre(&self, genre: &str) -> Option<usize> {
        let needle = genre.to_lowercase();
        self.top_genres.iter().position(|top| {
            let top = top.to_lowercase();
            !top.is_empty() && !needle.is_empty() && (needle.contains(&top) || top.contains(&needle))
        })
    }

    #[must_use]
    pub fn last_played_at(&self, track_id: &str) -> Option<DateTime<Utc>> {
        self.last_played.get(track_id).copied()
    }
}

/// Target point in (valence, energy) space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodTarget {
    pub valence: f64,
    pub energy: f64,
}

/// Activity presets that constrain energy and tempo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Workout,
    Focus,
    Relax,
    Party,
    Commute,
}

impl Activity {
    /// Acceptable energy range.
    #[must_use]
    pub const fn energy_range(self) -> (f64, f64) {
        match self {
            Self::Workout => (0.7, 1.0),
            Self::Focus => (0.2, 0.5),
            Self::Relax => (0.0, 0.4),
            Self::Party => (0.65, 1.0),
            Self::Commute => (0.4, 0.75),
        }
    }

    /// Acceptable tempo range, if the activity cares about tempo.
    #[must_use]
    pub const fn bpm_range(self) -> Option<(f64, f64)> {
        match self {
            Self::Workout => Some((120.0, 180.0)),
            Self::Focus => Some((60.0, 110.0)),
            Self::Relax => Some((50.0, 100.0)),
            Self::Party => Some((110.0, 140.0)),
            Self::Commute => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, artist: &str, genre: &str) -> SessionEntry {
        SessionEntry {
            track_id: id.to_string(),
            artist_ids: vec![artist.to_string()],
            genres: vec![genre.to_string()],
            features: None,
        }
    }

    #[test]
    fn test_session_is_bounded() {
        let mut session = SessionState::with_capacity(2);
        session.push(entry("a", "x", "rock"));
        session.push(entry("b", "y", "rock"));
        session.push(entry("c", "z", "jazz"));

        assert_eq!(session.len(), 2);
        assert!(!session.contains_track("a"));
        assert_eq!(session.last().map(|e| e.track_id.as_str()), Some("c"));
    }

    #[test]
    fn test_session_counts() {
        let mut session = SessionState::default();
        session.push(entry("a", "x", "Rock"));
        session.push(entry("b", "x", "rock"));
        session.push(entry("c", "y", "Jazz"));

        assert_eq!(session.artist_occurrences("x"), 2);
        assert_eq!(session.genre_occurrences("ROCK"), 2);
        assert_eq!(session.distinct_genres(), 2);
    }

    #[test]
    fn test_attach_features_only_to_current_track() {
        let mut session = SessionState::default();
        session.push(entry("a", "x", "rock"));
        let features = AudioFeatures {
            energy: Some(0.6),
            ..AudioFeatures::default()
        };

        assert!(!session.attach_features("zzz", features.clone()));
        assert!(session.attach_features("a", features));
        assert_eq!(session.last().and_then(SessionEntry::energy), Some(0.6));
    }

    #[test]
    fn test_top_genre_matching_is_substring_and_case_insensitive() {
        let profile = UserProfile {
            top_genres: vec!["Rock".to_string(), "jazz".to_string()],
            ..UserProfile::default()
        };

        assert_eq!(profile.matching_top_genre("indie rock"), Some(0));
        assert_eq!(profile.matching_top_genre("JAZZ"), Some(1));
        assert_eq!(profile.matching_top_genre("techno"), None);
        assert_eq!(profile.matching_top_genre(""), None);
    }

    #[test]
    fn test_empty_profile() {
        assert!(UserProfile::default().is_empty());
        let profile = UserProfile {
            top_artists: vec!["a".to_string()],
            ..UserProfile::default()
        };
        assert!(!profile.is_empty());
        assert!(!profile.is_new_artist("a"));
        assert!(profile.is_new_artist("b"));
    }
}
