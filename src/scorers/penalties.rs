//! Penalty magnitudes on the 0-100 score scale.

use crate::session::{SessionState, UserProfile};
use crate::track::{QueueEntry, Track};

const DISLIKED_TRACK: f64 = 50.0;
const DISLIKED_ARTIST: f64 = 25.0;

const QUEUED_ARTIST: f64 = 15.0;
const QUEUED_ARTIST_CAP: f64 = 45.0;
const ALREADY_IN_SESSION: f64 = 25.0;

const FATIGUE_STEP: f64 = 8.0;
const FATIGUE_CAP: f64 = 30.0;
const MONOTONY_WINDOW: usize = 3;
const MONOTONY_TOLERANCE: f64 = 0.05;

/// 50 for a disliked track, 25 for a disliked artist, whichever is larger.
#[must_use]
pub fn dislike_penalty(track: &Track, profile: &UserProfile) -> f64 {
    if profile.disliked_tracks.contains(&track.id) {
        DISLIKED_TRACK
    } else if track
        .artist_ids
        .iter()
        .any(|a| profile.disliked_artists.contains(a))
    {
        DISLIKED_ARTIST
    } else {
        0.0
    }
}

/// Penalty for artists already waiting in the queue and for replays.
///
/// 15 per upcoming entry by the same primary artist (at most 45), plus 25
/// when the track itself was already played this session.
#[must_use]
pub fn repetition_penalty(track: &Track, upcoming: &[QueueEntry], session: &SessionState) -> f64 {
    let queued = track.primary_artist().map_or(0, |artist| {
        upcoming
            .iter()
            .filter(|e| e.track.primary_artist() == Some(artist))
            .count()
    });
    let mut penalty = (QUEUED_ARTIST * queued as f64).min(QUEUED_ARTIST_CAP);
    if session.contains_track(&track.id) {
        penalty += ALREADY_IN_SESSION;
    }
    penalty
}

/// Listener fatigue from long same-artist runs and flat energy.
///
/// 8 per track of the candidate's artist run at the end of the session
/// beyond the first, plus 8 when the last three tracks all sit within 0.05
/// energy of the candidate. Capped at 30.
#[must_use]
pub fn fatigue_penalty(track: &Track, session: &SessionState) -> f64 {
    let run = track.primary_artist().map_or(0, |artist| {
        session
            .iter()
            .rev()
            .take_while(|e| e.primary_artist() == Some(artist))
            .count()
    });
    let mut penalty = FATIGUE_STEP * run.saturating_sub(1) as f64;

    if let Some(energy) = track.energy() {
        let recent: Vec<Option<f64>> = session
            .iter()
            .rev()
            .take(MONOTONY_WINDOW)
            .map(|e| e.energy())
            .collect();
        let monotonous = recent.len() == MONOTONY_WINDOW
            && recent
                .iter()
                .all(|e| e.is_some_and(|e| (e - energy).abs() <= MONOTONY_TOLERANCE));
        if monotonous {
            penalty += FATIGUE_STEP;
        }
    }

    penalty.min(FATIGUE_CAP)
}
