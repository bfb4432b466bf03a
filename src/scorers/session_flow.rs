//! Energy continuity with the previous session track.

use super::sanitize;
use crate::session::SessionState;

/// How smoothly `track_energy` follows the last track of the session.
///
/// - empty session: `1.0`, there is nothing to disrupt
/// - `|Δ| <= max_jump`: `1 - (Δ / max_jump) * 0.3`
/// - larger jumps: `max(0, 0.7 - (Δ - max_jump))`
///
/// Returns `None` when the last session track has no known energy.
#[must_use]
pub fn session_flow_score(track_energy: f64, session: &SessionState, max_jump: f64) -> Option<f64> {
    let Some(last) = session.last() else {
        return Some(1.0);
    };
    let previous = last.energy()?;
    Some(flow_between(previous, track_energy, max_jump))
}

/// Flow score for a single energy transition.
#[must_use]
pub fn flow_between(previous: f64, next: f64, max_jump: f64) -> f64 {
    let max_jump = if max_jump > 0.0 { max_jump } else { 0.3 };
    let delta = (next - previous).abs();
    let score = if delta <= max_jump {
        1.0 - (delta / max_jump) * 0.3
    } else {
        (0.7 - (delta - max_jump)).max(0.0)
    };
    sanitize(score, 0.5)
}
