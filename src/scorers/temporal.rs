//! Time-of-day fit.
//!
//! The plain variant compares track energy with an hourly preferred-energy
//! curve. The enhanced variant also checks a mood rule per part of the day.

use super::sanitize;
use crate::config::DEFAULT_ENERGY_CURVE;
use crate::track::AudioFeatures;

const ENERGY_DIFF_FACTOR: f64 = 1.2;
const RULE_BONUS: f64 = 0.15;
const RULE_MALUS: f64 = 0.10;

/// Part of the day an hour belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    LateNight,
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// Classify an hour (taken modulo 24).
    #[must_use]
    pub const fn from_hour(hour: u32) -> Self {
        match hour % 24 {
            0..=5 => Self::LateNight,
            6..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }

    /// Whether a track suits this part of the day.
    #[must_use]
    pub fn suits(self, energy: f64, valence: Option<f64>) -> bool {
        match self {
            Self::LateNight => energy < 0.4,
            Self::Morning => valence.is_some_and(|v| v >= 0.5) || (0.4..=0.75).contains(&energy),
            Self::Afternoon => energy >= 0.5,
            Self::Evening => (0.3..=0.7).contains(&energy),
            Self::Night => energy < 0.6,
        }
    }
}

fn preferred_energy(curve: &[f64], hour: u32) -> f64 {
    let curve: &[f64] = if curve.len() == 24 { curve } else { &DEFAULT_ENERGY_CURVE };
    let preferred = curve[(hour % 24) as usize];
    if preferred.is_finite() {
        preferred
    } else {
        DEFAULT_ENERGY_CURVE[(hour % 24) as usize]
    }
}

/// `max(0, 1 - |energy - preferred[hour]| * 1.2)`.
///
/// A curve that is not 24 entries long is replaced by the default curve.
#[must_use]
pub fn temporal_fit(track_energy: f64, hour: u32, curve: &[f64]) -> f64 {
    let diff = (track_energy - preferred_energy(curve, hour)).abs();
    sanitize((1.0 - diff * ENERGY_DIFF_FACTOR).max(0.0), 0.5)
}

/// Energy distance plus a fixed bonus or malus from the time-of-day rule.
///
/// Returns `None` when the track energy is unknown.
#[must_use]
pub fn enhanced_temporal_fit(features: &AudioFeatures, hour: u32, curve: &[f64]) -> Option<f64> {
    let energy = features.energy?;
    let diff = (energy - preferred_energy(curve, hour)).abs();
    let adjustment = if TimeOfDay::from_hour(hour).suits(energy, features.valence) {
        RULE_BONUS
    } else {
        -RULE_MALUS
    };
    Some(sanitize(1.0 - diff + adjustment, 0.5))
}
