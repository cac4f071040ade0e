#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Quest eligibility thresholds and safety advisory bands.
//!
//! Pure functions over a city's safety score. This is the seam the quest,
//! badge, and itinerary subsystems depend on; none of them need to know
//! how aggregation works, only these policies.

use questmap_impact_models::{QuestDifficulty, SafetyAdvisory};

/// Score at or above which a city is [`SafetyAdvisory::Safe`].
pub const SAFE_THRESHOLD: f64 = 70.0;

/// Score at or above which a city is at worst [`SafetyAdvisory::Caution`];
/// anything below is [`SafetyAdvisory::Avoid`].
pub const CAUTION_THRESHOLD: f64 = 40.0;

/// Minimum city safety score required to offer a quest of the given
/// difficulty.
///
/// Monotonic in difficulty: a harder quest never has a lower threshold.
#[must_use]
pub const fn min_score_for(difficulty: QuestDifficulty) -> f64 {
    match difficulty {
        QuestDifficulty::Easy => 0.0,
        QuestDifficulty::Medium => 25.0,
        QuestDifficulty::Hard => 50.0,
        QuestDifficulty::Extreme => 70.0,
    }
}

/// Whether a quest of this difficulty may be offered in a city with the
/// given safety score.
#[must_use]
pub fn is_quest_eligible(difficulty: QuestDifficulty, city_score: f64) -> bool {
    city_score >= min_score_for(difficulty)
}

/// Maps a safety score to its user-facing advisory band.
///
/// Bands: `score >= 70` SAFE, `40 <= score < 70` CAUTION, `score < 40`
/// AVOID.
#[must_use]
pub fn advisory_for(city_score: f64) -> SafetyAdvisory {
    if city_score >= SAFE_THRESHOLD {
        SafetyAdvisory::Safe
    } else if city_score >= CAUTION_THRESHOLD {
        SafetyAdvisory::Caution
    } else {
        SafetyAdvisory::Avoid
    }
}
