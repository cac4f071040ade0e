#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Safety impact types and the concern taxonomy.
//!
//! This crate defines the canonical shape of a news-derived safety impact
//! as produced by the classification pipeline, along with the domain enums
//! shared across the questmap safety system. Validation lives here so that
//! every entry point (HTTP ingest, store writes) rejects malformed impacts
//! with the same rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Type of safety concern assigned to a classified news article.
///
/// `Positive` covers safety-improving reports (police presence, new
/// security measures); everything else degrades or is neutral depending on
/// the article's signed impact factor.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConcernType {
    /// Criminal activity (theft, assault, scams targeting travelers)
    Crime,
    /// Earthquakes, floods, storms, wildfires
    NaturalDisaster,
    /// Infrastructure failures affecting safety (power, roads, bridges)
    Infrastructure,
    /// Disease outbreaks and public health advisories
    Health,
    /// Protests, riots, political instability
    CivilUnrest,
    /// Transit disruptions and transport safety incidents
    Transport,
    /// Safety-improving developments
    Positive,
    /// Classifier could not determine a concern type
    Unknown,
}

impl ConcernType {
    /// Per-concern half-life override in hours, where the concern's
    /// relevance fades on a different timescale than the default.
    ///
    /// Natural disasters and infrastructure damage stay relevant for
    /// weeks; everything else uses the configured default.
    #[must_use]
    pub const fn half_life_hours_override(self) -> Option<f64> {
        match self {
            Self::NaturalDisaster => Some(168.0),
            Self::Infrastructure => Some(240.0),
            Self::Crime
            | Self::Health
            | Self::CivilUnrest
            | Self::Transport
            | Self::Positive
            | Self::Unknown => None,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Crime,
            Self::NaturalDisaster,
            Self::Infrastructure,
            Self::Health,
            Self::CivilUnrest,
            Self::Transport,
            Self::Positive,
            Self::Unknown,
        ]
    }
}

/// Quest difficulty levels from the quest subsystem.
///
/// Ordered so that a harder difficulty always compares greater; the
/// eligibility gate relies on this ordering being monotonic.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestDifficulty {
    /// Short quests in well-trafficked areas
    Easy,
    /// Standard quests
    Medium,
    /// Quests requiring higher situational awareness
    Hard,
    /// Night quests, remote areas
    Extreme,
}

impl QuestDifficulty {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Easy, Self::Medium, Self::Hard, Self::Extreme]
    }
}

/// User-facing advisory level derived from a city's safety score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyAdvisory {
    /// Score >= 70: normal precautions
    Safe,
    /// Score in [40, 70): heightened awareness recommended
    Caution,
    /// Score < 40: defer non-essential travel
    Avoid,
}

/// A persisted safety impact: one classified article's quantified effect
/// on one city.
///
/// Immutable after insert except for `is_active` and `expires_at`, so the
/// impact history stays auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyImpact {
    /// Unique impact ID (UUID).
    pub id: String,
    /// Source article ID from the news pipeline.
    pub article_id: String,
    /// City this impact applies to.
    pub city_id: String,
    /// Classified concern type.
    pub concern: ConcernType,
    /// Signed effect in [-1.0, 1.0]; negative degrades safety.
    pub impact_factor: f64,
    /// Source-credibility/severity multiplier, >= 0.
    pub weight_factor: f64,
    /// Per-impact decay rate in (0.0, 1.0]; 1.0 means no decay.
    pub decay_factor: f64,
    /// Footprint center latitude.
    pub latitude: f64,
    /// Footprint center longitude.
    pub longitude: f64,
    /// Footprint radius in kilometers, > 0.
    pub radius_km: f64,
    /// Whether the impact still contributes to scores.
    pub is_active: bool,
    /// When the impact was recorded.
    pub created_at: DateTime<Utc>,
    /// Hard cutoff after which the impact contributes exactly zero,
    /// independent of decay.
    pub expires_at: Option<DateTime<Utc>>,
}

/// An impact as received from the news pipeline, before it has been
/// assigned an ID and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImpact {
    /// Source article ID from the news pipeline.
    pub article_id: String,
    /// City this impact applies to.
    pub city_id: String,
    /// Classified concern type.
    pub concern: ConcernType,
    /// Signed effect in [-1.0, 1.0].
    pub impact_factor: f64,
    /// Source-credibility/severity multiplier, >= 0.
    #[serde(default = "default_weight_factor")]
    pub weight_factor: f64,
    /// Per-impact decay rate in (0.0, 1.0].
    pub decay_factor: f64,
    /// Footprint center latitude.
    pub latitude: f64,
    /// Footprint center longitude.
    pub longitude: f64,
    /// Footprint radius in kilometers.
    pub radius_km: f64,
    /// Optional hard expiry cutoff.
    pub expires_at: Option<DateTime<Utc>>,
}

const fn default_weight_factor() -> f64 {
    1.0
}

impl NewImpact {
    /// Validates all numeric bounds.
    ///
    /// Out-of-range values are rejected rather than clamped: clamping
    /// would mask bugs in the upstream classifier.
    ///
    /// # Errors
    ///
    /// Returns the first violated bound as a [`ValidationError`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.article_id.trim().is_empty() {
            return Err(ValidationError::EmptyArticleId);
        }
        if self.city_id.trim().is_empty() {
            return Err(ValidationError::EmptyCityId);
        }
        if !self.impact_factor.is_finite() || !(-1.0..=1.0).contains(&self.impact_factor) {
            return Err(ValidationError::ImpactFactorOutOfRange {
                value: self.impact_factor,
            });
        }
        if !self.weight_factor.is_finite() || self.weight_factor < 0.0 {
            return Err(ValidationError::NegativeWeightFactor {
                value: self.weight_factor,
            });
        }
        if !self.decay_factor.is_finite()
            || self.decay_factor <= 0.0
            || self.decay_factor > 1.0
        {
            return Err(ValidationError::DecayFactorOutOfRange {
                value: self.decay_factor,
            });
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange {
                value: self.latitude,
            });
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange {
                value: self.longitude,
            });
        }
        if !self.radius_km.is_finite() || self.radius_km <= 0.0 {
            return Err(ValidationError::NonPositiveRadius {
                value: self.radius_km,
            });
        }
        Ok(())
    }

    /// Promotes this ingest record to a full [`SafetyImpact`] with the
    /// given ID and creation timestamp.
    #[must_use]
    pub fn into_impact(self, id: String, created_at: DateTime<Utc>) -> SafetyImpact {
        SafetyImpact {
            id,
            article_id: self.article_id,
            city_id: self.city_id,
            concern: self.concern,
            impact_factor: self.impact_factor,
            weight_factor: self.weight_factor,
            decay_factor: self.decay_factor,
            latitude: self.latitude,
            longitude: self.longitude,
            radius_km: self.radius_km,
            is_active: true,
            created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Error returned when an incoming impact violates a numeric bound.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Article ID is empty or whitespace.
    #[error("article id must not be empty")]
    EmptyArticleId,

    /// City ID is empty or whitespace.
    #[error("city id must not be empty")]
    EmptyCityId,

    /// Impact factor outside [-1.0, 1.0] or non-finite.
    #[error("impact factor {value} outside [-1.0, 1.0]")]
    ImpactFactorOutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// Weight factor negative or non-finite.
    #[error("weight factor {value} must be >= 0")]
    NegativeWeightFactor {
        /// The rejected value.
        value: f64,
    },

    /// Decay factor outside (0.0, 1.0] or non-finite.
    #[error("decay factor {value} outside (0.0, 1.0]")]
    DecayFactorOutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// Latitude outside [-90, 90] or non-finite.
    #[error("latitude {value} outside [-90, 90]")]
    LatitudeOutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// Longitude outside [-180, 180] or non-finite.
    #[error("longitude {value} outside [-180, 180]")]
    LongitudeOutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// Radius not strictly positive or non-finite.
    #[error("radius {value} km must be > 0")]
    NonPositiveRadius {
        /// The rejected value.
        value: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_impact() -> NewImpact {
        NewImpact {
            article_id: "article-1".to_string(),
            city_id: "city-lisbon".to_string(),
            concern: ConcernType::Crime,
            impact_factor: -0.6,
            weight_factor: 1.0,
            decay_factor: 0.5,
            latitude: 38.7223,
            longitude: -9.1393,
            radius_km: 5.0,
            expires_at: None,
        }
    }

    #[test]
    fn valid_impact_passes() {
        assert_eq!(valid_impact().validate(), Ok(()));
    }

    #[test]
    fn impact_factor_bounds_rejected() {
        let mut impact = valid_impact();
        impact.impact_factor = -1.01;
        assert!(matches!(
            impact.validate(),
            Err(ValidationError::ImpactFactorOutOfRange { .. })
        ));

        impact.impact_factor = 1.01;
        assert!(matches!(
            impact.validate(),
            Err(ValidationError::ImpactFactorOutOfRange { .. })
        ));

        impact.impact_factor = f64::NAN;
        assert!(impact.validate().is_err());
    }

    #[test]
    fn decay_factor_zero_rejected() {
        let mut impact = valid_impact();
        impact.decay_factor = 0.0;
        assert!(matches!(
            impact.validate(),
            Err(ValidationError::DecayFactorOutOfRange { .. })
        ));

        impact.decay_factor = 1.0;
        assert_eq!(impact.validate(), Ok(()));
    }

    #[test]
    fn negative_radius_rejected() {
        let mut impact = valid_impact();
        impact.radius_km = 0.0;
        assert!(matches!(
            impact.validate(),
            Err(ValidationError::NonPositiveRadius { .. })
        ));
    }

    #[test]
    fn negative_weight_rejected() {
        let mut impact = valid_impact();
        impact.weight_factor = -0.1;
        assert!(matches!(
            impact.validate(),
            Err(ValidationError::NegativeWeightFactor { .. })
        ));
    }

    #[test]
    fn into_impact_starts_active() {
        let now = Utc::now();
        let impact = valid_impact().into_impact("imp-1".to_string(), now);
        assert!(impact.is_active);
        assert_eq!(impact.created_at, now);
        assert_eq!(impact.concern, ConcernType::Crime);
    }

    #[test]
    fn concern_serializes_screaming_snake() {
        let json = serde_json::to_string(&ConcernType::NaturalDisaster).unwrap();
        assert_eq!(json, "\"NATURAL_DISASTER\"");
        assert_eq!(ConcernType::CivilUnrest.to_string(), "CIVIL_UNREST");
    }

    #[test]
    fn difficulty_ordering_is_monotonic() {
        let all = QuestDifficulty::all();
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
