#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Safety score aggregation.
//!
//! Combines active, non-expired impacts within a city's safety-relevant
//! radius into a single score in [0, 100], weighted by source credibility
//! and attenuated by the decay clock. Recomputation is idempotent: the
//! same inputs and the same `now` snapshot always produce bit-identical
//! output, because contributions are summed in ascending impact-id order.

pub mod config;
pub mod decay;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use questmap_geo::{GeoIndex, haversine_km};
use questmap_scoring_models::{CityProfile, CitySafetyAggregate};

pub use config::{ConfigError, ScoringConfig};

/// Errors surfaced when computing a city's aggregate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// The city is not registered with the engine.
    #[error("unknown city: {city_id}")]
    UnknownCity {
        /// The unrecognized city ID.
        city_id: String,
    },

    /// The impact source was unavailable. Callers must keep serving the
    /// previous aggregate rather than overwrite it with a degraded value.
    #[error("transient source failure: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },
}

/// Anything that can produce a city's current aggregate.
///
/// The cache depends on this seam instead of the concrete aggregator so
/// recompute policies can be tested with substitute implementations.
pub trait ScoreSource: Send + Sync {
    /// Computes the aggregate for `city_id` at the `now` snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnknownCity`] for unregistered cities and
    /// [`AggregateError::Transient`] when the impact source is unavailable.
    fn recompute(
        &self,
        city_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CitySafetyAggregate, AggregateError>;
}

/// Computes per-city safety scores from the spatial index.
///
/// All aggregate mutation goes through [`ScoreAggregator::recompute`];
/// there are no ad-hoc score increments anywhere in the engine.
pub struct ScoreAggregator {
    index: Arc<GeoIndex>,
    cities: RwLock<BTreeMap<String, CityProfile>>,
    config: ScoringConfig,
}

impl ScoreAggregator {
    /// Builds an aggregator over the given index and city registry.
    #[must_use]
    pub fn new(index: Arc<GeoIndex>, cities: Vec<CityProfile>, config: ScoringConfig) -> Self {
        let cities = cities
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();
        Self {
            index,
            cities: RwLock::new(cities),
            config,
        }
    }

    /// Looks up a registered city profile.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn city(&self, city_id: &str) -> Option<CityProfile> {
        self.cities
            .read()
            .expect("city registry lock poisoned")
            .get(city_id)
            .cloned()
    }

    /// Registers or replaces a city profile.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn upsert_city(&self, profile: CityProfile) {
        self.cities
            .write()
            .expect("city registry lock poisoned")
            .insert(profile.id.clone(), profile);
    }

    /// The configured scoring constants.
    #[must_use]
    pub const fn config(&self) -> &ScoringConfig {
        &self.config
    }

    fn compute(
        &self,
        city_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CitySafetyAggregate, AggregateError> {
        let Some(profile) = self.city(city_id) else {
            return Err(AggregateError::UnknownCity {
                city_id: city_id.to_string(),
            });
        };

        let radius_km = profile
            .safety_radius_km
            .unwrap_or(self.config.default_city_radius_km);

        let mut impacts = self
            .index
            .query(profile.latitude, profile.longitude, radius_km);

        // Fixed summation order keeps floating-point addition reproducible
        // across runs.
        impacts.sort_by(|a, b| a.id.cmp(&b.id));

        let mut sum = 0.0_f64;
        let mut contributing = 0_usize;

        for impact in &impacts {
            let dist_km = haversine_km(
                profile.latitude,
                profile.longitude,
                impact.latitude,
                impact.longitude,
            );
            // An impact contributes nothing outside its own footprint,
            // even when the index returned it as a candidate.
            if dist_km > impact.radius_km {
                continue;
            }

            let multiplier = decay::decay_multiplier(impact, now, self.config.half_life_hours);
            if multiplier <= 0.0 {
                continue;
            }

            sum += impact.impact_factor * impact.weight_factor * multiplier;
            contributing += 1;
        }

        let score = (profile.baseline_score + sum * self.config.score_scale).clamp(0.0, 100.0);

        log::debug!(
            "Recomputed {city_id}: score {score:.2} from {contributing} of {} candidates",
            impacts.len()
        );

        Ok(CitySafetyAggregate {
            city_id: profile.id,
            score,
            last_updated: now,
            contributing_impact_count: contributing,
        })
    }
}

impl ScoreSource for ScoreAggregator {
    fn recompute(
        &self,
        city_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CitySafetyAggregate, AggregateError> {
        self.compute(city_id, now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use questmap_impact_models::{ConcernType, SafetyImpact};

    use super::*;

    const LISBON_LAT: f64 = 38.7223;
    const LISBON_LNG: f64 = -9.1393;

    fn lisbon() -> CityProfile {
        CityProfile {
            id: "city-lisbon".to_string(),
            name: "Lisbon".to_string(),
            country: "PT".to_string(),
            latitude: LISBON_LAT,
            longitude: LISBON_LNG,
            safety_radius_km: None,
            baseline_score: 70.0,
        }
    }

    fn impact(id: &str, factor: f64, decay_factor: f64, created_at: DateTime<Utc>) -> SafetyImpact {
        SafetyImpact {
            id: id.to_string(),
            article_id: format!("article-{id}"),
            city_id: "city-lisbon".to_string(),
            concern: ConcernType::Crime,
            impact_factor: factor,
            weight_factor: 1.0,
            decay_factor,
            latitude: LISBON_LAT,
            longitude: LISBON_LNG,
            radius_km: 10.0,
            is_active: true,
            created_at,
            expires_at: None,
        }
    }

    fn aggregator(impacts: Vec<SafetyImpact>) -> ScoreAggregator {
        ScoreAggregator::new(
            Arc::new(GeoIndex::new(impacts)),
            vec![lisbon()],
            ScoringConfig::default(),
        )
    }

    #[test]
    fn fresh_negative_impact_lowers_score() {
        let now = Utc::now();
        let agg = aggregator(vec![impact("a", -0.8, 0.5, now)]);

        let result = agg.recompute("city-lisbon", now).unwrap();
        // contribution = -0.8 * 1.0 * 1.0, scaled by 20 => -16
        assert!((result.score - 54.0).abs() < 1e-9);
        assert_eq!(result.contributing_impact_count, 1);
        assert_eq!(result.last_updated, now);
    }

    #[test]
    fn decayed_impact_contributes_less() {
        let now = Utc::now();
        let created = now - Duration::hours(144);
        let agg = aggregator(vec![impact("a", -0.8, 0.5, created)]);

        let result = agg.recompute("city-lisbon", now).unwrap();
        // Two half-lives: multiplier 0.25, contribution -4 => 66.
        assert!((result.score - 66.0).abs() < 1e-6);
        assert_eq!(result.contributing_impact_count, 1);
    }

    #[test]
    fn expired_impact_returns_score_to_baseline() {
        let now = Utc::now();
        let mut imp = impact("a", -0.8, 0.01, now - Duration::hours(1));
        imp.expires_at = Some(now - Duration::minutes(1));
        let agg = aggregator(vec![imp]);

        let result = agg.recompute("city-lisbon", now).unwrap();
        assert!((result.score - 70.0).abs() < 1e-9);
        assert_eq!(result.contributing_impact_count, 0);
    }

    #[test]
    fn opposing_impacts_cancel() {
        let now = Utc::now();
        let agg = aggregator(vec![
            impact("a", 0.5, 0.5, now),
            impact("b", -0.5, 0.5, now),
        ]);

        let result = agg.recompute("city-lisbon", now).unwrap();
        assert!((result.score - 70.0).abs() < 1e-9);
        assert_eq!(result.contributing_impact_count, 2);
    }

    #[test]
    fn impact_outside_footprint_contributes_zero() {
        let now = Utc::now();
        // ~30 km north of the city center with a 5 km footprint: returned
        // by a 25 km candidate query but outside its own footprint.
        let mut imp = impact("a", -1.0, 0.5, now);
        imp.latitude = 38.99;
        imp.radius_km = 5.0;
        let agg = aggregator(vec![imp]);

        let result = agg.recompute("city-lisbon", now).unwrap();
        assert!((result.score - 70.0).abs() < 1e-9);
        assert_eq!(result.contributing_impact_count, 0);
    }

    #[test]
    fn score_clamps_to_lower_bound() {
        let now = Utc::now();
        let impacts = (0..10)
            .map(|i| impact(&format!("imp-{i}"), -1.0, 0.5, now))
            .collect();
        let agg = aggregator(impacts);

        let result = agg.recompute("city-lisbon", now).unwrap();
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn score_clamps_to_upper_bound() {
        let now = Utc::now();
        let impacts = (0..10)
            .map(|i| impact(&format!("imp-{i}"), 1.0, 0.5, now))
            .collect();
        let agg = aggregator(impacts);

        let result = agg.recompute("city-lisbon", now).unwrap();
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn recompute_is_idempotent_at_fixed_now() {
        let now = Utc::now();
        let impacts: Vec<SafetyImpact> = (0..50)
            .map(|i| {
                let mut imp = impact(
                    &format!("imp-{i:02}"),
                    if i % 2 == 0 { -0.3 } else { 0.2 },
                    0.7,
                    now - Duration::hours(i),
                );
                imp.weight_factor = 1.0 + f64::from(u32::try_from(i).unwrap()) * 0.01;
                imp
            })
            .collect();
        let agg = aggregator(impacts);

        let first = agg.recompute("city-lisbon", now).unwrap();
        let second = agg.recompute("city-lisbon", now).unwrap();
        assert_eq!(first.score.to_bits(), second.score.to_bits());
        assert_eq!(first, second);
    }

    #[test]
    fn newly_registered_city_scores_at_its_baseline() {
        let now = Utc::now();
        let agg = aggregator(Vec::new());

        let mut porto = lisbon();
        porto.id = "city-porto".to_string();
        porto.name = "Porto".to_string();
        porto.latitude = 41.1579;
        porto.longitude = -8.6291;
        porto.baseline_score = 65.0;
        agg.upsert_city(porto);

        let result = agg.recompute("city-porto", now).unwrap();
        assert!((result.score - 65.0).abs() < 1e-9);
        assert_eq!(result.contributing_impact_count, 0);
        assert!((agg.config().default_city_radius_km - 25.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_city_is_an_error() {
        let agg = aggregator(Vec::new());
        assert_eq!(
            agg.recompute("city-atlantis", Utc::now()),
            Err(AggregateError::UnknownCity {
                city_id: "city-atlantis".to_string()
            })
        );
    }

    #[test]
    fn per_city_radius_override_narrows_candidates() {
        let now = Utc::now();
        // Impact 8.7 km from the center with a 2 km footprint.
        let mut imp = impact("a", -0.5, 0.5, now);
        imp.latitude = 38.7681;
        imp.longitude = -9.0966;
        imp.radius_km = 2.0;

        let mut city = lisbon();
        city.safety_radius_km = Some(1.0);

        let agg = ScoreAggregator::new(
            Arc::new(GeoIndex::new(vec![imp])),
            vec![city],
            ScoringConfig::default(),
        );

        let result = agg.recompute("city-lisbon", now).unwrap();
        assert_eq!(result.contributing_impact_count, 0);
        assert!((result.score - 70.0).abs() < 1e-9);
    }
}
