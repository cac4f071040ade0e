//! Time-based decay multipliers for safety impacts.
//!
//! Exponential decay: `multiplier = decay_factor ^ (elapsed / half_life)`.
//! Expiry is a hard cutoff that overrides the curve; decay is the soft one.

use chrono::{DateTime, Utc};
use questmap_impact_models::SafetyImpact;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Computes the decay multiplier for an impact at `now`.
///
/// Returns a value in `[0.0, 1.0]`:
/// * exactly `0.0` for inactive impacts and at or after `expires_at`,
/// * otherwise `decay_factor ^ (elapsed_hours / half_life_hours)`, which
///   stays in `(0.0, 1.0]` for any validated impact.
///
/// The half-life comes from the impact's concern-type override when one
/// exists, else from `default_half_life_hours`. A `created_at` in the
/// future (clock skew between the pipeline and the engine) counts as zero
/// elapsed time rather than amplifying the impact.
#[must_use]
pub fn decay_multiplier(
    impact: &SafetyImpact,
    now: DateTime<Utc>,
    default_half_life_hours: f64,
) -> f64 {
    if !impact.is_active {
        return 0.0;
    }
    if let Some(expires_at) = impact.expires_at
        && now >= expires_at
    {
        return 0.0;
    }

    let half_life_hours = impact
        .concern
        .half_life_hours_override()
        .unwrap_or(default_half_life_hours);

    #[allow(clippy::cast_precision_loss)]
    let elapsed_hours =
        ((now - impact.created_at).num_seconds().max(0) as f64) / SECONDS_PER_HOUR;

    impact
        .decay_factor
        .powf(elapsed_hours / half_life_hours)
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use questmap_impact_models::ConcernType;

    use super::*;

    const HALF_LIFE: f64 = 72.0;

    fn impact(decay_factor: f64, age_hours: i64) -> SafetyImpact {
        SafetyImpact {
            id: "imp-1".to_string(),
            article_id: "article-1".to_string(),
            city_id: "city-1".to_string(),
            concern: ConcernType::Crime,
            impact_factor: -0.8,
            weight_factor: 1.0,
            decay_factor,
            latitude: 38.7223,
            longitude: -9.1393,
            radius_km: 5.0,
            is_active: true,
            created_at: Utc::now() - Duration::hours(age_hours),
            expires_at: None,
        }
    }

    #[test]
    fn fresh_impact_has_full_multiplier() {
        let now = Utc::now();
        let mut imp = impact(0.5, 0);
        imp.created_at = now;
        assert!((decay_multiplier(&imp, now, HALF_LIFE) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn two_half_lives_quarters_the_multiplier() {
        let imp = impact(0.5, 0);
        let now = imp.created_at + Duration::hours(144);
        let multiplier = decay_multiplier(&imp, now, HALF_LIFE);
        assert!((multiplier - 0.25).abs() < 1e-9);
    }

    #[test]
    fn strictly_decreasing_over_time() {
        let imp = impact(0.5, 0);
        let mut previous = f64::INFINITY;
        for hours in [0, 1, 12, 72, 144, 720] {
            let now = imp.created_at + Duration::hours(hours);
            let multiplier = decay_multiplier(&imp, now, HALF_LIFE);
            assert!(multiplier < previous, "not decreasing at {hours}h");
            assert!(multiplier > 0.0 && multiplier <= 1.0);
            previous = multiplier;
        }
    }

    #[test]
    fn expiry_is_a_hard_zero() {
        let mut imp = impact(0.9, 0);
        let expires = imp.created_at + Duration::hours(10);
        imp.expires_at = Some(expires);

        assert!(decay_multiplier(&imp, expires - Duration::seconds(1), HALF_LIFE) > 0.0);
        assert_eq!(decay_multiplier(&imp, expires, HALF_LIFE), 0.0);
        assert_eq!(
            decay_multiplier(&imp, expires + Duration::hours(100), HALF_LIFE),
            0.0
        );
    }

    #[test]
    fn inactive_impact_is_zero() {
        let mut imp = impact(0.5, 0);
        imp.is_active = false;
        assert_eq!(decay_multiplier(&imp, imp.created_at, HALF_LIFE), 0.0);
    }

    #[test]
    fn no_decay_factor_stays_at_one() {
        let imp = impact(1.0, 0);
        let now = imp.created_at + Duration::hours(10_000);
        assert!((decay_multiplier(&imp, now, HALF_LIFE) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn future_created_at_counts_as_zero_elapsed() {
        let imp = impact(0.5, 0);
        let now = imp.created_at - Duration::hours(5);
        assert!((decay_multiplier(&imp, now, HALF_LIFE) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn concern_override_slows_decay() {
        let mut disaster = impact(0.5, 0);
        disaster.concern = ConcernType::NaturalDisaster;
        let crime = impact(0.5, 0);

        let now = crime.created_at + Duration::hours(72);
        // Crime uses the 72h default (one half-life); the disaster's 168h
        // override has decayed less.
        assert!(
            decay_multiplier(&disaster, now, HALF_LIFE)
                > decay_multiplier(&crime, now, HALF_LIFE)
        );
    }
}
