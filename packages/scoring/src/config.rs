//! Scoring constants, loaded from the environment at startup.

use std::time::Duration;

/// Errors raised for malformed or out-of-range scoring configuration.
///
/// Fatal at startup: a misconfigured engine must not serve scores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed as a number.
    #[error("invalid value {value:?} for {key}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// The unparseable value.
        value: String,
    },

    /// A parsed value violated its documented range.
    #[error("{key} out of range: {message}")]
    OutOfRange {
        /// Environment variable name.
        key: &'static str,
        /// Range description.
        message: String,
    },
}

/// Tunable constants for the aggregation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    /// Default decay half-life in hours, used when the concern type has
    /// no override.
    pub half_life_hours: f64,
    /// Converts summed unit contributions into score points.
    pub score_scale: f64,
    /// Safety-relevant radius for cities without a per-city override.
    pub default_city_radius_km: f64,
    /// How long a cached aggregate may be served before a recompute.
    pub max_staleness: Duration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            half_life_hours: 72.0,
            score_scale: 20.0,
            default_city_radius_km: 25.0,
            max_staleness: Duration::from_secs(300),
        }
    }
}

impl ScoringConfig {
    /// Loads the configuration from `SCORE_*` environment variables,
    /// falling back to the defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for any set-but-malformed or out-of-range
    /// value. Callers should treat this as fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            half_life_hours: read_f64("SCORE_HALF_LIFE_HOURS", defaults.half_life_hours)?,
            score_scale: read_f64("SCORE_SCALE", defaults.score_scale)?,
            default_city_radius_km: read_f64(
                "SCORE_DEFAULT_RADIUS_KM",
                defaults.default_city_radius_km,
            )?,
            max_staleness: Duration::from_secs(read_u64(
                "SCORE_MAX_STALENESS_SECS",
                defaults.max_staleness.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the documented ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first violated bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.half_life_hours.is_finite() || self.half_life_hours <= 0.0 {
            return Err(ConfigError::OutOfRange {
                key: "SCORE_HALF_LIFE_HOURS",
                message: format!("{} must be > 0", self.half_life_hours),
            });
        }
        if !self.score_scale.is_finite() || self.score_scale <= 0.0 {
            return Err(ConfigError::OutOfRange {
                key: "SCORE_SCALE",
                message: format!("{} must be > 0", self.score_scale),
            });
        }
        if !self.default_city_radius_km.is_finite() || self.default_city_radius_km <= 0.0 {
            return Err(ConfigError::OutOfRange {
                key: "SCORE_DEFAULT_RADIUS_KM",
                message: format!("{} must be > 0", self.default_city_radius_km),
            });
        }
        Ok(())
    }
}

fn read_f64(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn read_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ScoringConfig::default().validate(), Ok(()));
    }

    #[test]
    fn non_positive_half_life_rejected() {
        let config = ScoringConfig {
            half_life_hours: 0.0,
            ..ScoringConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                key: "SCORE_HALF_LIFE_HOURS",
                ..
            })
        ));
    }

    #[test]
    fn nan_scale_rejected() {
        let config = ScoringConfig {
            score_scale: f64::NAN,
            ..ScoringConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
