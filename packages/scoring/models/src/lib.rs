#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! City profile and derived safety aggregate types.
//!
//! Separate from the scoring crate so the cache, server, and database
//! layers can share these shapes without pulling in the aggregation logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A city known to the safety engine.
///
/// Loaded from the `cities` table at startup. The baseline score is a
/// slowly-moving historical average maintained outside the engine; the
/// aggregator only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityProfile {
    /// City ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// ISO country code.
    pub country: String,
    /// City center latitude.
    pub latitude: f64,
    /// City center longitude.
    pub longitude: f64,
    /// Per-city safety-relevant radius override in kilometers. `None`
    /// falls back to the configured default.
    pub safety_radius_km: Option<f64>,
    /// Persisted baseline safety score in [0, 100].
    pub baseline_score: f64,
}

/// The combined safety score for a city at a point in time.
///
/// Owned by the aggregator; the cache holds read-through copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitySafetyAggregate {
    /// City ID.
    pub city_id: String,
    /// Safety score, always clamped to [0, 100].
    pub score: f64,
    /// The `now` snapshot the aggregate was computed with.
    pub last_updated: DateTime<Utc>,
    /// Number of impacts that contributed a nonzero multiplier.
    pub contributing_impact_count: usize,
}
