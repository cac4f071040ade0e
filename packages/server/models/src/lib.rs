#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the questmap safety server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the engine's internal types to allow independent evolution of the
//! API contract.

use chrono::{DateTime, Utc};
use questmap_impact_models::{QuestDifficulty, SafetyAdvisory};
use questmap_scoring_models::CitySafetyAggregate;
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// A city's safety score as served to quest, leaderboard, and itinerary
/// consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSafetyScore {
    /// City ID.
    pub city_id: String,
    /// Safety score in [0, 100].
    pub score: f64,
    /// When the aggregate was last recomputed.
    pub last_updated: DateTime<Utc>,
    /// Number of impacts contributing to the score.
    pub contributing_impact_count: usize,
    /// `true` when served beyond the freshness window because the
    /// recompute failed; consumers may choose to display a caveat.
    pub stale: bool,
}

impl ApiSafetyScore {
    /// Builds the API shape from a cached aggregate.
    #[must_use]
    pub fn from_aggregate(aggregate: CitySafetyAggregate, stale: bool) -> Self {
        Self {
            city_id: aggregate.city_id,
            score: aggregate.score,
            last_updated: aggregate.last_updated,
            contributing_impact_count: aggregate.contributing_impact_count,
            stale,
        }
    }
}

/// Advisory response for a city.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAdvisory {
    /// City ID.
    pub city_id: String,
    /// Advisory band derived from the score.
    pub advisory: SafetyAdvisory,
    /// The underlying safety score.
    pub score: f64,
    /// When the aggregate was last recomputed.
    pub last_updated: DateTime<Utc>,
}

/// Eligibility check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEligibility {
    /// City ID.
    pub city_id: String,
    /// Difficulty that was checked.
    pub difficulty: QuestDifficulty,
    /// Minimum score required for this difficulty.
    pub threshold: f64,
    /// The city's current score.
    pub score: f64,
    /// Whether quests of this difficulty may be offered.
    pub eligible: bool,
}

/// Query parameters for the eligibility endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityQueryParams {
    /// Quest difficulty to check.
    pub difficulty: QuestDifficulty,
}

/// Body for the admin deactivation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateImpactRequest {
    /// Operator-supplied reason, stored for the audit trail.
    pub reason: String,
}

/// Generic message response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMessage {
    /// Human-readable outcome.
    pub message: String,
}
