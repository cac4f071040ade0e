//! Durable store for safety impacts and city profiles.
//!
//! Impacts are append-mostly: after insert only `is_active` and the
//! deactivation metadata change. A unique constraint on
//! `(article_id, city_id)` guarantees one article can influence one city
//! at most once, so concurrent ingests of the same article deduplicate at
//! the database rather than double-counting.

use chrono::{DateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use questmap_impact_models::{ConcernType, NewImpact, SafetyImpact, ValidationError};
use questmap_scoring_models::CityProfile;
use switchy_database::{Database, DatabaseValue};
use uuid::Uuid;

use crate::DbError;

/// Errors surfaced by [`ImpactStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The incoming impact violated a numeric bound; nothing was persisted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An impact for this `(article, city)` pair already exists.
    #[error("impact for article {article_id} and city {city_id} already recorded")]
    Duplicate {
        /// Article ID of the rejected insert.
        article_id: String,
        /// City ID of the rejected insert.
        city_id: String,
    },

    /// Underlying database failure; treat as transient and retry with
    /// backoff at the caller.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<switchy_database::DatabaseError> for StoreError {
    fn from(e: switchy_database::DatabaseError) -> Self {
        Self::Db(DbError::Database(e))
    }
}

/// Durable record of safety impacts, backed by `switchy_database`.
#[derive(Clone)]
pub struct ImpactStore {
    db: std::sync::Arc<dyn Database>,
}

impl ImpactStore {
    /// Wraps an open database connection.
    #[must_use]
    pub const fn new(db: std::sync::Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Validates and persists a classified impact from the news pipeline.
    ///
    /// Assigns a fresh UUID and the `now` timestamp. Returns the persisted
    /// impact so the caller can index it without a re-read.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Validation`] if a numeric bound is violated — the
    ///   value is rejected, never clamped.
    /// * [`StoreError::Duplicate`] if this article already has an impact
    ///   recorded for this city.
    /// * [`StoreError::Db`] on database failure.
    pub async fn add(
        &self,
        new_impact: NewImpact,
        now: DateTime<Utc>,
    ) -> Result<SafetyImpact, StoreError> {
        new_impact.validate()?;

        let impact = new_impact.into_impact(Uuid::new_v4().to_string(), now);

        let inserted = self
            .db
            .exec_raw_params(
                "INSERT INTO safety_impacts (
                    id, article_id, city_id, concern_type,
                    impact_factor, weight_factor, decay_factor,
                    latitude, longitude, radius_km,
                    is_active, created_at, expires_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (article_id, city_id) DO NOTHING",
                &[
                    DatabaseValue::String(impact.id.clone()),
                    DatabaseValue::String(impact.article_id.clone()),
                    DatabaseValue::String(impact.city_id.clone()),
                    DatabaseValue::String(impact.concern.as_ref().to_string()),
                    DatabaseValue::Real64(impact.impact_factor),
                    DatabaseValue::Real64(impact.weight_factor),
                    DatabaseValue::Real64(impact.decay_factor),
                    DatabaseValue::Real64(impact.latitude),
                    DatabaseValue::Real64(impact.longitude),
                    DatabaseValue::Real64(impact.radius_km),
                    DatabaseValue::Bool(impact.is_active),
                    DatabaseValue::DateTime(impact.created_at.naive_utc()),
                    impact
                        .expires_at
                        .as_ref()
                        .map_or(DatabaseValue::Null, |dt| {
                            DatabaseValue::DateTime(dt.naive_utc())
                        }),
                ],
            )
            .await?;

        if inserted == 0 {
            return Err(StoreError::Duplicate {
                article_id: impact.article_id,
                city_id: impact.city_id,
            });
        }

        Ok(impact)
    }

    /// Deactivates an impact, recording the operator-supplied reason.
    ///
    /// A single atomic `UPDATE`; no partial deactivation is ever visible.
    /// Returns the impact's city ID so the caller can invalidate that
    /// city's cached aggregate, or `None` if the impact does not exist or
    /// was already inactive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub async fn deactivate(
        &self,
        impact_id: &str,
        reason: &str,
    ) -> Result<Option<String>, StoreError> {
        let rows = self
            .db
            .query_raw_params(
                "UPDATE safety_impacts
                 SET is_active = FALSE, deactivated_reason = $2
                 WHERE id = $1 AND is_active = TRUE
                 RETURNING city_id",
                &[
                    DatabaseValue::String(impact_id.to_string()),
                    DatabaseValue::String(reason.to_string()),
                ],
            )
            .await?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let city_id: String = row.to_value("city_id").map_err(|e| DbError::Conversion {
            message: format!("Failed to parse city_id: {e}"),
        })?;

        Ok(Some(city_id))
    }

    /// Deactivates every active impact whose expiry has passed.
    ///
    /// One atomic `UPDATE`; the swept rows keep their data and gain
    /// `deactivated_reason = 'expired'` for the audit trail. Returns the
    /// `(impact_id, city_id)` pairs that were swept so the caller can
    /// drop them from the spatial index and invalidate the touched
    /// cities' cached aggregates.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub async fn deactivate_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let rows = self
            .db
            .query_raw_params(
                "UPDATE safety_impacts
                 SET is_active = FALSE, deactivated_reason = 'expired'
                 WHERE is_active = TRUE AND expires_at IS NOT NULL AND expires_at <= $1
                 RETURNING id, city_id",
                &[DatabaseValue::DateTime(now.naive_utc())],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.to_value("id").unwrap_or_default(),
                    row.to_value("city_id").unwrap_or_default(),
                )
            })
            .collect())
    }

    /// Returns all active impacts for one city, ordered by impact ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub async fn active_impacts_for_city(
        &self,
        city_id: &str,
    ) -> Result<Vec<SafetyImpact>, StoreError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT * FROM safety_impacts
                 WHERE city_id = $1 AND is_active = TRUE
                 ORDER BY id",
                &[DatabaseValue::String(city_id.to_string())],
            )
            .await?;

        Ok(rows.iter().map(parse_impact_row).collect())
    }

    /// Loads every active impact, for building the spatial index at
    /// startup. Run [`ImpactStore::deactivate_expired`] first so
    /// expired-but-unswept rows do not land in the index; any that slip
    /// through between sweeps still score as zero via the decay clock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub async fn load_active(&self) -> Result<Vec<SafetyImpact>, StoreError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT * FROM safety_impacts WHERE is_active = TRUE ORDER BY id",
                &[],
            )
            .await?;

        Ok(rows.iter().map(parse_impact_row).collect())
    }

    /// Loads all city profiles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub async fn city_profiles(&self) -> Result<Vec<CityProfile>, StoreError> {
        let rows = self
            .db
            .query_raw_params("SELECT * FROM cities ORDER BY id", &[])
            .await?;

        let profiles = rows
            .iter()
            .map(|row| CityProfile {
                id: row.to_value("id").unwrap_or_default(),
                name: row.to_value("name").unwrap_or_default(),
                country: row.to_value("country").unwrap_or_default(),
                latitude: row.to_value("latitude").unwrap_or(0.0),
                longitude: row.to_value("longitude").unwrap_or(0.0),
                safety_radius_km: row.to_value("safety_radius_km").unwrap_or(None),
                baseline_score: row.to_value("baseline_score").unwrap_or(70.0),
            })
            .collect();

        Ok(profiles)
    }
}

/// Converts a `safety_impacts` row into a [`SafetyImpact`].
///
/// Unparseable concern names fall back to `UNKNOWN`, matching how the
/// classifier reports articles it could not categorize.
fn parse_impact_row(row: &switchy_database::Row) -> SafetyImpact {
    let concern_name: String = row.to_value("concern_type").unwrap_or_default();
    let concern = concern_name
        .parse::<ConcernType>()
        .unwrap_or(ConcernType::Unknown);

    let created_at_naive: chrono::NaiveDateTime = row.to_value("created_at").unwrap_or_default();
    let created_at =
        chrono::DateTime::<Utc>::from_naive_utc_and_offset(created_at_naive, Utc);

    let expires_at_naive: Option<chrono::NaiveDateTime> =
        row.to_value("expires_at").unwrap_or(None);
    let expires_at = expires_at_naive
        .map(|naive| chrono::DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));

    SafetyImpact {
        id: row.to_value("id").unwrap_or_default(),
        article_id: row.to_value("article_id").unwrap_or_default(),
        city_id: row.to_value("city_id").unwrap_or_default(),
        concern,
        impact_factor: row.to_value("impact_factor").unwrap_or(0.0),
        weight_factor: row.to_value("weight_factor").unwrap_or(1.0),
        decay_factor: row.to_value("decay_factor").unwrap_or(1.0),
        latitude: row.to_value("latitude").unwrap_or(0.0),
        longitude: row.to_value("longitude").unwrap_or(0.0),
        radius_km: row.to_value("radius_km").unwrap_or(0.0),
        is_active: row.to_value("is_active").unwrap_or(false),
        created_at,
        expires_at,
    }
}
