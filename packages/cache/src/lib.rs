#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Read-through per-city cache over the score aggregator.
//!
//! Recompute policy: lazy on stale read. A write touching a city
//! invalidates its entry immediately, so correctness under new data never
//! waits out the staleness window. Concurrent misses for the same city
//! collapse into a single recompute (per-city single-flight); reads of
//! other cities never block on it. Replacement is a full atomic swap
//! guarded by the computation's `now` snapshot, so a recompute superseded
//! by a fresher one is abandoned instead of clobbering the cache.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use questmap_scoring::{AggregateError, ScoreSource};
use questmap_scoring_models::CitySafetyAggregate;
use tokio::sync::{Mutex, RwLock};

/// A cached aggregate plus its serving metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedScore {
    /// The aggregate being served.
    pub aggregate: CitySafetyAggregate,
    /// `true` when the value is served beyond its freshness window
    /// because the recompute failed. Stale-but-known beats wrong.
    pub stale: bool,
}

#[derive(Debug, Clone)]
struct CacheRecord {
    aggregate: CitySafetyAggregate,
    /// Invalidation epoch observed when the aggregate was computed. The
    /// record is fresh only while this matches the city's current epoch.
    computed_epoch: u64,
}

#[derive(Default)]
struct Entries {
    records: BTreeMap<String, CacheRecord>,
    /// Monotonic per-city counters bumped by `invalidate`.
    epochs: BTreeMap<String, u64>,
}

impl Entries {
    fn epoch(&self, city_id: &str) -> u64 {
        self.epochs.get(city_id).copied().unwrap_or(0)
    }

    fn fresh_record(
        &self,
        city_id: &str,
        now: DateTime<Utc>,
        max_staleness: Duration,
    ) -> Option<&CacheRecord> {
        let record = self.records.get(city_id)?;
        if record.computed_epoch != self.epoch(city_id) {
            return None;
        }
        if now - record.aggregate.last_updated >= max_staleness {
            return None;
        }
        Some(record)
    }
}

/// Per-city read-through score cache.
pub struct ScoreCache<S: ScoreSource> {
    source: Arc<S>,
    max_staleness: Duration,
    entries: RwLock<Entries>,
    /// One mutex per city collapses concurrent recomputes. Slots for
    /// known cities persist, so the map is bounded by the registry;
    /// lookups that turn out to be for unknown cities reap their slot on
    /// the way out.
    in_flight: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl<S: ScoreSource> ScoreCache<S> {
    /// Creates a cache over the given score source.
    #[must_use]
    pub fn new(source: Arc<S>, max_staleness: std::time::Duration) -> Self {
        Self {
            source,
            max_staleness: Duration::from_std(max_staleness).unwrap_or(Duration::MAX),
            entries: RwLock::new(Entries::default()),
            in_flight: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the city's aggregate, recomputing if the cached one is
    /// stale or invalidated.
    ///
    /// # Errors
    ///
    /// Propagates [`AggregateError`] when no value can be served at all:
    /// unknown cities always error, and transient failures error only
    /// when there is no last-known-good aggregate to fall back on.
    pub async fn get(&self, city_id: &str) -> Result<CachedScore, AggregateError> {
        self.get_at(city_id, Utc::now()).await
    }

    /// [`ScoreCache::get`] with an explicit `now` snapshot.
    ///
    /// # Errors
    ///
    /// See [`ScoreCache::get`].
    pub async fn get_at(
        &self,
        city_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CachedScore, AggregateError> {
        if let Some(record) = self
            .entries
            .read()
            .await
            .fresh_record(city_id, now, self.max_staleness)
        {
            return Ok(CachedScore {
                aggregate: record.aggregate.clone(),
                stale: false,
            });
        }

        let flight = self.flight_lock(city_id).await;
        let _guard = flight.lock().await;

        // A waiter that lost the race re-reads what the winner stored.
        if let Some(record) = self
            .entries
            .read()
            .await
            .fresh_record(city_id, now, self.max_staleness)
        {
            return Ok(CachedScore {
                aggregate: record.aggregate.clone(),
                stale: false,
            });
        }

        let epoch = self.entries.read().await.epoch(city_id);

        match self.source.recompute(city_id, now) {
            Ok(aggregate) => {
                self.store(aggregate.clone(), epoch).await;
                Ok(CachedScore {
                    aggregate,
                    stale: false,
                })
            }
            Err(AggregateError::Transient { message }) => {
                let entries = self.entries.read().await;
                if let Some(record) = entries.records.get(city_id) {
                    log::warn!(
                        "Serving stale aggregate for {city_id} after transient failure: {message}"
                    );
                    Ok(CachedScore {
                        aggregate: record.aggregate.clone(),
                        stale: true,
                    })
                } else {
                    Err(AggregateError::Transient { message })
                }
            }
            Err(e) => {
                self.reap_flight_lock(city_id).await;
                Err(e)
            }
        }
    }

    /// Recomputes now, ignoring freshness. Surfaces the underlying error
    /// directly — this is the explicit operator path, no silent degrade.
    ///
    /// # Errors
    ///
    /// Propagates any [`AggregateError`] from the source.
    pub async fn force_recompute(
        &self,
        city_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CitySafetyAggregate, AggregateError> {
        let flight = self.flight_lock(city_id).await;
        let _guard = flight.lock().await;

        let epoch = self.entries.read().await.epoch(city_id);
        match self.source.recompute(city_id, now) {
            Ok(aggregate) => {
                self.store(aggregate.clone(), epoch).await;
                Ok(aggregate)
            }
            Err(e) => {
                if matches!(e, AggregateError::UnknownCity { .. }) {
                    self.reap_flight_lock(city_id).await;
                }
                Err(e)
            }
        }
    }

    /// Marks a city's entry stale immediately, independent of the
    /// staleness timer. Called on every impact write touching the city.
    pub async fn invalidate(&self, city_id: &str) {
        let mut entries = self.entries.write().await;
        let epoch = entries.epoch(city_id) + 1;
        entries.epochs.insert(city_id.to_string(), epoch);
    }

    async fn flight_lock(&self, city_id: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight
            .entry(city_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Removes a city's flight slot. Called when the source reports the
    /// city unknown, so arbitrary ids cannot grow the map without bound.
    /// Waiters already queued on the mutex keep their `Arc` clone and
    /// finish normally.
    async fn reap_flight_lock(&self, city_id: &str) {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.remove(city_id);
    }

    #[cfg(test)]
    async fn flight_slot_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Atomic full replacement, newest snapshot wins. A result computed
    /// against an older `now` (or an older invalidation epoch) than what
    /// is already stored is abandoned.
    async fn store(&self, aggregate: CitySafetyAggregate, computed_epoch: u64) {
        let mut entries = self.entries.write().await;
        let city_id = aggregate.city_id.clone();

        if let Some(existing) = entries.records.get(&city_id)
            && existing.aggregate.last_updated > aggregate.last_updated
        {
            log::debug!("Abandoning superseded recompute for {city_id}");
            return;
        }

        entries.records.insert(
            city_id,
            CacheRecord {
                aggregate,
                computed_epoch,
            },
        );
    }
}
