#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index over active safety impacts.
//!
//! Loads active impacts from the database at startup, builds an R-tree
//! keyed by each impact's footprint bounding box, and answers
//! footprint-intersection queries with great-circle (haversine) distance.
//! Inserts and deactivations keep the tree current so re-queries after a
//! write are O(log n); no full rebuild is needed.

use std::collections::BTreeMap;
use std::sync::RwLock;

use questmap_impact_models::SafetyImpact;
use rstar::{AABB, RTree, RTreeObject};

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude.
const KM_PER_DEGREE_LAT: f64 = 110.574;

/// Kilometers per degree of longitude at the equator.
const KM_PER_DEGREE_LNG_EQUATOR: f64 = 111.320;

/// Great-circle distance between two points in kilometers.
#[must_use]
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Bounding box for a disc of `radius_km` around a point, in degrees.
///
/// The longitude padding widens toward the poles; the cosine is floored
/// so envelopes stay finite at extreme latitudes. Footprints crossing the
/// antimeridian are not split, matching the scale of city-sized discs.
fn disc_envelope(lat: f64, lng: f64, radius_km: f64) -> AABB<[f64; 2]> {
    let dlat = radius_km / KM_PER_DEGREE_LAT;
    let dlng = radius_km / (KM_PER_DEGREE_LNG_EQUATOR * lat.to_radians().cos().abs().max(1e-6));
    AABB::from_corners([lng - dlng, lat - dlat], [lng + dlng, lat + dlat])
}

/// An impact stored in the R-tree under its footprint envelope.
#[derive(Debug, Clone)]
struct ImpactEntry {
    envelope: AABB<[f64; 2]>,
    impact: SafetyImpact,
}

impl RTreeObject for ImpactEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PartialEq for ImpactEntry {
    fn eq(&self, other: &Self) -> bool {
        self.impact.id == other.impact.id
    }
}

/// Location and footprint radius kept per impact ID so a deactivation can
/// reconstruct the probe envelope without scanning the tree.
#[derive(Debug, Clone, Copy)]
struct Footprint {
    latitude: f64,
    longitude: f64,
    radius_km: f64,
}

struct Inner {
    tree: RTree<ImpactEntry>,
    footprints: BTreeMap<String, Footprint>,
}

/// R-tree spatial index over active impacts.
///
/// Shared across the aggregator and the ingest path. Reads take a shared
/// lock and have no side effects; inserts and removals take the exclusive
/// lock briefly.
pub struct GeoIndex {
    inner: RwLock<Inner>,
}

impl GeoIndex {
    /// Builds the index from the active impacts loaded at startup.
    #[must_use]
    pub fn new(impacts: Vec<SafetyImpact>) -> Self {
        let mut footprints = BTreeMap::new();
        let entries: Vec<ImpactEntry> = impacts
            .into_iter()
            .map(|impact| {
                footprints.insert(
                    impact.id.clone(),
                    Footprint {
                        latitude: impact.latitude,
                        longitude: impact.longitude,
                        radius_km: impact.radius_km,
                    },
                );
                ImpactEntry {
                    envelope: disc_envelope(impact.latitude, impact.longitude, impact.radius_km),
                    impact,
                }
            })
            .collect();

        log::info!("Built spatial index with {} active impacts", entries.len());

        Self {
            inner: RwLock::new(Inner {
                tree: RTree::bulk_load(entries),
                footprints,
            }),
        }
    }

    /// Returns all indexed impacts whose footprint circle intersects a
    /// disc of `radius_km` around the given center.
    ///
    /// Envelope intersection prefilters candidates; the exact test is
    /// `haversine(center, impact) <= radius_km + impact.radius_km`.
    ///
    /// # Panics
    ///
    /// Panics if the index lock is poisoned.
    #[must_use]
    pub fn query(&self, lat: f64, lng: f64, radius_km: f64) -> Vec<SafetyImpact> {
        let inner = self.inner.read().expect("GeoIndex lock poisoned");
        let query_env = disc_envelope(lat, lng, radius_km);

        inner
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| {
                let dist = haversine_km(lat, lng, entry.impact.latitude, entry.impact.longitude);
                dist <= radius_km + entry.impact.radius_km
            })
            .map(|entry| entry.impact.clone())
            .collect()
    }

    /// Inserts a newly persisted impact.
    ///
    /// # Panics
    ///
    /// Panics if the index lock is poisoned.
    pub fn insert(&self, impact: SafetyImpact) {
        let mut inner = self.inner.write().expect("GeoIndex lock poisoned");
        inner.footprints.insert(
            impact.id.clone(),
            Footprint {
                latitude: impact.latitude,
                longitude: impact.longitude,
                radius_km: impact.radius_km,
            },
        );
        let envelope = disc_envelope(impact.latitude, impact.longitude, impact.radius_km);
        inner.tree.insert(ImpactEntry { envelope, impact });
    }

    /// Removes a deactivated impact from the index.
    ///
    /// Returns `false` if the impact was not indexed (already removed or
    /// never active).
    ///
    /// # Panics
    ///
    /// Panics if the index lock is poisoned.
    pub fn remove(&self, impact_id: &str) -> bool {
        let mut inner = self.inner.write().expect("GeoIndex lock poisoned");
        let Some(footprint) = inner.footprints.remove(impact_id) else {
            return false;
        };

        let probe_env =
            disc_envelope(footprint.latitude, footprint.longitude, footprint.radius_km);
        let Some(entry) = inner
            .tree
            .locate_in_envelope_intersecting(&probe_env)
            .find(|entry| entry.impact.id == impact_id)
            .cloned()
        else {
            return false;
        };

        inner.tree.remove(&entry).is_some()
    }

    /// Number of indexed impacts.
    ///
    /// # Panics
    ///
    /// Panics if the index lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("GeoIndex lock poisoned").tree.size()
    }

    /// Whether the index is empty.
    ///
    /// # Panics
    ///
    /// Panics if the index lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use questmap_impact_models::ConcernType;

    use super::*;

    fn impact_at(id: &str, lat: f64, lng: f64, radius_km: f64) -> SafetyImpact {
        SafetyImpact {
            id: id.to_string(),
            article_id: format!("article-{id}"),
            city_id: "city-1".to_string(),
            concern: ConcernType::Crime,
            impact_factor: -0.5,
            weight_factor: 1.0,
            decay_factor: 0.5,
            latitude: lat,
            longitude: lng,
            radius_km,
            is_active: true,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn haversine_known_distances() {
        // NYC to London: ~5570 km
        let dist = haversine_km(40.7128, -74.0060, 51.5074, -0.1278);
        assert!((dist - 5570.0).abs() < 50.0);

        // Same point: 0 km
        assert!(haversine_km(38.72, -9.14, 38.72, -9.14).abs() < 1e-9);
    }

    #[test]
    fn query_finds_intersecting_footprints() {
        // Lisbon center, plus an impact ~8.7 km east (Parque das Nações).
        let index = GeoIndex::new(vec![
            impact_at("near", 38.7223, -9.1393, 5.0),
            impact_at("edge", 38.7681, -9.0966, 5.0),
            // Porto, ~270 km north.
            impact_at("far", 41.1579, -8.6291, 5.0),
        ]);

        let results = index.query(38.7223, -9.1393, 10.0);
        let mut ids: Vec<&str> = results.iter().map(|i| i.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["edge", "near"]);
    }

    #[test]
    fn query_excludes_beyond_combined_radius() {
        // Impact 30 km away with a 5 km footprint; a 10 km query disc
        // cannot intersect it.
        let index = GeoIndex::new(vec![impact_at("away", 38.99, -9.14, 5.0)]);
        assert!(index.query(38.7223, -9.1393, 10.0).is_empty());

        // Widen the query until the discs touch.
        assert_eq!(index.query(38.7223, -9.1393, 26.0).len(), 1);
    }

    #[test]
    fn remove_drops_impact_from_queries() {
        let index = GeoIndex::new(vec![
            impact_at("a", 38.7223, -9.1393, 5.0),
            impact_at("b", 38.7300, -9.1400, 5.0),
        ]);
        assert_eq!(index.len(), 2);

        assert!(index.remove("a"));
        assert_eq!(index.len(), 1);
        let remaining = index.query(38.7223, -9.1393, 10.0);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");

        // Second removal is a no-op.
        assert!(!index.remove("a"));
    }

    #[test]
    fn batch_removal_empties_the_index() {
        // Shape of the expiry sweep: a batch of ids comes back from the
        // store and each is dropped in turn.
        let index = GeoIndex::new(vec![
            impact_at("a", 38.7223, -9.1393, 5.0),
            impact_at("b", 38.7300, -9.1400, 5.0),
            impact_at("c", 38.7681, -9.0966, 5.0),
        ]);

        for id in ["a", "b", "c"] {
            assert!(index.remove(id));
        }
        assert!(index.is_empty());
        assert!(index.query(38.7223, -9.1393, 50.0).is_empty());
    }

    #[test]
    fn insert_is_visible_to_next_query() {
        let index = GeoIndex::new(Vec::new());
        assert!(index.is_empty());

        index.insert(impact_at("new", 38.7223, -9.1393, 5.0));
        assert_eq!(index.query(38.7223, -9.1393, 1.0).len(), 1);
    }
}
