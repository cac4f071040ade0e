#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the questmap safety engine.
//!
//! Serves the safety score query interface to the quest, leaderboard, and
//! itinerary subsystems, the impact ingest endpoint for the news
//! pipeline, and the operator/admin surface (force recompute, impact
//! deactivation). Scores are served from the read-through cache; all
//! writes invalidate the touched city's entry immediately.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use questmap_cache::ScoreCache;
use questmap_database::store::ImpactStore;
use questmap_database::{db, run_migrations};
use questmap_geo::GeoIndex;
use questmap_scoring::{ScoreAggregator, ScoringConfig};

/// Shared application state.
pub struct AppState {
    /// Durable impact store.
    pub store: ImpactStore,
    /// In-memory spatial index over active impacts.
    pub index: Arc<GeoIndex>,
    /// Read-through per-city score cache, wrapping the aggregator.
    pub cache: Arc<ScoreCache<ScoreAggregator>>,
}

/// Starts the questmap safety API server.
///
/// Connects to the database, runs migrations, loads city profiles and
/// active impacts, builds the spatial index, and starts the Actix-Web
/// HTTP server. This is a regular async function — the caller is
/// responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
///
/// # Panics
///
/// Panics if the scoring configuration is invalid, the database
/// connection fails, migrations fail, or the initial load of cities and
/// impacts fails. All of these are startup-fatal by design: a misloaded
/// engine must not serve scores.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ScoringConfig::from_env().expect("Invalid scoring configuration");

    log::info!("Connecting to database...");
    let db_conn = db::connect_from_env()
        .await
        .expect("Failed to connect to database");

    log::info!("Running migrations...");
    run_migrations(db_conn.as_ref())
        .await
        .expect("Failed to run migrations");

    let store = ImpactStore::new(Arc::from(db_conn));

    log::info!("Sweeping expired impacts...");
    let swept = store
        .deactivate_expired(chrono::Utc::now())
        .await
        .expect("Failed to sweep expired impacts");
    if !swept.is_empty() {
        log::info!("Deactivated {} expired impacts", swept.len());
    }

    log::info!("Loading city profiles...");
    let cities = store
        .city_profiles()
        .await
        .expect("Failed to load city profiles");
    log::info!("Loaded {} cities", cities.len());

    log::info!("Loading active impacts...");
    let impacts = store
        .load_active()
        .await
        .expect("Failed to load active impacts");
    let index = Arc::new(GeoIndex::new(impacts));

    let max_staleness = config.max_staleness;
    let aggregator = Arc::new(ScoreAggregator::new(index.clone(), cities, config));
    let cache = Arc::new(ScoreCache::new(aggregator, max_staleness));

    let sweep_interval: u64 = std::env::var("SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3600);
    spawn_expiry_sweeper(
        store.clone(),
        index.clone(),
        cache.clone(),
        std::time::Duration::from_secs(sweep_interval),
    );

    let state = web::Data::new(AppState {
        store,
        index,
        cache,
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .route(
                        "/safety/score/{city_id}",
                        web::get().to(handlers::safety_score),
                    )
                    .route(
                        "/safety/advisory/{city_id}",
                        web::get().to(handlers::safety_advisory),
                    )
                    .route(
                        "/safety/eligibility/{city_id}",
                        web::get().to(handlers::quest_eligibility),
                    )
                    .route("/impacts", web::post().to(handlers::ingest_impact))
                    .route(
                        "/admin/recompute/{city_id}",
                        web::post().to(handlers::force_recompute),
                    )
                    .route(
                        "/admin/impacts/{impact_id}/deactivate",
                        web::post().to(handlers::deactivate_impact),
                    ),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

/// Background task deactivating impacts whose expiry has passed.
///
/// Each swept impact leaves the spatial index and invalidates its city's
/// cached aggregate, so the table and index stay bounded instead of
/// accumulating expired rows that the decay clock merely zeroes.
fn spawn_expiry_sweeper(
    store: ImpactStore,
    index: Arc<GeoIndex>,
    cache: Arc<ScoreCache<ScoreAggregator>>,
    interval: std::time::Duration,
) {
    actix_web::rt::spawn(async move {
        let mut ticker = actix_web::rt::time::interval(interval);
        // The first tick fires immediately; startup already swept.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.deactivate_expired(chrono::Utc::now()).await {
                Ok(swept) => {
                    if swept.is_empty() {
                        continue;
                    }
                    log::info!("Swept {} expired impacts", swept.len());
                    for (impact_id, city_id) in swept {
                        index.remove(&impact_id);
                        cache.invalidate(&city_id).await;
                    }
                }
                Err(e) => log::error!("Expired impact sweep failed: {e:?}"),
            }
        }
    });
}
