//! HTTP handler functions for the questmap safety API.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use questmap_database::store::StoreError;
use questmap_impact_models::NewImpact;
use questmap_scoring::AggregateError;
use questmap_server_models::{
    ApiAdvisory, ApiEligibility, ApiHealth, ApiMessage, ApiSafetyScore, DeactivateImpactRequest,
    EligibilityQueryParams,
};

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/safety/score/{city_id}`
///
/// Serves the city's aggregate from the read-through cache. A stale
/// value (served after a transient recompute failure) is marked as such
/// rather than failing the consumer's request.
pub async fn safety_score(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let city_id = path.into_inner();

    match state.cache.get(&city_id).await {
        Ok(cached) => {
            HttpResponse::Ok().json(ApiSafetyScore::from_aggregate(cached.aggregate, cached.stale))
        }
        Err(e) => aggregate_error_response(&city_id, &e),
    }
}

/// `GET /api/safety/advisory/{city_id}`
pub async fn safety_advisory(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let city_id = path.into_inner();

    match state.cache.get(&city_id).await {
        Ok(cached) => HttpResponse::Ok().json(ApiAdvisory {
            city_id: cached.aggregate.city_id,
            advisory: questmap_eligibility::advisory_for(cached.aggregate.score),
            score: cached.aggregate.score,
            last_updated: cached.aggregate.last_updated,
        }),
        Err(e) => aggregate_error_response(&city_id, &e),
    }
}

/// `GET /api/safety/eligibility/{city_id}?difficulty=`
pub async fn quest_eligibility(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<EligibilityQueryParams>,
) -> HttpResponse {
    let city_id = path.into_inner();
    let difficulty = params.difficulty;

    match state.cache.get(&city_id).await {
        Ok(cached) => HttpResponse::Ok().json(ApiEligibility {
            city_id: cached.aggregate.city_id,
            difficulty,
            threshold: questmap_eligibility::min_score_for(difficulty),
            score: cached.aggregate.score,
            eligible: questmap_eligibility::is_quest_eligible(difficulty, cached.aggregate.score),
        }),
        Err(e) => aggregate_error_response(&city_id, &e),
    }
}

/// `POST /api/impacts`
///
/// Ingests a classified impact from the news pipeline: validate, persist,
/// index, and invalidate the touched city's cached aggregate.
pub async fn ingest_impact(
    state: web::Data<AppState>,
    body: web::Json<NewImpact>,
) -> HttpResponse {
    let new_impact = body.into_inner();

    match state.store.add(new_impact, Utc::now()).await {
        Ok(impact) => {
            let city_id = impact.city_id.clone();
            state.index.insert(impact.clone());
            state.cache.invalidate(&city_id).await;
            HttpResponse::Created().json(impact)
        }
        Err(StoreError::Validation(e)) => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() }))
        }
        Err(e @ StoreError::Duplicate { .. }) => {
            HttpResponse::Conflict().json(serde_json::json!({ "error": e.to_string() }))
        }
        Err(StoreError::Db(e)) => {
            log::error!("Failed to persist impact: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to persist impact"
            }))
        }
    }
}

/// `POST /api/admin/recompute/{city_id}`
///
/// Operator-triggered recompute. Surfaces the underlying error directly;
/// no stale-serving on this path.
pub async fn force_recompute(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let city_id = path.into_inner();

    match state.cache.force_recompute(&city_id, Utc::now()).await {
        Ok(aggregate) => HttpResponse::Ok().json(ApiSafetyScore::from_aggregate(aggregate, false)),
        Err(AggregateError::UnknownCity { city_id }) => HttpResponse::NotFound()
            .json(serde_json::json!({ "error": format!("Unknown city: {city_id}") })),
        Err(e) => {
            log::error!("Forced recompute for {city_id} failed: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

/// `POST /api/admin/impacts/{impact_id}/deactivate`
pub async fn deactivate_impact(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<DeactivateImpactRequest>,
) -> HttpResponse {
    let impact_id = path.into_inner();
    let reason = body.into_inner().reason;

    match state.store.deactivate(&impact_id, &reason).await {
        Ok(Some(city_id)) => {
            state.index.remove(&impact_id);
            state.cache.invalidate(&city_id).await;
            HttpResponse::Ok().json(ApiMessage {
                message: format!("Impact {impact_id} deactivated"),
            })
        }
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Impact not found or already inactive"
        })),
        Err(e) => {
            log::error!("Failed to deactivate impact {impact_id}: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to deactivate impact"
            }))
        }
    }
}

/// Maps an [`AggregateError`] from the cache path to an HTTP response.
fn aggregate_error_response(city_id: &str, error: &AggregateError) -> HttpResponse {
    match error {
        AggregateError::UnknownCity { .. } => HttpResponse::NotFound()
            .json(serde_json::json!({ "error": format!("Unknown city: {city_id}") })),
        AggregateError::Transient { .. } => {
            log::error!("No aggregate available for {city_id}: {error}");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "Safety score temporarily unavailable"
            }))
        }
    }
}
