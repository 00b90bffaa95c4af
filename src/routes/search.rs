use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use validator::Validate;
use crate::models::{ErrorResponse, HealthResponse, SearchRequest, SearchResponse};
use crate::services::{ProfileStore, StoreError};
use crate::core::{MatchingEngine, SearchError};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: MatchingEngine,
    pub store: Arc<dyn ProfileStore>,
    pub request_deadline: Duration,
}

/// Configure search and profile read routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/search", web::post().to(search_profiles))
        .route("/profiles", web::get().to(list_profiles))
        .route("/profiles/{id}", web::get().to(get_profile));
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// HTTP status for each search failure kind
pub fn status_for(err: &SearchError) -> StatusCode {
    match err {
        SearchError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        SearchError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        SearchError::BackendTimeout => StatusCode::GATEWAY_TIMEOUT,
        SearchError::BackendRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        SearchError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SearchError::BackendRejected(_) => StatusCode::BAD_GATEWAY,
        SearchError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        SearchError::ProfileStore(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn search_error_response(err: &SearchError) -> HttpResponse {
    let status = status_for(err);
    let mut builder = HttpResponse::build(status);

    if let SearchError::BackendRateLimited { retry_after: Some(delay) } = err {
        builder.insert_header(("Retry-After", delay.as_secs().max(1).to_string()));
    }

    builder.json(ErrorResponse {
        error: err.kind().to_string(),
        message: err.to_string(),
        status_code: status.as_u16(),
    })
}

fn store_error_response(err: &StoreError) -> HttpResponse {
    match err {
        StoreError::NotFound(message) => HttpResponse::NotFound().json(ErrorResponse {
            error: "not_found".to_string(),
            message: message.clone(),
            status_code: 404,
        }),
        _ => HttpResponse::ServiceUnavailable().json(ErrorResponse {
            error: "profile_store_error".to_string(),
            message: err.to_string(),
            status_code: 503,
        }),
    }
}

/// Search profiles endpoint
///
/// POST /api/v1/search
///
/// Request body:
/// ```json
/// { "query": "find developers with machine learning experience" }
/// ```
async fn search_profiles(
    state: web::Data<AppState>,
    req: web::Json<SearchRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for search request: {}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "invalid_query".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("search", %request_id);
    span.in_scope(|| tracing::info!("Searching profiles for query of {} chars", req.query.len()));

    let result = state
        .engine
        .search_within(&req.query, state.request_deadline)
        .instrument(span.clone())
        .await;

    let _enter = span.enter();
    match result {
        Ok(outcome) => HttpResponse::Ok().json(SearchResponse {
            matches: outcome.matches,
            profiles_considered: outcome.corpus_size,
        }),
        Err(e) => {
            if e.is_retryable() {
                tracing::warn!("Search failed ({}): {}", e.kind(), e);
            } else {
                tracing::error!("Search failed ({}): {}", e.kind(), e);
            }
            search_error_response(&e)
        }
    }
}

/// List all profiles
///
/// GET /api/v1/profiles
async fn list_profiles(state: web::Data<AppState>) -> impl Responder {
    match state.store.list_all_profiles().await {
        Ok(profiles) => HttpResponse::Ok().json(profiles),
        Err(e) => {
            tracing::error!("Failed to list profiles: {}", e);
            store_error_response(&e)
        }
    }
}

/// Get a single profile
///
/// GET /api/v1/profiles/{id}
async fn get_profile(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_profile(&id).await {
        Ok(profile) => HttpResponse::Ok().json(profile),
        Err(e) => {
            tracing::debug!("Failed to fetch profile {}: {}", id, e);
            store_error_response(&e)
        }
    }
}
