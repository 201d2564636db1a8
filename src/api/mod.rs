//! HTTP job API: start a multi-city search, poll it, fetch or cancel it.

use crate::core::types::{
    ErrorResponse, ResultRow, SearchRequest, SearchResultsResponse, SearchStarted, SearchStatusResponse,
};
use crate::jobs::{spawn_search_job, AcquisitionJob};
use crate::tools::harvest::{parse_qualifiers, MultiTargetRequest};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const DEFAULT_MAX_RESULTS: usize = 20;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Search not found")
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/search", post(start_search))
        .route("/api/search/{search_id}/status", get(search_status))
        .route("/api/search/{search_id}/results", get(search_results))
        .route("/api/search/{search_id}/cancel", post(cancel_search))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "maps-harvest",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "active_searches": state.jobs.active_count(),
    }))
}

async fn start_search(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchStarted>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid request body: {}", rejection.body_text()),
        )
    })?;
    let query = request.query.trim();
    if query.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Search query required"));
    }
    let cities = request.cities.as_deref().map(str::trim).unwrap_or_default();
    if cities.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "At least one city must be specified",
        ));
    }
    let city_list = parse_qualifiers(cities);
    if city_list.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid city format. Use comma-separated city names.",
        ));
    }

    let filters = request
        .filters
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty());
    let per_city = request.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    let harvest = MultiTargetRequest::per_target(query, filters, city_list, per_city);

    let job = state.jobs.insert(AcquisitionJob::new(
        query,
        harvest.targets(),
        harvest.total_goal,
    ));
    let search_id = job.id();
    let message = format!(
        "Search started for: {} across {} cities ({} results per city, {} total)",
        query,
        harvest.qualifiers.len(),
        harvest.per_target_goal,
        harvest.total_goal
    );
    info!("{} [{}]", message, search_id);
    spawn_search_job(&state, job, harvest);

    Ok(Json(SearchStarted {
        search_id,
        status: "started".to_string(),
        message,
    }))
}

async fn search_status(
    State(state): State<Arc<AppState>>,
    Path(search_id): Path<String>,
) -> Result<Json<SearchStatusResponse>, ApiError> {
    let job = state.jobs.snapshot(&search_id).ok_or_else(not_found)?;
    let in_flight = !job.status.is_finished();

    Ok(Json(SearchStatusResponse {
        search_id,
        status: job.status.to_string(),
        query: job.query.clone(),
        results_count: job.records.len(),
        elapsed_time: job.elapsed_display(),
        current_city: in_flight.then(|| {
            job.current_target
                .clone()
                .unwrap_or_else(|| "Starting...".to_string())
        }),
        target_total: in_flight.then_some(job.total_goal),
        progress: in_flight.then(|| job.progress()),
    }))
}

async fn search_results(
    State(state): State<Arc<AppState>>,
    Path(search_id): Path<String>,
) -> Result<Json<SearchResultsResponse>, ApiError> {
    let job = state.jobs.snapshot(&search_id).ok_or_else(not_found)?;

    if !job.status.is_finished() {
        return Ok(Json(SearchResultsResponse {
            search_id,
            status: job.status.to_string(),
            query: job.query,
            results: Vec::new(),
            total_results: None,
            message: Some("Search still in progress...".to_string()),
            error: None,
        }));
    }

    let results: Vec<ResultRow> = job.records.iter().map(ResultRow::from).collect();
    Ok(Json(SearchResultsResponse {
        search_id,
        status: job.status.to_string(),
        query: job.query,
        total_results: Some(results.len()),
        results,
        message: None,
        error: job.error,
    }))
}

async fn cancel_search(
    State(state): State<Arc<AppState>>,
    Path(search_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state.jobs.cancel(&search_id).ok_or_else(not_found)?;
    let (status, message) = if status.is_finished() {
        (status.to_string(), "Search already finished")
    } else {
        ("cancelling".to_string(), "Cancellation requested")
    };
    Ok(Json(serde_json::json!({
        "search_id": search_id,
        "status": status,
        "message": message,
    })))
}
