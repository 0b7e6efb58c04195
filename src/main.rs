use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use form_funnel::config::Config;
use form_funnel::demo::seed_sample_funnel;
use form_funnel::forms::{suggest_form_id, JsonFileFormProvider};
use form_funnel::models::{
    AnalyticsEvent, AnalyticsOverview, ApiResponse, EventCounts, FormAnalytics, TrackInput,
};
use form_funnel::session::MemorySessionStore;
use form_funnel::{AnalyticsError, AnalyticsService};

#[cfg(test)]
mod tests;

const SESSION_HEADER: &str = "x-session-id";
const DEFAULT_EVENT_LIMIT: usize = 50;

/// Event-driven analytics API
/// Tracking only ever appends to the event log
/// All funnel numbers are derived from it
#[derive(Clone)]
struct AppState {
    analytics: Arc<AnalyticsService>,
}

type ApiError = (StatusCode, Json<ApiResponse>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "form_funnel=info,tower_http=info".into()),
        )
        .init();

    let config = Config::parse();
    info!(
        bind = %config.bind,
        store = ?config.store,
        forms_path = %config.forms_path.display(),
        "form-funnel starting"
    );

    let store = config.open_store()?;
    let forms = Arc::new(JsonFileFormProvider::new(&config.forms_path));
    let analytics = Arc::new(AnalyticsService::new(
        store,
        forms,
        Arc::new(MemorySessionStore::new()),
    ));

    let app = router(AppState { analytics });

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    // forms embedded on external sites post events cross-origin
    let public = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/events", post(track_event).get(list_events))
        .route("/forms/:form_id/analytics", get(get_form_analytics))
        .route("/analytics", get(get_overview))
        .route("/analytics/debug", get(get_event_counts))
        .layer(CorsLayer::permissive());

    // same-origin only: these wipe, seed or rebuild the log
    let admin = Router::new()
        .route("/admin/events", delete(clear_events))
        .route("/admin/forms/:form_id/sample-data", post(seed_sample_data))
        .route("/admin/analytics/refresh", post(refresh_analytics));

    public
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "Form Funnel Analytics API v0.1.0"
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::error(message, None)))
}

fn internal_error(e: AnalyticsError) -> ApiError {
    error!(error = %e, "analytics request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

/// Track one event
/// Session comes from the body, then the header, then the server's own session
async fn track_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<TrackInput>,
) -> Result<Json<ApiResponse>, ApiError> {
    let header_session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let session_id = input.session_id.or(header_session);

    let event = state
        .analytics
        .record(
            input.event_type,
            &input.form_id,
            input.step_id.as_deref(),
            session_id.as_deref(),
        )
        .map_err(|e| match e {
            AnalyticsError::Validation(msg) => api_error(StatusCode::BAD_REQUEST, msg),
            other => internal_error(other),
        })?;

    Ok(Json(ApiResponse::success(
        format!("Event tracked: {}", event.event_type.as_str()),
        Some(serde_json::json!({ "event": event })),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsQuery {
    form_id: Option<String>,
    limit: Option<usize>,
}

/// Recent events, newest first (read-only)
async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<AnalyticsEvent>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    state
        .analytics
        .recent_events(query.form_id.as_deref(), limit)
        .map(Json)
        .map_err(internal_error)
}

/// Administrative reset, not a tracking operation
async fn clear_events(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    state.analytics.reset().map_err(internal_error)?;
    Ok(Json(ApiResponse::success("Analytics data cleared", None)))
}

async fn get_form_analytics(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> Result<Json<FormAnalytics>, ApiError> {
    match state.analytics.get_form_analytics(&form_id) {
        Some(analytics) => Ok(Json(analytics)),
        None => Err(not_found(&state, &form_id)),
    }
}

fn not_found(state: &AppState, form_id: &str) -> ApiError {
    let suggestion = suggest_form_id(state.analytics.forms(), form_id);
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(
            format!("No analytics for form {form_id}"),
            suggestion.map(|id| serde_json::json!({ "didYouMean": id })),
        )),
    )
}

/// Seeding records thousands of events, so it runs off the async workers
async fn seed_sample_data(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Some(form) = state.analytics.forms().get_form(&form_id) else {
        return Err(not_found(&state, &form_id));
    };
    let analytics = Arc::clone(&state.analytics);
    let recorded = tokio::task::spawn_blocking(move || seed_sample_funnel(&analytics, &form))
        .await
        .map_err(join_error)?
        .map_err(internal_error)?;
    Ok(Json(ApiResponse::success(
        format!("Sample funnel generated for {form_id}"),
        Some(serde_json::json!({ "events": recorded })),
    )))
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!(error = %e, "blocking analytics task failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

async fn get_overview(State(state): State<AppState>) -> Json<AnalyticsOverview> {
    Json(state.analytics.overview())
}

async fn get_event_counts(State(state): State<AppState>) -> Result<Json<EventCounts>, ApiError> {
    state.analytics.event_counts().map(Json).map_err(internal_error)
}

async fn refresh_analytics(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let analytics = Arc::clone(&state.analytics);
    tokio::task::spawn_blocking(move || analytics.refresh_all_analytics())
        .await
        .map_err(join_error)?;
    Ok(Json(ApiResponse::success("Analytics refreshed", None)))
}
