//! # Admin API
//!
//! Read/administer the delivery core over HTTP: the metrics snapshot,
//! dead letter inspection, and entry replay. This surface is for
//! operators; game traffic never touches it.
//!
//! ## Routes
//!
//! - `GET /healthz` — liveness + broker connection state
//! - `GET /metrics` — metrics snapshot (JSON)
//! - `GET /dlq?channel=&reason=&since=&until=` — list dead letters
//! - `GET /dlq/:id` — one entry
//! - `POST /dlq/:id/replay` — re-attempt delivery, remove on success

use crate::bridge::EventBridge;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use ember_telemetry::{MetricsCollector, MetricsSnapshot};
use messaging::MessagingClient;
use resilience::{DeadLetterEntry, DeadLetterQueue, DlqError, DlqFilter, FailureReason};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared state for the admin routes.
#[derive(Clone)]
pub struct ApiState {
    /// Metrics collector backing `/metrics`.
    pub metrics: Arc<MetricsCollector>,
    /// Dead letter queue backing the `/dlq` routes.
    pub dlq: Arc<DeadLetterQueue>,
    /// Bridge used for replay delivery.
    pub bridge: Arc<EventBridge>,
    /// Broker client, reported by `/healthz`.
    pub client: Arc<MessagingClient>,
}

/// Build the admin router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_snapshot))
        .route("/dlq", get(list_dead_letters))
        .route("/dlq/:id", get(get_dead_letter))
        .route("/dlq/:id/replay", post(replay_dead_letter))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API error mapped onto HTTP statuses.
#[derive(Debug)]
pub enum ApiError {
    /// 404.
    NotFound,
    /// 400 with a message.
    BadRequest(String),
    /// Underlying store/replay failure.
    Dlq(DlqError),
}

impl From<DlqError> for ApiError {
    fn from(err: DlqError) -> Self {
        match err {
            DlqError::NotFound(_) => Self::NotFound,
            other => Self::Dlq(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Dlq(DlqError::ReplayFailed { reason, .. }) => {
                (StatusCode::BAD_GATEWAY, format!("replay failed: {reason}"))
            }
            Self::Dlq(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

async fn healthz(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connection": state.client.state().as_str(),
    }))
}

async fn metrics_snapshot(State(state): State<ApiState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Query parameters for listing dead letters.
#[derive(Debug, Deserialize)]
struct DlqQuery {
    channel: Option<String>,
    reason: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl DlqQuery {
    fn into_filter(self) -> Result<DlqFilter, ApiError> {
        let reason = match self.reason.as_deref() {
            None => None,
            Some("retries_exhausted") => Some(FailureReason::RetriesExhausted),
            Some("circuit_open") => Some(FailureReason::CircuitOpen),
            Some(other) => {
                return Err(ApiError::BadRequest(format!("unknown reason: {other}")));
            }
        };
        Ok(DlqFilter {
            channel: self.channel,
            reason,
            since: self.since,
            until: self.until,
        })
    }
}

async fn list_dead_letters(
    State(state): State<ApiState>,
    Query(query): Query<DlqQuery>,
) -> Result<Json<Vec<DeadLetterEntry>>, ApiError> {
    let filter = query.into_filter()?;
    let entries = state.dlq.list(&filter).await?;
    Ok(Json(entries))
}

async fn get_dead_letter(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeadLetterEntry>, ApiError> {
    let entry = state.dlq.entry(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(entry))
}

async fn replay_dead_letter(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.bridge.replay(id).await?;
    Ok(Json(serde_json::json!({ "status": "replayed", "id": id })))
}
