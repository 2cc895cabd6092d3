//! HTTP endpoint handlers.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::AppState;
use crate::models::{ExtractionStatus, JobRequest, PhantomWebhookPayload};
use crate::services::CompletionSignal;
use crate::store::StoreError;

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

fn store_error(err: StoreError) -> (StatusCode, Json<serde_json::Value>) {
    error!("Queue store error: {}", err);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": err.to_string() })),
    )
}

/// Inbound provider callback. Always acknowledges quickly; the decoded event
/// is handed to the completion worker, and anything unroutable is logged and
/// dropped rather than bounced (the provider retries on non-2xx and a
/// malformed payload will not improve with retries).
pub async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let payload: PhantomWebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("Undecodable webhook payload: {}", err);
            return (StatusCode::OK, Json(json!({ "status": "ignored" })));
        }
    };

    if !payload.is_routable() {
        warn!("Webhook payload carries no container id; dropping");
        return (StatusCode::OK, Json(json!({ "status": "ignored" })));
    }
    let container_id = payload.container_id.clone().unwrap_or_default();

    let Some(event) = payload.decode() else {
        warn!(
            "Unrecognized webhook shape for container {} (status {:?})",
            container_id, payload.status
        );
        return (StatusCode::OK, Json(json!({ "status": "ignored" })));
    };

    let signal = CompletionSignal {
        container_id,
        event,
        source: "webhook",
    };
    match state.signals.try_send(signal) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "received" }))),
        Err(err) => {
            error!("Could not queue webhook event: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error" })),
            )
        }
    }
}

/// Status query parameters.
#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub target_id: Option<String>,
}

/// Queue snapshot plus a rough wait estimate for anything joining now.
/// Pass `?target_id=` to also get that target's 1-based waiting position
/// (`null` when it is not in line).
pub async fn queue_status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> impl IntoResponse {
    let snapshot = match state.queue.queue_status().await {
        Ok(snapshot) => snapshot,
        Err(err) => return store_error(err).into_response(),
    };

    let position = match params.target_id.as_deref() {
        Some(target_id) => match state.queue.position_for(target_id).await {
            Ok(position) => position,
            Err(err) => return store_error(err).into_response(),
        },
        None => None,
    };

    // The holder's container id lives on its audit record, not in the lock.
    let container_id = match &snapshot.current_job {
        Some(job) => match state.audit.latest_pending_with_container() {
            Ok(record) => record
                .filter(|r| r.job_id == job.job_id)
                .and_then(|r| r.container_id().map(str::to_string)),
            Err(err) => {
                warn!("Could not look up container for status: {}", err);
                None
            }
        },
        None => None,
    };

    let slots_ahead = snapshot.queue_length + usize::from(snapshot.is_processing);
    let estimated_wait_seconds = slots_ahead as u64 * state.average_run.as_secs();

    Json(json!({
        "queue_length": snapshot.queue_length,
        "is_processing": snapshot.is_processing,
        "current_job": snapshot.current_job,
        "container_id": container_id,
        "lock_age_secs": snapshot.lock_age_secs,
        "position": position,
        "estimated_wait_seconds": estimated_wait_seconds,
    }))
    .into_response()
}

/// Waiting entries, head first.
pub async fn list_queue_jobs(State(state): State<AppState>) -> impl IntoResponse {
    match state.queue.queue_contents().await {
        Ok(contents) => Json(contents).into_response(),
        Err(err) => store_error(err).into_response(),
    }
}

/// Body for enqueue requests.
#[derive(Debug, Deserialize)]
pub struct EnqueueBody {
    pub target_id: String,
    pub job_kind: Option<String>,
    pub search_url: Option<String>,
    pub extra_params: Option<serde_json::Value>,
}

/// Ask for the extraction slot.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(body): Json<EnqueueBody>,
) -> impl IntoResponse {
    if body.target_id.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "target_id must not be empty" })),
        )
            .into_response();
    }

    let mut request = JobRequest::new(body.target_id.trim());
    if let Some(kind) = body.job_kind.filter(|k| !k.trim().is_empty()) {
        request = request.with_kind(kind.trim());
    }
    if let Some(url) = body.search_url.filter(|u| !u.trim().is_empty()) {
        request = request.with_search_url(url.trim());
    }
    if let Some(params) = body.extra_params {
        request.extra_params = params;
    }

    match state.queue.request_slot(request).await {
        Ok(decision) => {
            let estimated_wait_seconds = decision
                .position
                .map(|p| p as u64 * state.average_run.as_secs());
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "started": decision.started,
                    "position": decision.position,
                    "estimated_wait_seconds": estimated_wait_seconds,
                })),
            )
                .into_response()
        }
        Err(err) => store_error(err).into_response(),
    }
}

/// Operator recovery: release the slot and start the next waiting entry.
pub async fn advance_queue(State(state): State<AppState>) -> impl IntoResponse {
    match state
        .queue
        .job_completed(None, crate::models::CompletionKind::Manual)
        .await
    {
        Ok(next_started) => Json(json!({ "next_started": next_started })).into_response(),
        Err(err) => store_error(err).into_response(),
    }
}

/// Remove one waiting entry by queue job id.
pub async fn remove_queue_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.queue.remove_job(&job_id).await {
        Ok(true) => Json(json!({ "removed": true })).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no waiting entry with that job id" })),
        )
            .into_response(),
        Err(err) => store_error(err).into_response(),
    }
}

/// Audit listing parameters.
#[derive(Debug, Deserialize)]
pub struct JobsParams {
    pub status: Option<String>,
    pub service: Option<String>,
    pub limit: Option<u32>,
}

/// Audit read surface: recent extraction job records.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobsParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(s) => match ExtractionStatus::from_str(s) {
            Some(status) => Some(status),
            None => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": format!("unknown status '{s}'") })),
                )
                    .into_response()
            }
        },
    };
    let limit = params.limit.unwrap_or(50).min(500);

    match state.audit.list(params.service.as_deref(), status, limit) {
        Ok(records) => Json(records).into_response(),
        Err(err) => {
            error!("Audit query failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
