//! HTTP handlers.
//!
//! The validating endpoint answers `AdmissionReview`s; the REST endpoints
//! read/write the store, with autoscaler creation gated by the same
//! validator.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{debug, info, warn};

use fleetscale_state::*;

use crate::ApiState;
use crate::review::{AdmissionResponse, AdmissionReview};

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn store_error(e: StateError) -> axum::response::Response {
    let status = match &e {
        StateError::AlreadyExists(_) | StateError::Conflict { .. } => StatusCode::CONFLICT,
        StateError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status).into_response()
}

// ── Admission ─────────────────────────────────────────────────────

/// POST /validate/fleetautoscaler
pub async fn validate_autoscaler(
    State(state): State<ApiState>,
    Json(review): Json<AdmissionReview>,
) -> impl IntoResponse {
    let Some(request) = review.request else {
        return error_response("admission review has no request", StatusCode::BAD_REQUEST)
            .into_response();
    };

    let name = request
        .object
        .pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let verdict = state.validator.validate_value(request.object);

    if verdict.allowed {
        debug!(uid = %request.uid, %name, "fleet autoscaler admitted");
    } else {
        info!(
            uid = %request.uid,
            %name,
            operation = %request.operation,
            reason = ?verdict.reason,
            details = %verdict.message(),
            "fleet autoscaler rejected"
        );
    }

    let response = AdmissionResponse::from_verdict(&request.uid, &name, &verdict);
    Json(AdmissionReview::respond(response)).into_response()
}

// ── Fleet autoscalers ─────────────────────────────────────────────

/// GET /api/v1/fleetautoscalers
pub async fn list_autoscalers(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_autoscalers() {
        Ok(list) => ApiResponse::ok(list).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/v1/fleetautoscalers/:namespace/:name
pub async fn get_autoscaler(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_autoscaler(&object_key(&namespace, &name)) {
        Ok(Some(fas)) => ApiResponse::ok(fas).into_response(),
        Ok(None) => error_response("fleet autoscaler not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /api/v1/fleetautoscalers
///
/// Runs admission before anything is written; a denial returns 422 with
/// the verdict as `data`.
pub async fn create_autoscaler(
    State(state): State<ApiState>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let verdict = state.validator.validate_value(body.clone());
    if !verdict.allowed {
        warn!(details = %verdict.message(), "fleet autoscaler create rejected");
        let message = verdict.message();
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse {
                success: false,
                data: Some(verdict),
                error: Some(message),
            }),
        )
            .into_response();
    }

    let mut fas: FleetAutoscaler = match serde_json::from_value(body) {
        Ok(fas) => fas,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    };
    fas.status = FleetAutoscalerStatus::default();

    match state.store.create_autoscaler(&fas) {
        Ok(created) => {
            info!(autoscaler = %created.metadata.key(), fleet = %created.spec.fleet_name, "fleet autoscaler created");
            (StatusCode::CREATED, ApiResponse::ok(created)).into_response()
        }
        Err(e) => store_error(e),
    }
}

/// DELETE /api/v1/fleetautoscalers/:namespace/:name
pub async fn delete_autoscaler(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_autoscaler(&object_key(&namespace, &name)) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("fleet autoscaler not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => store_error(e),
    }
}

// ── Fleets ────────────────────────────────────────────────────────

/// GET /api/v1/fleets
pub async fn list_fleets(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_fleets() {
        Ok(list) => ApiResponse::ok(list).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/v1/fleets/:namespace/:name
pub async fn get_fleet(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_fleet(&object_key(&namespace, &name)) {
        Ok(Some(fleet)) => ApiResponse::ok(fleet).into_response(),
        Ok(None) => error_response("fleet not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /api/v1/fleets
pub async fn create_fleet(
    State(state): State<ApiState>,
    Json(fleet): Json<Fleet>,
) -> impl IntoResponse {
    if split_key(&fleet.metadata.key()).is_none() {
        return error_response(
            "fleet name and namespace must be non-empty and contain no '/'",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    match state.store.create_fleet(&fleet) {
        Ok(created) => (StatusCode::CREATED, ApiResponse::ok(created)).into_response(),
        Err(e) => store_error(e),
    }
}

/// PUT /api/v1/fleets/:namespace/:name/status
///
/// Report observed fleet state. The body's `resourceVersion` must match
/// the stored one.
pub async fn update_fleet_status(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(fleet): Json<Fleet>,
) -> impl IntoResponse {
    if fleet.metadata.key() != object_key(&namespace, &name) {
        return error_response("body does not match path", StatusCode::BAD_REQUEST).into_response();
    }
    if !fleet.status.is_consistent() {
        return error_response(
            "allocated and ready replicas exceed total replicas",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    match state.store.update_fleet_status(&fleet) {
        Ok(updated) => ApiResponse::ok(updated).into_response(),
        Err(e) => store_error(e),
    }
}

/// DELETE /api/v1/fleets/:namespace/:name
pub async fn delete_fleet(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_fleet(&object_key(&namespace, &name)) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("fleet not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => store_error(e),
    }
}
