//! fleetscale-admission: admission validation and REST API.
//!
//! [`AdmissionValidator`] decides whether a `FleetAutoscaler` may be
//! persisted. The router exposes it as a validating webhook and gates the
//! REST create endpoint with it.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/validate/fleetautoscaler` | Answer an `AdmissionReview` |
//! | GET | `/api/v1/fleetautoscalers` | List autoscalers |
//! | POST | `/api/v1/fleetautoscalers` | Create an autoscaler (admission-gated) |
//! | GET | `/api/v1/fleetautoscalers/:namespace/:name` | Get an autoscaler |
//! | DELETE | `/api/v1/fleetautoscalers/:namespace/:name` | Delete an autoscaler |
//! | GET | `/api/v1/fleets` | List fleets |
//! | POST | `/api/v1/fleets` | Create a fleet |
//! | GET | `/api/v1/fleets/:namespace/:name` | Get a fleet |
//! | DELETE | `/api/v1/fleets/:namespace/:name` | Delete a fleet |
//! | PUT | `/api/v1/fleets/:namespace/:name/status` | Report observed fleet state |

pub mod handlers;
pub mod review;
pub mod validator;

use axum::Router;
use axum::routing::{get, post, put};
use fleetscale_state::StateStore;

pub use review::{AdmissionRequest, AdmissionResponse, AdmissionReview};
pub use validator::{AdmissionValidator, AdmissionVerdict, DenyReason, FieldViolation};

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub validator: AdmissionValidator,
}

/// Build the admission + REST router.
pub fn build_router(store: StateStore) -> Router {
    let state = ApiState {
        store,
        validator: AdmissionValidator::new(),
    };

    let api_routes = Router::new()
        .route(
            "/fleetautoscalers",
            get(handlers::list_autoscalers).post(handlers::create_autoscaler),
        )
        .route(
            "/fleetautoscalers/{namespace}/{name}",
            get(handlers::get_autoscaler).delete(handlers::delete_autoscaler),
        )
        .route("/fleets", get(handlers::list_fleets).post(handlers::create_fleet))
        .route(
            "/fleets/{namespace}/{name}",
            get(handlers::get_fleet).delete(handlers::delete_fleet),
        )
        .route(
            "/fleets/{namespace}/{name}/status",
            put(handlers::update_fleet_status),
        )
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route(
            "/validate/fleetautoscaler",
            post(handlers::validate_autoscaler).with_state(state),
        )
}
