use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use tracing::{error, warn};

use crate::supervisor::{Supervisor, SupervisorError};

pub fn router(supervisor: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/update", get(handle_update).post(handle_update))
        .route("/check", get(handle_check))
        .with_state(supervisor)
}

/// Accepts a reload trigger. "success" acknowledges acceptance, not
/// completion; the reload outcome is only observable in the logs.
async fn handle_update(State(supervisor): State<Arc<Supervisor>>) -> (StatusCode, &'static str) {
    match supervisor.reload().await {
        Ok(()) => (StatusCode::OK, "success"),
        Err(e @ SupervisorError::Busy) => {
            warn!("{e}");
            (StatusCode::CONFLICT, "reload already in flight")
        }
        Err(e @ SupervisorError::NotStarted) => {
            error!("{e}");
            (StatusCode::SERVICE_UNAVAILABLE, "daemon not started")
        }
        Err(e) => {
            error!("reload trigger failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "reload failed")
        }
    }
}

// Reserved health endpoint.
async fn handle_check() -> (StatusCode, &'static str) {
    (StatusCode::NOT_IMPLEMENTED, "not implemented")
}
