use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde_json::json;

/// GET the liveness of the API and its database
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "The database answered a ping"),
        (status = 500, description = "The database could not be reached; the body carries the error")
    )
)]
pub async fn health_check(State(app_state): State<AppState>) -> impl IntoResponse {
    match entity_api::ping(app_state.db_conn_ref()).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy" }))),
        Err(e) => {
            warn!("Health check failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "unhealthy", "error": e.to_string() })),
            )
        }
    }
}
