//! Match lookup endpoint

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use super::ErrorResponse;
use crate::models::matches::Match;
use crate::AppState;

/// GET /matches/:match_id
///
/// Reads from the in-memory store, so only matches that have not been
/// dropped (cancelled or pruned) are visible here
pub async fn get_match(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<Match>, (StatusCode, Json<ErrorResponse>)> {
    match state.match_store.get(&match_id) {
        Some(m) => Ok(Json(m)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Match {} not found", match_id),
                code: "MATCH_NOT_FOUND".to_string(),
            }),
        )),
    }
}
