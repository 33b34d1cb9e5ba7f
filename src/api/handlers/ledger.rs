//! Settlement ledger endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use super::ErrorResponse;
use crate::blockchain::LedgerStats;
use crate::AppState;

/// GET /ledger/stats
///
/// Live figures straight from the settlement contract
pub async fn get_ledger_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LedgerStats>, (StatusCode, Json<ErrorResponse>)> {
    let ledger = state.ledger.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "Settlement ledger not configured".to_string(),
            code: "LEDGER_NOT_CONFIGURED".to_string(),
        }),
    ))?;

    let stats = ledger.get_stats().await.map_err(|e| {
        tracing::error!("Failed to read ledger stats: {}", e);
        (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: "Ledger query failed".to_string(),
                code: "LEDGER_ERROR".to_string(),
            }),
        )
    })?;

    Ok(Json(stats))
}
