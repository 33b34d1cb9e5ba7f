//! Player history endpoints
//!
//! All of these read the database, so they answer 503 when the server
//! runs without one. Only wallet-bound players accumulate history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::ErrorResponse;
use crate::db::Database;
use crate::models::player::{LeaderboardEntry, MatchHistoryRow, PlayerStats};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

fn require_db(state: &AppState) -> Result<&Arc<Database>, (StatusCode, Json<ErrorResponse>)> {
    state.db.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "Match history requires a database".to_string(),
            code: "PERSISTENCE_NOT_CONFIGURED".to_string(),
        }),
    ))
}

/// GET /leaderboard
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, (StatusCode, Json<ErrorResponse>)> {
    let db = require_db(&state)?;
    let entries = db
        .leaderboard(query.limit.clamp(1, 100))
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch leaderboard: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to fetch leaderboard".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                }),
            )
        })?;
    Ok(Json(entries))
}

/// GET /players/:address/stats
pub async fn get_player_stats(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<PlayerStats>, (StatusCode, Json<ErrorResponse>)> {
    let db = require_db(&state)?;
    let stats = db
        .player_stats(&address.to_lowercase())
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch stats for {}: {}", address, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to fetch player stats".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                }),
            )
        })?;

    match stats {
        Some(stats) => Ok(Json(stats)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No history for {}", address),
                code: "PLAYER_NOT_FOUND".to_string(),
            }),
        )),
    }
}

/// GET /players/:address/history
pub async fn get_player_history(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<MatchHistoryRow>>, (StatusCode, Json<ErrorResponse>)> {
    let db = require_db(&state)?;
    let rows = db
        .match_history(&address.to_lowercase(), query.limit.clamp(1, 100))
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch history for {}: {}", address, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to fetch match history".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                }),
            )
        })?;
    Ok(Json(rows))
}
