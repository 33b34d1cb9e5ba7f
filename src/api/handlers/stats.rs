//! Service statistics endpoint

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::models::matches::MatchStatus;
use crate::services::matchmaking::QueueStats;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceStats {
    pub connected_players: usize,
    pub queued_players: usize,
    pub active_matches: usize,
    /// Matches currently held in memory, every status included
    pub total_matches: usize,
    pub queue: QueueStats,
    /// None when the server runs without a database
    pub database_healthy: Option<bool>,
    pub uptime_secs: u64,
}

/// GET /stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ServiceStats> {
    let database_healthy = match &state.db {
        Some(db) => Some(db.health_check().await),
        None => None,
    };

    Json(ServiceStats {
        connected_players: state.registry.connected_count(),
        queued_players: state.queue.depth(),
        active_matches: state.match_store.count_with_status(MatchStatus::Active),
        total_matches: state.match_store.len(),
        queue: state.queue.stats(),
        database_healthy,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
