use axum::{routing::get, Router};
use std::sync::Arc;

use crate::api::handlers;
use crate::AppState;

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(handlers::stats::get_stats))
        .route("/matches/:match_id", get(handlers::matches::get_match))
        .route("/leaderboard", get(handlers::players::get_leaderboard))
        .route(
            "/players/:address/stats",
            get(handlers::players::get_player_stats),
        )
        .route(
            "/players/:address/history",
            get(handlers::players::get_player_history),
        )
        .route("/ledger/stats", get(handlers::ledger::get_ledger_stats))
}
