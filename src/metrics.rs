//! Prometheus Metrics
//!
//! Installs the global recorder and pre-registers the series the rest of
//! the server emits. The handle renders the scrape body for GET /metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_gauge!("duel_connected_players", "Currently connected WebSocket players");
    describe_gauge!("duel_players_queued", "Players waiting in the matchmaking queue");
    describe_gauge!("duel_active_matches", "Matches with the round clock running");

    describe_counter!("duel_queue_joins_total", "Queue join requests accepted");
    describe_counter!("duel_matches_proposed_total", "Pairings offered to players");
    describe_counter!("duel_matches_started_total", "Matches that went live");
    describe_counter!("duel_matches_completed_total", "Matches that reached an outcome");
    describe_counter!("duel_matches_cancelled_total", "Matches deleted before going live");
    describe_counter!("duel_accept_timeouts_total", "Proposals expired unanswered");
    describe_counter!("duel_matches_settled_total", "Matches that reached the terminal state");
    describe_counter!("duel_settlement_failures_total", "Settlements that ended in a failed payout");
    describe_counter!("duel_price_feed_errors_total", "Upstream price feed fetch failures");

    describe_counter!("duel_http_requests_total", "HTTP requests served, by route and status");
    describe_histogram!(
        "duel_http_request_duration_seconds",
        "HTTP request latency in seconds, by route"
    );

    Ok(handle)
}
