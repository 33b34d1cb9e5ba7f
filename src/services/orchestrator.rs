//! Match Orchestrator
//!
//! Drives every duel through its lifecycle:
//!
//! ```text
//!   JOIN_QUEUE -> WAITING --pair--> PROPOSED --both accept--> ACTIVE
//!        |                    |                                  |
//!        |              timeout/decline/                    round clock
//!        |               disconnect                             |
//!        +---> deleted <------+                            COMPLETED
//!                                                               |
//!                                                       settle grace
//!                                                               |
//!                                                  SETTLING -> SETTLED
//! ```
//!
//! Mutations run inside store entry locks and never await; every await
//! (price fetches, engine hooks, the settlement bridge) is followed by a
//! status re-check before the result is applied, so a match cancelled
//! mid-await is left alone. Deferred transitions go through the timer
//! registry and die with the match.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::Database;
use crate::models::matches::{GameType, Match, MatchStatus};
use crate::services::engine::engine_for;
use crate::services::match_store::MatchStore;
use crate::services::matchmaking::{MatchmakingQueue, QueueEntry};
use crate::services::oracle::PriceOracle;
use crate::services::registry::ConnectionRegistry;
use crate::services::settlement::SettlementBridge;
use crate::services::timers::{TimerKind, TimerRegistry};
use crate::websocket::ServerMessage;

enum AcceptOutcome {
    Rejected,
    Recorded,
    Ready(Match),
}

pub struct MatchOrchestrator {
    store: Arc<MatchStore>,
    queue: Arc<MatchmakingQueue>,
    registry: Arc<ConnectionRegistry>,
    timers: Arc<TimerRegistry>,
    oracle: Arc<PriceOracle>,
    settlement: Arc<SettlementBridge>,
    db: Option<Arc<Database>>,
    accept_timeout: Duration,
    settle_delay: Duration,
    default_duration_secs: u64,
}

impl MatchOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<MatchStore>,
        queue: Arc<MatchmakingQueue>,
        registry: Arc<ConnectionRegistry>,
        timers: Arc<TimerRegistry>,
        oracle: Arc<PriceOracle>,
        settlement: Arc<SettlementBridge>,
        db: Option<Arc<Database>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            timers,
            oracle,
            settlement,
            db,
            accept_timeout: Duration::from_secs(config.accept_timeout_secs),
            settle_delay: Duration::from_secs(config.settle_delay_secs),
            default_duration_secs: config.match_duration_secs,
        }
    }

    // ============ Identity ============

    /// Bind a wallet to a connection before it (re)enters the queue. A
    /// queue entry keyed by the old id is dropped first, the rename would
    /// orphan it; a player tied to a proposed or live match keeps their
    /// current id. Returns the id the caller should use from here on
    pub fn bind_wallet(&self, player_id: &str, wallet_address: &str) -> Result<String, String> {
        let wallet = wallet_address.to_lowercase();
        if player_id == wallet {
            return Ok(wallet);
        }

        self.leave_queue(player_id);
        if self.registry.match_of(player_id).is_some() {
            return Err("Cannot bind a wallet while in a match".to_string());
        }

        match self.registry.promote(player_id, &wallet) {
            Some(promoted) => {
                info!("✅ {} promoted to {}", player_id, promoted);
                Ok(promoted)
            }
            None => Ok(player_id.to_string()),
        }
    }

    // ============ Queue Entry ============

    /// Player asks for an opponent. Pairs immediately when someone with
    /// identical terms is waiting, otherwise opens a WAITING match and
    /// queues behind it
    pub fn join_queue(
        self: &Arc<Self>,
        player_id: &str,
        stake: Decimal,
        game_type: GameType,
        asset: &str,
        session_ref: Option<String>,
    ) {
        if self.queue.contains(player_id) {
            self.registry.send_to(
                player_id,
                ServerMessage::Error {
                    message: "Already in queue".to_string(),
                },
            );
            return;
        }
        if self.registry.match_of(player_id).is_some() {
            self.registry.send_to(
                player_id,
                ServerMessage::Error {
                    message: "Already in a match".to_string(),
                },
            );
            return;
        }

        if let Some(opponent) = self.queue.find_opponent(player_id, stake, game_type, asset) {
            if self.propose_match(opponent.match_id, player_id) {
                return;
            }
            // the waiting match vanished under its queue entry, fall
            // through and open a fresh one
            debug!("Stale queue entry for match {}", opponent.match_id);
        }

        let m = Match::new(player_id, stake, game_type, asset, self.default_duration_secs);
        let match_id = m.id;
        self.store.insert(m);
        self.registry.set_match(player_id, Some(match_id));

        let position = self.queue.add(QueueEntry {
            player_id: player_id.to_string(),
            stake,
            game_type,
            asset: asset.to_uppercase(),
            match_id,
            session_ref,
            queued_at: Utc::now(),
        });

        counter!("duel_queue_joins_total").increment(1);
        gauge!("duel_players_queued").set(self.queue.depth() as f64);
        self.registry
            .send_to(player_id, ServerMessage::QueueJoined { position });
        info!(
            "🎮 {} queued: {} on {} at stake {}",
            player_id, game_type, asset, stake
        );
    }

    /// Player backs out before being paired. Drops their WAITING match
    pub fn leave_queue(&self, player_id: &str) -> bool {
        let entry = match self.queue.remove_player(player_id) {
            Some(entry) => entry,
            None => return false,
        };
        self.store
            .remove_if(&entry.match_id, |m| m.status == MatchStatus::Waiting);
        self.registry.set_match(player_id, None);
        gauge!("duel_players_queued").set(self.queue.depth() as f64);
        info!("{} left the queue", player_id);
        true
    }

    // ============ Pairing ============

    /// Promote a WAITING match to PROPOSED with `joiner` as the second
    /// player and arm the acceptance window. False when the match is no
    /// longer open
    fn propose_match(self: &Arc<Self>, match_id: Uuid, joiner: &str) -> bool {
        let proposal = self
            .store
            .update(&match_id, |m| {
                if m.status != MatchStatus::Waiting || m.player_b.is_some() {
                    return None;
                }
                m.player_b = Some(joiner.to_string());
                m.status = MatchStatus::Proposed;
                m.accepted.clear();
                Some(m.clone())
            })
            .flatten();

        let m = match proposal {
            Some(m) => m,
            None => return false,
        };

        self.registry.set_match(joiner, Some(match_id));
        gauge!("duel_players_queued").set(self.queue.depth() as f64);

        let expires_at = Utc::now().timestamp_millis() + self.accept_timeout.as_millis() as i64;
        let offer = ServerMessage::MatchProposed {
            match_id,
            stake: m.stake,
            game_type: m.game_type,
            asset: m.asset.clone(),
            expires_at,
        };
        for player in m.players() {
            self.registry.send_to(&player, offer.clone());
        }

        let orch = Arc::clone(self);
        self.timers.schedule(
            match_id,
            TimerKind::AcceptTimeout,
            self.accept_timeout,
            move || async move {
                orch.handle_accept_timeout(match_id);
            },
        );

        counter!("duel_matches_proposed_total").increment(1);
        info!("Match {} proposed: {} vs {}", match_id, m.player_a, joiner);
        true
    }

    pub async fn accept_match(self: &Arc<Self>, match_id: Uuid, player_id: &str) {
        let outcome = self.store.update(&match_id, |m| {
            if m.status != MatchStatus::Proposed || !m.is_participant(player_id) {
                return AcceptOutcome::Rejected;
            }
            m.accepted.insert(player_id.to_string());
            if m.has_both_accepted() {
                AcceptOutcome::Ready(m.clone())
            } else {
                AcceptOutcome::Recorded
            }
        });

        match outcome {
            None | Some(AcceptOutcome::Rejected) => {
                debug!("Ignoring accept of {} from {}", match_id, player_id);
            }
            Some(AcceptOutcome::Recorded) => {
                debug!("{} accepted match {}", player_id, match_id);
            }
            Some(AcceptOutcome::Ready(m)) => {
                self.timers.cancel(match_id, TimerKind::AcceptTimeout);
                let found = ServerMessage::MatchFound {
                    match_state: m.clone(),
                };
                for player in m.players() {
                    self.registry.send_to(&player, found.clone());
                }
                self.start_match(match_id).await;
            }
        }
    }

    pub fn decline_match(&self, match_id: Uuid, player_id: &str) {
        let is_party = self
            .store
            .get(&match_id)
            .map(|m| m.status == MatchStatus::Proposed && m.is_participant(player_id))
            .unwrap_or(false);
        if !is_party {
            debug!("Ignoring decline of {} from {}", match_id, player_id);
            return;
        }
        self.cancel_match(match_id, "Match declined");
    }

    fn handle_accept_timeout(&self, match_id: Uuid) {
        if self.cancel_match(match_id, "Match not accepted in time") {
            counter!("duel_accept_timeouts_total").increment(1);
        }
    }

    /// Delete a match that never went live. Only WAITING and PROPOSED
    /// matches can die this way; anything later always runs forward
    fn cancel_match(&self, match_id: Uuid, reason: &str) -> bool {
        let removed = self
            .store
            .remove_if(&match_id, |m| m.status.is_cancellable());
        let m = match removed {
            Some(m) => m,
            None => return false,
        };

        self.timers.cancel_all_for(match_id);
        self.queue.remove_player(&m.player_a);
        for player in m.players() {
            self.registry.set_match(&player, None);
            self.registry.send_to(
                &player,
                ServerMessage::Error {
                    message: reason.to_string(),
                },
            );
        }

        gauge!("duel_players_queued").set(self.queue.depth() as f64);
        counter!("duel_matches_cancelled_total").increment(1);
        info!("Match {} cancelled: {}", match_id, reason);
        true
    }

    // ============ Live Round ============

    async fn start_match(self: &Arc<Self>, match_id: Uuid) {
        let snapshot = match self.store.get(&match_id) {
            Some(m) if m.status == MatchStatus::Proposed => m,
            _ => return,
        };

        let engine = engine_for(snapshot.game_type);
        let started = engine.on_start(&snapshot, &self.oracle).await;

        // the proposal may have been cancelled while the start price was
        // being fetched
        let live = self
            .store
            .update(&match_id, |m| {
                if m.status != MatchStatus::Proposed {
                    return None;
                }
                m.status = MatchStatus::Active;
                m.start_time = Some(Utc::now());
                m.start_price = started.start_price;
                m.match_data = started.match_data;
                m.accepted.clear();
                m.sync_mirrors();
                Some(m.clone())
            })
            .flatten();

        let m = match live {
            Some(m) => m,
            None => {
                debug!("Match {} vanished before start", match_id);
                return;
            }
        };

        let start = ServerMessage::StartMatch {
            match_id,
            start_time: m.start_time.map(|t| t.timestamp_millis()).unwrap_or_default(),
            start_price: m.start_price,
            match_state: m.clone(),
        };
        for player in m.players() {
            self.registry.send_to(&player, start.clone());
        }

        let orch = Arc::clone(self);
        self.timers.schedule(
            match_id,
            TimerKind::MatchDuration,
            Duration::from_secs(m.duration_secs),
            move || async move {
                orch.complete_match(match_id).await;
            },
        );

        counter!("duel_matches_started_total").increment(1);
        gauge!("duel_active_matches")
            .set(self.store.count_with_status(MatchStatus::Active) as f64);
        info!(
            "⚔️ Match {} live: {} vs {} ({} on {}, {}s)",
            match_id,
            m.player_a,
            m.player_b.as_deref().unwrap_or("?"),
            m.game_type,
            m.asset,
            m.duration_secs
        );
        self.persist_match(&m);
    }

    /// One in-round player input. Returns false when rejected for any
    /// reason; rejections are silent by design, clients learn the state
    /// from the next update they do land
    pub async fn handle_game_action(
        &self,
        match_id: Uuid,
        player_id: &str,
        action: &str,
        payload: &Value,
    ) -> bool {
        let snapshot = match self.store.get(&match_id) {
            Some(m) if m.status == MatchStatus::Active && m.is_participant(player_id) => m,
            _ => return false,
        };

        let engine = engine_for(snapshot.game_type);
        let price = if engine.wants_action_price() {
            Some(self.oracle.get_price(&snapshot.asset).await.price)
        } else {
            None
        };

        let updated = self
            .store
            .update(&match_id, |m| {
                // the round may have ended while the price was fetched
                if m.status != MatchStatus::Active {
                    return None;
                }
                if !engine.on_action(m, player_id, action, payload, price) {
                    return None;
                }
                m.sync_mirrors();
                Some(m.clone())
            })
            .flatten();

        let m = match updated {
            Some(m) => m,
            None => return false,
        };

        let update = ServerMessage::GameStateUpdate {
            match_id,
            state: m.match_data.clone(),
            predictions: m.predictions.clone(),
            start_price: m.start_price,
            current_price: price.or_else(|| self.oracle.last_price(&m.asset)),
        };
        for player in m.players() {
            self.registry.send_to(&player, update.clone());
        }
        true
    }

    // ============ Completion and Settlement ============

    async fn complete_match(self: &Arc<Self>, match_id: Uuid) {
        let snapshot = match self.store.get(&match_id) {
            Some(m) if m.status == MatchStatus::Active => m,
            _ => return,
        };

        let engine = engine_for(snapshot.game_type);
        let resolution = engine.on_complete(&snapshot, &self.oracle).await;

        let completed = self
            .store
            .update(&match_id, |m| {
                if m.status != MatchStatus::Active {
                    return None;
                }
                m.status = MatchStatus::Completed;
                m.end_time = Some(Utc::now());
                m.end_price = resolution.end_price;
                m.winner = resolution.winner.clone();
                m.match_data = resolution.match_data;
                m.sync_mirrors();
                Some(m.clone())
            })
            .flatten();

        let m = match completed {
            Some(m) => m,
            None => return,
        };

        let result = ServerMessage::MatchResult {
            match_state: m.clone(),
        };
        for player in m.players() {
            self.registry.send_to(&player, result.clone());
        }

        counter!("duel_matches_completed_total").increment(1);
        gauge!("duel_active_matches")
            .set(self.store.count_with_status(MatchStatus::Active) as f64);
        info!(
            "🏁 Match {} complete: winner={}",
            match_id,
            m.winner.as_deref().unwrap_or("draw")
        );
        self.persist_match(&m);

        let orch = Arc::clone(self);
        self.timers.schedule(
            match_id,
            TimerKind::SettleDelay,
            self.settle_delay,
            move || async move {
                orch.settle_match(match_id).await;
            },
        );
    }

    /// Payout. COMPLETED -> SETTLING -> SETTLED, unconditionally: the
    /// bridge encodes failure in the result instead of raising
    async fn settle_match(&self, match_id: Uuid) {
        let snapshot = self
            .store
            .update(&match_id, |m| {
                if m.status != MatchStatus::Completed {
                    return None;
                }
                m.status = MatchStatus::Settling;
                m.settlement = Some(self.settlement.preview(m));
                Some(m.clone())
            })
            .flatten();

        let m = match snapshot {
            Some(m) => m,
            None => return,
        };

        let started = ServerMessage::SettlementStarted { match_id };
        for player in m.players() {
            self.registry.send_to(&player, started.clone());
        }

        let settlement = self.settlement.settle(&m).await;

        let settled = self.store.update(&match_id, |m| {
            m.status = MatchStatus::Settled;
            m.settlement = Some(settlement.clone());
            m.clone()
        });
        let m = match settled {
            Some(m) => m,
            None => return,
        };

        if settlement.status.is_failed() {
            counter!("duel_settlement_failures_total").increment(1);
            let failed = ServerMessage::SettlementFailed {
                match_id,
                error: settlement
                    .error
                    .clone()
                    .unwrap_or_else(|| "Settlement failed".to_string()),
            };
            for player in m.players() {
                self.registry.send_to(&player, failed.clone());
            }
        } else {
            let complete = ServerMessage::SettlementComplete {
                match_state: m.clone(),
                settlement: settlement.clone(),
            };
            for player in m.players() {
                self.registry.send_to(&player, complete.clone());
            }
        }

        for player in m.players() {
            self.registry.set_match(&player, None);
        }

        counter!("duel_matches_settled_total").increment(1);
        info!(
            "💰 Match {} settled: {}{}",
            match_id,
            settlement.status,
            if settlement.simulated { " (simulated)" } else { "" }
        );
        self.persist_match(&m);
        self.persist_player_results(&m);
    }

    // ============ Disconnects ============

    /// A socket died. Queue entries and pre-game matches are dropped;
    /// live matches run to their clock so a flaky connection cannot void
    /// a round that is already being played
    pub fn handle_disconnect(&self, player_id: &str) {
        if let Some(entry) = self.queue.remove_player(player_id) {
            self.store
                .remove_if(&entry.match_id, |m| m.status == MatchStatus::Waiting);
            gauge!("duel_players_queued").set(self.queue.depth() as f64);
            debug!("{} dropped from queue on disconnect", player_id);
        }

        if let Some(match_id) = self.registry.match_of(player_id) {
            let cancellable = self
                .store
                .get(&match_id)
                .map(|m| m.status.is_cancellable())
                .unwrap_or(false);
            if cancellable {
                self.cancel_match(match_id, "Opponent disconnected");
            }
        }
    }

    // ============ Persistence ============

    fn persist_match(&self, m: &Match) {
        let db = match &self.db {
            Some(db) => Arc::clone(db),
            None => return,
        };
        let m = m.clone();
        tokio::spawn(async move {
            if let Err(e) = db.record_match(&m).await {
                error!("Failed to persist match {}: {}", m.id, e);
            }
        });
    }

    fn persist_player_results(&self, m: &Match) {
        let db = match &self.db {
            Some(db) => Arc::clone(db),
            None => return,
        };
        let m = m.clone();
        tokio::spawn(async move {
            if let Err(e) = db.record_player_results(&m).await {
                error!("Failed to persist results of match {}: {}", m.id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::oracle::{PriceFeed, PriceFeedError};
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct TestFeed {
        price: RwLock<Decimal>,
    }

    impl TestFeed {
        fn at(price: Decimal) -> Arc<Self> {
            Arc::new(Self {
                price: RwLock::new(price),
            })
        }

        fn set(&self, price: Decimal) {
            *self.price.write() = price;
        }
    }

    #[async_trait]
    impl PriceFeed for TestFeed {
        async fn fetch(&self, _asset: &str) -> Result<Decimal, PriceFeedError> {
            Ok(*self.price.read())
        }
    }

    struct Harness {
        orchestrator: Arc<MatchOrchestrator>,
        registry: Arc<ConnectionRegistry>,
        store: Arc<MatchStore>,
        queue: Arc<MatchmakingQueue>,
        feed: Arc<TestFeed>,
    }

    fn harness() -> Harness {
        let mut config: AppConfig = serde_json::from_value(json!({})).unwrap();
        config.accept_timeout_secs = 10;
        config.match_duration_secs = 60;
        config.settle_delay_secs = 3;
        // cache window zero: every quote is a real fetch in tests
        config.price_cache_ms = 0;

        let store = Arc::new(MatchStore::new());
        let queue = Arc::new(MatchmakingQueue::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let timers = Arc::new(TimerRegistry::new());
        let feed = TestFeed::at(dec!(3200));
        let oracle = Arc::new(PriceOracle::new(feed.clone(), config.price_cache_ms));
        let settlement = Arc::new(SettlementBridge::new(None, 250, "https://arbiscan.io", 6));

        let orchestrator = Arc::new(MatchOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&registry),
            timers,
            oracle,
            settlement,
            None,
            &config,
        ));

        Harness {
            orchestrator,
            registry,
            store,
            queue,
            feed,
        }
    }

    fn connect(h: &Harness, player: &str) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        h.registry.register(player, tx);
        rx
    }

    /// Drain queued messages until one matches, panicking after a bound
    /// so a missing message fails instead of hanging
    async fn recv_until<F>(rx: &mut mpsc::UnboundedReceiver<ServerMessage>, pred: F) -> ServerMessage
    where
        F: Fn(&ServerMessage) -> bool,
    {
        for _ in 0..16 {
            let msg = rx.recv().await.expect("channel closed");
            if pred(&msg) {
                return msg;
            }
        }
        panic!("expected message never arrived");
    }

    fn pair_players(h: &Harness) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>, mpsc::UnboundedReceiver<ServerMessage>) {
        let rx_a = connect(h, "alice");
        let rx_b = connect(h, "bob");
        h.orchestrator
            .join_queue("alice", dec!(10), GameType::Prediction, "ETH/USD", None);
        h.orchestrator
            .join_queue("bob", dec!(10), GameType::Prediction, "ETH/USD", None);
        let match_id = h.registry.match_of("alice").expect("alice not paired");
        (match_id, rx_a, rx_b)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_promotes_waiting_match() {
        let h = harness();
        let (match_id, mut rx_a, mut rx_b) = pair_players(&h);

        let queued = recv_until(&mut rx_a, |m| matches!(m, ServerMessage::QueueJoined { .. })).await;
        match queued {
            ServerMessage::QueueJoined { position } => assert_eq!(position, 1),
            _ => unreachable!(),
        }
        recv_until(&mut rx_a, |m| matches!(m, ServerMessage::MatchProposed { .. })).await;
        recv_until(&mut rx_b, |m| matches!(m, ServerMessage::MatchProposed { .. })).await;

        let m = h.store.get(&match_id).unwrap();
        assert_eq!(m.status, MatchStatus::Proposed);
        assert_eq!(m.player_b.as_deref(), Some("bob"));
        assert_eq!(h.queue.depth(), 0);
        assert_eq!(h.registry.match_of("bob"), Some(match_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_accepts_start_the_round() {
        let h = harness();
        let (match_id, mut rx_a, mut rx_b) = pair_players(&h);

        h.orchestrator.accept_match(match_id, "alice").await;
        assert_eq!(h.store.get(&match_id).unwrap().status, MatchStatus::Proposed);

        h.orchestrator.accept_match(match_id, "bob").await;

        recv_until(&mut rx_a, |m| matches!(m, ServerMessage::MatchFound { .. })).await;
        let start = recv_until(&mut rx_b, |m| matches!(m, ServerMessage::StartMatch { .. })).await;
        match start {
            ServerMessage::StartMatch { start_price, .. } => {
                assert_eq!(start_price, Some(dec!(3200)));
            }
            _ => unreachable!(),
        }
        assert_eq!(h.store.get(&match_id).unwrap().status, MatchStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_proposal_times_out() {
        let h = harness();
        let (match_id, mut rx_a, _rx_b) = pair_players(&h);

        tokio::time::sleep(Duration::from_secs(11)).await;

        let err = recv_until(&mut rx_a, |m| matches!(m, ServerMessage::Error { .. })).await;
        match err {
            ServerMessage::Error { message } => assert!(message.contains("not accepted")),
            _ => unreachable!(),
        }
        assert!(h.store.get(&match_id).is_none());
        assert_eq!(h.registry.match_of("alice"), None);
        assert_eq!(h.registry.match_of("bob"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decline_deletes_proposal() {
        let h = harness();
        let (match_id, mut rx_a, _rx_b) = pair_players(&h);

        h.orchestrator.decline_match(match_id, "bob");

        let err = recv_until(&mut rx_a, |m| matches!(m, ServerMessage::Error { .. })).await;
        match err {
            ServerMessage::Error { message } => assert!(message.contains("declined")),
            _ => unreachable!(),
        }
        assert!(h.store.get(&match_id).is_none());

        // an accept arriving after the decline is ignored
        h.orchestrator.accept_match(match_id, "alice").await;
        assert!(h.store.get(&match_id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_drops_waiting_match() {
        let h = harness();
        let _rx = connect(&h, "alice");
        h.orchestrator
            .join_queue("alice", dec!(10), GameType::Prediction, "ETH/USD", None);
        assert_eq!(h.queue.depth(), 1);

        h.orchestrator.handle_disconnect("alice");
        assert_eq!(h.queue.depth(), 0);
        assert!(h.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_does_not_void_live_round() {
        let h = harness();
        let (match_id, _rx_a, _rx_b) = pair_players(&h);
        h.orchestrator.accept_match(match_id, "alice").await;
        h.orchestrator.accept_match(match_id, "bob").await;
        assert_eq!(h.store.get(&match_id).unwrap().status, MatchStatus::Active);

        h.orchestrator.handle_disconnect("bob");
        assert_eq!(h.store.get(&match_id).unwrap().status, MatchStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_terms_do_not_pair() {
        let h = harness();
        let _rx_a = connect(&h, "alice");
        let _rx_b = connect(&h, "bob");

        h.orchestrator
            .join_queue("alice", dec!(10), GameType::Prediction, "ETH/USD", None);
        h.orchestrator
            .join_queue("bob", dec!(25), GameType::Prediction, "ETH/USD", None);

        assert_eq!(h.queue.depth(), 2);
        assert_eq!(h.store.count_with_status(MatchStatus::Waiting), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_prediction_round_to_settlement() {
        let h = harness();
        let (match_id, mut rx_a, _rx_b) = pair_players(&h);
        h.orchestrator.accept_match(match_id, "alice").await;
        h.orchestrator.accept_match(match_id, "bob").await;

        let applied = h
            .orchestrator
            .handle_game_action(match_id, "alice", "PREDICT", &json!({ "direction": "UP" }))
            .await;
        assert!(applied);
        recv_until(&mut rx_a, |m| matches!(m, ServerMessage::GameStateUpdate { .. })).await;

        // price rises before the clock runs out
        h.feed.set(dec!(3300));
        tokio::time::sleep(Duration::from_secs(61 + 4)).await;

        let result = recv_until(&mut rx_a, |m| matches!(m, ServerMessage::MatchResult { .. })).await;
        match result {
            ServerMessage::MatchResult { match_state } => {
                assert_eq!(match_state.winner.as_deref(), Some("alice"));
                assert_eq!(match_state.end_price, Some(dec!(3300)));
            }
            _ => unreachable!(),
        }

        recv_until(&mut rx_a, |m| matches!(m, ServerMessage::SettlementStarted { .. })).await;
        // no ledger configured: failure arrives as a simulated settlement
        recv_until(&mut rx_a, |m| matches!(m, ServerMessage::SettlementFailed { .. })).await;

        let settled = h.store.get(&match_id).unwrap();
        assert_eq!(settled.status, MatchStatus::Settled);
        let info = settled.settlement.unwrap();
        assert!(info.simulated);
        assert_eq!(info.gross, dec!(20));
        assert_eq!(h.registry.match_of("alice"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoining_while_queued_is_rejected() {
        let h = harness();
        let mut rx = connect(&h, "alice");
        h.orchestrator
            .join_queue("alice", dec!(10), GameType::Prediction, "ETH/USD", None);
        h.orchestrator
            .join_queue("alice", dec!(10), GameType::Prediction, "ETH/USD", None);

        recv_until(&mut rx, |m| matches!(m, ServerMessage::QueueJoined { .. })).await;
        let err = recv_until(&mut rx, |m| matches!(m, ServerMessage::Error { .. })).await;
        match err {
            ServerMessage::Error { message } => assert!(message.contains("Already in queue")),
            _ => unreachable!(),
        }
        assert_eq!(h.queue.depth(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wallet_bind_requeues_cleanly() {
        let h = harness();
        let _rx = connect(&h, "anon-11112222");
        h.orchestrator
            .join_queue("anon-11112222", dec!(10), GameType::Prediction, "ETH/USD", None);
        assert_eq!(h.queue.depth(), 1);

        let wallet = "0xAbC1111111111111111111111111111111111111";
        let bound = h.orchestrator.bind_wallet("anon-11112222", wallet).unwrap();
        assert_eq!(bound, wallet.to_lowercase());

        // nothing stays keyed by the anonymous id: the old queue entry
        // and its waiting match are gone, not matchable, not leaveable
        assert_eq!(h.queue.depth(), 0);
        assert!(!h.queue.contains("anon-11112222"));
        assert!(h.store.is_empty());
        assert_eq!(h.registry.match_of(&bound), None);

        // the bound id queues and leaves like any other
        h.orchestrator
            .join_queue(&bound, dec!(10), GameType::Prediction, "ETH/USD", None);
        assert_eq!(h.queue.depth(), 1);
        assert!(h.orchestrator.leave_queue(&bound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wallet_bind_refused_during_match() {
        let h = harness();
        let (match_id, _rx_a, _rx_b) = pair_players(&h);
        h.orchestrator.accept_match(match_id, "alice").await;
        h.orchestrator.accept_match(match_id, "bob").await;

        let result = h
            .orchestrator
            .bind_wallet("bob", "0x2222222222222222222222222222222222222222");
        assert!(result.is_err());
        // the live match still reaches bob under his original id
        assert!(h.registry.contains("bob"));
        assert_eq!(h.registry.match_of("bob"), Some(match_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_rejected_outside_active_round() {
        let h = harness();
        let (match_id, _rx_a, _rx_b) = pair_players(&h);

        // still proposed
        let applied = h
            .orchestrator
            .handle_game_action(match_id, "alice", "PREDICT", &json!({ "direction": "UP" }))
            .await;
        assert!(!applied);

        h.orchestrator.accept_match(match_id, "alice").await;
        h.orchestrator.accept_match(match_id, "bob").await;

        // outsider
        let applied = h
            .orchestrator
            .handle_game_action(match_id, "mallory", "PREDICT", &json!({ "direction": "UP" }))
            .await;
        assert!(!applied);
    }
}
