//! WebSocket Handler
//!
//! One socket per player. Inbound frames are parsed into [`ClientMessage`]
//! and dispatched to the orchestrator; everything the server pushes back
//! travels through the connection registry, so the orchestrator can reach
//! this socket long after the handler stack frame that created it is gone.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::matches::{Direction, GameType, Match, MatchData, SettlementInfo};
use crate::models::player::is_wallet_address;
use crate::AppState;

/// Identity handed to a socket before it proves a wallet
fn anon_player_id() -> String {
    let tail = Uuid::new_v4().simple().to_string();
    format!("anon-{}", &tail[..8])
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Enter the matchmaking queue. A wallet address, when present,
    /// promotes the anonymous connection before the queue is touched
    JoinQueue {
        stake: Decimal,
        game_type: GameType,
        asset: String,
        #[serde(default)]
        wallet_address: Option<String>,
        #[serde(default)]
        session_ref: Option<String>,
    },
    LeaveQueue,
    AcceptMatch {
        match_id: Uuid,
    },
    DeclineMatch {
        match_id: Uuid,
    },
    /// Raw in-round input, interpreted by the game engine
    GameAction {
        match_id: Uuid,
        action: String,
        #[serde(default)]
        payload: Value,
    },
    /// Convenience form of GAME_ACTION for prediction duels
    SubmitPrediction {
        match_id: Uuid,
        prediction: Direction,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Connected {
        player_id: String,
    },
    QueueJoined {
        position: usize,
    },
    MatchProposed {
        match_id: Uuid,
        stake: Decimal,
        game_type: GameType,
        asset: String,
        /// Unix millis after which the proposal lapses
        expires_at: i64,
    },
    MatchFound {
        #[serde(rename = "match")]
        match_state: Match,
    },
    StartMatch {
        match_id: Uuid,
        /// Unix millis of the round start
        start_time: i64,
        start_price: Option<Decimal>,
        #[serde(rename = "match")]
        match_state: Match,
    },
    GameStateUpdate {
        match_id: Uuid,
        state: MatchData,
        predictions: HashMap<String, Direction>,
        start_price: Option<Decimal>,
        current_price: Option<Decimal>,
    },
    PredictionReceived {
        match_id: Uuid,
        prediction: Direction,
    },
    MatchResult {
        #[serde(rename = "match")]
        match_state: Match,
    },
    SettlementStarted {
        match_id: Uuid,
    },
    SettlementComplete {
        #[serde(rename = "match")]
        match_state: Match,
        settlement: SettlementInfo,
    },
    SettlementFailed {
        match_id: Uuid,
        error: String,
    },
    Error {
        message: String,
    },
    Pong,
}

pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut player_id = anon_player_id();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.registry.register(&player_id, tx);

    tracing::info!("🔌 WebSocket connected: {}", player_id);
    state.registry.send_to(
        &player_id,
        ServerMessage::Connected {
            player_id: player_id.clone(),
        },
    );

    loop {
        tokio::select! {
            // Client frames
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(response) = handle_client_message(&text, &mut player_id, &state).await {
                            state.registry.send_to(&player_id, response);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        // browsers rarely bother with a closing handshake
                        tracing::warn!("WebSocket disconnected: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Server pushes routed through the registry
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => match serde_json::to_string(&msg) {
                        Ok(text) => {
                            let _ = sender.send(Message::Text(text)).await;
                        }
                        Err(e) => {
                            tracing::warn!("Dropping outbound frame for {}: {}", player_id, e);
                        }
                    },
                    // Registry entry was replaced or pruned out from under us
                    None => {
                        break;
                    }
                }
            }
        }
    }

    state.orchestrator.handle_disconnect(&player_id);
    state.registry.remove(&player_id);
    tracing::info!("WebSocket closed: {}", player_id);
}

async fn handle_client_message(
    text: &str,
    player_id: &mut String,
    state: &Arc<AppState>,
) -> Result<(), ServerMessage> {
    let client_msg: ClientMessage = serde_json::from_str(text).map_err(|e| ServerMessage::Error {
        message: format!("Failed to parse message: {}", e),
    })?;

    match client_msg {
        ClientMessage::JoinQueue {
            stake,
            game_type,
            asset,
            wallet_address,
            session_ref,
        } => {
            if let Some(wallet) = wallet_address {
                if !is_wallet_address(&wallet) {
                    return Err(ServerMessage::Error {
                        message: "Invalid wallet address".to_string(),
                    });
                }
                match state.orchestrator.bind_wallet(player_id, &wallet) {
                    Ok(bound) => *player_id = bound,
                    Err(message) => return Err(ServerMessage::Error { message }),
                }
            }

            if !state.config.is_valid_stake(stake) {
                return Err(ServerMessage::Error {
                    message: "Unsupported stake tier".to_string(),
                });
            }
            if !state.config.is_supported_asset(&asset) {
                return Err(ServerMessage::Error {
                    message: "Unsupported asset".to_string(),
                });
            }

            state.registry.set_session_ref(player_id, session_ref.clone());
            state
                .orchestrator
                .join_queue(player_id, stake, game_type, &asset, session_ref);
        }

        ClientMessage::LeaveQueue => {
            state.orchestrator.leave_queue(player_id);
        }

        ClientMessage::AcceptMatch { match_id } => {
            state.orchestrator.accept_match(match_id, player_id).await;
        }

        ClientMessage::DeclineMatch { match_id } => {
            state.orchestrator.decline_match(match_id, player_id);
        }

        ClientMessage::GameAction {
            match_id,
            action,
            payload,
        } => {
            state
                .orchestrator
                .handle_game_action(match_id, player_id, &action, &payload)
                .await;
        }

        ClientMessage::SubmitPrediction {
            match_id,
            prediction,
        } => {
            let payload = serde_json::json!({ "direction": prediction });
            let applied = state
                .orchestrator
                .handle_game_action(match_id, player_id, "PREDICT", &payload)
                .await;
            if applied {
                state.registry.send_to(
                    player_id,
                    ServerMessage::PredictionReceived {
                        match_id,
                        prediction,
                    },
                );
            }
        }

        ClientMessage::Ping => {
            state.registry.send_to(player_id, ServerMessage::Pong);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_anon_ids_are_prefixed_and_unique() {
        let a = anon_player_id();
        let b = anon_player_id();
        assert!(a.starts_with("anon-"));
        assert_eq!(a.len(), "anon-".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_join_queue_parses_with_defaults() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"JOIN_QUEUE","stake":"10","game_type":"prediction","asset":"ETH/USD"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::JoinQueue {
                stake,
                game_type,
                asset,
                wallet_address,
                session_ref,
            } => {
                assert_eq!(stake, dec!(10));
                assert_eq!(game_type, GameType::Prediction);
                assert_eq!(asset, "ETH/USD");
                assert!(wallet_address.is_none());
                assert!(session_ref.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_submit_prediction_parses_direction() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"SUBMIT_PREDICTION","match_id":"{}","prediction":"DOWN"}}"#,
            id
        );
        let msg: ClientMessage = serde_json::from_str(&raw).unwrap();
        match msg {
            ClientMessage::SubmitPrediction {
                match_id,
                prediction,
            } => {
                assert_eq!(match_id, id);
                assert_eq!(prediction, Direction::Down);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_game_action_payload_defaults_to_null() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"GAME_ACTION","match_id":"{}","action":"FLIP"}}"#,
            id
        );
        let msg: ClientMessage = serde_json::from_str(&raw).unwrap();
        match msg {
            ClientMessage::GameAction { payload, .. } => assert!(payload.is_null()),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_match_found_uses_match_key() {
        let m = Match::new("alice", dec!(5), GameType::Prediction, "BTC/USD", 60);
        let msg = ServerMessage::MatchFound {
            match_state: m.clone(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "MATCH_FOUND");
        assert_eq!(json["match"]["player_a"], "alice");
        assert_eq!(json["match"]["status"], "waiting");
        // the accept set never crosses the wire
        assert!(json["match"].get("accepted").is_none());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let parsed: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"SELF_DESTRUCT"}"#);
        assert!(parsed.is_err());
    }
}
