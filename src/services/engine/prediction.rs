//! Prediction Duel
//!
//! Each player calls the price direction once (resubmitting overwrites).
//! At round end the actual move decides it:
//!
//! - price unchanged                     -> draw, whoever called what
//! - both called, one correct            -> that player wins
//! - both called the same, or both wrong -> draw
//! - only one player called at all       -> that player wins by default
//! - nobody called                       -> draw

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::models::matches::{Direction, Match, MatchData, PredictionState};
use crate::services::engine::{EngineResolution, EngineStart, GameEngine};
use crate::services::oracle::PriceOracle;

const ACTION_PREDICT: &str = "PREDICT";

pub struct PredictionEngine;

#[async_trait]
impl GameEngine for PredictionEngine {
    fn name(&self) -> &'static str {
        "prediction"
    }

    async fn on_start(&self, m: &Match, oracle: &PriceOracle) -> EngineStart {
        let quote = oracle.get_price(&m.asset).await;
        EngineStart {
            match_data: MatchData::Prediction(PredictionState::default()),
            start_price: Some(quote.price),
        }
    }

    fn on_action(
        &self,
        m: &mut Match,
        player_id: &str,
        action: &str,
        payload: &Value,
        _price: Option<Decimal>,
    ) -> bool {
        if action != ACTION_PREDICT {
            return false;
        }
        let direction = match payload
            .get("direction")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Direction>().ok())
        {
            Some(d) => d,
            None => return false,
        };
        match &mut m.match_data {
            MatchData::Prediction(state) => {
                state.calls.insert(player_id.to_string(), direction);
                true
            }
            _ => false,
        }
    }

    async fn on_complete(&self, m: &Match, oracle: &PriceOracle) -> EngineResolution {
        let end_price = oracle.get_fresh_price(&m.asset).await.price;
        EngineResolution {
            winner: resolve_winner(m, end_price),
            end_price: Some(end_price),
            match_data: m.match_data.clone(),
        }
    }
}

fn resolve_winner(m: &Match, end_price: Decimal) -> Option<String> {
    let start_price = m.start_price?;
    let player_b = m.player_b.as_deref()?;
    let state = match &m.match_data {
        MatchData::Prediction(state) => state,
        _ => return None,
    };

    // an unchanged price has no direction and yields a draw no matter
    // who called; the lone-call default only applies after this gate
    let actual = if end_price > start_price {
        Direction::Up
    } else if end_price < start_price {
        Direction::Down
    } else {
        return None;
    };

    let call_a = state.calls.get(&m.player_a).copied();
    let call_b = state.calls.get(player_b).copied();

    match (call_a, call_b) {
        (None, None) => None,
        // a lone call wins by default
        (Some(_), None) => Some(m.player_a.clone()),
        (None, Some(_)) => Some(player_b.to_string()),
        (Some(a), Some(b)) => match (a == actual, b == actual) {
            (true, false) => Some(m.player_a.clone()),
            (false, true) => Some(player_b.to_string()),
            _ => None,
        },
    }
}
