//! Game Engine Strategies
//!
//! Each game variant implements the same lifecycle behind `GameEngine`:
//!
//! ```text
//!   on_start   -> initial game state when the round goes live
//!   on_action  -> apply one player input, synchronous and in-place
//!   on_complete-> decide the winner when the round clock expires
//! ```
//!
//! The orchestrator owns all locking and status checks. Engines only read
//! and write the game payload they are handed, which keeps `on_action`
//! free of awaits; price-based engines declare the need up front and the
//! orchestrator resolves the quote before taking the entry lock.

pub mod memory;
pub mod prediction;
pub mod trade_duel;

pub use memory::MemoryEngine;
pub use prediction::PredictionEngine;
pub use trade_duel::TradeDuelEngine;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::models::matches::{GameType, Match, MatchData};
use crate::services::oracle::PriceOracle;

/// Initial payload produced when a match goes live
pub struct EngineStart {
    pub match_data: MatchData,
    /// Anchor price for price-based variants
    pub start_price: Option<Decimal>,
}

/// Final outcome produced when the round clock expires
pub struct EngineResolution {
    /// None on a draw
    pub winner: Option<String>,
    pub end_price: Option<Decimal>,
    pub match_data: MatchData,
}

#[async_trait]
pub trait GameEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `on_action` needs a current price resolved before the call
    fn wants_action_price(&self) -> bool {
        false
    }

    /// Build the initial game state. The match is still PROPOSED here;
    /// the caller applies the result under the entry lock
    async fn on_start(&self, m: &Match, oracle: &PriceOracle) -> EngineStart;

    /// Apply one player input. Runs under the store entry lock, must not
    /// block. Returns false when the input is rejected
    fn on_action(
        &self,
        m: &mut Match,
        player_id: &str,
        action: &str,
        payload: &Value,
        price: Option<Decimal>,
    ) -> bool;

    /// Periodic mid-round refresh of the game state. No current variant
    /// advances state between actions, so the default is a no-op
    fn on_update(&self, _m: &Match) -> Option<MatchData> {
        None
    }

    /// Decide the outcome at round end
    async fn on_complete(&self, m: &Match, oracle: &PriceOracle) -> EngineResolution;
}

/// Engine for a game variant. Engines are stateless, all game state lives
/// on the match record
pub fn engine_for(game_type: GameType) -> &'static dyn GameEngine {
    match game_type {
        GameType::Prediction => &PredictionEngine,
        GameType::TradeDuel => &TradeDuelEngine,
        GameType::MemoryMatch => &MemoryEngine,
    }
}
