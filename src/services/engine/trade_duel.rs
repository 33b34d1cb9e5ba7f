//! Trade Duel
//!
//! Both players trade a simulated cash balance against the live price.
//! BUY opens a long, SELL opens a short, and either order first closes
//! any open position at the current price. Positions always commit the
//! player's entire balance. At round end open positions are force-closed
//! at a fresh price and the higher profit wins; if neither player ends
//! above the starting balance the match is a draw, even when one lost
//! less than the other.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::models::matches::{Match, MatchData, Position, PositionSide, TradeDuelState};
use crate::services::engine::{EngineResolution, EngineStart, GameEngine};
use crate::services::oracle::PriceOracle;

const ACTION_BUY: &str = "BUY";
const ACTION_SELL: &str = "SELL";

/// Simulated cash both players start the round with
pub const STARTING_BALANCE: u64 = 10_000;

pub struct TradeDuelEngine;

#[async_trait]
impl GameEngine for TradeDuelEngine {
    fn name(&self) -> &'static str {
        "trade_duel"
    }

    fn wants_action_price(&self) -> bool {
        true
    }

    async fn on_start(&self, m: &Match, oracle: &PriceOracle) -> EngineStart {
        let quote = oracle.get_price(&m.asset).await;
        let initial = Decimal::from(STARTING_BALANCE);

        let mut state = TradeDuelState {
            initial_balance: initial,
            ..TradeDuelState::default()
        };
        for player in m.players() {
            state.balances.insert(player, initial);
        }

        EngineStart {
            match_data: MatchData::TradeDuel(state),
            start_price: Some(quote.price),
        }
    }

    fn on_action(
        &self,
        m: &mut Match,
        player_id: &str,
        action: &str,
        _payload: &Value,
        price: Option<Decimal>,
    ) -> bool {
        let side = match action {
            ACTION_BUY => PositionSide::Long,
            ACTION_SELL => PositionSide::Short,
            _ => return false,
        };
        let price = match price.filter(|p| *p > Decimal::ZERO) {
            Some(p) => p,
            None => return false,
        };
        let state = match &mut m.match_data {
            MatchData::TradeDuel(state) => state,
            _ => return false,
        };
        if !state.balances.contains_key(player_id) {
            return false;
        }

        close_position(state, player_id, price);

        let balance = state.balances.get(player_id).copied().unwrap_or_default();
        if balance <= Decimal::ZERO {
            // busted, nothing left to commit
            return false;
        }

        state.positions.insert(
            player_id.to_string(),
            Position {
                side,
                size: balance / price,
                entry_price: price,
                margin: balance,
            },
        );
        state.balances.insert(player_id.to_string(), Decimal::ZERO);
        true
    }

    async fn on_complete(&self, m: &Match, oracle: &PriceOracle) -> EngineResolution {
        let end_price = oracle.get_fresh_price(&m.asset).await.price;

        let mut state = match &m.match_data {
            MatchData::TradeDuel(state) => state.clone(),
            other => {
                return EngineResolution {
                    winner: None,
                    end_price: Some(end_price),
                    match_data: other.clone(),
                }
            }
        };

        for player in m.players() {
            close_position(&mut state, &player, end_price);
        }

        EngineResolution {
            winner: resolve_winner(&state, m),
            end_price: Some(end_price),
            match_data: MatchData::TradeDuel(state),
        }
    }
}

/// Realize any open position into the player's cash balance
fn close_position(state: &mut TradeDuelState, player_id: &str, price: Decimal) {
    if let Some(pos) = state.positions.remove(player_id) {
        let proceeds = pos.margin + pos.pnl_at(price);
        let balance = state.balances.entry(player_id.to_string()).or_default();
        *balance += proceeds;
    }
}

/// Higher profit wins; no profit anywhere is a draw. Assumes all
/// positions are already closed
fn resolve_winner(state: &TradeDuelState, m: &Match) -> Option<String> {
    let player_b = m.player_b.as_deref()?;
    let profit = |player: &str| -> Decimal {
        state.balances.get(player).copied().unwrap_or_default() - state.initial_balance
    };

    let profit_a = profit(&m.player_a);
    let profit_b = profit(player_b);

    if profit_a <= Decimal::ZERO && profit_b <= Decimal::ZERO {
        return None;
    }
    if profit_a > profit_b {
        Some(m.player_a.clone())
    } else if profit_b > profit_a {
        Some(player_b.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matches::GameType;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn live_state() -> (Match, TradeDuelState) {
        let mut m = Match::new("alice", dec!(10), GameType::TradeDuel, "ETH/USD", 60);
        m.player_b = Some("bob".to_string());
        m.start_price = Some(dec!(100));

        let mut state = TradeDuelState {
            initial_balance: Decimal::from(STARTING_BALANCE),
            ..TradeDuelState::default()
        };
        state.balances.insert("alice".to_string(), Decimal::from(STARTING_BALANCE));
        state.balances.insert("bob".to_string(), Decimal::from(STARTING_BALANCE));
        m.match_data = MatchData::TradeDuel(state.clone());
        (m, state)
    }

    fn act(m: &mut Match, player: &str, action: &str, price: Decimal) -> bool {
        TradeDuelEngine.on_action(m, player, action, &json!({}), Some(price))
    }

    fn state_of(m: &Match) -> &TradeDuelState {
        match &m.match_data {
            MatchData::TradeDuel(state) => state,
            _ => panic!("wrong game payload"),
        }
    }

    #[test]
    fn test_buy_commits_full_balance() {
        let (mut m, _) = live_state();
        assert!(act(&mut m, "alice", ACTION_BUY, dec!(100)));

        let state = state_of(&m);
        let pos = state.positions.get("alice").unwrap();
        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.size, dec!(100)); // 10_000 / 100
        assert_eq!(pos.margin, dec!(10000));
        assert_eq!(state.balances["alice"], Decimal::ZERO);
    }

    #[test]
    fn test_flip_closes_then_reopens() {
        let (mut m, _) = live_state();
        assert!(act(&mut m, "alice", ACTION_BUY, dec!(100)));
        // price moved up, flipping realizes the long's gain
        assert!(act(&mut m, "alice", ACTION_SELL, dec!(110)));

        let state = state_of(&m);
        let pos = state.positions.get("alice").unwrap();
        assert_eq!(pos.side, PositionSide::Short);
        assert_eq!(pos.margin, dec!(11000));
        assert_eq!(pos.entry_price, dec!(110));
    }

    #[test]
    fn test_long_profit_beats_flat_opponent() {
        let (mut m, _) = live_state();
        assert!(act(&mut m, "alice", ACTION_BUY, dec!(100)));

        let mut state = state_of(&m).clone();
        for player in m.players() {
            close_position(&mut state, &player, dec!(120));
        }
        assert_eq!(state.balances["alice"], dec!(12000));
        assert_eq!(resolve_winner(&state, &m).as_deref(), Some("alice"));
    }

    #[test]
    fn test_short_profits_on_drop() {
        let (mut m, _) = live_state();
        assert!(act(&mut m, "bob", ACTION_SELL, dec!(100)));

        let mut state = state_of(&m).clone();
        for player in m.players() {
            close_position(&mut state, &player, dec!(80));
        }
        assert_eq!(state.balances["bob"], dec!(12000));
        assert_eq!(resolve_winner(&state, &m).as_deref(), Some("bob"));
    }

    #[test]
    fn test_both_losing_is_draw() {
        let (mut m, _) = live_state();
        // both long from different entries, price drops: unequal losses, nobody profits
        assert!(act(&mut m, "alice", ACTION_BUY, dec!(100)));
        assert!(act(&mut m, "bob", ACTION_BUY, dec!(110)));

        let mut state = state_of(&m).clone();
        for player in m.players() {
            close_position(&mut state, &player, dec!(90));
        }
        assert!(state.balances["alice"] < state.initial_balance);
        assert!(state.balances["bob"] < state.initial_balance);
        assert_eq!(resolve_winner(&state, &m), None);
    }

    #[test]
    fn test_equal_profit_is_draw() {
        let (m, mut state) = live_state();
        state.balances.insert("alice".to_string(), dec!(11000));
        state.balances.insert("bob".to_string(), dec!(11000));
        assert_eq!(resolve_winner(&state, &m), None);
    }

    #[test]
    fn test_rejects_outsiders_and_bad_input() {
        let (mut m, _) = live_state();
        assert!(!act(&mut m, "mallory", ACTION_BUY, dec!(100)));
        assert!(!act(&mut m, "alice", "HOLD", dec!(100)));
        assert!(!TradeDuelEngine.on_action(&mut m, "alice", ACTION_BUY, &json!({}), None));
        assert!(!act(&mut m, "alice", ACTION_BUY, dec!(0)));
    }
}
