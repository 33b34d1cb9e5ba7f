//! Memory Match
//!
//! Both players race the same shuffled 30-card board (15 symbols, each
//! twice), each with independent progress: one player pairing two cards
//! does not remove them for the opponent. A flip sequence is two cards;
//! a symbol match banks the pair permanently, a miss leaves the pair
//! face-up until the next flip discards it. Most banked pairs at the
//! clock wins, equal scores draw. The only price here is none.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::models::matches::{Match, MatchData, MemoryProgress, MemoryState};
use crate::services::engine::{EngineResolution, EngineStart, GameEngine};
use crate::services::oracle::PriceOracle;

const ACTION_FLIP: &str = "FLIP";

pub const SYMBOL_COUNT: u8 = 15;
pub const BOARD_SIZE: usize = (SYMBOL_COUNT as usize) * 2;

pub struct MemoryEngine;

#[async_trait]
impl GameEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory_match"
    }

    async fn on_start(&self, m: &Match, _oracle: &PriceOracle) -> EngineStart {
        let mut state = MemoryState {
            board: shuffled_board(),
            ..MemoryState::default()
        };
        for player in m.players() {
            state.progress.insert(player, MemoryProgress::default());
        }

        EngineStart {
            match_data: MatchData::Memory(state),
            start_price: None,
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
        if action != ACTION_FLIP {
            return false;
        }
        let index = match payload.get("index").and_then(|v| v.as_u64()) {
            Some(i) => i as usize,
            None => return false,
        };
        let state = match &mut m.match_data {
            MatchData::Memory(state) => state,
            _ => return false,
        };
        if index >= state.board.len() {
            return false;
        }
        let board = state.board.clone();
        let progress = match state.progress.get_mut(player_id) {
            Some(p) => p,
            None => return false,
        };
        if progress.matched.contains(&index) {
            return false;
        }

        // a miss stays face-up until the player flips again
        if progress.flipped.len() == 2 {
            progress.flipped.clear();
        }
        if progress.flipped.contains(&index) {
            return false;
        }

        progress.flipped.push(index);
        if progress.flipped.len() == 2 {
            let (first, second) = (progress.flipped[0], progress.flipped[1]);
            if board[first] == board[second] {
                progress.matched.insert(first);
                progress.matched.insert(second);
                progress.score += 1;
                progress.flipped.clear();
            }
        }
        true
    }

    async fn on_complete(&self, m: &Match, _oracle: &PriceOracle) -> EngineResolution {
        let winner = match &m.match_data {
            MatchData::Memory(state) => resolve_winner(state, m),
            _ => None,
        };
        EngineResolution {
            winner,
            end_price: None,
            match_data: m.match_data.clone(),
        }
    }
}

/// Fresh board layout: every symbol exactly twice, order randomized
fn shuffled_board() -> Vec<u8> {
    let mut board: Vec<u8> = (0..SYMBOL_COUNT).flat_map(|symbol| [symbol, symbol]).collect();
    board.shuffle(&mut rand::thread_rng());
    board
}

fn resolve_winner(state: &MemoryState, m: &Match) -> Option<String> {
    let player_b = m.player_b.as_deref()?;
    let score = |player: &str| state.progress.get(player).map(|p| p.score).unwrap_or(0);

    let score_a = score(&m.player_a);
    let score_b = score(player_b);
    if score_a > score_b {
        Some(m.player_a.clone())
    } else if score_b > score_a {
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

    /// Deterministic board: [0,0,1,1,...,14,14]
    fn fixed_board_match() -> Match {
        let mut m = Match::new("alice", dec!(10), GameType::MemoryMatch, "ETH/USD", 60);
        m.player_b = Some("bob".to_string());

        let board: Vec<u8> = (0..SYMBOL_COUNT).flat_map(|s| [s, s]).collect();
        let mut state = MemoryState {
            board,
            ..MemoryState::default()
        };
        state.progress.insert("alice".to_string(), MemoryProgress::default());
        state.progress.insert("bob".to_string(), MemoryProgress::default());
        m.match_data = MatchData::Memory(state);
        m
    }

    fn flip(m: &mut Match, player: &str, index: usize) -> bool {
        MemoryEngine.on_action(m, player, ACTION_FLIP, &json!({ "index": index }), None)
    }

    fn progress_of<'a>(m: &'a Match, player: &str) -> &'a MemoryProgress {
        match &m.match_data {
            MatchData::Memory(state) => &state.progress[player],
            _ => panic!("wrong game payload"),
        }
    }

    #[test]
    fn test_board_composition() {
        let board = shuffled_board();
        assert_eq!(board.len(), BOARD_SIZE);
        for symbol in 0..SYMBOL_COUNT {
            assert_eq!(board.iter().filter(|&&c| c == symbol).count(), 2);
        }
    }

    #[test]
    fn test_pair_match_banks_and_scores() {
        let mut m = fixed_board_match();
        assert!(flip(&mut m, "alice", 0));
        assert!(flip(&mut m, "alice", 1));

        let progress = progress_of(&m, "alice");
        assert_eq!(progress.score, 1);
        assert!(progress.matched.contains(&0));
        assert!(progress.matched.contains(&1));
        assert!(progress.flipped.is_empty());
    }

    #[test]
    fn test_miss_discarded_on_next_flip() {
        let mut m = fixed_board_match();
        // 0 and 2 carry different symbols
        assert!(flip(&mut m, "alice", 0));
        assert!(flip(&mut m, "alice", 2));
        assert_eq!(progress_of(&m, "alice").flipped, vec![0, 2]);
        assert_eq!(progress_of(&m, "alice").score, 0);

        // next flip starts a new attempt
        assert!(flip(&mut m, "alice", 4));
        assert_eq!(progress_of(&m, "alice").flipped, vec![4]);
    }

    #[test]
    fn test_rejects_banked_and_repeated_cards() {
        let mut m = fixed_board_match();
        assert!(flip(&mut m, "alice", 0));
        assert!(!flip(&mut m, "alice", 0)); // same card twice in one attempt
        assert!(flip(&mut m, "alice", 1));

        assert!(!flip(&mut m, "alice", 0)); // banked
        assert!(!flip(&mut m, "alice", 99)); // out of range
        assert!(!flip(&mut m, "mallory", 2)); // not a participant
    }

    #[test]
    fn test_progress_is_independent() {
        let mut m = fixed_board_match();
        assert!(flip(&mut m, "alice", 0));
        assert!(flip(&mut m, "alice", 1));

        // bob can still bank the same cards
        assert!(flip(&mut m, "bob", 0));
        assert!(flip(&mut m, "bob", 1));
        assert_eq!(progress_of(&m, "bob").score, 1);
    }

    #[test]
    fn test_resolution_by_score() {
        let mut m = fixed_board_match();
        assert!(flip(&mut m, "alice", 0));
        assert!(flip(&mut m, "alice", 1));
        assert!(flip(&mut m, "bob", 2));
        assert!(flip(&mut m, "bob", 4)); // miss

        match &m.match_data {
            MatchData::Memory(state) => {
                assert_eq!(resolve_winner(state, &m).as_deref(), Some("alice"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_equal_scores_draw() {
        let m = fixed_board_match();
        match &m.match_data {
            MatchData::Memory(state) => assert_eq!(resolve_winner(state, &m), None),
            _ => unreachable!(),
        }
    }
}
