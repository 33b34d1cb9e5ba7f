//! Match Domain Model
//!
//! A match is a 60-second wagered duel between two players. It moves through
//! a fixed lifecycle: WAITING (open, queued) -> PROPOSED (paired, awaiting
//! accepts) -> ACTIVE (round running) -> COMPLETED (outcome known) ->
//! SETTLING (payout in flight) -> SETTLED (terminal). Matches in WAITING or
//! PROPOSED can be deleted outright; from ACTIVE onward they always run
//! forward to SETTLED.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Enums ============

/// Game variant played inside the duel round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    /// Call the price direction once, closest call wins
    Prediction,
    /// Trade a simulated balance against the live price
    TradeDuel,
    /// Race to pair the most cards on a shared board
    MemoryMatch,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Prediction => "prediction",
            GameType::TradeDuel => "trade_duel",
            GameType::MemoryMatch => "memory_match",
        }
    }

    /// Whether the variant resolves against oracle prices
    pub fn is_price_based(&self) -> bool {
        matches!(self, GameType::Prediction | GameType::TradeDuel)
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GameType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prediction" => Ok(GameType::Prediction),
            "trade_duel" | "tradeduel" => Ok(GameType::TradeDuel),
            "memory_match" | "memorymatch" => Ok(GameType::MemoryMatch),
            _ => Err(format!("Unknown game type: {}", s)),
        }
    }
}

/// Match lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Open match waiting in the queue for an opponent
    Waiting,
    /// Paired, both players must accept within the timeout
    Proposed,
    /// Round clock running
    Active,
    /// Round over, outcome decided, payout not yet attempted
    Completed,
    /// Payout attempt in flight
    Settling,
    /// Terminal. Payout confirmed, failed, or simulated
    Settled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Waiting => "waiting",
            MatchStatus::Proposed => "proposed",
            MatchStatus::Active => "active",
            MatchStatus::Completed => "completed",
            MatchStatus::Settling => "settling",
            MatchStatus::Settled => "settled",
        }
    }

    /// Pre-game states that may be deleted outright (disconnect, decline, timeout)
    pub fn is_cancellable(&self) -> bool {
        matches!(self, MatchStatus::Waiting | MatchStatus::Proposed)
    }

    /// Round in progress
    pub fn is_live(&self) -> bool {
        matches!(self, MatchStatus::Active)
    }

    /// Nothing further will ever happen to this match
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Settled)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Price direction call for the prediction game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// Side of an open trade-duel position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

// ============ Per-Game State ============

/// Prediction game state: one direction call per player, last write wins
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionState {
    pub calls: HashMap<String, Direction>,
}

/// An open position in the trade duel, sized with the player's full balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    /// Units of the asset, margin / entry_price
    pub size: Decimal,
    pub entry_price: Decimal,
    /// Cash committed when the position was opened
    pub margin: Decimal,
}

impl Position {
    /// Realized profit or loss if closed at `price`
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            PositionSide::Long => (price - self.entry_price) * self.size,
            PositionSide::Short => (self.entry_price - price) * self.size,
        }
    }
}

/// Trade duel state: simulated cash balances and at most one open position each
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeDuelState {
    /// Free cash per player. Zero while a position is open
    pub balances: HashMap<String, Decimal>,
    pub positions: HashMap<String, Position>,
    /// Starting balance both players received
    pub initial_balance: Decimal,
}

impl TradeDuelState {
    /// Cash plus the value of any open position at `price`
    pub fn equity(&self, player_id: &str, price: Decimal) -> Decimal {
        let cash = self.balances.get(player_id).copied().unwrap_or_default();
        match self.positions.get(player_id) {
            Some(pos) => cash + pos.margin + pos.pnl_at(price),
            None => cash,
        }
    }
}

/// One player's progress on the shared memory board
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryProgress {
    /// Indices of the current in-flight pair attempt (0..=2 entries)
    pub flipped: Vec<usize>,
    /// Indices this player has permanently paired
    pub matched: HashSet<usize>,
    /// Pairs completed
    pub score: u32,
}

/// Memory game state: one shared card layout, each player races it independently
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryState {
    /// Symbol id per card slot, each symbol appears exactly twice
    pub board: Vec<u8>,
    pub progress: HashMap<String, MemoryProgress>,
}

/// Game-specific payload carried by every match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum MatchData {
    Prediction(PredictionState),
    TradeDuel(TradeDuelState),
    Memory(MemoryState),
}

impl MatchData {
    /// Empty state for a match that has not gone live yet
    pub fn empty_for(game_type: GameType) -> Self {
        match game_type {
            GameType::Prediction => MatchData::Prediction(PredictionState::default()),
            GameType::TradeDuel => MatchData::TradeDuel(TradeDuelState::default()),
            GameType::MemoryMatch => MatchData::Memory(MemoryState::default()),
        }
    }
}

// ============ Settlement ============

/// Where the payout attempt stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Match entered SETTLING, nothing submitted yet
    Pending,
    /// Ledger call being built and sent
    Submitting,
    /// Transaction sent, receipt not yet seen
    Confirming,
    Confirmed,
    Failed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Submitting => "submitting",
            SettlementStatus::Confirming => "confirming",
            SettlementStatus::Confirmed => "confirmed",
            SettlementStatus::Failed => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SettlementStatus::Failed)
    }

    /// No further status change will happen
    pub fn is_final(&self) -> bool {
        matches!(self, SettlementStatus::Confirmed | SettlementStatus::Failed)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the payout attempt, attached to the match once it settles.
/// Amounts are in stake currency: net = gross - rake, rake floored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementInfo {
    pub status: SettlementStatus,
    pub tx_hash: Option<String>,
    pub gross: Decimal,
    pub rake: Decimal,
    pub net: Decimal,
    pub error: Option<String>,
    pub explorer_url: Option<String>,
    /// True when no transaction was ever attempted (ledger not configured)
    pub simulated: bool,
}

impl SettlementInfo {
    /// Record created when a match enters SETTLING, before any submission
    pub fn pending(gross: Decimal, rake: Decimal, net: Decimal) -> Self {
        Self {
            status: SettlementStatus::Pending,
            tx_hash: None,
            gross,
            rake,
            net,
            error: None,
            explorer_url: None,
            simulated: false,
        }
    }
}

// ============ Match ============

/// A single duel from queue entry to settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    /// Player who opened the match by joining the queue
    pub player_a: String,
    /// Opponent, set when the queue pairs the match
    pub player_b: Option<String>,
    /// Wager per player, in stake currency
    pub stake: Decimal,
    pub game_type: GameType,
    /// Price pair the round runs against, e.g. "ETH/USD"
    pub asset: String,
    pub duration_secs: u64,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_price: Option<Decimal>,
    pub end_price: Option<Decimal>,
    /// None on a draw or before completion
    pub winner: Option<String>,
    /// Mirror of prediction calls for clients, kept in sync with match_data
    pub predictions: HashMap<String, Direction>,
    pub match_data: MatchData,
    /// Players who accepted the proposal. Internal, cleared at start
    #[serde(skip)]
    pub accepted: HashSet<String>,
    pub settlement: Option<SettlementInfo>,
}

impl Match {
    /// Open a new WAITING match for a player entering the queue
    pub fn new(
        player_a: &str,
        stake: Decimal,
        game_type: GameType,
        asset: &str,
        duration_secs: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            player_a: player_a.to_string(),
            player_b: None,
            stake,
            game_type,
            asset: asset.to_string(),
            duration_secs,
            status: MatchStatus::Waiting,
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
            start_price: None,
            end_price: None,
            winner: None,
            predictions: HashMap::new(),
            match_data: MatchData::empty_for(game_type),
            accepted: HashSet::new(),
            settlement: None,
        }
    }

    pub fn is_participant(&self, player_id: &str) -> bool {
        self.player_a == player_id || self.player_b.as_deref() == Some(player_id)
    }

    /// Both players, once paired
    pub fn players(&self) -> Vec<String> {
        let mut out = vec![self.player_a.clone()];
        if let Some(b) = &self.player_b {
            out.push(b.clone());
        }
        out
    }

    pub fn opponent_of(&self, player_id: &str) -> Option<String> {
        if self.player_a == player_id {
            self.player_b.clone()
        } else if self.player_b.as_deref() == Some(player_id) {
            Some(self.player_a.clone())
        } else {
            None
        }
    }

    pub fn has_both_accepted(&self) -> bool {
        self.player_b.is_some()
            && self.accepted.contains(&self.player_a)
            && self
                .player_b
                .as_ref()
                .map(|b| self.accepted.contains(b))
                .unwrap_or(false)
    }

    /// Total pot: both stakes
    pub fn pot(&self) -> Decimal {
        self.stake * Decimal::from(2)
    }

    /// Re-derive client-facing mirrors from the game state
    pub fn sync_mirrors(&mut self) {
        if let MatchData::Prediction(state) = &self.match_data {
            self.predictions = state.calls.clone();
        }
    }
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_match() -> Match {
        Match::new("anon-aaaa1111", dec!(10), GameType::Prediction, "ETH/USD", 60)
    }

    #[test]
    fn test_game_type_round_trip() {
        for gt in [GameType::Prediction, GameType::TradeDuel, GameType::MemoryMatch] {
            assert_eq!(gt.as_str().parse::<GameType>().unwrap(), gt);
        }
        assert_eq!("TRADE_DUEL".parse::<GameType>().unwrap(), GameType::TradeDuel);
        assert!("poker".parse::<GameType>().is_err());
    }

    #[test]
    fn test_status_predicates() {
        assert!(MatchStatus::Waiting.is_cancellable());
        assert!(MatchStatus::Proposed.is_cancellable());
        assert!(!MatchStatus::Active.is_cancellable());
        assert!(!MatchStatus::Settling.is_cancellable());
        assert!(MatchStatus::Active.is_live());
        assert!(MatchStatus::Settled.is_terminal());
        assert!(!MatchStatus::Completed.is_terminal());
    }

    #[test]
    fn test_settlement_status_flow() {
        assert!(!SettlementStatus::Pending.is_final());
        assert!(!SettlementStatus::Submitting.is_final());
        assert!(!SettlementStatus::Confirming.is_final());
        assert!(SettlementStatus::Confirmed.is_final());
        assert!(SettlementStatus::Failed.is_final());
        assert!(SettlementStatus::Failed.is_failed());
        assert!(!SettlementStatus::Confirmed.is_failed());

        let info = SettlementInfo::pending(dec!(20), dec!(0.5), dec!(19.5));
        assert_eq!(info.status, SettlementStatus::Pending);
        assert!(info.tx_hash.is_none());
        assert!(!info.simulated);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("DOWN".parse::<Direction>().unwrap(), Direction::Down);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_new_match_defaults() {
        let m = sample_match();
        assert_eq!(m.status, MatchStatus::Waiting);
        assert!(m.player_b.is_none());
        assert!(m.start_price.is_none());
        assert!(m.winner.is_none());
        assert_eq!(m.pot(), dec!(20));
        assert!(matches!(m.match_data, MatchData::Prediction(_)));
    }

    #[test]
    fn test_participants_and_acceptance() {
        let mut m = sample_match();
        m.player_b = Some("anon-bbbb2222".to_string());

        assert!(m.is_participant("anon-aaaa1111"));
        assert!(m.is_participant("anon-bbbb2222"));
        assert!(!m.is_participant("anon-cccc3333"));
        assert_eq!(m.opponent_of("anon-aaaa1111").as_deref(), Some("anon-bbbb2222"));
        assert_eq!(m.opponent_of("anon-cccc3333"), None);

        assert!(!m.has_both_accepted());
        m.accepted.insert("anon-aaaa1111".to_string());
        assert!(!m.has_both_accepted());
        m.accepted.insert("anon-bbbb2222".to_string());
        assert!(m.has_both_accepted());
    }

    #[test]
    fn test_position_pnl() {
        let long = Position {
            side: PositionSide::Long,
            size: dec!(2),
            entry_price: dec!(100),
            margin: dec!(200),
        };
        assert_eq!(long.pnl_at(dec!(110)), dec!(20));
        assert_eq!(long.pnl_at(dec!(90)), dec!(-20));

        let short = Position {
            side: PositionSide::Short,
            size: dec!(2),
            entry_price: dec!(100),
            margin: dec!(200),
        };
        assert_eq!(short.pnl_at(dec!(90)), dec!(20));
        assert_eq!(short.pnl_at(dec!(110)), dec!(-20));
    }

    #[test]
    fn test_match_data_serde_tag() {
        let data = MatchData::empty_for(GameType::MemoryMatch);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["game"], "memory");
    }

    #[test]
    fn test_prediction_mirror_sync() {
        let mut m = sample_match();
        if let MatchData::Prediction(state) = &mut m.match_data {
            state.calls.insert("anon-aaaa1111".to_string(), Direction::Up);
        }
        m.sync_mirrors();
        assert_eq!(m.predictions.get("anon-aaaa1111"), Some(&Direction::Up));
    }
}
