//! Player Profile Models
//!
//! Players are identified by an anonymous session id until they bind a
//! wallet, after which the lowercased wallet address becomes the id.
//! Aggregate records below are only kept for wallet-bound players.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Checks the 0x-prefixed 20-byte hex shape of an EVM wallet address
pub fn is_wallet_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Lifetime aggregates for one wallet-bound player
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlayerStats {
    pub wallet_address: String,
    pub total_matches: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    /// Sum of stakes committed across all matches
    pub total_wagered: Decimal,
    /// Net payout across all matches, rake included
    pub net_profit: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// One row of the win leaderboard
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaderboardEntry {
    pub wallet_address: String,
    pub wins: i64,
    pub total_matches: i64,
    pub net_profit: Decimal,
}

/// One settled match as seen from a player's history
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchHistoryRow {
    pub id: Uuid,
    pub game_type: String,
    pub asset: String,
    pub stake: Decimal,
    pub player_a: String,
    pub player_b: Option<String>,
    pub winner: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_shape() {
        assert!(is_wallet_address("0x1111111111111111111111111111111111111111"));
        assert!(is_wallet_address("0xAbCdEf0123456789abcdef0123456789ABCDEF01"));
        assert!(!is_wallet_address("1111111111111111111111111111111111111111"));
        assert!(!is_wallet_address("0x1111"));
        assert!(!is_wallet_address("0xZZ11111111111111111111111111111111111111"));
        assert!(!is_wallet_address("anon-9f3a2c1d"));
    }
}
