//! Matchmaking Queue
//!
//! FIFO queue of players waiting for an opponent, bucketed by the exact
//! duel terms (stake, game type, asset). Only identical terms ever match.
//! Each entry carries the id of the WAITING match shell its player opened,
//! so pairing promotes that match instead of creating a new one.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::matches::GameType;

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub player_id: String,
    pub stake: Decimal,
    pub game_type: GameType,
    pub asset: String,
    /// WAITING match opened when this player joined
    pub match_id: Uuid,
    pub session_ref: Option<String>,
    pub queued_at: DateTime<Utc>,
}

/// Duel terms that must agree exactly for two players to be paired.
/// Stake is normalized so "5" and "5.0" land in the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    stake: String,
    game_type: GameType,
    asset: String,
}

impl BucketKey {
    fn new(stake: Decimal, game_type: GameType, asset: &str) -> Self {
        Self {
            stake: stake.normalize().to_string(),
            game_type,
            asset: asset.to_uppercase(),
        }
    }
}

/// Depth of one waiting bucket, for the stats surface
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub stake: String,
    pub game_type: GameType,
    pub asset: String,
    pub waiting: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub total_waiting: usize,
    pub buckets: Vec<BucketStats>,
}

#[derive(Default)]
pub struct MatchmakingQueue {
    buckets: DashMap<BucketKey, Vec<QueueEntry>>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Append to the bucket for these terms. Returns the 1-based queue position
    pub fn add(&self, entry: QueueEntry) -> usize {
        let key = BucketKey::new(entry.stake, entry.game_type, &entry.asset);
        let mut bucket = self.buckets.entry(key).or_default();
        bucket.push(entry);
        bucket.len()
    }

    /// Pop the longest-waiting player with matching terms, skipping the
    /// caller's own entry. FIFO within the bucket. A stale entry of the
    /// caller's own is dropped along the way, since the caller is about
    /// to be paired either way.
    pub fn find_opponent(
        &self,
        player_id: &str,
        stake: Decimal,
        game_type: GameType,
        asset: &str,
    ) -> Option<QueueEntry> {
        let key = BucketKey::new(stake, game_type, asset);
        let mut bucket = self.buckets.get_mut(&key)?;
        let pos = bucket.iter().position(|e| e.player_id != player_id)?;
        let opponent = bucket.remove(pos);
        bucket.retain(|e| e.player_id != player_id);
        Some(opponent)
    }

    /// Remove a player from whichever bucket holds them
    pub fn remove_player(&self, player_id: &str) -> Option<QueueEntry> {
        for mut bucket in self.buckets.iter_mut() {
            if let Some(pos) = bucket.iter().position(|e| e.player_id == player_id) {
                return Some(bucket.remove(pos));
            }
        }
        None
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.buckets
            .iter()
            .any(|bucket| bucket.iter().any(|e| e.player_id == player_id))
    }

    /// Total players waiting across all buckets
    pub fn depth(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    pub fn stats(&self) -> QueueStats {
        let mut buckets: Vec<BucketStats> = self
            .buckets
            .iter()
            .filter(|bucket| !bucket.is_empty())
            .map(|bucket| BucketStats {
                stake: bucket.key().stake.clone(),
                game_type: bucket.key().game_type,
                asset: bucket.key().asset.clone(),
                waiting: bucket.len(),
            })
            .collect();
        buckets.sort_by(|a, b| a.asset.cmp(&b.asset).then(a.stake.cmp(&b.stake)));

        QueueStats {
            total_waiting: buckets.iter().map(|b| b.waiting).sum(),
            buckets,
        }
    }
}
