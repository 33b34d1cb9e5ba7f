//! Database Module
//!
//! PostgreSQL pool management plus the duel history queries. Persistence
//! is best effort: the server is fully playable without a database, and
//! every write here is fired from a background task whose failure is
//! logged and otherwise ignored.
//!
//! Expected schema: a `matches` table keyed by match id (upserted on
//! every status change worth keeping) and a `player_stats` table keyed
//! by wallet address.

use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::models::matches::{Match, MatchStatus};
use crate::models::player::{is_wallet_address, LeaderboardEntry, MatchHistoryRow, PlayerStats};

/// Pool sizing for the history writer. Every query here is a short upsert
/// or a bounded read off the gameplay hot path, so the pool stays small
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    fn from_env(database_url: &str) -> Self {
        let env_u32 = |name: &str, fallback| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback)
        };
        Self {
            url: database_url.to_string(),
            max_connections: env_u32("DB_MAX_CONNECTIONS", 10),
            min_connections: env_u32("DB_MIN_CONNECTIONS", 1),
            acquire_timeout_secs: env_u32("DB_ACQUIRE_TIMEOUT", 5) as u64,
        }
    }
}

/// Handle over the history pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        Self::connect_with_config(DatabaseConfig::from_env(database_url)).await
    }

    pub async fn connect_with_config(config: DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .test_before_acquire(true)
            .connect(&config.url)
            .await?;

        tracing::info!(
            "History pool ready: {} connections max, {} warm",
            config.max_connections,
            pool.num_idle()
        );
        Ok(Self { pool })
    }

    /// One round trip to confirm the pool still answers
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    // ============ Duel history ============

    /// Upsert the current shape of a match. Called on start, completion
    /// and settlement, so the stored row converges on the final state
    pub async fn record_match(&self, m: &Match) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO matches (
                id, player_a, player_b, stake, game_type, asset,
                duration_secs, status, winner, start_price, end_price,
                created_at, start_time, end_time, settlement_tx, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                player_b = EXCLUDED.player_b,
                status = EXCLUDED.status,
                winner = EXCLUDED.winner,
                start_price = EXCLUDED.start_price,
                end_price = EXCLUDED.end_price,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                settlement_tx = EXCLUDED.settlement_tx,
                updated_at = NOW()
            "#,
        )
        .bind(m.id)
        .bind(&m.player_a)
        .bind(&m.player_b)
        .bind(m.stake)
        .bind(m.game_type.as_str())
        .bind(&m.asset)
        .bind(m.duration_secs as i64)
        .bind(m.status.to_string())
        .bind(&m.winner)
        .bind(m.start_price)
        .bind(m.end_price)
        .bind(m.created_at)
        .bind(m.start_time)
        .bind(m.end_time)
        .bind(m.settlement.as_ref().and_then(|s| s.tx_hash.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fold a settled match into both players' lifetime aggregates.
    /// Anonymous ids are skipped, only wallet-bound players keep history
    pub async fn record_player_results(&self, m: &Match) -> Result<(), sqlx::Error> {
        if m.status != MatchStatus::Settled {
            return Ok(());
        }

        let net_payout = m
            .settlement
            .as_ref()
            .map(|s| s.net)
            .unwrap_or(Decimal::ZERO);

        let mut tx = self.pool.begin().await?;
        for player in m.players() {
            if !is_wallet_address(&player) {
                continue;
            }

            let is_draw = m.winner.is_none();
            let is_winner = m.winner.as_deref() == Some(player.as_str());
            // Winner banks the net pot less their own returned stake; a
            // draw refund nets out to the rake taken from each side
            let net = if is_draw {
                net_payout / Decimal::from(2) - m.stake
            } else if is_winner {
                net_payout - m.stake
            } else {
                -m.stake
            };

            sqlx::query(
                r#"
                INSERT INTO player_stats (
                    wallet_address, total_matches, wins, losses, draws,
                    total_wagered, net_profit, updated_at
                )
                VALUES ($1, 1, $2, $3, $4, $5, $6, NOW())
                ON CONFLICT (wallet_address)
                DO UPDATE SET
                    total_matches = player_stats.total_matches + 1,
                    wins = player_stats.wins + $2,
                    losses = player_stats.losses + $3,
                    draws = player_stats.draws + $4,
                    total_wagered = player_stats.total_wagered + $5,
                    net_profit = player_stats.net_profit + $6,
                    updated_at = NOW()
                "#,
            )
            .bind(&player)
            .bind(if is_winner { 1i64 } else { 0 })
            .bind(if !is_winner && !is_draw { 1i64 } else { 0 })
            .bind(if is_draw { 1i64 } else { 0 })
            .bind(m.stake)
            .bind(net)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn player_stats(&self, address: &str) -> Result<Option<PlayerStats>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT wallet_address, total_matches, wins, losses, draws,
                   total_wagered, net_profit, updated_at
            FROM player_stats
            WHERE wallet_address = $1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn match_history(
        &self,
        address: &str,
        limit: i64,
    ) -> Result<Vec<MatchHistoryRow>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, game_type, asset, stake, player_a, player_b,
                   winner, status, created_at
            FROM matches
            WHERE player_a = $1 OR player_b = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(address)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT wallet_address, wins, total_matches, net_profit
            FROM player_stats
            ORDER BY net_profit DESC, wins DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_falls_back_without_env() {
        let config = DatabaseConfig::from_env("postgres://localhost/duels");
        assert_eq!(config.url, "postgres://localhost/duels");
        assert!(config.max_connections >= 1);
        assert!(config.acquire_timeout_secs >= 1);
    }
}
