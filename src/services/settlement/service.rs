//! Settlement Bridge
//!
//! Turns a completed match into an on-chain payout through the duel
//! ledger. The bridge never fails outward: every path, including a
//! missing ledger configuration, produces a SettlementInfo describing
//! what happened, and the orchestrator attaches it to the match. With
//! no operator signer configured the computed figures are still filled
//! in and the result is marked simulated.
//!
//! Winner payout is one settleMatch call over the full pot. A draw is
//! refunded as two per-player settleMatch calls over one stake each, so
//! refunds bear the same rake as wins; the draw is only Confirmed when
//! both legs confirm.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blockchain::{LedgerClient, SettleOutcome, TxStatus};
use crate::models::matches::{Match, SettlementInfo, SettlementStatus};
use crate::services::settlement::types::{rake_split, RakeBreakdown, SettlementError, MAX_RAKE_BPS};

pub struct SettlementBridge {
    ledger: Option<Arc<LedgerClient>>,
    rake_bps: u32,
    token_decimals: u32,
    explorer_base_url: String,
}

impl SettlementBridge {
    pub fn new(
        ledger: Option<Arc<LedgerClient>>,
        rake_bps: u32,
        explorer_base_url: &str,
        token_decimals: u32,
    ) -> Self {
        let clamped = rake_bps.min(MAX_RAKE_BPS);
        if clamped != rake_bps {
            warn!("Rake {} bps exceeds cap, clamped to {}", rake_bps, clamped);
        }
        Self {
            ledger,
            rake_bps: clamped,
            token_decimals,
            explorer_base_url: explorer_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Whether real transactions can be submitted
    pub fn is_enabled(&self) -> bool {
        self.ledger
            .as_ref()
            .map(|l| l.has_signer())
            .unwrap_or(false)
    }

    pub fn rake_bps(&self) -> u32 {
        self.rake_bps
    }

    /// Compact ledger id for a match: high 64 bits of the uuid
    pub fn ledger_match_id(match_id: &Uuid) -> u64 {
        match_id.as_u64_pair().0
    }

    /// Pending record attached to the match the moment it enters SETTLING,
    /// carrying the locally computed figures before anything is submitted
    pub fn preview(&self, m: &Match) -> SettlementInfo {
        let breakdown = match &m.winner {
            Some(_) => self.breakdown_for(m.pot()),
            None => {
                let per_player = self.breakdown_for(m.stake);
                RakeBreakdown {
                    gross: per_player.gross * Decimal::from(2),
                    rake: per_player.rake * Decimal::from(2),
                    net: per_player.net * Decimal::from(2),
                }
            }
        };
        SettlementInfo::pending(breakdown.gross, breakdown.rake, breakdown.net)
    }

    /// Settle a completed match. Infallible by contract: errors become a
    /// Failed (possibly simulated) SettlementInfo
    pub async fn settle(&self, m: &Match) -> SettlementInfo {
        let result = match &m.winner {
            Some(winner) => self.settle_winner(m, winner).await,
            None => self.settle_draw(m).await,
        };

        match result {
            Ok(info) => info,
            Err((breakdown, err)) => {
                warn!("Settlement of match {} failed: {}", m.id, err);
                let simulated = matches!(
                    err,
                    SettlementError::NotConfigured | SettlementError::UnboundPlayer(_)
                );
                SettlementInfo {
                    status: SettlementStatus::Failed,
                    tx_hash: None,
                    gross: breakdown.gross,
                    rake: breakdown.rake,
                    net: breakdown.net,
                    error: Some(err.to_string()),
                    explorer_url: None,
                    simulated,
                }
            }
        }
    }

    // ============ Winner Payout ============

    async fn settle_winner(
        &self,
        m: &Match,
        winner: &str,
    ) -> Result<SettlementInfo, (RakeBreakdown, SettlementError)> {
        let breakdown = self.breakdown_for(m.pot());

        let ledger = self.signing_ledger().map_err(|e| (breakdown, e))?;
        let winner_addr: ethers::types::Address = winner
            .parse()
            .map_err(|_| (breakdown, SettlementError::UnboundPlayer(winner.to_string())))?;

        let gross_units = ledger.decimal_to_units(m.pot());
        self.check_liquidity(&ledger, gross_units, m.pot())
            .await
            .map_err(|e| (breakdown, e))?;

        let outcome = ledger
            .settle_match(
                Self::ledger_match_id(&m.id),
                winner_addr,
                gross_units,
                self.rake_bps,
            )
            .await
            .map_err(|e| (breakdown, SettlementError::Ledger(e.to_string())))?;

        info!(
            "Settled match {} for {}: tx {:?} ({:?})",
            m.id, winner, outcome.tx.tx_hash, outcome.tx.status
        );
        Ok(self.info_from_outcome(&ledger, outcome, breakdown))
    }

    // ============ Draw Refunds ============

    async fn settle_draw(
        &self,
        m: &Match,
    ) -> Result<SettlementInfo, (RakeBreakdown, SettlementError)> {
        // aggregate figures: both stakes refunded, each bearing the rake
        let per_player = self.breakdown_for(m.stake);
        let total = RakeBreakdown {
            gross: per_player.gross * Decimal::from(2),
            rake: per_player.rake * Decimal::from(2),
            net: per_player.net * Decimal::from(2),
        };

        let ledger = self.signing_ledger().map_err(|e| (total, e))?;

        let players = m.players();
        let mut addresses = Vec::with_capacity(players.len());
        for player in &players {
            let addr: ethers::types::Address = player
                .parse()
                .map_err(|_| (total, SettlementError::UnboundPlayer(player.clone())))?;
            addresses.push(addr);
        }

        let pot_units = ledger.decimal_to_units(m.pot());
        self.check_liquidity(&ledger, pot_units, m.pot())
            .await
            .map_err(|e| (total, e))?;

        let ledger_id = Self::ledger_match_id(&m.id);
        let stake_units = ledger.decimal_to_units(m.stake);
        let mut reported: Option<SettleOutcome> = None;

        for (player, addr) in players.iter().zip(addresses) {
            let outcome = ledger
                .settle_match(ledger_id, addr, stake_units, self.rake_bps)
                .await
                .map_err(|e| {
                    (
                        total,
                        SettlementError::Ledger(format!("refund of {} failed: {}", player, e)),
                    )
                })?;
            if outcome.tx.status == TxStatus::Failed {
                return Err((
                    total,
                    SettlementError::Reverted(format!(
                        "refund of {} reverted in tx {:?}",
                        player, outcome.tx.tx_hash
                    )),
                ));
            }
            // a draw is only Confirmed once every leg is, so one
            // receipt-less leg pins the reported outcome
            let keep_pending = matches!(&reported, Some(prev) if prev.tx.status == TxStatus::Pending);
            if !keep_pending {
                reported = Some(outcome);
            }
        }

        info!("Refunded draw match {} to both players", m.id);
        let outcome = match reported {
            Some(o) => o,
            // unreachable with two players, but never panic in this path
            None => return Err((total, SettlementError::Ledger("no players to refund".into()))),
        };
        Ok(self.info_from_outcome(&ledger, outcome, total))
    }

    // ============ Helpers ============

    fn signing_ledger(&self) -> Result<Arc<LedgerClient>, SettlementError> {
        match &self.ledger {
            Some(ledger) if ledger.has_signer() => Ok(Arc::clone(ledger)),
            _ => Err(SettlementError::NotConfigured),
        }
    }

    async fn check_liquidity(
        &self,
        ledger: &LedgerClient,
        needed_units: ethers::types::U256,
        needed: Decimal,
    ) -> Result<(), SettlementError> {
        let available = ledger
            .available_liquidity()
            .await
            .map_err(|e| SettlementError::Ledger(e.to_string()))?;
        if available < needed_units {
            return Err(SettlementError::InsufficientLiquidity {
                needed,
                available: ledger.units_to_decimal(available),
            });
        }
        Ok(())
    }

    /// Gross split computed locally in integer token units, so the
    /// figures match what the contract floors
    fn breakdown_for(&self, gross: Decimal) -> RakeBreakdown {
        let factor = Decimal::from(10u64.pow(self.token_decimals));
        let gross_units = (gross * factor).trunc().to_u128().unwrap_or(0);
        let (rake_units, net_units) = rake_split(gross_units, self.rake_bps);

        let to_decimal = |units: u128| {
            Decimal::from_i128_with_scale(units as i128, self.token_decimals).normalize()
        };
        RakeBreakdown {
            gross: to_decimal(gross_units),
            rake: to_decimal(rake_units),
            net: to_decimal(net_units),
        }
    }

    fn info_from_outcome(
        &self,
        ledger: &LedgerClient,
        outcome: SettleOutcome,
        local: RakeBreakdown,
    ) -> SettlementInfo {
        // the decoded event is authoritative when the receipt carried one
        let (gross, rake, net) = match &outcome.event {
            Some(ev) => (
                ledger.units_to_decimal(ev.gross),
                ledger.units_to_decimal(ev.rake),
                ledger.units_to_decimal(ev.net),
            ),
            None => (local.gross, local.rake, local.net),
        };

        match outcome.tx.status {
            TxStatus::Confirmed => {
                let hash = format!("{:?}", outcome.tx.tx_hash);
                SettlementInfo {
                    status: SettlementStatus::Confirmed,
                    explorer_url: Some(self.explorer_tx_url(&hash)),
                    tx_hash: Some(hash),
                    gross,
                    rake,
                    net,
                    error: None,
                    simulated: false,
                }
            }
            TxStatus::Pending => {
                let hash = format!("{:?}", outcome.tx.tx_hash);
                SettlementInfo {
                    status: SettlementStatus::Confirming,
                    explorer_url: Some(self.explorer_tx_url(&hash)),
                    tx_hash: Some(hash),
                    gross,
                    rake,
                    net,
                    error: outcome.tx.error,
                    simulated: false,
                }
            }
            TxStatus::Failed => {
                let hash = format!("{:?}", outcome.tx.tx_hash);
                SettlementInfo {
                    status: SettlementStatus::Failed,
                    explorer_url: Some(self.explorer_tx_url(&hash)),
                    tx_hash: Some(hash),
                    gross,
                    rake,
                    net,
                    error: Some("Settlement transaction reverted".to_string()),
                    simulated: false,
                }
            }
        }
    }

    fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_base_url, tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matches::GameType;
    use rust_decimal_macros::dec;

    fn unconfigured_bridge() -> SettlementBridge {
        SettlementBridge::new(None, 250, "https://arbiscan.io", 6)
    }

    fn completed_match(winner: Option<&str>) -> Match {
        let mut m = Match::new(
            "0x1111111111111111111111111111111111111111",
            dec!(10),
            GameType::Prediction,
            "ETH/USD",
            60,
        );
        m.player_b = Some("0x2222222222222222222222222222222222222222".to_string());
        m.winner = winner.map(|w| w.to_string());
        m
    }

    #[test]
    fn test_rake_clamped_at_construction() {
        let bridge = SettlementBridge::new(None, 900, "https://arbiscan.io", 6);
        assert_eq!(bridge.rake_bps(), MAX_RAKE_BPS);
        assert_eq!(unconfigured_bridge().rake_bps(), 250);
    }

    #[test]
    fn test_ledger_match_id_is_stable() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let first = SettlementBridge::ledger_match_id(&id);
        assert_eq!(first, SettlementBridge::ledger_match_id(&id));
        assert_eq!(first, 0x67e5504410b1426f);
    }

    #[test]
    fn test_breakdown_uses_floored_units() {
        let bridge = unconfigured_bridge();
        let b = bridge.breakdown_for(dec!(20));
        assert_eq!(b.gross, dec!(20));
        assert_eq!(b.rake, dec!(0.5));
        assert_eq!(b.net, dec!(19.5));

        // 0.000001 pot: the rake share floors away entirely
        let tiny = bridge.breakdown_for(dec!(0.000001));
        assert_eq!(tiny.rake, Decimal::ZERO);
        assert_eq!(tiny.net, dec!(0.000001));
    }

    #[tokio::test]
    async fn test_unconfigured_winner_settlement_is_simulated() {
        let bridge = unconfigured_bridge();
        let m = completed_match(Some("0x1111111111111111111111111111111111111111"));

        let info = bridge.settle(&m).await;
        assert_eq!(info.status, SettlementStatus::Failed);
        assert!(info.simulated);
        assert!(info.tx_hash.is_none());
        assert_eq!(info.gross, dec!(20));
        assert_eq!(info.rake, dec!(0.5));
        assert_eq!(info.net, dec!(19.5));
    }

    #[tokio::test]
    async fn test_unconfigured_draw_reports_both_refunds() {
        let bridge = unconfigured_bridge();
        let m = completed_match(None);

        let info = bridge.settle(&m).await;
        assert_eq!(info.status, SettlementStatus::Failed);
        assert!(info.simulated);
        // two refunds of 10, each raked 0.25
        assert_eq!(info.gross, dec!(20));
        assert_eq!(info.rake, dec!(0.5));
        assert_eq!(info.net, dec!(19.5));
    }

    #[tokio::test]
    async fn test_anonymous_winner_cannot_be_paid() {
        let bridge = SettlementBridge::new(
            Some(Arc::new(
                LedgerClient::new_with_signer(
                    "http://localhost:8545",
                    "0x0123456789012345678901234567890123456789012345678901234567890123",
                    "0x1111111111111111111111111111111111111111",
                    42161,
                    6,
                )
                .unwrap(),
            )),
            250,
            "https://arbiscan.io",
            6,
        );
        let m = completed_match(Some("anon-9f3a2c1d"));

        let info = bridge.settle(&m).await;
        assert_eq!(info.status, SettlementStatus::Failed);
        assert!(info.simulated);
        assert!(info.error.unwrap().contains("anon-9f3a2c1d"));
    }
}
