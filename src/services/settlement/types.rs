//! Settlement types

use rust_decimal::Decimal;
use thiserror::Error;

/// Hard cap on the rake, in basis points. Construction clamps to this
pub const MAX_RAKE_BPS: u32 = 500;

/// Basis-point denominator
pub const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Ledger not configured")]
    NotConfigured,

    #[error("Player {0} has no wallet-bound identity")]
    UnboundPlayer(String),

    #[error("Insufficient ledger liquidity: need {needed}, have {available}")]
    InsufficientLiquidity { needed: Decimal, available: Decimal },

    #[error("Ledger call failed: {0}")]
    Ledger(String),

    #[error("Settlement transaction reverted: {0}")]
    Reverted(String),
}

/// Payout split for one gross amount: gross = rake + net
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RakeBreakdown {
    pub gross: Decimal,
    pub rake: Decimal,
    pub net: Decimal,
}

/// Split raw token units by the rake. The rake side is floored, so the
/// net side never loses more than the exact bps share
pub fn rake_split(gross_units: u128, rake_bps: u32) -> (u128, u128) {
    let rake = gross_units * rake_bps as u128 / BPS_DENOMINATOR;
    (rake, gross_units - rake)
}
