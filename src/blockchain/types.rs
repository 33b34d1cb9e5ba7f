//! Ledger types and structures

use ethers::types::{Address, H256, U256};
use rust_decimal::Decimal;
use serde::Serialize;

/// Transaction status after submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Sent, receipt not yet available
    Pending,
    Confirmed,
    /// Mined but reverted
    Failed,
}

/// Result of a submitted ledger transaction
#[derive(Debug, Clone)]
pub struct TxResult {
    pub tx_hash: H256,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub error: Option<String>,
}

/// MatchSettled event payload, decoded from the settlement receipt.
/// Amounts are raw token units
#[derive(Debug, Clone)]
pub struct SettledEvent {
    pub match_id: u64,
    pub winner: Address,
    pub gross: U256,
    pub rake: U256,
    pub net: U256,
}

/// Outcome of one settleMatch call: the transaction plus the decoded
/// event when the receipt carried one
#[derive(Debug, Clone)]
pub struct SettleOutcome {
    pub tx: TxResult,
    pub event: Option<SettledEvent>,
}

/// Lifetime contract aggregates, amounts converted to stake currency
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStats {
    pub total_matches: u64,
    pub total_volume: Decimal,
    pub total_rake: Decimal,
    pub available_liquidity: Decimal,
}
