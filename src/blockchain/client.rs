//! Ledger client for the duel escrow contract
//!
//! Thin wrapper over the on-chain ledger that escrows stakes and pays
//! winners. Read paths work with a bare provider; settleMatch requires
//! the operator signer. The contract does its own rake accounting, the
//! client just forwards amounts in raw token units and decodes the
//! MatchSettled event out of the receipt.

use std::sync::Arc;

use ethers::abi::RawLog;
use ethers::contract::EthLogDecode;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, TransactionReceipt, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::blockchain::types::{LedgerStats, SettledEvent, SettleOutcome, TxResult, TxStatus};

type SignerMiddleware = ethers::middleware::SignerMiddleware<Provider<Http>, LocalWallet>;

abigen!(
    DuelLedger,
    r#"[
        function deposit(uint256 amount) external
        function balanceOf(address account) external view returns (uint256)
        function availableLiquidity() external view returns (uint256)
        function settleMatch(uint64 matchId, address winner, uint256 grossAmount, uint256 rakeBps) external
        function getStats() external view returns (uint256, uint256, uint256, uint256)
        event MatchSettled(uint64 indexed matchId, address indexed winner, uint256 gross, uint256 rake, uint256 net)
    ]"#
);

/// Client for the duel escrow ledger
#[derive(Clone)]
pub struct LedgerClient {
    provider: Arc<Provider<Http>>,
    signer: Option<Arc<SignerMiddleware>>,
    contract_address: Address,
    chain_id: u64,
    token_decimals: u32,
}

impl LedgerClient {
    /// Create a new ledger client (read-only)
    pub fn new(
        rpc_url: &str,
        contract_address: &str,
        chain_id: u64,
        token_decimals: u32,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let contract_address: Address = contract_address.parse()?;
        Ok(Self {
            provider: Arc::new(provider),
            signer: None,
            contract_address,
            chain_id,
            token_decimals,
        })
    }

    /// Create a new ledger client with the operator signer
    pub fn new_with_signer(
        rpc_url: &str,
        private_key: &str,
        contract_address: &str,
        chain_id: u64,
        token_decimals: u32,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let contract_address: Address = contract_address.parse()?;
        let wallet: LocalWallet = private_key.parse::<LocalWallet>()?.with_chain_id(chain_id);
        let signer = SignerMiddleware::new(provider.clone(), wallet);

        Ok(Self {
            provider: Arc::new(provider),
            signer: Some(Arc::new(signer)),
            contract_address,
            chain_id,
            token_decimals,
        })
    }

    fn get_signer(&self) -> Result<Arc<SignerMiddleware>, &'static str> {
        self.signer.clone().ok_or("No signer configured")
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    pub fn operator_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Ledger contract instance (read-only)
    fn ledger(&self) -> DuelLedger<Provider<Http>> {
        DuelLedger::new(self.contract_address, self.provider.clone())
    }

    // ============ Read Methods ============

    /// Tokens the contract can currently pay out
    pub async fn available_liquidity(
        &self,
    ) -> Result<U256, Box<dyn std::error::Error + Send + Sync>> {
        let liquidity = self.ledger().available_liquidity().call().await?;
        Ok(liquidity)
    }

    pub async fn balance_of(
        &self,
        account: Address,
    ) -> Result<U256, Box<dyn std::error::Error + Send + Sync>> {
        let balance = self.ledger().balance_of(account).call().await?;
        Ok(balance)
    }

    /// Lifetime contract aggregates
    pub async fn get_stats(&self) -> Result<LedgerStats, Box<dyn std::error::Error + Send + Sync>> {
        let (matches, volume, rake, liquidity) = self.ledger().get_stats().call().await?;
        Ok(LedgerStats {
            total_matches: matches.as_u64(),
            total_volume: self.units_to_decimal(volume),
            total_rake: self.units_to_decimal(rake),
            available_liquidity: self.units_to_decimal(liquidity),
        })
    }

    // ============ Write Methods ============

    /// Pay out one match. `gross` is the full pot in raw token units,
    /// the contract splits the rake internally
    pub async fn settle_match(
        &self,
        match_id: u64,
        winner: Address,
        gross: U256,
        rake_bps: u32,
    ) -> Result<SettleOutcome, Box<dyn std::error::Error + Send + Sync>> {
        let signer = self.get_signer()?;
        let contract = DuelLedger::new(self.contract_address, signer);
        let call = contract.settle_match(match_id, winner, gross, U256::from(rake_bps));
        let pending_tx = call.send().await?;
        let receipt = pending_tx.await?;

        let event = receipt.as_ref().and_then(Self::decode_settled_event);
        Ok(SettleOutcome {
            tx: self.parse_receipt(receipt),
            event,
        })
    }

    // ============ Conversions ============

    /// Stake currency -> raw token units, truncating excess precision
    pub fn decimal_to_units(&self, amount: Decimal) -> U256 {
        let factor = Decimal::from(10u64.pow(self.token_decimals));
        let scaled = (amount * factor).trunc();
        U256::from(scaled.to_u128().unwrap_or(0))
    }

    /// Raw token units -> stake currency
    pub fn units_to_decimal(&self, units: U256) -> Decimal {
        // clamp: anything past u128 is far beyond real token supplies
        let capped = units.min(U256::from(u128::MAX >> 1)).low_u128();
        Decimal::from_i128_with_scale(capped as i128, self.token_decimals).normalize()
    }

    // ============ Helpers ============

    fn decode_settled_event(receipt: &TransactionReceipt) -> Option<SettledEvent> {
        for log in &receipt.logs {
            let raw = RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            };
            if let Ok(ev) = <MatchSettledFilter as EthLogDecode>::decode_log(&raw) {
                return Some(SettledEvent {
                    match_id: ev.match_id,
                    winner: ev.winner,
                    gross: ev.gross,
                    rake: ev.rake,
                    net: ev.net,
                });
            }
        }
        None
    }

    fn parse_receipt(&self, receipt: Option<TransactionReceipt>) -> TxResult {
        match receipt {
            Some(r) => TxResult {
                tx_hash: r.transaction_hash,
                status: if r.status == Some(1.into()) {
                    TxStatus::Confirmed
                } else {
                    TxStatus::Failed
                },
                block_number: r.block_number.map(|b| b.as_u64()),
                gas_used: r.gas_used,
                error: None,
            },
            None => TxResult {
                tx_hash: H256::zero(),
                status: TxStatus::Pending,
                block_number: None,
                gas_used: None,
                error: Some("No receipt".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn read_only_client() -> LedgerClient {
        LedgerClient::new(
            "http://localhost:8545",
            "0x1111111111111111111111111111111111111111",
            42161,
            6,
        )
        .unwrap()
    }

    #[test]
    fn test_unit_conversions() {
        let client = read_only_client();

        assert_eq!(client.decimal_to_units(dec!(20)), U256::from(20_000_000u64));
        assert_eq!(client.decimal_to_units(dec!(0.5)), U256::from(500_000u64));
        // sub-unit precision truncates
        assert_eq!(
            client.decimal_to_units(dec!(1.0000019)),
            U256::from(1_000_001u64)
        );

        assert_eq!(client.units_to_decimal(U256::from(19_500_000u64)), dec!(19.5));
        assert_eq!(client.units_to_decimal(U256::zero()), Decimal::ZERO);
    }

    #[test]
    fn test_signer_gating() {
        let client = read_only_client();
        assert!(!client.has_signer());
        assert!(client.operator_address().is_none());
        assert!(client.get_signer().is_err());
    }

    #[test]
    fn test_missing_receipt_is_pending() {
        let client = read_only_client();
        let result = client.parse_receipt(None);
        assert_eq!(result.status, TxStatus::Pending);
        assert_eq!(result.tx_hash, H256::zero());
        assert!(result.error.is_some());
    }
}
