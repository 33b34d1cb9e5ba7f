use rust_decimal::Decimal;
use serde::Deserialize;

use crate::blockchain::LedgerClient;
use crate::services::settlement::MAX_RAKE_BPS;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_port")]
    pub port: u16,

    // Optional. Without it the server runs with no match history
    #[serde(default)]
    pub database_url: Option<String>,

    // Queue terms (comma-separated strings, e.g. "1,5,10")
    #[serde(default = "default_stake_tiers")]
    pub stake_tiers: String,

    #[serde(default = "default_supported_assets")]
    pub supported_assets: String,

    // Match timing
    #[serde(default = "default_match_duration_secs")]
    pub match_duration_secs: u64,

    #[serde(default = "default_accept_timeout_secs")]
    pub accept_timeout_secs: u64,

    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    // Price feed settings
    #[serde(default = "default_price_feed_url")]
    pub price_feed_url: String,

    #[serde(default = "default_price_feed_timeout_ms")]
    pub price_feed_timeout_ms: u64,

    #[serde(default = "default_price_cache_ms")]
    pub price_cache_ms: u64,

    // Ledger settings (all optional; settlements are simulated without them)
    #[serde(default)]
    pub ledger_rpc_url: Option<String>,

    #[serde(default)]
    pub ledger_contract_address: Option<String>,

    #[serde(default)]
    pub ledger_operator_key: Option<String>,

    #[serde(default = "default_ledger_chain_id")]
    pub ledger_chain_id: u64,

    #[serde(default = "default_rake_bps")]
    pub rake_bps: u32,

    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,

    #[serde(default = "default_explorer_base_url")]
    pub explorer_base_url: String,

    // Dead connection sweep interval
    #[serde(default = "default_registry_sweep_secs")]
    pub registry_sweep_secs: u64,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_stake_tiers() -> String {
    "1,5,10,25,50,100".to_string()
}

fn default_supported_assets() -> String {
    "BTC/USD,ETH/USD,SOL/USD".to_string()
}

fn default_match_duration_secs() -> u64 {
    60
}

fn default_accept_timeout_secs() -> u64 {
    10
}

fn default_settle_delay_secs() -> u64 {
    3 // short grace so clients render the result before payout events arrive
}

fn default_price_feed_url() -> String {
    // Price sidecar; any service exposing GET /v1/prices/{symbol}
    "http://127.0.0.1:8090".to_string()
}

fn default_price_feed_timeout_ms() -> u64 {
    2500
}

fn default_price_cache_ms() -> u64 {
    5000 // 5 second reuse window
}

fn default_ledger_chain_id() -> u64 {
    42161 // Arbitrum One
}

fn default_rake_bps() -> u32 {
    250 // 2.5%
}

fn default_token_decimals() -> u32 {
    6 // USDT / USDC
}

fn default_explorer_base_url() -> String {
    "https://arbiscan.io".to_string()
}

fn default_registry_sweep_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    /// Get supported stake tiers as a vector
    pub fn get_stake_tiers(&self) -> Vec<Decimal> {
        self.stake_tiers
            .split(',')
            .filter_map(|s| s.trim().parse::<Decimal>().ok())
            .collect()
    }

    /// Check if a stake amount is one of the configured tiers
    pub fn is_valid_stake(&self, stake: Decimal) -> bool {
        self.get_stake_tiers().iter().any(|t| *t == stake)
    }

    /// Get supported price pairs as a vector
    pub fn get_supported_assets(&self) -> Vec<String> {
        self.supported_assets
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Check if a price pair is supported
    pub fn is_supported_asset(&self, asset: &str) -> bool {
        let asset_upper = asset.to_uppercase();
        self.get_supported_assets().contains(&asset_upper)
    }

    /// Rake clamped to the protocol maximum
    pub fn effective_rake_bps(&self) -> u32 {
        self.rake_bps.min(MAX_RAKE_BPS)
    }

    /// Check if the escrow ledger is configured
    pub fn has_ledger_config(&self) -> bool {
        self.ledger_rpc_url.is_some() && self.ledger_contract_address.is_some()
    }

    /// Create a LedgerClient from configured RPC and contract settings.
    /// Read-only when no operator key is set
    pub fn create_ledger_client(&self) -> Option<LedgerClient> {
        let rpc_url = self.ledger_rpc_url.as_deref()?;
        let contract = self.ledger_contract_address.as_deref()?;

        let result = match self.ledger_operator_key.as_deref() {
            Some(key) if !key.is_empty() => LedgerClient::new_with_signer(
                rpc_url,
                key,
                contract,
                self.ledger_chain_id,
                self.token_decimals,
            ),
            _ => LedgerClient::new(rpc_url, contract, self.ledger_chain_id, self.token_decimals),
        };

        match result {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!("Failed to create ledger client: {}", e);
                None
            }
        }
    }
}
