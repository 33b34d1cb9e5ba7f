//! On-Chain Settlement Bridge
//!
//! Pays out completed duels through the escrow ledger:
//! 1. Players deposit stakes into the ledger before queueing
//! 2. Backend runs the match and decides the winner
//! 3. Operator submits settleMatch with the pot and rake
//! 4. The contract splits rake and pays the winner (or refunds a draw)

mod service;
mod types;

pub use service::SettlementBridge;
pub use types::*;
