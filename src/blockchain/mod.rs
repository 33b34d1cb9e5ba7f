//! Ledger integration for duel stake escrow
//!
//! This module provides:
//! - Contract bindings for the DuelLedger escrow contract
//! - Ledger client for settlement submission and contract reads
//! - Transaction result types

pub mod client;
pub mod types;

pub use client::LedgerClient;
pub use types::{LedgerStats, SettleOutcome, SettledEvent, TxResult, TxStatus};
