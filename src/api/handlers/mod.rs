//! API Handlers for the duel service

pub mod ledger;
pub mod matches;
pub mod players;
pub mod stats;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
