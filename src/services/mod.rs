//! Business logic services

pub mod engine;
pub mod match_store;
pub mod matchmaking;
pub mod oracle;
pub mod orchestrator;
pub mod registry;
pub mod settlement;
pub mod timers;
