//! WebSocket layer: the real-time duel protocol

pub mod handler;
pub mod routes;

pub use handler::{ClientMessage, ServerMessage};
