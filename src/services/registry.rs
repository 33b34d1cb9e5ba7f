//! Connection Registry
//!
//! Tracks every live WebSocket player keyed by player id. Players connect
//! anonymously under a generated id and may later bind a wallet, which
//! re-keys the entry to the lowercased address. Only the socket task that
//! owns a connection calls `promote` for it, so the remove-reinsert pair
//! never races with itself.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::gauge;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::websocket::ServerMessage;

pub struct ConnectedPlayer {
    pub player_id: String,
    /// Outbound channel drained by the player's socket task
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    /// Match the player is currently tied to, if any
    pub match_id: Option<Uuid>,
    /// Opaque client session tag, echoed into persistence
    pub session_ref: Option<String>,
    pub connected_at: DateTime<Utc>,
    /// Set once a wallet has been bound; promotion happens at most once
    pub promoted: bool,
}

pub struct ConnectionRegistry {
    players: DashMap<String, ConnectedPlayer>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
        }
    }

    pub fn register(&self, player_id: &str, sender: mpsc::UnboundedSender<ServerMessage>) {
        self.players.insert(
            player_id.to_string(),
            ConnectedPlayer {
                player_id: player_id.to_string(),
                sender,
                match_id: None,
                session_ref: None,
                connected_at: Utc::now(),
                promoted: false,
            },
        );
        self.update_gauge();
    }

    pub fn remove(&self, player_id: &str) -> Option<ConnectedPlayer> {
        let removed = self.players.remove(player_id).map(|(_, p)| p);
        self.update_gauge();
        removed
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn connected_count(&self) -> usize {
        self.players.len()
    }

    /// Queue a message to one player. False if the player is gone or their
    /// socket task has stopped draining
    pub fn send_to(&self, player_id: &str, msg: ServerMessage) -> bool {
        match self.players.get(player_id) {
            Some(player) => player.sender.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn set_match(&self, player_id: &str, match_id: Option<Uuid>) {
        if let Some(mut player) = self.players.get_mut(player_id) {
            player.match_id = match_id;
        }
    }

    pub fn match_of(&self, player_id: &str) -> Option<Uuid> {
        self.players.get(player_id).and_then(|p| p.match_id)
    }

    pub fn set_session_ref(&self, player_id: &str, session_ref: Option<String>) {
        if let Some(mut player) = self.players.get_mut(player_id) {
            if session_ref.is_some() {
                player.session_ref = session_ref;
            }
        }
    }

    pub fn session_ref(&self, player_id: &str) -> Option<String> {
        self.players.get(player_id).and_then(|p| p.session_ref.clone())
    }

    /// Re-key an anonymous entry to a wallet address, preserving channel,
    /// match binding and session tag. Returns the id the caller should use
    /// from now on, or None if the entry is gone or the wallet is already
    /// connected elsewhere.
    pub fn promote(&self, current_id: &str, wallet_address: &str) -> Option<String> {
        let wallet = wallet_address.to_lowercase();
        if current_id == wallet {
            return Some(wallet);
        }
        if self.players.contains_key(&wallet) {
            warn!("Wallet {} already connected, keeping {} anonymous", wallet, current_id);
            return None;
        }

        let (_, mut entry) = self.players.remove(current_id)?;
        if entry.promoted {
            // a bound identity never re-keys again
            let keep = entry.player_id.clone();
            self.players.insert(keep.clone(), entry);
            return None;
        }

        entry.player_id = wallet.clone();
        entry.promoted = true;
        self.players.insert(wallet.clone(), entry);
        Some(wallet)
    }

    /// Drop entries whose socket task is gone. Returns how many were removed
    pub fn prune(&self) -> usize {
        let before = self.players.len();
        self.players.retain(|_, player| !player.sender.is_closed());
        let removed = before - self.players.len();
        self.update_gauge();
        removed
    }

    fn update_gauge(&self) {
        gauge!("duel_connected_players").set(self.players.len() as f64);
    }
}
