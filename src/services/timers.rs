//! Match Timer Registry
//!
//! Every deferred transition (accept timeout, round clock, settlement
//! grace) runs as a spawned sleep task registered under (match id, kind).
//! Cancelling a match aborts its pending tasks so a dead match never
//! fires a late transition. Scheduling the same key twice replaces the
//! earlier timer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Proposal acceptance window
    AcceptTimeout,
    /// Round clock, fires match completion
    MatchDuration,
    /// Grace between result broadcast and payout
    SettleDelay,
}

const ALL_KINDS: [TimerKind; 3] = [
    TimerKind::AcceptTimeout,
    TimerKind::MatchDuration,
    TimerKind::SettleDelay,
];

pub struct TimerRegistry {
    timers: DashMap<(Uuid, TimerKind), JoinHandle<()>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self {
            timers: DashMap::new(),
        }
    }

    /// Arm a timer that runs `f` after `delay` unless cancelled first
    pub fn schedule<F, Fut>(self: &Arc<Self>, match_id: Uuid, kind: TimerKind, delay: Duration, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel(match_id, kind);

        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.timers.remove(&(match_id, kind));
            f().await;
        });
        self.timers.insert((match_id, kind), handle);
    }

    /// Abort a pending timer. False if nothing was armed
    pub fn cancel(&self, match_id: Uuid, kind: TimerKind) -> bool {
        match self.timers.remove(&(match_id, kind)) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all_for(&self, match_id: Uuid) {
        for kind in ALL_KINDS {
            self.cancel(match_id, kind);
        }
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}
