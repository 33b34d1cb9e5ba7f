//! In-Memory Match Store
//!
//! Single source of truth for live match records. All state transitions go
//! through `update`, which runs the mutation while holding the entry lock,
//! so concurrent handlers and timer callbacks never interleave partial
//! writes. Callers that awaited between reading and writing must re-check
//! the status inside their closure.

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::matches::{Match, MatchStatus};

#[derive(Default)]
pub struct MatchStore {
    matches: DashMap<Uuid, Match>,
}

impl MatchStore {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn insert(&self, m: Match) {
        self.matches.insert(m.id, m);
    }

    /// Snapshot of a match, cloned out of the map
    pub fn get(&self, id: &Uuid) -> Option<Match> {
        self.matches.get(id).map(|entry| entry.clone())
    }

    /// Run a mutation under the entry lock. The closure must not block or await
    pub fn update<T>(&self, id: &Uuid, f: impl FnOnce(&mut Match) -> T) -> Option<T> {
        self.matches.get_mut(id).map(|mut entry| f(&mut entry))
    }

    pub fn remove(&self, id: &Uuid) -> Option<Match> {
        self.matches.remove(id).map(|(_, m)| m)
    }

    /// Remove only when the predicate holds, atomically with the check
    pub fn remove_if(&self, id: &Uuid, pred: impl FnOnce(&Match) -> bool) -> Option<Match> {
        self.matches.remove_if(id, |_, m| pred(m)).map(|(_, m)| m)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn count_with_status(&self, status: MatchStatus) -> usize {
        self.matches
            .iter()
            .filter(|entry| entry.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matches::GameType;
    use rust_decimal_macros::dec;

    fn waiting_match() -> Match {
        Match::new("anon-11112222", dec!(5), GameType::Prediction, "BTC/USD", 60)
    }

    #[test]
    fn test_insert_get_remove() {
        let store = MatchStore::new();
        let m = waiting_match();
        let id = m.id;

        store.insert(m);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).unwrap().player_a, "anon-11112222");

        let removed = store.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(store.is_empty());
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_update_mutates_in_place() {
        let store = MatchStore::new();
        let m = waiting_match();
        let id = m.id;
        store.insert(m);

        let new_status = store.update(&id, |m| {
            m.status = MatchStatus::Proposed;
            m.status
        });
        assert_eq!(new_status, Some(MatchStatus::Proposed));
        assert_eq!(store.get(&id).unwrap().status, MatchStatus::Proposed);

        assert!(store.update(&Uuid::new_v4(), |_| ()).is_none());
    }

    #[test]
    fn test_remove_if_respects_predicate() {
        let store = MatchStore::new();
        let m = waiting_match();
        let id = m.id;
        store.insert(m);

        assert!(store
            .remove_if(&id, |m| m.status == MatchStatus::Active)
            .is_none());
        assert_eq!(store.len(), 1);

        assert!(store
            .remove_if(&id, |m| m.status == MatchStatus::Waiting)
            .is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_count_with_status() {
        let store = MatchStore::new();
        store.insert(waiting_match());
        let mut active = waiting_match();
        active.status = MatchStatus::Active;
        store.insert(active);

        assert_eq!(store.count_with_status(MatchStatus::Waiting), 1);
        assert_eq!(store.count_with_status(MatchStatus::Active), 1);
        assert_eq!(store.count_with_status(MatchStatus::Settled), 0);
    }
}
