use std::sync::Arc;

use tokio::sync::watch;

use crate::model::{LocalState, Reservation};

pub type Snapshot = Arc<Vec<Reservation>>;

/// Ordered reservations visible for one view scope.
///
/// Contents live behind a `watch` channel as an `Arc`'d vector. Every write
/// publishes a whole new snapshot (copy-on-write), so a reader holding a
/// snapshot never sees a half-applied update.
pub struct ReservationStore {
    tx: watch::Sender<Snapshot>,
}

impl Default for ReservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self { tx }
    }

    // ── Writes ───────────────────────────────────────────────

    /// Swap the full contents in one step.
    pub fn replace_all(&self, records: Vec<Reservation>) {
        self.tx.send_replace(Arc::new(records));
    }

    /// Swap the full contents only if `still_current` holds at swap time.
    pub(crate) fn replace_all_if(
        &self,
        records: Vec<Reservation>,
        still_current: impl FnOnce() -> bool,
    ) -> bool {
        self.tx.send_if_modified(move |current| {
            if !still_current() {
                return false;
            }
            *current = Arc::new(records);
            true
        })
    }

    /// Remove one record. Absent ids are a no-op and return false.
    pub fn remove_by_id(&self, id: &str) -> bool {
        self.tx.send_if_modified(|current| {
            let Some(pos) = current.iter().position(|r| r.id == id) else {
                return false;
            };
            Arc::make_mut(current).remove(pos);
            true
        })
    }

    // ── Reads ────────────────────────────────────────────────

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<Reservation> {
        self.tx.borrow().iter().find(|r| r.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tx.borrow().iter().any(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn local_state(&self, id: &str) -> LocalState {
        self.tx
            .borrow()
            .iter()
            .find(|r| r.id == id)
            .map_or(LocalState::Removed, |r| r.status.into())
    }

    /// Change feed: each received value is a complete snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::reservation;
    use crate::model::ReservationStatus::*;

    fn ids(store: &ReservationStore) -> Vec<String> {
        store.snapshot().iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn replace_all_discards_previous_contents() {
        let store = ReservationStore::new();
        store.replace_all(vec![
            reservation("r1", "c1", Pending),
            reservation("r2", "c1", Pending),
            reservation("r3", "c1", Pending),
        ]);
        store.replace_all(vec![reservation("r9", "c1", Pending)]);
        assert_eq!(ids(&store), vec!["r9"]);

        store.replace_all(vec![]);
        assert!(store.is_empty());
    }

    #[test]
    fn replace_all_keeps_given_order() {
        let store = ReservationStore::new();
        store.replace_all(vec![
            reservation("b", "c1", Pending),
            reservation("c", "c1", Pending),
            reservation("a", "c1", Pending),
        ]);
        assert_eq!(ids(&store), vec!["b", "c", "a"]);
    }

    #[test]
    fn remove_absent_id_is_noop() {
        let store = ReservationStore::new();
        store.replace_all(vec![reservation("r1", "c1", Pending)]);
        let before = store.snapshot();
        assert!(!store.remove_by_id("nope"));
        assert_eq!(*store.snapshot(), *before);
        // No new snapshot was published either.
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn remove_keeps_order_of_the_rest() {
        let store = ReservationStore::new();
        store.replace_all(vec![
            reservation("r1", "c1", Pending),
            reservation("r2", "c1", Pending),
            reservation("r3", "c1", Pending),
        ]);
        assert!(store.remove_by_id("r2"));
        assert_eq!(ids(&store), vec!["r1", "r3"]);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_writes() {
        let store = ReservationStore::new();
        store.replace_all(vec![reservation("r1", "c1", Pending), reservation("r2", "c1", Pending)]);
        let held = store.snapshot();
        store.remove_by_id("r1");
        store.replace_all(vec![]);
        assert_eq!(held.len(), 2);
        assert_eq!(held[0].id, "r1");
    }

    #[test]
    fn replace_if_respects_condition() {
        let store = ReservationStore::new();
        store.replace_all(vec![reservation("r1", "c1", Pending)]);
        assert!(!store.replace_all_if(vec![], || false));
        assert_eq!(store.len(), 1);
        assert!(store.replace_all_if(vec![], || true));
        assert!(store.is_empty());
    }

    #[test]
    fn local_state_reports_removed_for_absent() {
        let store = ReservationStore::new();
        store.replace_all(vec![reservation("r1", "c1", Confirmed)]);
        assert_eq!(store.local_state("r1"), LocalState::Confirmed);
        assert_eq!(store.local_state("r2"), LocalState::Removed);
    }

    #[tokio::test]
    async fn subscribers_see_whole_snapshots() {
        let store = ReservationStore::new();
        let mut rx = store.subscribe();
        store.replace_all(vec![reservation("r1", "c1", Pending), reservation("r2", "c1", Pending)]);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 2);

        store.remove_by_id("r1");
        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id, "r2");
    }
}
