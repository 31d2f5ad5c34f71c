mod error;
mod fetch;
mod mutations;
mod store;

pub use error::{ErrorKind, SyncError};
pub use fetch::FetchOutcome;
pub use store::{ReservationStore, Snapshot};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::backend::ReservationBackend;
use crate::notify::NoticeHub;

/// Reconciliation core for one view scope: the store, the backend it is
/// filled from, and the notices raised along the way.
///
/// Fetch and status-change operations live in `fetch.rs` and
/// `mutations.rs`. All entry points take `&self`; the store is the only
/// mutable state and is written in whole snapshots.
pub struct ReservationSync {
    store: ReservationStore,
    backend: Arc<dyn ReservationBackend>,
    notices: Arc<NoticeHub>,
    request_timeout: Duration,
    /// Sequence number of the most recently issued fetch.
    issued: AtomicU64,
    /// Sequence number of the newest response written to the store, or of
    /// the last `clear()`. Responses at or below it are stale.
    applied: AtomicU64,
}

impl ReservationSync {
    pub fn new(
        backend: Arc<dyn ReservationBackend>,
        notices: Arc<NoticeHub>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store: ReservationStore::new(),
            backend,
            notices,
            request_timeout,
            issued: AtomicU64::new(0),
            applied: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &ReservationStore {
        &self.store
    }

    pub fn notices(&self) -> &Arc<NoticeHub> {
        &self.notices
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Drop everything shown, and make any in-flight fetch stale so its
    /// response cannot repopulate the store.
    pub fn clear(&self) {
        self.store.replace_all_if(Vec::new(), || {
            let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            self.applied.store(seq, Ordering::SeqCst);
            true
        });
    }

    /// Whether a response for fetch `seq` may still be written. Called
    /// under the store's write lock, which orders it against `clear()` and
    /// other responses; on success the watermark moves to `seq`.
    fn claim_response(&self, seq: u64) -> bool {
        if seq <= self.applied.load(Ordering::SeqCst) {
            return false;
        }
        self.applied.store(seq, Ordering::SeqCst);
        true
    }

    /// Run one backend call under the request timeout.
    pub(super) async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.request_timeout)),
        }
    }
}
