use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, warn};

use crate::model::{Reservation, ViewFilter};
use crate::notify::Notice;
use crate::observability::{FETCHES_TOTAL, FETCH_DURATION_SECONDS, RECORDS_OUT_OF_SCOPE_TOTAL};

use super::{ReservationSync, SyncError};

/// What a successful fetch did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The store now holds exactly these many records, in backend order.
    Applied { count: usize },
    /// A newer fetch already wrote the store, or `clear()` ran, while this
    /// one was in flight; the response was discarded and the store left alone.
    Superseded,
}

impl ReservationSync {
    /// Query the backend for `filter` and replace the store with the result.
    ///
    /// Exactly one backend call. On failure the store is untouched and a
    /// `FetchFailed` notice is raised. Safe to call repeatedly: among the
    /// fetches that succeed, the last issued wins. A failed fetch never
    /// invalidates an earlier one that is still in flight.
    pub async fn fetch(&self, filter: &ViewFilter) -> Result<FetchOutcome, SyncError> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        let result = self.bounded(self.backend.list_reservations(filter)).await;
        metrics::histogram!(FETCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                warn!("fetch {filter} failed: {e}");
                metrics::counter!(FETCHES_TOTAL, "outcome" => e.label()).increment(1);
                self.notices.send(Notice::FetchFailed { error: e.to_string() });
                return Err(e);
            }
        };

        let records = retain_in_scope(filter, records);
        let count = records.len();
        let applied = self
            .store
            .replace_all_if(records, || self.claim_response(seq));

        if applied {
            debug!("fetch {filter} applied {count} records");
            metrics::counter!(FETCHES_TOTAL, "outcome" => "applied").increment(1);
            Ok(FetchOutcome::Applied { count })
        } else {
            debug!("fetch #{seq} for {filter} superseded, response discarded");
            metrics::counter!(FETCHES_TOTAL, "outcome" => "superseded").increment(1);
            Ok(FetchOutcome::Superseded)
        }
    }
}

/// Drop records the backend should not have returned for `filter`,
/// keeping the order of the rest.
fn retain_in_scope(filter: &ViewFilter, mut records: Vec<Reservation>) -> Vec<Reservation> {
    let before = records.len();
    records.retain(|r| filter.admits(r));
    let dropped = before - records.len();
    if dropped > 0 {
        warn!("backend returned {dropped} records outside {filter}; dropped");
        metrics::counter!(RECORDS_OUT_OF_SCOPE_TOTAL).increment(dropped as u64);
    }
    records
}
