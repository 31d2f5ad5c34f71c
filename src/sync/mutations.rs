use tracing::{info, warn};

use crate::limits::MAX_RESERVATION_ID_LEN;
use crate::model::ReservationStatus;
use crate::notify::Notice;
use crate::observability::MUTATIONS_TOTAL;

use super::{ReservationSync, SyncError};

impl ReservationSync {
    /// Move a PENDING reservation to CONFIRMED or CANCELLED.
    ///
    /// One backend call, no retry. On success the reservation is removed
    /// from the store without re-fetching; on failure the store is
    /// untouched so the user can try again.
    pub async fn set_status(&self, id: &str, target: ReservationStatus) -> Result<(), SyncError> {
        validate_id(id)?;
        if target == ReservationStatus::Pending {
            return Err(SyncError::InvalidInput("target status must be CONFIRMED or CANCELLED"));
        }
        if let Some(current) = self.store.get(id)
            && !current.status.can_transition_to(target)
        {
            return Err(SyncError::InvalidTransition {
                id: id.to_string(),
                status: current.status,
            });
        }

        match self.bounded(self.backend.update_status(id, target)).await {
            Ok(()) => {
                self.store.remove_by_id(id);
                info!("reservation {id} -> {target}");
                metrics::counter!(MUTATIONS_TOTAL, "target" => target.as_str(), "outcome" => "ok")
                    .increment(1);
                self.notices.send(Notice::StatusUpdated {
                    id: id.to_string(),
                    status: target,
                });
                Ok(())
            }
            Err(e) => {
                warn!("reservation {id} -> {target} failed: {e}");
                metrics::counter!(MUTATIONS_TOTAL, "target" => target.as_str(), "outcome" => e.label())
                    .increment(1);
                self.notices.send(Notice::UpdateFailed {
                    id: id.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub async fn confirm(&self, id: &str) -> Result<(), SyncError> {
        self.set_status(id, ReservationStatus::Confirmed).await
    }

    pub async fn cancel(&self, id: &str) -> Result<(), SyncError> {
        self.set_status(id, ReservationStatus::Cancelled).await
    }
}

/// Any other string is a valid id; the backend encodes it as one path
/// segment. Dot segments would be dropped from the url.
fn validate_id(id: &str) -> Result<(), SyncError> {
    if id.is_empty() {
        return Err(SyncError::InvalidInput("reservation id must not be empty"));
    }
    if id.len() > MAX_RESERVATION_ID_LEN {
        return Err(SyncError::InvalidInput("reservation id too long"));
    }
    if id == "." || id == ".." {
        return Err(SyncError::InvalidInput("reservation id cannot be a dot segment"));
    }
    Ok(())
}
