use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;
use tracing::info;

use crate::backend::ReservationBackend;
use crate::listener::Backoff;
use crate::model::{ReservationStatus, StatusSet, ViewFilter};
use crate::notify::NoticeHub;
use crate::push::PushTransport;
use crate::sync::{ReservationSync, SyncError};
use crate::view::ReservationView;

/// The booking screens of the company dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewKind {
    CurrentBookings,
    RequestHistory,
    PendingRequests,
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [
        ViewKind::CurrentBookings,
        ViewKind::RequestHistory,
        ViewKind::PendingRequests,
    ];

    pub fn statuses(&self) -> StatusSet {
        match self {
            ViewKind::CurrentBookings => StatusSet::only(ReservationStatus::Confirmed),
            ViewKind::RequestHistory => {
                StatusSet::of([ReservationStatus::Cancelled, ReservationStatus::Confirmed])
            }
            ViewKind::PendingRequests => StatusSet::only(ReservationStatus::Pending),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ViewKind::CurrentBookings => "Current Bookings",
            ViewKind::RequestHistory => "Request History",
            ViewKind::PendingRequests => "Pending Requests",
        }
    }

    /// Accepts `current`, `history`, `pending` (any case).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" | "current_bookings" => Some(ViewKind::CurrentBookings),
            "history" | "request_history" => Some(ViewKind::RequestHistory),
            "pending" | "pending_requests" => Some(ViewKind::PendingRequests),
            _ => None,
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Counters shown on the company overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub current_bookings: usize,
    pub pending_requests: usize,
    pub booking_history: usize,
}

struct MountedView {
    view: Arc<Mutex<ReservationView>>,
    sync: Arc<ReservationSync>,
}

/// Booking views of one company. Each kind is mounted lazily, at most
/// once, with its own store and push listener.
pub struct Dashboard {
    company_id: String,
    backend: Arc<dyn ReservationBackend>,
    transport: Arc<dyn PushTransport>,
    notices: Arc<NoticeHub>,
    request_timeout: Duration,
    backoff: Backoff,
    views: DashMap<ViewKind, MountedView>,
}

impl Dashboard {
    pub fn new(
        company_id: impl Into<String>,
        backend: Arc<dyn ReservationBackend>,
        transport: Arc<dyn PushTransport>,
        notices: Arc<NoticeHub>,
        request_timeout: Duration,
    ) -> Result<Self, SyncError> {
        let company_id = company_id.into();
        // Validates the id once, up front.
        ViewFilter::new(company_id.clone(), ViewKind::PendingRequests.statuses())?;
        Ok(Self {
            company_id: company_id.trim().to_string(),
            backend,
            transport,
            notices,
            request_timeout,
            backoff: Backoff::default(),
            views: DashMap::new(),
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn notices(&self) -> &Arc<NoticeHub> {
        &self.notices
    }

    /// Get or lazily mount the view for `kind`.
    pub async fn open(&self, kind: ViewKind) -> Result<Arc<Mutex<ReservationView>>, SyncError> {
        if let Some(mounted) = self.views.get(&kind) {
            return Ok(mounted.view.clone());
        }

        let filter = ViewFilter::new(self.company_id.clone(), kind.statuses())?;
        let sync = Arc::new(ReservationSync::new(
            self.backend.clone(),
            self.notices.clone(),
            self.request_timeout,
        ));
        let view = ReservationView::mount_with_backoff(
            sync.clone(),
            self.transport.clone(),
            filter,
            self.backoff.clone(),
        )
        .await;

        // Another caller may have mounted the same kind while we awaited.
        let (winner, loser) = match self.views.entry(kind) {
            Entry::Occupied(existing) => (existing.get().view.clone(), Some(view)),
            Entry::Vacant(slot) => {
                let view = Arc::new(Mutex::new(view));
                slot.insert(MountedView {
                    view: view.clone(),
                    sync,
                });
                (view, None)
            }
        };
        if let Some(duplicate) = loser {
            duplicate.unmount().await;
        } else {
            info!("dashboard {}: opened {kind}", self.company_id);
        }
        Ok(winner)
    }

    pub async fn close(&self, kind: ViewKind) -> bool {
        let Some((_, mounted)) = self.views.remove(&kind) else {
            return false;
        };
        unmount_shared(mounted.view).await;
        info!("dashboard {}: closed {kind}", self.company_id);
        true
    }

    pub fn open_views(&self) -> Vec<ViewKind> {
        let mut kinds: Vec<ViewKind> = self.views.iter().map(|e| *e.key()).collect();
        kinds.sort();
        kinds
    }

    /// Counts taken from the mounted views' stores; unmounted views count 0.
    pub fn stats(&self) -> DashboardStats {
        let len = |kind: ViewKind| self.views.get(&kind).map_or(0, |m| m.sync.store().len());
        DashboardStats {
            current_bookings: len(ViewKind::CurrentBookings),
            pending_requests: len(ViewKind::PendingRequests),
            booking_history: len(ViewKind::RequestHistory),
        }
    }

    pub async fn shutdown(&self) {
        for kind in ViewKind::ALL {
            self.close(kind).await;
        }
    }
}

/// Unmount a view that may still be shared with a caller of `open`.
async fn unmount_shared(view: Arc<Mutex<ReservationView>>) {
    match Arc::try_unwrap(view) {
        Ok(view) => view.into_inner().unmount().await,
        // Still referenced elsewhere: stop its listener in place.
        Err(shared) => shared.lock().await.stop().await,
    }
}
