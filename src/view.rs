use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};
use ulid::Ulid;

use crate::listener::{self, Backoff, ListenerHandle};
use crate::model::ViewFilter;
use crate::push::PushTransport;
use crate::sync::{FetchOutcome, ReservationSync, Snapshot, SyncError};

/// One mounted reservation list: a store kept in sync with the backend for
/// a single filter, plus the push listener scoped to it.
pub struct ReservationView {
    sync: Arc<ReservationSync>,
    transport: Arc<dyn PushTransport>,
    filter: ViewFilter,
    backoff: Backoff,
    listener: Option<ListenerHandle>,
}

impl ReservationView {
    /// Start listening, then load the list. A failed initial load is
    /// reported through the notice hub; the view stays mounted.
    pub async fn mount(
        sync: Arc<ReservationSync>,
        transport: Arc<dyn PushTransport>,
        filter: ViewFilter,
    ) -> Self {
        Self::mount_with_backoff(sync, transport, filter, Backoff::default()).await
    }

    pub async fn mount_with_backoff(
        sync: Arc<ReservationSync>,
        transport: Arc<dyn PushTransport>,
        filter: ViewFilter,
        backoff: Backoff,
    ) -> Self {
        let mut view = Self {
            sync,
            transport,
            filter,
            backoff,
            listener: None,
        };
        view.start_listener();
        info!("view mounted for {}", view.filter);
        if let Err(e) = view.refresh().await {
            // Already raised through the notice hub.
            debug!("initial load for {} failed: {e}", view.filter);
        }
        view
    }

    fn start_listener(&mut self) {
        self.listener = Some(listener::spawn_with_backoff(
            self.sync.clone(),
            self.transport.clone(),
            self.filter.clone(),
            self.backoff.clone(),
        ));
    }

    /// Stop the push listener; the store keeps its last contents.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.shutdown().await;
        }
    }

    /// Re-scope the view. The old listener is fully stopped before the new
    /// one starts, and nothing from the old scope stays visible.
    pub async fn set_filter(&mut self, filter: ViewFilter) -> Result<FetchOutcome, SyncError> {
        if filter == self.filter {
            return Ok(FetchOutcome::Applied {
                count: self.sync.store().len(),
            });
        }
        self.stop().await;
        self.sync.clear();
        info!("view re-scoped from {} to {}", self.filter, filter);
        self.filter = filter;
        self.start_listener();
        self.refresh().await
    }

    pub async fn refresh(&self) -> Result<FetchOutcome, SyncError> {
        self.sync.fetch(&self.filter).await
    }

    pub async fn confirm(&self, id: &str) -> Result<(), SyncError> {
        self.sync.confirm(id).await
    }

    pub async fn cancel(&self, id: &str) -> Result<(), SyncError> {
        self.sync.cancel(id).await
    }

    pub fn reservations(&self) -> Snapshot {
        self.sync.store().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.sync.store().subscribe()
    }

    pub fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    pub fn sync(&self) -> &Arc<ReservationSync> {
        &self.sync
    }

    pub fn listener_id(&self) -> Option<Ulid> {
        self.listener.as_ref().map(ListenerHandle::id)
    }

    pub async fn unmount(mut self) {
        self.stop().await;
        info!("view unmounted for {}", self.filter);
    }
}
