use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::{RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS};
use crate::model::{PushEvent, ReservationHint, ViewFilter};
use crate::notify::Notice;
use crate::observability::{LISTENERS_ACTIVE, PUSH_EVENTS_TOTAL, PUSH_RECONNECTS_TOTAL};
use crate::push::PushTransport;
use crate::sync::{ReservationSync, SyncError};

/// Exponential reconnect delay: doubles per failure up to `max`, back to
/// `base` after a successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            Duration::from_millis(RECONNECT_MAX_DELAY_MS),
        )
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, next: base }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.checked_mul(2).unwrap_or(self.max).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.base;
    }
}

/// Owner of one running listener task.
///
/// `shutdown` cancels and joins the task; dropping the handle cancels it
/// without waiting.
pub struct ListenerHandle {
    id: Ulid,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("listener {} ended abnormally: {e}", self.id);
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Start a listener for `filter` with the default reconnect backoff.
pub fn spawn(
    sync: Arc<ReservationSync>,
    transport: Arc<dyn PushTransport>,
    filter: ViewFilter,
) -> ListenerHandle {
    spawn_with_backoff(sync, transport, filter, Backoff::default())
}

pub fn spawn_with_backoff(
    sync: Arc<ReservationSync>,
    transport: Arc<dyn PushTransport>,
    filter: ViewFilter,
    backoff: Backoff,
) -> ListenerHandle {
    let id = Ulid::new();
    let token = CancellationToken::new();
    let task = tokio::spawn(run_listener(id, sync, transport, filter, backoff, token.clone()));
    ListenerHandle {
        id,
        token,
        task: Some(task),
    }
}

/// Background task: hold one push connection for the view scope and turn
/// matching new-reservation events into fetches.
async fn run_listener(
    id: Ulid,
    sync: Arc<ReservationSync>,
    transport: Arc<dyn PushTransport>,
    filter: ViewFilter,
    mut backoff: Backoff,
    token: CancellationToken,
) {
    metrics::gauge!(LISTENERS_ACTIVE).increment(1.0);
    info!("listener {id} started for {filter}");
    let mut outage = false;

    loop {
        let connected = tokio::select! {
            _ = token.cancelled() => break,
            result = transport.connect() => result,
        };

        let lost = match connected {
            Ok(mut stream) => {
                backoff.reset();
                if outage {
                    sync.notices().send(Notice::Reconnected);
                    outage = false;
                }
                info!("listener {id} connected");

                let lost = loop {
                    let item = tokio::select! {
                        _ = token.cancelled() => break None,
                        item = stream.next() => item,
                    };
                    match item {
                        Some(Ok(PushEvent::NewReservation(reservation))) => {
                            let hint = ReservationHint::from(&reservation);
                            on_new_reservation(&sync, &filter, hint, &token).await;
                        }
                        Some(Ok(PushEvent::ReservationHint(hint))) => {
                            on_new_reservation(&sync, &filter, hint, &token).await;
                        }
                        Some(Ok(PushEvent::Other(name))) => {
                            debug!("listener {id} ignoring event {name:?}");
                            metrics::counter!(PUSH_EVENTS_TOTAL, "outcome" => "other").increment(1);
                        }
                        Some(Err(e)) => break Some(e),
                        None => break Some(SyncError::Connection("push stream ended".into())),
                    }
                };
                match lost {
                    Some(e) => e,
                    None => break,
                }
            }
            Err(e) => e,
        };

        warn!("listener {id} push channel unavailable: {lost}");
        if !outage {
            sync.notices().send(Notice::ConnectionLost { error: lost.to_string() });
            outage = true;
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        metrics::counter!(PUSH_RECONNECTS_TOTAL).increment(1);
    }

    metrics::gauge!(LISTENERS_ACTIVE).decrement(1.0);
    info!("listener {id} stopped");
}

/// Only the company decides whether the event is ours; the fetch brings
/// the record itself.
async fn on_new_reservation(
    sync: &ReservationSync,
    filter: &ViewFilter,
    hint: ReservationHint,
    token: &CancellationToken,
) {
    let id = hint.id.unwrap_or_default();
    if hint.company_id != filter.company_id() {
        debug!("ignoring reservation {id:?} of company {}", hint.company_id);
        metrics::counter!(PUSH_EVENTS_TOTAL, "outcome" => "ignored").increment(1);
        return;
    }

    metrics::counter!(PUSH_EVENTS_TOTAL, "outcome" => "matched").increment(1);
    sync.notices().send(Notice::NewReservation {
        id,
        car_model: hint.car_model.unwrap_or_default(),
    });
    // Failures are already logged and raised as notices by `fetch`.
    tokio::select! {
        _ = token.cancelled() => {}
        _ = sync.fetch(filter) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_ceiling_and_resets() {
        let mut b = Backoff::new(Duration::from_millis(500), Duration::from_secs(3));
        let delays: Vec<_> = (0..5).map(|_| b.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 3000, 3000]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn huge_ceiling_saturates_instead_of_overflowing() {
        let mut b = Backoff::new(Duration::MAX / 2 + Duration::from_secs(1), Duration::MAX);
        b.next_delay();
        assert_eq!(b.next_delay(), Duration::MAX);
        assert_eq!(b.next_delay(), Duration::MAX);
    }
}
