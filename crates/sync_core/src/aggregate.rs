use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use chrono::Utc;
use futures::future::join_all;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    periodic::FetchSource,
    schedule::spawn_poll_loop,
    state::{FetchFailure, FetchState},
    ticket::TicketWindow,
    SyncError,
};

struct AggregateInner<V> {
    /// Last successful value per source, in construction order. `None` means
    /// the source has never succeeded ("unavailable").
    slots: Vec<Option<V>>,
    tickets: TicketWindow,
    in_flight: usize,
    first_settled: bool,
}

/// Fans out to several independent [`FetchSource`]s on one shared timer and
/// publishes a single merged snapshot once all of them have settled.
///
/// A source that fails on a tick contributes its previous value (or stays
/// `None` if it never succeeded); it never blanks the sources that succeeded
/// on the same tick.
pub struct MultiSourceFetcher<V: Clone + Send + Sync + 'static> {
    sources: Vec<Arc<dyn FetchSource<V>>>,
    period: Duration,
    inner: Mutex<AggregateInner<V>>,
    state_tx: watch::Sender<FetchState<Vec<Option<V>>>>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl<V: Clone + Send + Sync + 'static> MultiSourceFetcher<V> {
    pub fn new(
        sources: Vec<Arc<dyn FetchSource<V>>>,
        period: Duration,
    ) -> Result<Arc<Self>, SyncError> {
        if sources.is_empty() {
            return Err(SyncError::NoSources);
        }
        if period.is_zero() {
            return Err(SyncError::InvalidInterval);
        }
        let slots = vec![None; sources.len()];
        let (state_tx, _) = watch::channel(FetchState::initial());
        Ok(Arc::new(Self {
            sources,
            period,
            inner: Mutex::new(AggregateInner {
                slots,
                tickets: TicketWindow::default(),
                in_flight: 0,
                first_settled: false,
            }),
            state_tx,
            poll_task: StdMutex::new(None),
            stopped: AtomicBool::new(false),
        }))
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<Vec<Option<V>>>> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> FetchState<Vec<Option<V>>> {
        self.state_tx.borrow().clone()
    }

    /// Begins polling: one immediate tick, then one per interval.
    pub fn start(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("start called on a stopped aggregator");
            return;
        }
        let mut slot = self.poll_task.lock().expect("poll task lock");
        if slot.is_some() {
            warn!("start called twice; keeping the existing poll loop");
            return;
        }
        *slot = Some(spawn_poll_loop(self, self.period, |fetcher| async move {
            fetcher.run_tick().await;
        }));
    }

    /// One extra tick outside the timer schedule.
    pub async fn refetch(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("refetch called on a stopped aggregator");
            return;
        }
        self.run_tick().await;
    }

    /// Cancels the poll loop. Idempotent, terminal.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.poll_task.lock().expect("poll task lock").take() {
            task.abort();
        }
    }

    async fn run_tick(self: &Arc<Self>) {
        let ticket = {
            let mut inner = self.inner.lock().await;
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }
            let ticket = inner.tickets.issue();
            inner.in_flight += 1;
            if inner.first_settled {
                self.state_tx
                    .send_modify(|state| state.is_background_refreshing = true);
            }
            ticket
        };

        // All sources in parallel; each settles independently.
        let fetches = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move { source.fetch().await }
        });
        let outcomes = join_all(fetches).await;

        let mut inner = self.inner.lock().await;
        inner.in_flight -= 1;
        inner.first_settled = true;
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let still_refreshing = inner.in_flight > 0;
        if !inner.tickets.try_apply(ticket) {
            debug!(ticket, "discarding out-of-order aggregate tick");
            self.state_tx.send_modify(|state| {
                state.is_initial_loading = false;
                state.is_background_refreshing = still_refreshing;
            });
            return;
        }

        let mut any_success = false;
        let mut failure = None;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(value) => {
                    inner.slots[index] = Some(value);
                    any_success = true;
                }
                Err(err) => {
                    warn!(
                        source = index,
                        error = format!("{err:#}"),
                        "stat source failed; keeping its previous value"
                    );
                    failure = Some(FetchFailure::from_error(&err));
                }
            }
        }
        let merged = inner.slots.clone();
        self.state_tx.send_modify(|state| {
            state.data = Some(merged);
            if any_success {
                state.last_updated_at = Some(Utc::now());
            }
            state.last_error = failure;
            state.is_initial_loading = false;
            state.is_background_refreshing = still_refreshing;
        });
    }
}

impl<V: Clone + Send + Sync + 'static> Drop for MultiSourceFetcher<V> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.poll_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/aggregate_tests.rs"]
mod tests;
