use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    schedule::spawn_poll_loop,
    state::{FetchFailure, FetchState},
    ticket::TicketWindow,
    SyncError,
};

/// Asynchronous producer a controller polls. The trait object is read at
/// fetch time, so swapping state behind the source between ticks is always
/// observed by the next attempt.
#[async_trait]
pub trait FetchSource<T>: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<T>;
}

struct FetcherInner {
    tickets: TicketWindow,
    in_flight: usize,
    first_settled: bool,
}

/// Drives a single [`FetchSource`] on a fixed interval and publishes a
/// [`FetchState`] snapshot through a watch channel.
///
/// The first fetch fires immediately on [`start`](Self::start); later ticks
/// run as background refreshes that never clear previously published data.
/// Overlapping attempts are allowed and applied in call order.
pub struct PeriodicFetcher<T: Clone + Send + Sync + 'static> {
    source: Arc<dyn FetchSource<T>>,
    period: Duration,
    inner: Mutex<FetcherInner>,
    state_tx: watch::Sender<FetchState<T>>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> PeriodicFetcher<T> {
    pub fn new(source: Arc<dyn FetchSource<T>>, period: Duration) -> Result<Arc<Self>, SyncError> {
        if period.is_zero() {
            return Err(SyncError::InvalidInterval);
        }
        let (state_tx, _) = watch::channel(FetchState::initial());
        Ok(Arc::new(Self {
            source,
            period,
            inner: Mutex::new(FetcherInner {
                tickets: TicketWindow::default(),
                in_flight: 0,
                first_settled: false,
            }),
            state_tx,
            poll_task: StdMutex::new(None),
            stopped: AtomicBool::new(false),
        }))
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> FetchState<T> {
        self.state_tx.borrow().clone()
    }

    /// Begins polling: one immediate fetch, then one per interval. Calling
    /// `start` twice, or after `stop`, is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("start called on a stopped fetcher; construct a fresh one instead");
            return;
        }
        let mut slot = self.poll_task.lock().expect("poll task lock");
        if slot.is_some() {
            warn!("start called twice; keeping the existing poll loop");
            return;
        }
        *slot = Some(spawn_poll_loop(self, self.period, |fetcher| async move {
            fetcher.run_attempt().await;
        }));
    }

    /// One extra background-style fetch, e.g. for pull-to-refresh. Leaves the
    /// timer schedule untouched.
    pub async fn refetch(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("refetch called on a stopped fetcher");
            return;
        }
        self.run_attempt().await;
    }

    /// Cancels the poll loop. Idempotent and terminal: the fetcher cannot be
    /// restarted afterwards.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.poll_task.lock().expect("poll task lock").take() {
            task.abort();
        }
    }

    async fn run_attempt(self: &Arc<Self>) {
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

        let outcome = self.source.fetch().await;

        let mut inner = self.inner.lock().await;
        inner.in_flight -= 1;
        inner.first_settled = true;
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let still_refreshing = inner.in_flight > 0;
        if !inner.tickets.try_apply(ticket) {
            debug!(ticket, "discarding out-of-order fetch result");
            self.state_tx.send_modify(|state| {
                state.is_initial_loading = false;
                state.is_background_refreshing = still_refreshing;
            });
            return;
        }
        match outcome {
            Ok(data) => self.state_tx.send_modify(|state| {
                state.data = Some(data);
                state.last_error = None;
                state.last_updated_at = Some(Utc::now());
                state.is_initial_loading = false;
                state.is_background_refreshing = still_refreshing;
            }),
            Err(err) => {
                warn!(error = format!("{err:#}"), "periodic fetch failed; keeping previous data");
                self.state_tx.send_modify(|state| {
                    state.last_error = Some(FetchFailure::from_error(&err));
                    state.is_initial_loading = false;
                    state.is_background_refreshing = still_refreshing;
                });
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for PeriodicFetcher<T> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.poll_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/periodic_tests.rs"]
mod tests;
