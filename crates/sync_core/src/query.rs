use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::{IssueStatus, SortOrder};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    schedule::spawn_poll_loop,
    state::FetchFailure,
    ticket::TicketWindow,
    SyncError, SEARCH_DEBOUNCE,
};

/// The committed filter/search/sort/page state for the issue list endpoint.
/// Exclusively owned and mutated by [`IssueQueryController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub category: Option<String>,
    pub status: Option<IssueStatus>,
    /// Committed (post-debounce) search text.
    pub search: String,
    pub sort_by: SortOrder,
    /// 1-based page number.
    pub page: u32,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            category: None,
            status: None,
            search: String::new(),
            sort_by: SortOrder::default(),
            page: 1,
        }
    }
}

impl QuerySpec {
    /// Offset for offset+limit pagination.
    pub fn offset(&self, page_size: u32) -> u32 {
        (self.page - 1) * page_size
    }
}

/// Partial update of the non-search filter fields. An outer `None` leaves the
/// field unchanged; `Some(None)` clears the filter.
#[derive(Debug, Clone, Default)]
pub struct FilterUpdate {
    pub category: Option<Option<String>>,
    pub status: Option<Option<IssueStatus>>,
    pub sort_by: Option<SortOrder>,
}

impl FilterUpdate {
    pub fn category(value: impl Into<String>) -> Self {
        Self {
            category: Some(Some(value.into())),
            ..Self::default()
        }
    }

    pub fn clear_category() -> Self {
        Self {
            category: Some(None),
            ..Self::default()
        }
    }

    pub fn status(value: IssueStatus) -> Self {
        Self {
            status: Some(Some(value)),
            ..Self::default()
        }
    }

    pub fn sort_by(value: SortOrder) -> Self {
        Self {
            sort_by: Some(value),
            ..Self::default()
        }
    }
}

/// Fetches one page of the collection for the given committed spec.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, spec: &QuerySpec, limit: u32) -> anyhow::Result<Vec<T>>;
}

/// View-model for the list screen. Items are replaced wholesale on every
/// successful fetch; a failed or in-flight refresh leaves them intact.
#[derive(Debug, Clone)]
pub struct ListState<T> {
    pub items: Vec<T>,
    /// Heuristic: true iff the last page came back exactly full. A final page
    /// that happens to be exactly full still reports more; the backend sends
    /// no total count, so this is an accepted approximation.
    pub has_more: bool,
    /// Page the user most recently requested (not necessarily the page the
    /// currently displayed items belong to while a fetch is in flight).
    pub page: u32,
    /// Raw search input as typed, updated before the debounce commits.
    pub search_input: String,
    pub is_initial_loading: bool,
    pub is_background_refreshing: bool,
    pub last_error: Option<FetchFailure>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl<T> ListState<T> {
    fn initial() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            page: 1,
            search_input: String::new(),
            is_initial_loading: true,
            is_background_refreshing: false,
            last_error: None,
            last_updated_at: None,
        }
    }
}

struct QueryInner {
    spec: QuerySpec,
    tickets: TicketWindow,
    in_flight: usize,
    first_settled: bool,
}

struct QueryTasks {
    poll: Option<JoinHandle<()>>,
    debounce: Option<JoinHandle<()>>,
}

/// Owns the issue list's [`QuerySpec`] and issues exactly one fetch per
/// committed change: filter and page changes fetch immediately, search text
/// is debounced, and a background tick re-fetches the current spec without
/// resetting the user's page.
///
/// All trigger lanes (filter, search commit, page, manual, background) share
/// one ticket counter, so an older response from any lane can never clobber
/// a newer one from another.
pub struct IssueQueryController<T: Clone + Send + Sync + 'static> {
    source: Arc<dyn PageSource<T>>,
    page_size: u32,
    refresh_period: Duration,
    inner: Mutex<QueryInner>,
    state_tx: watch::Sender<ListState<T>>,
    tasks: StdMutex<QueryTasks>,
    stopped: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> IssueQueryController<T> {
    pub fn new(
        source: Arc<dyn PageSource<T>>,
        page_size: u32,
        refresh_period: Duration,
    ) -> Result<Arc<Self>, SyncError> {
        Self::new_with_spec(source, QuerySpec::default(), page_size, refresh_period)
    }

    pub fn new_with_spec(
        source: Arc<dyn PageSource<T>>,
        spec: QuerySpec,
        page_size: u32,
        refresh_period: Duration,
    ) -> Result<Arc<Self>, SyncError> {
        if page_size == 0 {
            return Err(SyncError::InvalidPageSize);
        }
        if refresh_period.is_zero() {
            return Err(SyncError::InvalidInterval);
        }
        if spec.page == 0 {
            return Err(SyncError::InvalidPage);
        }
        let mut state = ListState::initial();
        state.page = spec.page;
        state.search_input = spec.search.clone();
        let (state_tx, _) = watch::channel(state);
        Ok(Arc::new(Self {
            source,
            page_size,
            refresh_period,
            inner: Mutex::new(QueryInner {
                spec,
                tickets: TicketWindow::default(),
                in_flight: 0,
                first_settled: false,
            }),
            state_tx,
            tasks: StdMutex::new(QueryTasks {
                poll: None,
                debounce: None,
            }),
            stopped: AtomicBool::new(false),
        }))
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState<T>> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> ListState<T> {
        self.state_tx.borrow().clone()
    }

    /// The committed spec as it stands right now. Background ticks read this
    /// at fetch time rather than a value captured at registration time.
    pub async fn current_spec(&self) -> QuerySpec {
        self.inner.lock().await.spec.clone()
    }

    /// Begins the initial fetch and the background poll loop.
    pub fn start(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("start called on a stopped query controller");
            return;
        }
        let mut tasks = self.tasks.lock().expect("task lock");
        if tasks.poll.is_some() {
            warn!("start called twice; keeping the existing poll loop");
            return;
        }
        tasks.poll = Some(spawn_poll_loop(
            self,
            self.refresh_period,
            |controller| async move {
                controller.run_attempt().await;
            },
        ));
    }

    /// Merges filter fields into the spec, resets the page to 1 and fetches
    /// immediately. Only free-text search is debounced, never filters.
    pub async fn set_filter(self: &Arc<Self>, update: FilterUpdate) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut inner = self.inner.lock().await;
            if let Some(category) = update.category {
                inner.spec.category = category;
            }
            if let Some(status) = update.status {
                inner.spec.status = status;
            }
            if let Some(sort_by) = update.sort_by {
                inner.spec.sort_by = sort_by;
            }
            inner.spec.page = 1;
            self.state_tx.send_modify(|state| state.page = 1);
        }
        self.run_attempt().await;
    }

    /// Updates the visible search input immediately and (re)starts the
    /// single-slot debounce window; the spec is only committed, and a fetch
    /// only issued, once the quiet period elapses with no further keystrokes.
    pub fn set_search_text(self: &Arc<Self>, text: impl Into<String>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let text = text.into();
        self.state_tx
            .send_modify(|state| state.search_input = text.clone());

        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(SEARCH_DEBOUNCE).await;
            let Some(controller) = weak.upgrade() else { return };
            controller.commit_search(text).await;
        });
        let mut tasks = self.tasks.lock().expect("task lock");
        if let Some(previous) = tasks.debounce.replace(task) {
            previous.abort();
        }
    }

    async fn commit_search(self: &Arc<Self>, text: String) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        debug!(search = %text, "committing debounced search text");
        {
            let mut inner = self.inner.lock().await;
            inner.spec.search = text;
            inner.spec.page = 1;
            self.state_tx.send_modify(|state| state.page = 1);
        }
        self.run_attempt().await;
    }

    /// Jumps to a page without touching any other field.
    pub async fn set_page(self: &Arc<Self>, page: u32) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let page = page.max(1);
        {
            let mut inner = self.inner.lock().await;
            inner.spec.page = page;
            self.state_tx.send_modify(|state| state.page = page);
        }
        self.run_attempt().await;
    }

    /// Manual background-style refresh of the current spec.
    pub async fn refetch(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.run_attempt().await;
    }

    /// Cancels the poll loop and any pending debounce. Idempotent, terminal.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks.lock().expect("task lock");
        if let Some(task) = tasks.poll.take() {
            task.abort();
        }
        if let Some(task) = tasks.debounce.take() {
            task.abort();
        }
    }

    async fn run_attempt(self: &Arc<Self>) {
        let (ticket, spec) = {
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
            (ticket, inner.spec.clone())
        };

        let outcome = self.source.fetch_page(&spec, self.page_size).await;

        let mut inner = self.inner.lock().await;
        inner.in_flight -= 1;
        inner.first_settled = true;
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let still_refreshing = inner.in_flight > 0;
        if !inner.tickets.try_apply(ticket) {
            debug!(ticket, "discarding out-of-order page result");
            self.state_tx.send_modify(|state| {
                state.is_initial_loading = false;
                state.is_background_refreshing = still_refreshing;
            });
            return;
        }
        match outcome {
            Ok(items) => {
                let has_more = items.len() as u32 == self.page_size;
                self.state_tx.send_modify(|state| {
                    state.items = items;
                    state.has_more = has_more;
                    state.last_error = None;
                    state.last_updated_at = Some(Utc::now());
                    state.is_initial_loading = false;
                    state.is_background_refreshing = still_refreshing;
                });
            }
            Err(err) => {
                warn!(
                    error = format!("{err:#}"),
                    page = spec.page,
                    "page fetch failed; keeping previous items"
                );
                self.state_tx.send_modify(|state| {
                    state.last_error = Some(FetchFailure::from_error(&err));
                    state.is_initial_loading = false;
                    state.is_background_refreshing = still_refreshing;
                });
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for IssueQueryController<T> {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(task) = tasks.poll.take() {
                task.abort();
            }
            if let Some(task) = tasks.debounce.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
