use super::*;

use std::{
    collections::VecDeque,
    sync::Mutex as TestMutex,
};

use anyhow::anyhow;
use tokio::sync::oneshot;

/// Records every spec it is called with; scripted responses, then full pages.
struct RecordingPages {
    calls: TestMutex<Vec<QuerySpec>>,
    responses: TestMutex<VecDeque<anyhow::Result<Vec<u32>>>>,
}

impl RecordingPages {
    fn new() -> Self {
        Self::scripted(Vec::new())
    }

    fn scripted(responses: Vec<anyhow::Result<Vec<u32>>>) -> Self {
        Self {
            calls: TestMutex::new(Vec::new()),
            responses: TestMutex::new(responses.into()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    fn last_call(&self) -> QuerySpec {
        self.calls
            .lock()
            .expect("calls lock")
            .last()
            .expect("no fetch recorded")
            .clone()
    }
}

#[async_trait]
impl PageSource<u32> for RecordingPages {
    async fn fetch_page(&self, spec: &QuerySpec, limit: u32) -> anyhow::Result<Vec<u32>> {
        self.calls.lock().expect("calls lock").push(spec.clone());
        match self.responses.lock().expect("responses lock").pop_front() {
            Some(response) => response,
            None => Ok((0..limit).collect()),
        }
    }
}

struct GatedPages {
    calls: TestMutex<Vec<QuerySpec>>,
    gates: TestMutex<VecDeque<oneshot::Receiver<anyhow::Result<Vec<u32>>>>>,
}

impl GatedPages {
    fn new(count: usize) -> (Self, Vec<oneshot::Sender<anyhow::Result<Vec<u32>>>>) {
        let mut senders = Vec::with_capacity(count);
        let mut receivers = VecDeque::with_capacity(count);
        for _ in 0..count {
            let (tx, rx) = oneshot::channel();
            senders.push(tx);
            receivers.push_back(rx);
        }
        (
            Self {
                calls: TestMutex::new(Vec::new()),
                gates: TestMutex::new(receivers),
            },
            senders,
        )
    }

    fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl PageSource<u32> for GatedPages {
    async fn fetch_page(&self, spec: &QuerySpec, _limit: u32) -> anyhow::Result<Vec<u32>> {
        self.calls.lock().expect("calls lock").push(spec.clone());
        let gate = self
            .gates
            .lock()
            .expect("gate lock")
            .pop_front()
            .expect("no gate left for this fetch");
        gate.await.expect("gate dropped")
    }
}

async fn wait_for(
    rx: &mut watch::Receiver<ListState<u32>>,
    pred: impl Fn(&ListState<u32>) -> bool,
) {
    loop {
        if pred(&rx.borrow()) {
            return;
        }
        rx.changed().await.expect("state channel closed");
    }
}

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn rejects_invalid_construction() {
    let source = Arc::new(RecordingPages::new());
    let err = IssueQueryController::new(source.clone() as Arc<dyn PageSource<u32>>, 0, HOUR)
        .err()
        .expect("zero page size must be rejected");
    assert_eq!(err, SyncError::InvalidPageSize);

    let err = IssueQueryController::new(
        source.clone() as Arc<dyn PageSource<u32>>,
        20,
        Duration::ZERO,
    )
    .err()
    .expect("zero interval must be rejected");
    assert_eq!(err, SyncError::InvalidInterval);

    let err = IssueQueryController::new_with_spec(
        source as Arc<dyn PageSource<u32>>,
        QuerySpec {
            page: 0,
            ..QuerySpec::default()
        },
        20,
        HOUR,
    )
    .err()
    .expect("page zero must be rejected");
    assert_eq!(err, SyncError::InvalidPage);
}

#[tokio::test]
async fn filter_change_resets_page_to_one() {
    let source = Arc::new(RecordingPages::new());
    let controller =
        IssueQueryController::new(source.clone() as Arc<dyn PageSource<u32>>, 20, HOUR)
            .expect("construct");

    controller.set_page(3).await;
    assert_eq!(controller.current_spec().await.page, 3);

    controller.set_filter(FilterUpdate::category("roads")).await;
    let spec = controller.current_spec().await;
    assert_eq!(spec.page, 1);
    assert_eq!(spec.category.as_deref(), Some("roads"));
    assert_eq!(controller.current().page, 1);

    let fetched = source.last_call();
    assert_eq!(fetched.page, 1);
    assert_eq!(fetched.category.as_deref(), Some("roads"));
}

#[tokio::test]
async fn page_change_preserves_filters() {
    let source = Arc::new(RecordingPages::new());
    let controller =
        IssueQueryController::new(source.clone() as Arc<dyn PageSource<u32>>, 20, HOUR)
            .expect("construct");

    controller
        .set_filter(FilterUpdate {
            category: Some(Some("water".into())),
            status: Some(Some(IssueStatus::Pending)),
            sort_by: Some(SortOrder::MostUpvoted),
        })
        .await;
    controller.set_page(2).await;

    let spec = controller.current_spec().await;
    assert_eq!(spec.page, 2);
    assert_eq!(spec.category.as_deref(), Some("water"));
    assert_eq!(spec.status, Some(IssueStatus::Pending));
    assert_eq!(spec.sort_by, SortOrder::MostUpvoted);
    assert_eq!(spec.offset(20), 20);
}

#[tokio::test(start_paused = true)]
async fn search_keystrokes_coalesce_into_one_fetch() {
    let source = Arc::new(RecordingPages::new());
    let controller =
        IssueQueryController::new(source.clone() as Arc<dyn PageSource<u32>>, 20, HOUR)
            .expect("construct");
    let mut rx = controller.subscribe();

    controller.set_search_text("p");
    tokio::time::advance(Duration::from_millis(100)).await;
    controller.set_search_text("po");
    tokio::time::advance(Duration::from_millis(100)).await;
    controller.set_search_text("pothole");

    // The visible input updates immediately, before the commit.
    assert_eq!(controller.current().search_input, "pothole");
    assert_eq!(controller.current_spec().await.search, "");

    tokio::time::advance(Duration::from_millis(299)).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(source.call_count(), 0);

    tokio::time::advance(Duration::from_millis(2)).await;
    wait_for(&mut rx, |state| state.last_updated_at.is_some()).await;
    assert_eq!(source.call_count(), 1);
    let fetched = source.last_call();
    assert_eq!(fetched.search, "pothole");
    assert_eq!(fetched.page, 1);
}

#[tokio::test]
async fn full_page_reports_more_and_short_page_does_not() {
    let source = Arc::new(RecordingPages::scripted(vec![
        Ok((0..20).collect()),
        Ok((0..12).collect()),
    ]));
    let controller =
        IssueQueryController::new(source.clone() as Arc<dyn PageSource<u32>>, 20, HOUR)
            .expect("construct");

    controller.refetch().await;
    let state = controller.current();
    assert_eq!(state.items.len(), 20);
    assert!(state.has_more);
    assert!(!state.is_initial_loading);

    controller.set_page(2).await;
    let state = controller.current();
    assert_eq!(state.items.len(), 12);
    assert!(!state.has_more);
    assert_eq!(state.page, 2);
    assert_eq!(source.last_call().offset(20), 20);
}

#[tokio::test]
async fn failed_fetch_keeps_previous_page() {
    let source = Arc::new(RecordingPages::scripted(vec![
        Ok(vec![1, 2, 3]),
        Err(anyhow!("503 from backend")),
    ]));
    let controller =
        IssueQueryController::new(source.clone() as Arc<dyn PageSource<u32>>, 20, HOUR)
            .expect("construct");

    controller.refetch().await;
    assert_eq!(controller.current().items, vec![1, 2, 3]);

    controller.set_filter(FilterUpdate::status(IssueStatus::Resolved)).await;
    let state = controller.current();
    assert_eq!(state.items, vec![1, 2, 3]);
    let failure = state.last_error.expect("failure recorded");
    assert!(failure.message.contains("503"));
}

#[tokio::test]
async fn stale_response_cannot_overwrite_newer_one() {
    let (source, mut gates) = GatedPages::new(2);
    let source = Arc::new(source);
    let controller =
        IssueQueryController::new(source.clone() as Arc<dyn PageSource<u32>>, 2, HOUR)
            .expect("construct");
    let mut rx = controller.subscribe();

    let slow = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.set_filter(FilterUpdate::category("roads")).await }
    });
    while source.call_count() < 1 {
        tokio::task::yield_now().await;
    }
    let fast = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.set_page(2).await }
    });
    while source.call_count() < 2 {
        tokio::task::yield_now().await;
    }

    gates.remove(1).send(Ok(vec![10, 11])).expect("release fast fetch");
    wait_for(&mut rx, |state| state.items == vec![10, 11]).await;
    gates.remove(0).send(Ok(vec![99, 99])).expect("release slow fetch");
    slow.await.expect("slow task");
    fast.await.expect("fast task");

    let state = controller.current();
    assert_eq!(state.items, vec![10, 11]);
    assert_eq!(state.page, 2);
}

#[tokio::test(start_paused = true)]
async fn background_tick_keeps_the_current_page() {
    let source = Arc::new(RecordingPages::new());
    let controller =
        IssueQueryController::new(source.clone() as Arc<dyn PageSource<u32>>, 5, Duration::from_secs(30))
            .expect("construct");
    let mut rx = controller.subscribe();

    controller.start();
    wait_for(&mut rx, |state| state.last_updated_at.is_some()).await;
    assert_eq!(source.call_count(), 1);

    controller.set_page(2).await;
    assert_eq!(source.call_count(), 2);

    tokio::time::advance(Duration::from_secs(31)).await;
    while source.call_count() < 3 {
        rx.changed().await.expect("state channel closed");
    }
    let background = source.last_call();
    assert_eq!(background.page, 2);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_pending_debounce() {
    let source = Arc::new(RecordingPages::new());
    let controller =
        IssueQueryController::new(source.clone() as Arc<dyn PageSource<u32>>, 20, HOUR)
            .expect("construct");

    controller.set_search_text("drain");
    controller.stop();
    tokio::time::advance(Duration::from_millis(400)).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(source.call_count(), 0);

    // Terminal: triggers after stop are ignored.
    controller.set_page(2).await;
    controller.refetch().await;
    assert_eq!(source.call_count(), 0);
}
