//! Fetch orchestration: initial load, "load more", refetch, polling.
//!
//! An orchestrator pairs an externally supplied async source with the
//! reconciler and exposes the result plus loading flags through a
//! `tokio::sync::watch` channel that UI code renders from.
//!
//! # Guarantees
//!
//! - At most one fetch per kind (`initial_load`, `load_more`, `refetch`) is
//!   in flight; a second call while one is pending returns
//!   [`FetchOutcome::Skipped`] with [`SkipReason::InFlight`].
//! - Failures are caught here: the decoded error goes to the [`Toaster`],
//!   the state keeps its last good value.
//! - After [`teardown`](ListOrchestrator::teardown) (or dropping the last
//!   handle) nothing is committed: in-flight results are discarded and
//!   pollers stop.
//!
//! ```text
//!   initial_load ──▶ ReplaceSnapshot ─┐
//!   load_more    ──▶ AppendPage      ─┼──▶ reconcile ──▶ watch<ListState>
//!   refetch      ──▶ ReplaceSnapshot ─┤
//!   apply(push)  ──▶ any Action      ─┘
//! ```

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use balancer_types::{ApiError, Record};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::constants::DEFAULT_PAGE_SIZE;
use crate::error::ClientError;
use crate::notify::Toaster;
use crate::reconcile::{Action, Collection, ReconcileError, decode_action};

// ============================================================================
// Sources
// ============================================================================

/// Pagination query: at most `limit` records starting after `start_at_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery<K> {
    pub limit: usize,
    pub start_at_id: Option<K>,
}

/// An asynchronous list endpoint.
#[async_trait]
pub trait ListSource<T: Record>: Send + Sync {
    async fn fetch_page(&self, query: PageQuery<T::Key>) -> Result<Vec<T>, ClientError>;
}

/// An asynchronous single-entity endpoint.
#[async_trait]
pub trait ResourceSource<S>: Send + Sync {
    async fn fetch(&self) -> Result<S, ClientError>;
}

// ============================================================================
// Outcomes
// ============================================================================

/// What a fetch operation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result was reconciled into the state.
    Applied,
    /// Nothing was requested (see reason).
    Skipped(SkipReason),
    /// The request failed; the error was toasted and recorded.
    Failed(ApiError),
    /// The owner was torn down before the result arrived.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The same kind of fetch is already pending.
    InFlight,
    /// Nothing has been loaded yet.
    NotLoaded,
    /// The last page was shorter than the limit.
    Exhausted,
    /// The owner was torn down.
    TornDown,
}

/// Run `fut` unless `cancel` fires first. `None` means cancelled.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => (!cancel.is_cancelled()).then_some(out),
    }
}

/// Check-and-set on a watch channel; notifies only when `f` returns `Ok`.
fn try_begin<S, R>(
    state: &watch::Sender<S>,
    f: impl FnOnce(&mut S) -> Result<R, SkipReason>,
) -> Result<R, SkipReason> {
    let mut result = Err(SkipReason::InFlight);
    state.send_if_modified(|s| {
        result = f(s);
        result.is_ok()
    });
    result
}

// ============================================================================
// List orchestrator
// ============================================================================

/// Observable state of one list screen.
#[derive(Debug, Clone)]
pub struct ListState<T: Record> {
    /// `None` until the initial load succeeds.
    pub collection: Option<Collection<T>>,
    pub loading: bool,
    pub loading_more: bool,
    pub refetching: bool,
    /// Whether another `load_more` may return records.
    pub has_more: bool,
    /// Last failure, cleared by the next success.
    pub error: Option<ApiError>,
}

impl<T: Record> Default for ListState<T> {
    fn default() -> Self {
        Self {
            collection: None,
            loading: false,
            loading_more: false,
            refetching: false,
            has_more: false,
            error: None,
        }
    }
}

impl<T: Record> ListState<T> {
    pub fn records(&self) -> &[T] {
        self.collection.as_ref().map(Collection::records).unwrap_or(&[])
    }
}

struct ListInner<T: Record> {
    name: &'static str,
    source: Arc<dyn ListSource<T>>,
    page_size: usize,
    /// Empty collection carrying the sort spec every snapshot is built on.
    seed: Collection<T>,
    state: watch::Sender<ListState<T>>,
    toaster: Toaster,
    cancel: CancellationToken,
}

impl<T: Record> Drop for ListInner<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct ListOrchestratorBuilder<T: Record> {
    name: &'static str,
    source: Arc<dyn ListSource<T>>,
    toaster: Toaster,
    page_size: usize,
    seed: Collection<T>,
}

impl<T: Record> ListOrchestratorBuilder<T> {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Start from this collection (and its sort spec) instead of an empty,
    /// newest-first one.
    pub fn collection(mut self, seed: Collection<T>) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> ListOrchestrator<T> {
        let (state, _) = watch::channel(ListState::default());
        ListOrchestrator {
            inner: Arc::new(ListInner {
                name: self.name,
                source: self.source,
                page_size: self.page_size,
                seed: self.seed,
                state,
                toaster: self.toaster,
                cancel: CancellationToken::new(),
            }),
        }
    }
}

/// Drives a paginated list endpoint into a reconciled collection.
///
/// Cheap to clone; all clones share state. Dropping the last clone tears the
/// orchestrator down.
pub struct ListOrchestrator<T: Record> {
    inner: Arc<ListInner<T>>,
}

impl<T: Record> Clone for ListOrchestrator<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> ListOrchestrator<T>
where
    T: Record + Send + Sync + 'static,
    T::Key: Send + Sync,
{
    pub fn builder(
        name: &'static str,
        source: Arc<dyn ListSource<T>>,
        toaster: Toaster,
    ) -> ListOrchestratorBuilder<T> {
        ListOrchestratorBuilder {
            name,
            source,
            toaster,
            page_size: DEFAULT_PAGE_SIZE,
            seed: Collection::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState<T>> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> ListState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stop everything: pending results are discarded, pollers exit.
    pub fn teardown(&self) {
        debug!(list = self.inner.name, "teardown");
        self.inner.cancel.cancel();
    }

    /// Fetch the first page and make it the collection.
    pub async fn initial_load(&self) -> FetchOutcome {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return FetchOutcome::Skipped(SkipReason::TornDown);
        }
        if let Err(reason) = try_begin(&inner.state, |s| {
            if s.loading {
                return Err(SkipReason::InFlight);
            }
            s.loading = true;
            Ok(())
        }) {
            return FetchOutcome::Skipped(reason);
        }

        let limit = inner.page_size;
        let query = PageQuery { limit, start_at_id: None };
        let Some(result) = until_cancelled(&inner.cancel, inner.source.fetch_page(query)).await else {
            trace!(list = inner.name, "initial load discarded after teardown");
            return FetchOutcome::Discarded;
        };

        match result {
            Ok(page) => {
                let has_more = page.len() == limit;
                debug!(list = inner.name, count = page.len(), has_more, "initial load");
                let collection = inner.seed.apply(Action::ReplaceSnapshot(page));
                inner.state.send_modify(|s| {
                    s.collection = Some(collection);
                    s.loading = false;
                    s.has_more = has_more;
                    s.error = None;
                });
                FetchOutcome::Applied
            }
            Err(e) => self.fail(e, |s| s.loading = false),
        }
    }

    /// Fetch the page after the last loaded record and append it.
    pub async fn load_more(&self) -> FetchOutcome {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return FetchOutcome::Skipped(SkipReason::TornDown);
        }
        let cursor = match try_begin(&inner.state, |s| {
            let Some(collection) = &s.collection else {
                return Err(SkipReason::NotLoaded);
            };
            if s.loading_more {
                return Err(SkipReason::InFlight);
            }
            if !s.has_more {
                return Err(SkipReason::Exhausted);
            }
            let cursor = collection.last_key();
            s.loading_more = true;
            Ok(cursor)
        }) {
            Ok(cursor) => cursor,
            Err(reason) => return FetchOutcome::Skipped(reason),
        };

        let limit = inner.page_size;
        let query = PageQuery { limit, start_at_id: cursor };
        let Some(result) = until_cancelled(&inner.cancel, inner.source.fetch_page(query)).await else {
            trace!(list = inner.name, "load more discarded after teardown");
            return FetchOutcome::Discarded;
        };

        match result {
            Ok(page) => {
                let has_more = page.len() == limit;
                debug!(list = inner.name, count = page.len(), has_more, "loaded more");
                inner.state.send_modify(|s| {
                    let current = s.collection.take().unwrap_or_else(|| inner.seed.clone());
                    s.collection = Some(current.apply(Action::AppendPage(page)));
                    s.loading_more = false;
                    s.has_more = has_more;
                    s.error = None;
                });
                FetchOutcome::Applied
            }
            Err(e) => self.fail(e, |s| s.loading_more = false),
        }
    }

    /// Re-read everything loaded so far and replace the collection.
    pub async fn refetch(&self) -> FetchOutcome {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return FetchOutcome::Skipped(SkipReason::TornDown);
        }
        let limit = match try_begin(&inner.state, |s| {
            let Some(collection) = &s.collection else {
                return Err(SkipReason::NotLoaded);
            };
            if s.refetching {
                return Err(SkipReason::InFlight);
            }
            s.refetching = true;
            // Once exhausted, ask for one more than loaded: a full reply
            // means the backend grew.
            let loaded = if s.has_more { collection.len() } else { collection.len() + 1 };
            Ok(loaded.max(inner.page_size))
        }) {
            Ok(limit) => limit,
            Err(reason) => return FetchOutcome::Skipped(reason),
        };

        let query = PageQuery { limit, start_at_id: None };
        let Some(result) = until_cancelled(&inner.cancel, inner.source.fetch_page(query)).await else {
            trace!(list = inner.name, "refetch discarded after teardown");
            return FetchOutcome::Discarded;
        };

        match result {
            Ok(records) => {
                let has_more = records.len() == limit;
                trace!(list = inner.name, count = records.len(), "refetched");
                let collection = inner.seed.apply(Action::ReplaceSnapshot(records));
                inner.state.send_modify(|s| {
                    s.collection = Some(collection);
                    s.refetching = false;
                    s.has_more = has_more;
                    s.error = None;
                });
                FetchOutcome::Applied
            }
            Err(e) => self.fail(e, |s| s.refetching = false),
        }
    }

    /// Fold a pushed action into the loaded collection.
    ///
    /// Returns `false` when nothing is loaded yet or after teardown; the next
    /// load brings the pushed change anyway.
    pub fn apply(&self, action: Action<T>) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        self.inner.state.send_if_modified(|s| match s.collection.take() {
            Some(current) => {
                s.collection = Some(current.apply(action));
                true
            }
            None => {
                trace!(list = self.inner.name, kind = %action.kind(), "push before initial load ignored");
                false
            }
        })
    }

    /// Decode a `{ "kind", "payload" }` push and apply it.
    pub fn apply_json(&self, raw: &str) -> Result<bool, ReconcileError>
    where
        T: serde::de::DeserializeOwned,
        T::Key: serde::de::DeserializeOwned,
    {
        let action = decode_action::<T>(raw)?;
        Ok(self.apply(action))
    }

    /// Refetch every `interval` until teardown. The first tick loads.
    pub fn spawn_polling(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<ListInner<T>> = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        let name = self.inner.name;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else { break };
                let this = ListOrchestrator { inner };
                let loaded = this.inner.state.borrow().collection.is_some();
                if loaded {
                    this.refetch().await;
                } else {
                    this.initial_load().await;
                }
            }
            debug!(list = name, "poller stopped");
        })
    }

    fn fail(&self, error: ClientError, reset: impl FnOnce(&mut ListState<T>)) -> FetchOutcome {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return FetchOutcome::Discarded;
        }
        let api_error = error.api_error();
        warn!(list = inner.name, "fetch failed: {}", error);
        inner.toaster.error(&api_error);
        inner.state.send_modify(|s| {
            reset(s);
            s.error = Some(api_error.clone());
        });
        FetchOutcome::Failed(api_error)
    }
}

// ============================================================================
// Resource orchestrator
// ============================================================================

/// Observable state of one single-entity resource.
#[derive(Debug, Clone)]
pub struct ResourceState<S> {
    pub value: Option<S>,
    pub loading: bool,
    pub refetching: bool,
    pub error: Option<ApiError>,
}

impl<S> Default for ResourceState<S> {
    fn default() -> Self {
        Self { value: None, loading: false, refetching: false, error: None }
    }
}

fn loading_flag<S>(s: &mut ResourceState<S>) -> &mut bool {
    &mut s.loading
}

fn refetching_flag<S>(s: &mut ResourceState<S>) -> &mut bool {
    &mut s.refetching
}

struct ResourceInner<S> {
    name: &'static str,
    source: Arc<dyn ResourceSource<S>>,
    state: watch::Sender<ResourceState<S>>,
    toaster: Toaster,
    cancel: CancellationToken,
}

impl<S> Drop for ResourceInner<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drives a single-entity endpoint; every success replaces the value.
pub struct ResourceOrchestrator<S> {
    inner: Arc<ResourceInner<S>>,
}

impl<S> Clone for ResourceOrchestrator<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S> ResourceOrchestrator<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, source: Arc<dyn ResourceSource<S>>, toaster: Toaster) -> Self {
        let (state, _) = watch::channel(ResourceState::default());
        Self {
            inner: Arc::new(ResourceInner {
                name,
                source,
                state,
                toaster,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<S>> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> ResourceState<S> {
        self.inner.state.borrow().clone()
    }

    pub fn value(&self) -> Option<S> {
        self.inner.state.borrow().value.clone()
    }

    pub fn teardown(&self) {
        debug!(resource = self.inner.name, "teardown");
        self.inner.cancel.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub async fn load(&self) -> FetchOutcome {
        self.run(loading_flag).await
    }

    pub async fn refetch(&self) -> FetchOutcome {
        if self.inner.state.borrow().value.is_none() {
            return self.load().await;
        }
        self.run(refetching_flag).await
    }

    /// Replace the value with a pushed snapshot.
    pub fn replace(&self, value: S) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        self.inner.state.send_modify(|s| s.value = Some(value));
        true
    }

    pub fn spawn_polling(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<ResourceInner<S>> = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        let name = self.inner.name;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else { break };
                ResourceOrchestrator { inner }.refetch().await;
            }
            debug!(resource = name, "poller stopped");
        })
    }

    async fn run(&self, flag: fn(&mut ResourceState<S>) -> &mut bool) -> FetchOutcome {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return FetchOutcome::Skipped(SkipReason::TornDown);
        }
        if let Err(reason) = try_begin(&inner.state, |s| {
            let pending = flag(s);
            if *pending {
                return Err(SkipReason::InFlight);
            }
            *pending = true;
            Ok(())
        }) {
            return FetchOutcome::Skipped(reason);
        }

        let Some(result) = until_cancelled(&inner.cancel, inner.source.fetch()).await else {
            trace!(resource = inner.name, "fetch discarded after teardown");
            return FetchOutcome::Discarded;
        };

        match result {
            Ok(value) => {
                inner.state.send_modify(|s| {
                    s.value = Some(value);
                    *flag(s) = false;
                    s.error = None;
                });
                FetchOutcome::Applied
            }
            Err(e) => {
                let api_error = e.api_error();
                warn!(resource = inner.name, "fetch failed: {}", e);
                inner.toaster.error(&api_error);
                inner.state.send_modify(|s| {
                    *flag(s) = false;
                    s.error = Some(api_error.clone());
                });
                FetchOutcome::Failed(api_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use balancer_types::{ApiErrorRecord, ServerSummary};
    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    use super::*;
    use tokio::sync::mpsc;

    use crate::notify::{Toast, ToastLevel};

    fn record(id: u64) -> ApiErrorRecord {
        ApiErrorRecord {
            id,
            origin: "test".into(),
            error: format!("error {id}"),
            uid: None,
            created_at: 0,
        }
    }

    /// Serves `total` records newest first (ids total..=1), honoring the
    /// cursor, optionally waiting on a gate per request.
    struct PagedSource {
        total: u64,
        queries: Mutex<Vec<PageQuery<u64>>>,
        gate: Option<Arc<Semaphore>>,
        fail: Mutex<Option<ClientError>>,
    }

    impl PagedSource {
        fn new(total: u64) -> Self {
            Self { total, queries: Mutex::new(Vec::new()), gate: None, fail: Mutex::new(None) }
        }

        fn gated(total: u64, gate: Arc<Semaphore>) -> Self {
            Self { gate: Some(gate), ..Self::new(total) }
        }
    }

    #[async_trait]
    impl ListSource<ApiErrorRecord> for PagedSource {
        async fn fetch_page(&self, query: PageQuery<u64>) -> Result<Vec<ApiErrorRecord>, ClientError> {
            self.queries.lock().push(query.clone());
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            if let Some(err) = self.fail.lock().take() {
                return Err(err);
            }
            let start = query.start_at_id.map(|id| id - 1).unwrap_or(self.total);
            Ok((1..=start).rev().take(query.limit).map(record).collect())
        }
    }

    fn orchestrator(
        source: Arc<PagedSource>,
        page_size: usize,
    ) -> (ListOrchestrator<ApiErrorRecord>, mpsc::UnboundedReceiver<Toast>) {
        let (toaster, rx) = Toaster::channel();
        let orch = ListOrchestrator::<ApiErrorRecord>::builder("api_errors", source, toaster)
            .page_size(page_size)
            .build();
        (orch, rx)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    #[tokio::test]
    async fn test_pagination_terminates_at_short_page() {
        let source = Arc::new(PagedSource::new(7));
        let (orch, _toasts) = orchestrator(source.clone(), 3);

        assert_eq!(orch.initial_load().await, FetchOutcome::Applied);
        assert!(orch.snapshot().has_more);

        assert_eq!(orch.load_more().await, FetchOutcome::Applied);
        assert!(orch.snapshot().has_more);

        assert_eq!(orch.load_more().await, FetchOutcome::Applied);
        let state = orch.snapshot();
        assert!(!state.has_more);
        assert_eq!(state.records().iter().map(|r| r.id).collect::<Vec<_>>(), vec![7, 6, 5, 4, 3, 2, 1]);

        assert_eq!(orch.load_more().await, FetchOutcome::Skipped(SkipReason::Exhausted));

        let queries = source.queries.lock().clone();
        assert_eq!(queries, vec![
            PageQuery { limit: 3, start_at_id: None },
            PageQuery { limit: 3, start_at_id: Some(5) },
            PageQuery { limit: 3, start_at_id: Some(2) },
        ]);
    }

    #[tokio::test]
    async fn test_pagination_exact_multiple_ends_on_empty_page() {
        let source = Arc::new(PagedSource::new(6));
        let (orch, _toasts) = orchestrator(source, 3);

        orch.initial_load().await;
        orch.load_more().await;
        assert!(orch.snapshot().has_more);
        orch.load_more().await;
        assert!(!orch.snapshot().has_more);
        assert_eq!(orch.snapshot().records().len(), 6);
    }

    #[tokio::test]
    async fn test_load_more_before_initial_load() {
        let (orch, _toasts) = orchestrator(Arc::new(PagedSource::new(3)), 3);
        assert_eq!(orch.load_more().await, FetchOutcome::Skipped(SkipReason::NotLoaded));
    }

    #[tokio::test]
    async fn test_load_more_ignored_while_pending() {
        let gate = Arc::new(Semaphore::new(1));
        let source = Arc::new(PagedSource::gated(10, gate.clone()));
        let (orch, _toasts) = orchestrator(source.clone(), 3);
        orch.initial_load().await;

        let pending = tokio::spawn({
            let orch = orch.clone();
            async move { orch.load_more().await }
        });
        while !orch.snapshot().loading_more {
            tokio::task::yield_now().await;
        }

        assert_eq!(orch.load_more().await, FetchOutcome::Skipped(SkipReason::InFlight));

        gate.add_permits(1);
        assert_eq!(pending.await.unwrap(), FetchOutcome::Applied);
        assert_eq!(orch.snapshot().records().len(), 6);
        assert_eq!(source.queries.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_initial_load_ignored_while_pending() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(PagedSource::gated(5, gate.clone()));
        let (orch, _toasts) = orchestrator(source.clone(), 3);

        let pending = tokio::spawn({
            let orch = orch.clone();
            async move { orch.initial_load().await }
        });
        while !orch.snapshot().loading {
            tokio::task::yield_now().await;
        }

        assert_eq!(orch.initial_load().await, FetchOutcome::Skipped(SkipReason::InFlight));

        gate.add_permits(1);
        assert_eq!(pending.await.unwrap(), FetchOutcome::Applied);
        assert!(!orch.snapshot().loading);
        assert_eq!(orch.snapshot().records().len(), 3);
        assert_eq!(source.queries.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_refetch_ignored_while_pending() {
        let gate = Arc::new(Semaphore::new(1));
        let source = Arc::new(PagedSource::gated(5, gate.clone()));
        let (orch, _toasts) = orchestrator(source.clone(), 3);
        orch.initial_load().await;

        let pending = tokio::spawn({
            let orch = orch.clone();
            async move { orch.refetch().await }
        });
        while !orch.snapshot().refetching {
            tokio::task::yield_now().await;
        }

        assert_eq!(orch.refetch().await, FetchOutcome::Skipped(SkipReason::InFlight));

        gate.add_permits(1);
        assert_eq!(pending.await.unwrap(), FetchOutcome::Applied);
        assert!(!orch.snapshot().refetching);
        assert_eq!(source.queries.lock().len(), 2);
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[tokio::test]
    async fn test_initial_load_failure_toasts_and_leaves_unset() {
        let source = Arc::new(PagedSource::new(3));
        *source.fail.lock() = Some(ClientError::server(500, "Database unavailable"));
        let (orch, mut toasts) = orchestrator(source, 3);

        let outcome = orch.initial_load().await;
        assert!(matches!(outcome, FetchOutcome::Failed(ref e) if e.message == "Database unavailable"));

        let state = orch.snapshot();
        assert!(state.collection.is_none());
        assert!(!state.loading);
        assert_eq!(state.error.as_ref().map(|e| e.message.as_str()), Some("Database unavailable"));

        let toast = toasts.try_recv().unwrap();
        assert_eq!(toast.level, ToastLevel::Error);
        assert_eq!(toast.message, "Database unavailable");
    }

    #[tokio::test]
    async fn test_refetch_failure_keeps_last_good_collection() {
        let source = Arc::new(PagedSource::new(3));
        let (orch, mut toasts) = orchestrator(source.clone(), 3);
        orch.initial_load().await;

        *source.fail.lock() = Some(ClientError::Transport("connection reset".into()));
        assert!(matches!(orch.refetch().await, FetchOutcome::Failed(_)));

        assert_eq!(orch.snapshot().records().len(), 3);
        assert!(!orch.snapshot().refetching);
        assert!(toasts.try_recv().is_ok());

        // Next success clears the error
        assert_eq!(orch.refetch().await, FetchOutcome::Applied);
        assert!(orch.snapshot().error.is_none());
    }

    // =========================================================================
    // Refetch / push
    // =========================================================================

    #[tokio::test]
    async fn test_refetch_covers_everything_loaded() {
        let source = Arc::new(PagedSource::new(10));
        let (orch, _toasts) = orchestrator(source.clone(), 3);
        orch.initial_load().await;
        orch.load_more().await;

        assert_eq!(orch.refetch().await, FetchOutcome::Applied);
        assert_eq!(orch.snapshot().records().len(), 6);
        assert_eq!(source.queries.lock().last().cloned(), Some(PageQuery { limit: 6, start_at_id: None }));
    }

    #[tokio::test]
    async fn test_refetch_after_exhaustion_keeps_has_more_false() {
        let source = Arc::new(PagedSource::new(7));
        let (orch, _toasts) = orchestrator(source.clone(), 3);
        orch.initial_load().await;
        orch.load_more().await;
        orch.load_more().await;
        assert!(!orch.snapshot().has_more);

        assert_eq!(orch.refetch().await, FetchOutcome::Applied);
        let state = orch.snapshot();
        assert_eq!(state.records().len(), 7);
        assert!(!state.has_more);
        assert_eq!(source.queries.lock().last().cloned(), Some(PageQuery { limit: 8, start_at_id: None }));

        assert_eq!(orch.load_more().await, FetchOutcome::Skipped(SkipReason::Exhausted));
        assert_eq!(source.queries.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_apply_push_and_json() {
        let (orch, _toasts) = orchestrator(Arc::new(PagedSource::new(2)), 3);
        assert!(!orch.apply(Action::Delete(1)));

        orch.initial_load().await;
        assert!(orch.apply(Action::Create(record(3))));
        assert!(orch.apply_json(r#"{"kind":"delete","payload":1}"#).unwrap());
        assert_eq!(orch.snapshot().records().iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2]);

        let err = orch.apply_json(r#"{"kind":"merge","payload":[]}"#).unwrap_err();
        assert_eq!(err, ReconcileError::UnknownAction { kind: "merge".into() });
        assert_eq!(orch.snapshot().records().len(), 2);
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    #[tokio::test]
    async fn test_teardown_discards_in_flight_result() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(PagedSource::gated(5, gate.clone()));
        let (orch, _toasts) = orchestrator(source, 3);
        let mut rx = orch.subscribe();

        let pending = tokio::spawn({
            let orch = orch.clone();
            async move { orch.initial_load().await }
        });
        while !orch.snapshot().loading {
            tokio::task::yield_now().await;
        }
        rx.borrow_and_update();

        orch.teardown();
        gate.add_permits(1);

        assert_eq!(pending.await.unwrap(), FetchOutcome::Discarded);
        assert!(orch.snapshot().collection.is_none());
        assert!(!rx.has_changed().unwrap());
        assert!(!orch.apply(Action::Create(record(9))));
        assert_eq!(orch.initial_load().await, FetchOutcome::Skipped(SkipReason::TornDown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_refetches_until_teardown() {
        let source = Arc::new(PagedSource::new(2));
        let (orch, _toasts) = orchestrator(source.clone(), 3);

        let poller = orch.spawn_polling(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(4_100)).await;

        let polled = source.queries.lock().len();
        assert!(polled >= 3, "expected at least 3 fetches, got {polled}");
        assert!(orch.snapshot().collection.is_some());

        orch.teardown();
        poller.await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.queries.lock().len(), polled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_stops_poller() {
        let source = Arc::new(PagedSource::new(2));
        let (orch, _toasts) = orchestrator(source.clone(), 3);
        let poller = orch.spawn_polling(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(orch);
        poller.await.unwrap();
    }

    // =========================================================================
    // Resources
    // =========================================================================

    struct CountingSummary {
        calls: AtomicUsize,
        fail: Mutex<Option<ClientError>>,
    }

    impl CountingSummary {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail: Mutex::new(None) })
        }
    }

    #[async_trait]
    impl ResourceSource<ServerSummary> for CountingSummary {
        async fn fetch(&self) -> Result<ServerSummary, ClientError> {
            if let Some(err) = self.fail.lock().take() {
                return Err(err);
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            Ok(ServerSummary {
                uptime_secs: n,
                cpu_load: 0.5,
                memory_used_bytes: 1,
                memory_total_bytes: 2,
            })
        }
    }

    #[tokio::test]
    async fn test_resource_refetch_replaces() {
        let (toaster, _rx) = Toaster::channel();
        let source = CountingSummary::new();
        let orch = ResourceOrchestrator::<ServerSummary>::new("server_summary", source, toaster);

        assert_eq!(orch.refetch().await, FetchOutcome::Applied);
        assert_eq!(orch.value().map(|s| s.uptime_secs), Some(0));
        assert_eq!(orch.refetch().await, FetchOutcome::Applied);
        assert_eq!(orch.value().map(|s| s.uptime_secs), Some(1));
        assert!(!orch.snapshot().refetching);
    }

    #[tokio::test]
    async fn test_resource_refetch_failure_keeps_value() {
        let (toaster, mut toasts) = Toaster::channel();
        let source = CountingSummary::new();
        let orch = ResourceOrchestrator::<ServerSummary>::new("server_summary", source.clone(), toaster);
        assert_eq!(orch.load().await, FetchOutcome::Applied);

        *source.fail.lock() = Some(ClientError::server(503, "Summary unavailable"));
        let outcome = orch.refetch().await;
        assert!(matches!(outcome, FetchOutcome::Failed(ref e) if e.message == "Summary unavailable"));

        let state = orch.snapshot();
        assert_eq!(state.value.map(|s| s.uptime_secs), Some(0));
        assert!(!state.refetching);
        assert_eq!(state.error.as_ref().map(|e| e.message.as_str()), Some("Summary unavailable"));

        let toast = toasts.try_recv().unwrap();
        assert_eq!(toast.level, ToastLevel::Error);
        assert_eq!(toast.message, "Summary unavailable");

        assert_eq!(orch.refetch().await, FetchOutcome::Applied);
        assert!(orch.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_resource_load_failure_leaves_unset() {
        let (toaster, mut toasts) = Toaster::channel();
        let source = CountingSummary::new();
        *source.fail.lock() = Some(ClientError::Transport("connection refused".into()));
        let orch = ResourceOrchestrator::<ServerSummary>::new("server_summary", source, toaster);

        assert!(matches!(orch.load().await, FetchOutcome::Failed(_)));
        let state = orch.snapshot();
        assert!(state.value.is_none());
        assert!(!state.loading);
        assert!(state.error.is_some());
        assert!(toasts.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resource_polling_stops_on_teardown() {
        let (toaster, _rx) = Toaster::channel();
        let source = CountingSummary::new();
        let orch = ResourceOrchestrator::<ServerSummary>::new("server_summary", source.clone(), toaster);

        let poller = orch.spawn_polling(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert!(source.calls.load(Ordering::SeqCst) >= 2);

        orch.teardown();
        poller.await.unwrap();
        assert!(!orch.replace(ServerSummary {
            uptime_secs: 99,
            cpu_load: 0.0,
            memory_used_bytes: 0,
            memory_total_bytes: 0,
        }));
    }
}
