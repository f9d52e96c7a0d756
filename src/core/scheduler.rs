//! Periodic refresh of the correlation matrix for one view.
//!
//! A [`RefreshScheduler`] is started for a [`RefreshContext`] (symbol set and
//! lookback window) and drives a single task that fetches every series
//! through the [`SeriesCache`], recomputes the matrix and publishes the
//! outcome on a `watch` channel. Cycles never overlap: a manual retry while a
//! cycle is running is folded into that cycle, and the timer is re-armed only
//! once a cycle has finished.
use crate::core::cache::SeriesCache;
use crate::core::correlation::{CorrelationEngine, CorrelationMatrix};
use crate::core::error::ErrorDetail;
use crate::core::series::PriceSeries;
use crate::core::source::PriceHistorySource;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshContext {
    symbols: Vec<String>,
    window_minutes: u32,
}

impl RefreshContext {
    /// Duplicate symbols are dropped, keeping the first occurrence.
    pub fn new<I, S>(symbols: I, window_minutes: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = symbol.into();
            if !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }
        Self {
            symbols: unique,
            window_minutes,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }
}

#[derive(Debug, Clone)]
pub enum RefreshState {
    Idle,
    Loading,
    Ready(Arc<CorrelationMatrix>),
    Failed(ErrorDetail),
}

/// What the presentation layer observes: the current state plus the last
/// good matrix of this context while a refresh is pending or has failed.
#[derive(Debug, Clone)]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub stale: Option<Arc<CorrelationMatrix>>,
}

impl RefreshStatus {
    fn idle() -> Self {
        Self {
            state: RefreshState::Idle,
            stale: None,
        }
    }

    /// The matrix to display, fresh or stale.
    pub fn matrix(&self) -> Option<&Arc<CorrelationMatrix>> {
        match &self.state {
            RefreshState::Ready(matrix) => Some(matrix),
            _ => self.stale.as_ref(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, RefreshState::Loading)
    }
}

pub struct RefreshScheduler {
    cache: SeriesCache,
    source: Arc<dyn PriceHistorySource>,
    engine: CorrelationEngine,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(
        cache: SeriesCache,
        source: Arc<dyn PriceHistorySource>,
        engine: CorrelationEngine,
    ) -> Self {
        Self {
            cache,
            source,
            engine,
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    /// Sets the auto refresh period. A zero period is ignored.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!(
                current = ?self.interval,
                "Zero refresh interval requested, keeping current interval"
            );
        } else {
            self.interval = interval;
        }
        self
    }

    /// Spawns the refresh task. The first cycle starts immediately.
    pub fn start(self, context: RefreshContext) -> RefreshHandle {
        let (status_tx, status_rx) = watch::channel(RefreshStatus::idle());
        let (context_tx, context_rx) = watch::channel(context);
        let trigger = Arc::new(Notify::new());
        let in_flight = Arc::new(AtomicBool::new(false));

        let driver = Driver {
            scheduler: self,
            status_tx,
            context_rx,
            trigger: Arc::clone(&trigger),
            in_flight: Arc::clone(&in_flight),
        };
        let task = tokio::spawn(driver.run());

        RefreshHandle {
            status_rx,
            context_tx,
            trigger,
            in_flight,
            task,
        }
    }
}

/// Owner of a running scheduler. Dropping it cancels the refresh task.
pub struct RefreshHandle {
    status_rx: watch::Receiver<RefreshStatus>,
    context_tx: watch::Sender<RefreshContext>,
    trigger: Arc<Notify>,
    in_flight: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn subscribe(&self) -> watch::Receiver<RefreshStatus> {
        self.status_rx.clone()
    }

    pub fn status(&self) -> RefreshStatus {
        self.status_rx.borrow().clone()
    }

    /// Requests a refresh. Returns `false` when a cycle is already running;
    /// the request is then satisfied by that cycle.
    pub fn retry(&self) -> bool {
        if self.in_flight.load(Ordering::SeqCst) {
            debug!("Refresh already in flight, coalescing manual retry");
            return false;
        }
        self.trigger.notify_one();
        true
    }

    /// Switches to a new symbol set or window, abandoning any running cycle.
    pub fn set_context(&self, context: RefreshContext) {
        self.context_tx.send_if_modified(|current| {
            if *current == context {
                false
            } else {
                *current = context;
                true
            }
        });
    }

    /// Cancels the timer and any in-flight cycle and waits for the task to end.
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        debug!("Refresh scheduler stopped");
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Driver {
    scheduler: RefreshScheduler,
    status_tx: watch::Sender<RefreshStatus>,
    context_rx: watch::Receiver<RefreshContext>,
    trigger: Arc<Notify>,
    in_flight: Arc<AtomicBool>,
}

impl Driver {
    async fn run(mut self) {
        let period = self.scheduler.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_matrix: Option<Arc<CorrelationMatrix>> = None;
        let mut pending = true;
        loop {
            if !pending {
                tokio::select! {
                    _ = ticker.tick() => debug!("Auto refresh timer fired"),
                    _ = self.trigger.notified() => debug!("Manual refresh requested"),
                    changed = self.context_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        last_matrix = None;
                    }
                }
            }
            pending = false;

            let context = self.context_rx.borrow_and_update().clone();
            if context.symbols().is_empty() {
                debug!("No symbols selected, staying idle");
                last_matrix = None;
                publish(&self.status_tx, RefreshState::Idle, None);
                ticker.reset();
                continue;
            }

            self.in_flight.store(true, Ordering::SeqCst);
            tokio::select! {
                outcome = refresh_cycle(&self.scheduler, &self.status_tx, last_matrix.clone(), &context) => {
                    if outcome.is_some() {
                        last_matrix = outcome;
                    }
                }
                changed = self.context_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("Context changed mid-refresh, abandoning cycle");
                    last_matrix = None;
                    pending = true;
                }
            }
            self.in_flight.store(false, Ordering::SeqCst);
            ticker.reset();
        }
    }
}

/// Runs one fetch-and-compute cycle. Returns the new matrix on success; on
/// failure the previous matrix stays published as stale.
async fn refresh_cycle(
    scheduler: &RefreshScheduler,
    status_tx: &watch::Sender<RefreshStatus>,
    last_matrix: Option<Arc<CorrelationMatrix>>,
    context: &RefreshContext,
) -> Option<Arc<CorrelationMatrix>> {
    let window = context.window_minutes();
    info!(
        symbols = ?context.symbols(),
        window_minutes = window,
        "Refreshing correlation matrix"
    );
    publish(status_tx, RefreshState::Loading, last_matrix.clone());

    let fetches = context.symbols().iter().map(|symbol| {
        let source = Arc::clone(&scheduler.source);
        let owned = symbol.clone();
        async move {
            let result = scheduler
                .cache
                .get_or_fetch(symbol, window, move |minutes| async move {
                    source.fetch_history(&owned, Some(minutes)).await
                })
                .await;
            (symbol.clone(), result)
        }
    });
    let results = join_all(fetches).await;

    let mut series_by_symbol: BTreeMap<String, PriceSeries> = BTreeMap::new();
    for (symbol, result) in results {
        match result {
            Ok(series) => {
                series_by_symbol.insert(symbol, series);
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Refresh failed");
                let detail = ErrorDetail::for_symbol(&symbol, &e);
                publish(status_tx, RefreshState::Failed(detail), last_matrix);
                return None;
            }
        }
    }

    let matrix = Arc::new(scheduler.engine.compute(&series_by_symbol));
    if matrix.has_synthetic_data() {
        warn!(fallback = true, "Correlation matrix includes synthetic series");
    }
    publish(status_tx, RefreshState::Ready(Arc::clone(&matrix)), None);
    Some(matrix)
}

fn publish(
    status_tx: &watch::Sender<RefreshStatus>,
    state: RefreshState,
    stale: Option<Arc<CorrelationMatrix>>,
) {
    status_tx.send_replace(RefreshStatus { state, stale });
}
