use crate::core::error::SourceError;
use crate::core::series::{PriceSeries, SeriesKey};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

type InFlight = Shared<BoxFuture<'static, Result<PriceSeries, SourceError>>>;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: SeriesKey,
    pub series: PriceSeries,
    pub fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.fetched_at) < ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<SeriesKey, CacheEntry>,
    in_flight: HashMap<SeriesKey, InFlight>,
}

/// Short-lived memoization of price series keyed by (symbol, window).
///
/// Concurrent requests for the same key share one underlying fetch. A failed
/// fetch leaves any previous entry for the key in place. Stale entries are
/// ignored rather than purged; the key space is bounded by the visible
/// tickers.
#[derive(Clone)]
pub struct SeriesCache {
    ttl: Duration,
    inner: Arc<Mutex<CacheState>>,
}

impl SeriesCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Returns the cached series for the key, or runs `fetcher(window_minutes)`
    /// and stores its result.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        symbol: &str,
        window_minutes: u32,
        fetcher: F,
    ) -> Result<PriceSeries, SourceError>
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = Result<PriceSeries, SourceError>> + Send + 'static,
    {
        let key = SeriesKey::new(symbol, window_minutes);

        let flight = {
            let mut state = self.inner.lock().await;
            if let Some(entry) = state.entries.get(&key) {
                if entry.is_fresh(self.ttl, Instant::now()) {
                    debug!("Cache HIT for key: {}", key);
                    return Ok(entry.series.clone());
                }
                debug!("Cache entry expired for key: {}", key);
            }

            match state.in_flight.get(&key) {
                Some(flight) => {
                    debug!("Joining in-flight fetch for key: {}", key);
                    flight.clone()
                }
                None => {
                    debug!("Cache MISS for key: {}", key);
                    let flight = self.start_fetch(key.clone(), fetcher(window_minutes));
                    state.in_flight.insert(key, flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    /// The stored entry for a key, fresh or not.
    pub async fn entry(&self, symbol: &str, window_minutes: u32) -> Option<CacheEntry> {
        let state = self.inner.lock().await;
        state
            .entries
            .get(&SeriesKey::new(symbol, window_minutes))
            .cloned()
    }

    // The store happens inside the shared future so the entry is written
    // exactly once, whichever caller ends up driving it.
    fn start_fetch<Fut>(&self, key: SeriesKey, fetch: Fut) -> InFlight
    where
        Fut: Future<Output = Result<PriceSeries, SourceError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        async move {
            let result = fetch.await;
            let mut state = inner.lock().await;
            state.in_flight.remove(&key);
            match &result {
                Ok(series) => {
                    debug!("Cache PUT for key: {}", key);
                    state.entries.insert(
                        key.clone(),
                        CacheEntry {
                            key,
                            series: series.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                }
                Err(e) => debug!("Fetch failed for key {}, keeping previous entry: {}", key, e),
            }
            result
        }
        .boxed()
        .shared()
    }
}

impl Default for SeriesCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::PriceSample;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn series(symbol: &str, prices: &[f64]) -> PriceSeries {
        let now = Utc::now();
        PriceSeries::live(
            symbol,
            prices
                .iter()
                .map(|p| PriceSample {
                    symbol: symbol.to_string(),
                    price: *p,
                    timestamp: now,
                })
                .collect(),
        )
    }

    fn counting_fetcher(
        calls: &Arc<AtomicUsize>,
        prices: &'static [f64],
    ) -> impl FnOnce(u32) -> BoxFuture<'static, Result<PriceSeries, SourceError>> {
        let calls = Arc::clone(calls);
        move |_window| {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(series("AAPL", prices))
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_within_ttl_fetches_once() {
        let cache = SeriesCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[1.0, 2.0]))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = cache
            .get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[3.0, 4.0]))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.prices(), vec![1.0, 2.0]);
        assert_eq!(second.prices(), vec![1.0, 2.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched_and_replaced() {
        let cache = SeriesCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[1.0, 2.0]))
            .await
            .unwrap();
        let first_fetch = cache.entry("AAPL", 30).await.unwrap().fetched_at;

        tokio::time::advance(DEFAULT_TTL).await;
        let refreshed = cache
            .get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[3.0, 4.0]))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.prices(), vec![3.0, 4.0]);
        let entry = cache.entry("AAPL", 30).await.unwrap();
        assert!(entry.fetched_at > first_fetch);
        assert_eq!(entry.series.prices(), vec![3.0, 4.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_part_of_the_key() {
        let cache = SeriesCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[1.0, 2.0]))
            .await
            .unwrap();
        cache
            .get_or_fetch("AAPL", 60, counting_fetcher(&calls, &[1.0, 2.0]))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_fetch() {
        let cache = SeriesCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[1.0, 2.0])),
            cache.get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[5.0, 6.0])),
            cache.get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[7.0, 8.0])),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().prices(), vec![1.0, 2.0]);
        assert_eq!(b.unwrap().prices(), vec![1.0, 2.0]);
        assert_eq!(c.unwrap().prices(), vec![1.0, 2.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_keeps_previous_entry() {
        let cache = SeriesCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[1.0, 2.0]))
            .await
            .unwrap();
        tokio::time::advance(DEFAULT_TTL).await;

        let result = cache
            .get_or_fetch("AAPL", 30, |_| async { Err(SourceError::Timeout) })
            .await;
        assert_eq!(result.unwrap_err(), SourceError::Timeout);

        let entry = cache.entry("AAPL", 30).await.unwrap();
        assert_eq!(entry.series.prices(), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = SeriesCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = cache
            .get_or_fetch("AAPL", 30, |_| async { Err(SourceError::Timeout) })
            .await;
        assert!(result.is_err());
        assert!(cache.entry("AAPL", 30).await.is_none());

        cache
            .get_or_fetch("AAPL", 30, counting_fetcher(&calls, &[1.0, 2.0]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
