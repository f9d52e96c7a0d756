use crate::core::error::SourceError;
use crate::core::series::PriceSeries;
use crate::core::source::{PriceHistorySource, StockDirectory, StockListSource};
use crate::providers::retry::RetryPolicy;
use crate::providers::synthetic;
use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

/// Wraps a source with a retry policy and, optionally, synthetic fallback
/// data once retries are exhausted.
///
/// Authentication failures are never replaced by fallback data.
pub struct ResilientSource<S> {
    inner: S,
    retry: RetryPolicy,
    fallback: bool,
}

impl<S> ResilientSource<S> {
    pub fn new(inner: S, retry: RetryPolicy) -> Self {
        Self {
            inner,
            retry,
            fallback: true,
        }
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback = false;
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    fn should_fall_back(&self, error: &SourceError) -> bool {
        self.fallback && !error.is_auth()
    }
}

#[async_trait]
impl<S: PriceHistorySource> PriceHistorySource for ResilientSource<S> {
    async fn fetch_history(
        &self,
        symbol: &str,
        window_minutes: Option<u32>,
    ) -> Result<PriceSeries, SourceError> {
        match self
            .retry
            .run(|| self.inner.fetch_history(symbol, window_minutes))
            .await
        {
            Ok(series) => Ok(series),
            Err(e) if self.should_fall_back(&e) => {
                warn!(
                    symbol,
                    error = %e,
                    fallback = true,
                    "Price history unavailable, serving synthetic series"
                );
                Ok(synthetic::price_series(symbol, Utc::now()))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<S: StockListSource> StockListSource for ResilientSource<S> {
    async fn fetch_stocks(&self) -> Result<StockDirectory, SourceError> {
        match self.retry.run(|| self.inner.fetch_stocks()).await {
            Ok(directory) => Ok(directory),
            Err(e) if self.should_fall_back(&e) => {
                warn!(
                    error = %e,
                    fallback = true,
                    "Stock list unavailable, serving sample stocks"
                );
                Ok(synthetic::stock_directory())
            }
            Err(e) => Err(e),
        }
    }
}
