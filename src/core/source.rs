//! Contracts for the external data collaborators

use crate::core::error::SourceError;
use crate::core::series::{DataOrigin, PriceSeries};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Supplies a ticker's price history over a lookback window.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    async fn fetch_history(
        &self,
        symbol: &str,
        window_minutes: Option<u32>,
    ) -> Result<PriceSeries, SourceError>;
}

/// Display name to ticker symbol, as offered by the stock list service.
#[derive(Debug, Clone, PartialEq)]
pub struct StockDirectory {
    pub entries: BTreeMap<String, String>,
    pub origin: DataOrigin,
}

impl StockDirectory {
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.entries.values().cloned().collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}

#[async_trait]
pub trait StockListSource: Send + Sync {
    async fn fetch_stocks(&self) -> Result<StockDirectory, SourceError>;
}
