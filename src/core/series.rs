//! Price history types shared by the sources, the cache and the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;

/// Where a series came from. Synthetic data is produced by the fallback
/// policy and must never be mistaken for market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataOrigin {
    Live,
    Synthetic,
}

impl Display for DataOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                DataOrigin::Live => "live",
                DataOrigin::Synthetic => "synthetic",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Samples for one symbol, kept in the order the source returned them.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    symbol: String,
    samples: Arc<[PriceSample]>,
    origin: DataOrigin,
}

impl PriceSeries {
    pub fn new(symbol: &str, samples: Vec<PriceSample>, origin: DataOrigin) -> Self {
        Self {
            symbol: symbol.to_string(),
            samples: samples.into(),
            origin,
        }
    }

    pub fn live(symbol: &str, samples: Vec<PriceSample>) -> Self {
        Self::new(symbol, samples, DataOrigin::Live)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }

    pub fn origin(&self) -> DataOrigin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.price).collect()
    }
}

/// Cache key: one series per symbol and lookback window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub symbol: String,
    pub window_minutes: u32,
}

impl SeriesKey {
    pub fn new(symbol: &str, window_minutes: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            window_minutes,
        }
    }
}

impl Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}m", self.symbol, self.window_minutes)
    }
}
