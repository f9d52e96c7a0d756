//! Core domain: series, caching, correlation and refresh scheduling

pub mod cache;
pub mod config;
pub mod correlation;
pub mod error;
pub mod log;
pub mod scheduler;
pub mod series;
pub mod source;

// Re-export main types for cleaner imports
pub use cache::SeriesCache;
pub use correlation::{Alignment, CorrelationEngine, CorrelationMatrix};
pub use error::{ErrorDetail, ErrorKind, SourceError};
pub use scheduler::{RefreshContext, RefreshHandle, RefreshScheduler, RefreshState, RefreshStatus};
pub use series::{DataOrigin, PriceSample, PriceSeries, SeriesKey};
pub use source::{PriceHistorySource, StockDirectory, StockListSource};
