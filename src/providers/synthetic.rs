//! Stand-in data served when the stock service cannot be reached.
//!
//! Every value produced here is tagged [`DataOrigin::Synthetic`].
use crate::core::series::{DataOrigin, PriceSample, PriceSeries};
use crate::core::source::StockDirectory;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SAMPLE_COUNT: usize = 10;
pub const BASE_PRICE: f64 = 100.0;
pub const PRICE_JITTER: f64 = 10.0;

const SAMPLE_STOCKS: [(&str, &str); 6] = [
    ("Apple Inc.", "AAPL"),
    ("Alphabet Inc.", "GOOGL"),
    ("Microsoft Corporation", "MSFT"),
    ("Amazon.com Inc.", "AMZN"),
    ("Meta Platforms Inc.", "META"),
    ("Tesla Inc.", "TSLA"),
];

// FNV-1a, so the seed does not depend on the std hasher's per-release details.
fn seed_for(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Ten one-minute samples ending at `now`, newest first. Prices are
/// `BASE_PRICE` plus a jitter in `[0, PRICE_JITTER)` that depends only on the
/// symbol.
pub fn price_series(symbol: &str, now: DateTime<Utc>) -> PriceSeries {
    let mut rng = StdRng::seed_from_u64(seed_for(symbol));
    let samples = (0..SAMPLE_COUNT)
        .map(|i| PriceSample {
            symbol: symbol.to_string(),
            price: BASE_PRICE + rng.random::<f64>() * PRICE_JITTER,
            timestamp: now - Duration::minutes(i as i64),
        })
        .collect();
    PriceSeries::new(symbol, samples, DataOrigin::Synthetic)
}

pub fn stock_directory() -> StockDirectory {
    StockDirectory {
        entries: SAMPLE_STOCKS
            .iter()
            .map(|(name, symbol)| (name.to_string(), symbol.to_string()))
            .collect(),
        origin: DataOrigin::Synthetic,
    }
}
