//! Decoders for the stock service's response bodies.
//!
//! The service is inconsistent about envelopes, so each body is matched
//! against a short, ordered list of known shapes. Anything else is a
//! [`SourceError::DataShape`].
use crate::core::error::SourceError;
use crate::core::series::PriceSample;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize, Debug)]
struct WirePrice {
    symbol: Option<String>,
    price: f64,
    #[serde(alias = "lastUpdatedAt")]
    timestamp: DateTime<Utc>,
}

// Variant order is the match order.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum HistoryPayload {
    List(Vec<WirePrice>),
    Prices { prices: Vec<WirePrice> },
    Stock { stock: WirePrice },
    Bare(WirePrice),
}

#[derive(Deserialize, Debug)]
struct WireStock {
    symbol: String,
    name: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum StockListPayload {
    Listing(Vec<WireStock>),
    Stocks { stocks: BTreeMap<String, String> },
    Mapping(BTreeMap<String, String>),
}

/// Decodes a price history body. Samples without a symbol are attributed to
/// the requested ticker.
pub fn decode_price_history(symbol: &str, body: &str) -> Result<Vec<PriceSample>, SourceError> {
    let payload: HistoryPayload = serde_json::from_str(body).map_err(|_| {
        SourceError::DataShape(format!(
            "Unrecognised price history for {symbol}: '{}'",
            preview(body)
        ))
    })?;

    let wire = match payload {
        HistoryPayload::List(prices) | HistoryPayload::Prices { prices } => prices,
        HistoryPayload::Stock { stock } | HistoryPayload::Bare(stock) => vec![stock],
    };

    Ok(wire
        .into_iter()
        .map(|p| PriceSample {
            symbol: p.symbol.unwrap_or_else(|| symbol.to_string()),
            price: p.price,
            timestamp: p.timestamp,
        })
        .collect())
}

/// Decodes a stock list body into display name -> ticker.
pub fn decode_stock_list(body: &str) -> Result<BTreeMap<String, String>, SourceError> {
    let payload: StockListPayload = serde_json::from_str(body).map_err(|_| {
        SourceError::DataShape(format!("Unrecognised stock list: '{}'", preview(body)))
    })?;

    let entries = match payload {
        StockListPayload::Listing(stocks) => stocks
            .into_iter()
            .map(|s| (s.name.unwrap_or_else(|| s.symbol.clone()), s.symbol))
            .collect(),
        StockListPayload::Stocks { stocks } => stocks,
        StockListPayload::Mapping(stocks) => stocks,
    };

    if entries.is_empty() {
        return Err(SourceError::DataShape("Stock list is empty".to_string()));
    }
    Ok(entries)
}

fn preview(body: &str) -> String {
    body.chars().take(120).collect()
}
