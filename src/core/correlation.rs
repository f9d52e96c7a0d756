//! Pairwise Pearson correlation across a set of price series.
//!
//! The engine never fails: degenerate inputs (fewer than two paired samples,
//! or a series with zero variance) produce a correlation of 0 instead of NaN,
//! so the matrix is always numerically well formed.
use crate::core::series::{DataOrigin, PriceSeries};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// How samples from two series are paired before correlating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    /// Pair the first `min(len(a), len(b))` samples of each series in stored order.
    #[default]
    Positional,
    /// Pair only samples that share a timestamp. When a timestamp repeats,
    /// the first sample for it is used.
    Timestamp,
}

/// Mean and sample standard deviation over a symbol's full series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    pub mean: f64,
    pub std_dev: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    symbols: Vec<String>,
    cells: BTreeMap<String, BTreeMap<String, f64>>,
    stats: BTreeMap<String, SeriesStats>,
    origins: BTreeMap<String, DataOrigin>,
    computed_at: DateTime<Utc>,
}

impl CorrelationMatrix {
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.cells.get(a).and_then(|row| row.get(b)).copied()
    }

    pub fn stats(&self, symbol: &str) -> Option<&SeriesStats> {
        self.stats.get(symbol)
    }

    pub fn origin(&self, symbol: &str) -> Option<DataOrigin> {
        self.origins.get(symbol).copied()
    }

    /// True when any input series came from the synthetic fallback.
    pub fn has_synthetic_data(&self) -> bool {
        self.origins.values().any(|o| *o == DataOrigin::Synthetic)
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationEngine {
    alignment: Alignment,
}

impl CorrelationEngine {
    pub fn new(alignment: Alignment) -> Self {
        Self { alignment }
    }

    /// Computes the full matrix. Each unordered pair is evaluated once and
    /// mirrored, so the result is symmetric by construction.
    pub fn compute(&self, series_by_symbol: &BTreeMap<String, PriceSeries>) -> CorrelationMatrix {
        let mut cells: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        let mut stats = BTreeMap::new();
        let mut origins = BTreeMap::new();

        let entries: Vec<(&String, &PriceSeries)> = series_by_symbol.iter().collect();
        for (i, (symbol_a, series_a)) in entries.iter().enumerate() {
            stats.insert((*symbol_a).clone(), series_stats(&series_a.prices()));
            origins.insert((*symbol_a).clone(), series_a.origin());

            for (symbol_b, series_b) in &entries[i..] {
                let (a, b) = self.paired_prices(series_a, series_b);
                let r = pearson(&a, &b);
                cells
                    .entry((*symbol_a).clone())
                    .or_default()
                    .insert((*symbol_b).clone(), r);
                cells
                    .entry((*symbol_b).clone())
                    .or_default()
                    .insert((*symbol_a).clone(), r);
            }
        }

        debug!(
            symbols = series_by_symbol.len(),
            alignment = ?self.alignment,
            "Computed correlation matrix"
        );

        CorrelationMatrix {
            symbols: series_by_symbol.keys().cloned().collect(),
            cells,
            stats,
            origins,
            computed_at: Utc::now(),
        }
    }

    fn paired_prices(&self, a: &PriceSeries, b: &PriceSeries) -> (Vec<f64>, Vec<f64>) {
        match self.alignment {
            Alignment::Positional => {
                let n = a.len().min(b.len());
                (
                    a.samples()[..n].iter().map(|s| s.price).collect(),
                    b.samples()[..n].iter().map(|s| s.price).collect(),
                )
            }
            Alignment::Timestamp => {
                // First sample wins on both sides when a timestamp repeats.
                let mut by_time: HashMap<_, f64> = HashMap::new();
                for s in b.samples() {
                    by_time.entry(s.timestamp).or_insert(s.price);
                }
                let mut seen = HashSet::new();
                a.samples()
                    .iter()
                    .filter(|s| seen.insert(s.timestamp))
                    .filter_map(|s| by_time.get(&s.timestamp).map(|pb| (s.price, *pb)))
                    .unzip()
            }
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

// Bessel-corrected; a single sample has no spread.
fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

pub fn series_stats(prices: &[f64]) -> SeriesStats {
    let mean = mean(prices);
    SeriesStats {
        mean,
        std_dev: sample_std_dev(prices, mean),
        samples: prices.len(),
    }
}

/// Pearson correlation of two equally long price slices.
///
/// Returns 0 when fewer than two pairs are available or either side has zero
/// variance. The result is clamped to [-1, 1].
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);

    let mean_a = mean(a);
    let mean_b = mean(b);
    let std_a = sample_std_dev(a, mean_a);
    let std_b = sample_std_dev(b, mean_b);
    if std_a == 0.0 || std_b == 0.0 {
        return 0.0;
    }

    let covariance = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / (n - 1) as f64;

    let correlation = covariance / (std_a * std_b);
    if correlation.is_finite() {
        correlation.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
