use super::ui;
use crate::core::config::AppConfig;
use crate::core::{
    CorrelationEngine, CorrelationMatrix, PriceHistorySource, RefreshContext, RefreshScheduler,
    RefreshState, RefreshStatus, SeriesCache, StockListSource,
};
use anyhow::{Context, Result, bail};
use comfy_table::{Cell, CellAlignment, Table};
use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub symbols: Vec<String>,
    pub window_minutes: Option<u32>,
    /// Exit after the first completed refresh.
    pub once: bool,
}

pub async fn run(
    config: &AppConfig,
    options: &WatchOptions,
    history: Arc<dyn PriceHistorySource>,
    stocks: &dyn StockListSource,
) -> Result<()> {
    let symbols = resolve_symbols(config, options, stocks).await?;
    if symbols.is_empty() {
        bail!("No symbols to watch");
    }
    let window = options
        .window_minutes
        .unwrap_or(config.refresh.window_minutes);
    if window == 0 {
        bail!("Window must be at least one minute");
    }
    info!(?symbols, window_minutes = window, "Starting watch");

    let scheduler = RefreshScheduler::new(
        SeriesCache::with_ttl(config.refresh.cache_ttl()),
        history,
        CorrelationEngine::new(config.refresh.alignment),
    )
    .with_interval(config.refresh.interval());
    let handle = scheduler.start(RefreshContext::new(symbols, window));
    let mut status_rx = handle.subscribe();

    let mut spinner: Option<ProgressBar> = None;
    let outcome = loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break Err(anyhow::anyhow!("Refresh task stopped before completing a refresh"));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, stopping watch");
                break Ok(());
            }
        }

        let status = status_rx.borrow_and_update().clone();
        if status.is_loading() {
            spinner.get_or_insert_with(|| ui::new_spinner("Refreshing correlations"));
            continue;
        }
        if let Some(pb) = spinner.take() {
            pb.finish_and_clear();
        }

        display_status(&status, window);
        if options.once {
            match &status.state {
                RefreshState::Failed(detail) => break Err(anyhow::anyhow!("{detail}")),
                RefreshState::Ready(_) => break Ok(()),
                _ => {}
            }
        }
    };

    if let Some(pb) = spinner.take() {
        pb.finish_and_clear();
    }
    handle.shutdown().await;
    outcome
}

/// Command line symbols win over configured ones; with neither, every stock
/// the list service offers is watched.
async fn resolve_symbols(
    config: &AppConfig,
    options: &WatchOptions,
    stocks: &dyn StockListSource,
) -> Result<Vec<String>> {
    if !options.symbols.is_empty() {
        return Ok(normalize(&options.symbols));
    }
    if !config.symbols.is_empty() {
        return Ok(normalize(&config.symbols));
    }

    let directory = stocks
        .fetch_stocks()
        .await
        .context("Failed to fetch stock list")?;
    Ok(directory.symbols())
}

fn normalize(symbols: &[String]) -> Vec<String> {
    symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn display_status(status: &RefreshStatus, window: u32) {
    match &status.state {
        RefreshState::Ready(matrix) => {
            println!(
                "\n{} {}",
                ui::style_text(
                    &format!("Correlation over the last {window} minutes"),
                    ui::StyleType::Title
                ),
                ui::style_text(
                    &matrix.computed_at().format("%H:%M:%S UTC").to_string(),
                    ui::StyleType::Subtle
                )
            );
            println!("{}", render_matrix(matrix));
            println!("{}", render_stats(matrix));
            if matrix.has_synthetic_data() {
                println!(
                    "{}",
                    ui::style_text(
                        "* live data unavailable, synthetic prices shown",
                        ui::StyleType::Warning
                    )
                );
            }
            ui::print_separator();
        }
        RefreshState::Failed(detail) => {
            println!("{}", ui::style_text(&detail.to_string(), ui::StyleType::Error));
            if let Some(stale) = &status.stale {
                println!(
                    "{}",
                    ui::style_text(
                        &format!(
                            "Last good matrix from {} remains in effect",
                            stale.computed_at().format("%H:%M:%S UTC")
                        ),
                        ui::StyleType::Subtle
                    )
                );
            }
        }
        RefreshState::Idle => println!("No symbols selected"),
        RefreshState::Loading => {}
    }
}

fn render_matrix(matrix: &CorrelationMatrix) -> Table {
    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("")];
    header.extend(
        matrix
            .symbols()
            .iter()
            .map(|s| ui::symbol_cell(s, matrix.origin(s))),
    );
    table.set_header(header);

    for row_symbol in matrix.symbols() {
        let mut row = vec![ui::symbol_cell(row_symbol, matrix.origin(row_symbol))];
        row.extend(
            matrix
                .symbols()
                .iter()
                .map(|col| ui::correlation_cell(matrix.get(row_symbol, col))),
        );
        table.add_row(row);
    }
    table
}

fn render_stats(matrix: &CorrelationMatrix) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Samples"),
        ui::header_cell("Mean"),
        ui::header_cell("Std Dev"),
    ]);

    for symbol in matrix.symbols() {
        let stats = matrix.stats(symbol);
        table.add_row(vec![
            ui::symbol_cell(symbol, matrix.origin(symbol)),
            Cell::new(stats.map_or(0, |s| s.samples)).set_alignment(CellAlignment::Right),
            ui::format_optional_cell(stats.map(|s| s.mean), |v| format!("{v:.2}")),
            ui::format_optional_cell(stats.map(|s| s.std_dev), |v| format!("{v:.2}")),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SourceError;
    use crate::core::source::StockDirectory;
    use crate::providers::synthetic;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;

    struct SampleStocks;

    #[async_trait]
    impl StockListSource for SampleStocks {
        async fn fetch_stocks(&self) -> Result<StockDirectory, SourceError> {
            Ok(synthetic::stock_directory())
        }
    }

    fn sample_matrix() -> CorrelationMatrix {
        let now = Utc::now();
        let series: BTreeMap<_, _> = ["AAPL", "MSFT"]
            .into_iter()
            .map(|s| (s.to_string(), synthetic::price_series(s, now)))
            .collect();
        CorrelationEngine::default().compute(&series)
    }

    #[tokio::test]
    async fn test_command_line_symbols_take_precedence() {
        let config = AppConfig {
            symbols: vec!["TSLA".to_string()],
            ..AppConfig::default()
        };
        let options = WatchOptions {
            symbols: vec!["aapl".to_string()],
            ..WatchOptions::default()
        };

        let symbols = resolve_symbols(&config, &options, &SampleStocks).await.unwrap();
        assert_eq!(symbols, vec!["AAPL"]);

        let symbols = resolve_symbols(&config, &WatchOptions::default(), &SampleStocks)
            .await
            .unwrap();
        assert_eq!(symbols, vec!["TSLA"]);
    }

    #[tokio::test]
    async fn test_configured_symbols_are_normalized_like_command_line() {
        let config = AppConfig {
            symbols: vec!["aapl".to_string(), " msft ".to_string()],
            ..AppConfig::default()
        };
        let from_config = resolve_symbols(&config, &WatchOptions::default(), &SampleStocks)
            .await
            .unwrap();

        let options = WatchOptions {
            symbols: vec!["AAPL".to_string(), "msft".to_string()],
            ..WatchOptions::default()
        };
        let from_args = resolve_symbols(&AppConfig::default(), &options, &SampleStocks)
            .await
            .unwrap();

        assert_eq!(from_config, vec!["AAPL", "MSFT"]);
        assert_eq!(from_config, from_args);
    }

    #[tokio::test]
    async fn test_directory_used_when_nothing_configured() {
        let symbols = resolve_symbols(
            &AppConfig::default(),
            &WatchOptions::default(),
            &SampleStocks,
        )
        .await
        .unwrap();
        assert_eq!(symbols.len(), 6);
    }

    #[test]
    fn test_matrix_table_has_row_per_symbol() {
        let matrix = sample_matrix();
        let table = render_matrix(&matrix);
        assert_eq!(table.row_iter().count(), 2);

        let diagonal: Vec<String> = table
            .row_iter()
            .enumerate()
            .filter_map(|(i, row)| row.cell_iter().nth(i + 1).map(|c| c.content()))
            .collect();
        assert_eq!(diagonal, vec!["1.00", "1.00"]);
    }

    #[test]
    fn test_stats_table_marks_synthetic_symbols() {
        let table = render_stats(&sample_matrix());
        let first = table
            .row_iter()
            .next()
            .and_then(|row| row.cell_iter().next().map(|c| c.content()));
        assert_eq!(first.as_deref(), Some("AAPL*"));
    }
}
