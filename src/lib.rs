pub mod cli;
pub mod core;
pub mod providers;

pub use cli::watch::WatchOptions;

use crate::core::config::AppConfig;
use crate::core::PriceHistorySource;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Stocks,
    Watch(WatchOptions),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Stock correlation starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let service = providers::build_stock_service(&config)?;

    match command {
        AppCommand::Stocks => cli::stocks::run(service.as_ref()).await,
        AppCommand::Watch(options) => {
            let history: Arc<dyn PriceHistorySource> = service.clone();
            cli::watch::run(&config, &options, history, service.as_ref()).await
        }
    }
}
