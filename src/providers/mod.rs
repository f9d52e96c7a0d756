pub mod auth;
pub mod payload;
pub mod resilient;
pub mod retry;
pub mod stock_api;
pub mod synthetic;

use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use auth::{AnonymousCredentials, ClientCredentials, CredentialProvider};
use resilient::ResilientSource;
use retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use stock_api::StockApiClient;
use tracing::debug;

/// The configured stock service, with retries and fallback applied.
pub type StockService = ResilientSource<StockApiClient>;

pub fn build_stock_service(config: &AppConfig) -> Result<Arc<StockService>> {
    let credentials: Arc<dyn CredentialProvider> = match &config.auth {
        Some(auth) => {
            debug!("Using client credentials for {}", config.api.base_url);
            Arc::new(
                ClientCredentials::new(
                    &config.api.base_url,
                    &auth.client_id,
                    &auth.client_secret,
                    config.api.timeout(),
                )
                .context("Failed to create credential provider")?,
            )
        }
        None => Arc::new(AnonymousCredentials),
    };

    let client = StockApiClient::new(&config.api.base_url, config.api.timeout(), credentials)
        .context("Failed to create stock API client")?;
    let retry = RetryPolicy::fixed(
        config.retry.max_retries,
        Duration::from_millis(config.retry.delay_ms),
    );

    Ok(Arc::new(
        ResilientSource::new(client, retry).with_fallback(config.retry.fallback),
    ))
}
