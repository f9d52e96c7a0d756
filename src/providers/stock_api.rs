use crate::core::error::SourceError;
use crate::core::series::{DataOrigin, PriceSeries};
use crate::core::source::{PriceHistorySource, StockDirectory, StockListSource};
use crate::providers::auth::CredentialProvider;
use crate::providers::payload::{decode_price_history, decode_stock_list};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Client for the stock service's price history and stock list endpoints.
///
/// The service has exposed the same resources under singular and plural
/// paths; both are tried in order and the first success wins.
pub struct StockApiClient {
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl StockApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent("stockcorr/1.0")
            .timeout(timeout)
            .build()?;
        Ok(StockApiClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credentials,
        })
    }

    fn history_urls(&self, symbol: &str, window_minutes: Option<u32>) -> [String; 2] {
        // A zero window means "no window", as the service treats it.
        let query = window_minutes
            .filter(|m| *m > 0)
            .map_or(String::new(), |m| format!("?minutes={m}"));
        [
            format!("{}/stocks/{}{}", self.base_url, symbol, query),
            format!("{}/stock/{}{}", self.base_url, symbol, query),
        ]
    }

    fn list_urls(&self) -> [String; 2] {
        [
            format!("{}/stock/list", self.base_url),
            format!("{}/stocks", self.base_url),
        ]
    }

    async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let headers = self.credentials.auth_headers().await?;
        debug!("Requesting {}", url);

        let response = self
            .client
            .get(url)
            .headers(headers)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => return Err(SourceError::unauthorized()),
            StatusCode::FORBIDDEN => return Err(SourceError::forbidden()),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(SourceError::Server {
                    status: s.as_u16(),
                    message: server_message(&body),
                });
            }
            _ => {}
        }

        Ok(response.text().await?)
    }

    /// Tries each URL in turn. Authentication failures stop the search since
    /// every alternative shares the same credentials.
    async fn first_success<T>(
        &self,
        urls: &[String],
        decode: impl Fn(&str) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        let mut last_error = SourceError::Network("no endpoints configured".to_string());
        for url in urls {
            match self.get_text(url).await.and_then(|body| decode(&body)) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    debug!("Request to {} failed: {}", url, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

fn server_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| "Unknown error".to_string())
}

#[async_trait]
impl PriceHistorySource for StockApiClient {
    #[instrument(name = "PriceHistoryFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_history(
        &self,
        symbol: &str,
        window_minutes: Option<u32>,
    ) -> Result<PriceSeries, SourceError> {
        let urls = self.history_urls(symbol, window_minutes);
        let samples = self
            .first_success(&urls, |body| decode_price_history(symbol, body))
            .await?;
        debug!(samples = samples.len(), "Received price history");
        Ok(PriceSeries::live(symbol, samples))
    }
}

#[async_trait]
impl StockListSource for StockApiClient {
    #[instrument(name = "StockListFetch", skip(self))]
    async fn fetch_stocks(&self) -> Result<StockDirectory, SourceError> {
        let entries = self
            .first_success(&self.list_urls(), decode_stock_list)
            .await?;
        debug!(stocks = entries.len(), "Received stock list");
        Ok(StockDirectory {
            entries,
            origin: DataOrigin::Live,
        })
    }
}
