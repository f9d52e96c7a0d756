use std::fs;
use stockcorr::{AppCommand, WatchOptions};
use tempfile::NamedTempFile;

// Adds automatic logging to test
mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub fn history_body(prices: &[f64]) -> String {
        let samples: Vec<String> = prices
            .iter()
            .enumerate()
            .map(|(i, price)| {
                format!(r#"{{"price": {price}, "lastUpdatedAt": "2025-05-08T04:{i:02}:00Z"}}"#)
            })
            .collect();
        format!("[{}]", samples.join(","))
    }

    pub async fn mount_history(server: &MockServer, symbol: &str, prices: &[f64]) {
        Mock::given(method("GET"))
            .and(path(format!("/stocks/{symbol}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(history_body(prices)))
            .mount(server)
            .await;
    }

    pub async fn mount_stock_list(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/stock/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"stocks": {"Apple Inc.": "AAPL", "Microsoft Corporation": "MSFT"}}"#,
            ))
            .mount(server)
            .await;
    }
}

fn write_config(base_url: &str, extra: &str) -> NamedTempFile {
    let config_file = NamedTempFile::new().expect("Failed to create temp file");
    let config_content = format!(
        r#"
api:
  base_url: {base_url}
retry:
  max_retries: 1
  delay_ms: 5
{extra}
"#
    );
    fs::write(config_file.path(), config_content).expect("Failed to write config file");
    config_file
}

fn watch_once(symbols: &[&str]) -> AppCommand {
    AppCommand::Watch(WatchOptions {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        window_minutes: Some(15),
        once: true,
    })
}

#[test_log::test(tokio::test)]
async fn test_watch_once_with_mock_service() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_history(&mock_server, "AAPL", &[1.0, 2.0, 3.0, 4.0, 5.0]).await;
    test_utils::mount_history(&mock_server, "MSFT", &[10.0, 20.0, 30.0, 40.0, 50.0]).await;
    let config = write_config(&mock_server.uri(), "");

    let result = stockcorr::run_command(
        watch_once(&["AAPL", "MSFT"]),
        Some(config.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "Watch failed with: {:?}", result.err());

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(
        requests
            .iter()
            .all(|r| r.url.query() == Some("minutes=15"))
    );
}

#[test_log::test(tokio::test)]
async fn test_watch_uses_stock_list_without_symbols() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_stock_list(&mock_server).await;
    test_utils::mount_history(&mock_server, "AAPL", &[3.0, 1.0, 2.0]).await;
    test_utils::mount_history(&mock_server, "MSFT", &[6.0, 2.0, 4.0]).await;
    let config = write_config(&mock_server.uri(), "");

    let result =
        stockcorr::run_command(watch_once(&[]), Some(config.path().to_str().unwrap())).await;
    assert!(result.is_ok(), "Watch failed with: {:?}", result.err());

    let paths: Vec<String> = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert!(paths.contains(&"/stock/list".to_string()));
    assert!(paths.contains(&"/stocks/AAPL".to_string()));
    assert!(paths.contains(&"/stocks/MSFT".to_string()));
}

#[test_log::test(tokio::test)]
async fn test_unavailable_service_falls_back_to_synthetic_data() {
    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;
    let config = write_config(&mock_server.uri(), "");

    let result = stockcorr::run_command(
        watch_once(&["AAPL", "MSFT"]),
        Some(config.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "Watch failed with: {:?}", result.err());

    let result =
        stockcorr::run_command(AppCommand::Stocks, Some(config.path().to_str().unwrap())).await;
    assert!(result.is_ok(), "Stocks failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_disabled_fallback_reports_server_error() {
    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(
            wiremock::ResponseTemplate::new(500).set_body_string(r#"{"message": "db down"}"#),
        )
        .mount(&mock_server)
        .await;
    let config = write_config(&mock_server.uri(), "  fallback: false");

    let err = stockcorr::run_command(watch_once(&["AAPL"]), Some(config.path().to_str().unwrap()))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "server error for AAPL: Server error (500): db down"
    );
}

#[test_log::test(tokio::test)]
async fn test_authentication_failure_is_not_masked() {
    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;
    let config = write_config(&mock_server.uri(), "");

    let err = stockcorr::run_command(watch_once(&["AAPL"]), Some(config.path().to_str().unwrap()))
        .await
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("Authentication failed. Please check your credentials."),
        "{err}"
    );
}

#[test_log::test(tokio::test)]
async fn test_client_credentials_are_sent() {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    let mock_server = wiremock::MockServer::start().await;
    let expires = chrono::Utc::now().timestamp() + 3600;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "access_token": "integration-token",
            "expires_in": expires
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stocks/NVDA"))
        .and(header("authorization", "Bearer integration-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(test_utils::history_body(&[1.0, 2.0])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = write_config(
        &mock_server.uri(),
        "auth:\n  client_id: id\n  client_secret: secret",
    );

    let result =
        stockcorr::run_command(watch_once(&["NVDA"]), Some(config.path().to_str().unwrap())).await;
    assert!(result.is_ok(), "Watch failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_zero_refresh_interval_is_rejected() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_history(&mock_server, "AAPL", &[1.0, 2.0, 3.0]).await;
    let config = write_config(&mock_server.uri(), "refresh:\n  interval_secs: 0");

    let err = stockcorr::run_command(watch_once(&["AAPL"]), Some(config.path().to_str().unwrap()))
        .await
        .unwrap_err();
    assert!(
        format!("{err:#}").contains("refresh.interval_secs must be greater than zero"),
        "{err:#}"
    );
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_zero_window_is_rejected() {
    let mock_server = wiremock::MockServer::start().await;
    let config = write_config(&mock_server.uri(), "");

    let result = stockcorr::run_command(
        AppCommand::Watch(WatchOptions {
            symbols: vec!["AAPL".to_string()],
            window_minutes: Some(0),
            once: true,
        }),
        Some(config.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_err());
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_missing_config_file_is_an_error() {
    let result = stockcorr::run_command(
        AppCommand::Stocks,
        Some("/nonexistent/stockcorr/config.yaml"),
    )
    .await;
    assert!(result.is_err());
}
