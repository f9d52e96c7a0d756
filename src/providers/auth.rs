//! Credential providers injected into the stock API client.
use crate::core::error::SourceError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Tokens are renewed this many seconds before they expire.
pub const TOKEN_REFRESH_THRESHOLD_SECS: i64 = 300;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Headers to attach to every request.
    async fn auth_headers(&self) -> Result<HeaderMap, SourceError>;
}

/// For services that need no authentication.
pub struct AnonymousCredentials;

#[async_trait]
impl CredentialProvider for AnonymousCredentials {
    async fn auth_headers(&self) -> Result<HeaderMap, SourceError> {
        Ok(HeaderMap::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub token_type: String,
    pub access_token: String,
    /// Unix timestamp in seconds.
    pub expires_at: i64,
}

impl AuthToken {
    pub fn needs_refresh(&self, now: i64) -> bool {
        now >= self.expires_at - TOKEN_REFRESH_THRESHOLD_SECS
    }

    fn header_value(&self) -> Result<HeaderValue, SourceError> {
        HeaderValue::from_str(&format!("{} {}", self.token_type, self.access_token)).map_err(
            |_| SourceError::Auth {
                status: None,
                message: "Authentication failed: token is not a valid header value".to_string(),
            },
        )
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    #[serde(rename = "clientID")]
    client_id: &'a str,
    #[serde(rename = "clientSecret")]
    client_secret: &'a str,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(alias = "token")]
    access_token: String,
    expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Bearer tokens obtained with a client id and secret, reused until they are
/// about to expire.
pub struct ClientCredentials {
    token_url: String,
    client_id: String,
    client_secret: String,
    client: reqwest::Client,
    token: Mutex<Option<AuthToken>>,
}

impl ClientCredentials {
    pub fn new(
        base_url: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent("stockcorr/1.0")
            .timeout(timeout)
            .build()
            .map_err(|e| refresh_failed(None, &e.to_string()))?;
        Ok(Self {
            token_url: format!("{}/auth/token", base_url.trim_end_matches('/')),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            client,
            token: Mutex::new(None),
        })
    }

    /// Seeds the provider with an already issued token.
    pub fn with_token(self, token: AuthToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
            ..self
        }
    }

    #[instrument(name = "TokenRefresh", skip(self), fields(url = %self.token_url))]
    async fn request_token(&self) -> Result<AuthToken, SourceError> {
        debug!("Requesting access token");
        let response = self
            .client
            .post(&self.token_url)
            .json(&TokenRequest {
                client_id: &self.client_id,
                client_secret: &self.client_secret,
            })
            .send()
            .await
            .map_err(|e| refresh_failed(None, &e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(refresh_failed(Some(status.as_u16()), status.as_str()));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| refresh_failed(None, &e.to_string()))?;
        Ok(AuthToken {
            token_type: body.token_type,
            access_token: body.access_token,
            expires_at: body.expires_in,
        })
    }
}

fn refresh_failed(status: Option<u16>, reason: &str) -> SourceError {
    warn!(?status, reason, "Token refresh failed");
    SourceError::Auth {
        status,
        message: "Authentication failed: Unable to refresh token".to_string(),
    }
}

#[async_trait]
impl CredentialProvider for ClientCredentials {
    async fn auth_headers(&self) -> Result<HeaderMap, SourceError> {
        let mut token = self.token.lock().await;
        let now = Utc::now().timestamp();
        if token.as_ref().is_none_or(|t| t.needs_refresh(now)) {
            *token = Some(self.request_token().await?);
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = token.as_ref() {
            headers.insert(AUTHORIZATION, token.header_value()?);
        }
        Ok(headers)
    }
}
