//! Error taxonomy for the data sources and its presentation classification

use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

/// Failures raised by price history and stock list sources.
///
/// `Clone` is required because a single in-flight fetch may be awaited by
/// several callers, each of which receives the same result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Unable to connect to the server. Please check your internet connection. ({0})")]
    Network(String),

    #[error("The request timed out. Please try again.")]
    Timeout,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("{message}")]
    Auth { status: Option<u16>, message: String },

    #[error("Unexpected response shape: {0}")]
    DataShape(String),
}

impl SourceError {
    pub fn unauthorized() -> Self {
        SourceError::Auth {
            status: Some(401),
            message: "Authentication failed. Please check your credentials.".to_string(),
        }
    }

    pub fn forbidden() -> Self {
        SourceError::Auth {
            status: Some(403),
            message: "Access denied. Please check your permissions.".to_string(),
        }
    }

    /// Network failures, timeouts and 5xx responses are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Network(_) | SourceError::Timeout => true,
            SourceError::Server { status, .. } => *status >= 500,
            SourceError::Auth { .. } | SourceError::DataShape(_) => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SourceError::Auth { .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_decode() {
            SourceError::DataShape(e.to_string())
        } else if let Some(status) = e.status() {
            SourceError::Server {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Auth,
    Network,
    Server,
    Unknown,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ErrorKind::Auth => "authentication",
                ErrorKind::Network => "network",
                ErrorKind::Server => "server",
                ErrorKind::Unknown => "unknown",
            }
        )
    }
}

/// A failed refresh, classified by cause for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub symbol: Option<String>,
    pub message: String,
}

impl ErrorDetail {
    pub fn for_symbol(symbol: &str, error: &SourceError) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            ..Self::from(error)
        }
    }
}

impl From<&SourceError> for ErrorDetail {
    fn from(error: &SourceError) -> Self {
        let kind = match error {
            SourceError::Auth { .. } => ErrorKind::Auth,
            SourceError::Network(_) | SourceError::Timeout => ErrorKind::Network,
            SourceError::Server { .. } => ErrorKind::Server,
            SourceError::DataShape(_) => ErrorKind::Unknown,
        };
        Self {
            kind,
            symbol: None,
            message: error.to_string(),
        }
    }
}

impl Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{} error for {}: {}", self.kind, symbol, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}
