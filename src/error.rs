//! Error taxonomy for the credential broker.
//!
//! Every failure surfaced by the lifecycle manager is one of these variants.
//! Nothing is retried; errors propagate to the immediate caller and the HTTP
//! layer turns them into a status code plus a JSON body.

use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Non-2xx response or network failure talking to a provider
    #[error("{provider} request failed{}: {detail}", status_suffix(.status))]
    Upstream {
        provider: String,
        status: Option<u16>,
        detail: String,
    },

    /// Anti-forgery state is missing, expired or already used
    #[error("State does not match or has expired.")]
    State,

    /// Provider reported a denial on the callback
    #[error("{description}")]
    Auth { error: String, description: String },

    /// No stored credential for the (provider, org, user) identity
    #[error("No {provider} credentials found. Please re-authenticate.")]
    NotAuthenticated { provider: String },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Integration '{0}' not found")]
    UnknownProvider(String),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|s| format!(" with status {}", s))
        .unwrap_or_default()
}

impl BrokerError {
    pub fn upstream(provider: &str, status: Option<u16>, detail: impl Into<String>) -> Self {
        BrokerError::Upstream {
            provider: provider.to_string(),
            status,
            detail: detail.into(),
        }
    }

    /// HTTP status the error is surfaced with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BrokerError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            BrokerError::State => StatusCode::BAD_REQUEST,
            BrokerError::Auth { .. } => StatusCode::BAD_REQUEST,
            BrokerError::NotAuthenticated { .. } => StatusCode::UNAUTHORIZED,
            BrokerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            BrokerError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            BrokerError::Storage(_) | BrokerError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::Storage(anyhow::Error::new(e).context("Malformed stored record"))
    }
}
