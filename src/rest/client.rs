//! Open orders REST client
//!
//! One-shot signed GET against the order query endpoint. Failures are
//! reduced to the exchange's own message; no retry, no timeout.

use crate::core::OrderSnapshot;
use crate::rest::signing::{RequestSigner, SignedRequest};
use serde::Deserialize;
use std::future::Future;

/// Default exchange REST host
pub const DEFAULT_BASE_URL: &str = "https://www.bitmex.com";

/// Business error from the exchange REST API
///
/// `message` is the exchange's human readable message; transport detail is
/// logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExchangeRequestError {
    pub message: String,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
}

impl ExchangeRequestError {
    pub fn new(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    /// Build from a non-success response body
    ///
    /// Uses `error.message` when the body carries one, `HTTP <status>` otherwise.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| format!("HTTP {}", status));
        Self::new(message, Some(status))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Source of open order snapshots
///
/// The order stream composer only depends on this seam, so tests can drive
/// it without a network.
pub trait OrderSource: Send + Sync + 'static {
    fn fetch_open_orders(
        &self,
    ) -> impl Future<Output = Result<OrderSnapshot, ExchangeRequestError>> + Send;
}

/// Signed REST client
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    signer: RequestSigner,
}

impl RestClient {
    /// Create client for `base_url` (no trailing slash)
    ///
    /// Fails if the HTTP client cannot be built (TLS backend unavailable).
    pub fn new(base_url: impl Into<String>, signer: RequestSigner) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("bitmex-streams/0.1")
            .build()
            .map_err(|e| crate::FeedError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a signed GET and parse the open orders body
    pub async fn send(&self, request: &SignedRequest) -> Result<OrderSnapshot, ExchangeRequestError> {
        let url = format!("{}{}", self.base_url, request.path);

        tracing::debug!(target: "rest", "GET {} (expires {})", request.path, request.expires);

        let mut builder = self
            .client
            .get(&url)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .header("api-key", self.signer.credentials().api_key());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(target: "rest", "order query transport failure: {}", e);
            ExchangeRequestError::new("order query failed: no response from exchange", None)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(target: "rest", "order query body read failed: {}", e);
            ExchangeRequestError::new("order query failed: response body unreadable", Some(status.as_u16()))
        })?;

        if !status.is_success() {
            let err = ExchangeRequestError::from_response(status.as_u16(), &body);
            tracing::warn!(target: "rest", "order query rejected ({}): {}", status, err.message);
            return Err(err);
        }

        OrderSnapshot::from_slice(&body).map_err(|e| {
            tracing::warn!(target: "rest", "order query body is not an order list: {}", e);
            ExchangeRequestError::new("malformed order snapshot", Some(status.as_u16()))
        })
    }
}

impl OrderSource for RestClient {
    async fn fetch_open_orders(&self) -> Result<OrderSnapshot, ExchangeRequestError> {
        let request = self.signer.open_orders();
        self.send(&request).await
    }
}
