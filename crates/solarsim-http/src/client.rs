//! HTTP gateway backed by `reqwest`.
//!
//! One call is one POST: no retry, no caching, no coalescing. Every way the
//! call can go wrong comes back as a classified [`FetchError`]:
//! - deadline expired → `Timeout`
//! - connection/transport failure → `NetworkError`
//! - non-2xx status → `BadStatus` (body text kept as details)
//! - 2xx with a body that is not JSON → `InvalidContent`

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use solarsim_core::config::EndpointConfig;
use solarsim_core::error::{ConfigError, FetchError, FetchResult, FetchSuccess};
use solarsim_core::transport::Transport;

/// Gateway to a BRP server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpGateway {
    /// Create a gateway for the endpoint described by `config`.
    pub fn new(config: &EndpointConfig) -> Result<Self, ConfigError> {
        Self::with_url(config.url(), config.request_timeout)
    }

    /// Create a gateway for an explicit URL.
    pub fn with_url(url: impl Into<String>, request_timeout: Duration) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            request_timeout,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn exchange(&self, body: &Value) -> FetchResult<Value> {
        let resp = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FetchError::bad_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
                text,
            ));
        }

        let text = resp.text().await.map_err(|e| self.classify(e))?;
        match serde_json::from_str::<Value>(&text) {
            Ok(data) => Ok(FetchSuccess {
                status: status.as_u16(),
                data,
            }),
            Err(e) => Err(FetchError::invalid_content(
                format!("Response body is not valid JSON: {e}"),
                text,
            )),
        }
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            return FetchError::timeout(self.request_timeout.as_millis());
        }
        FetchError::network(Some(error_chain(&err)), format!("{err:?}"))
    }
}

/// `outer: inner: root` rendering of an error and its sources.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[async_trait]
impl Transport for HttpGateway {
    async fn post(&self, body: Value) -> FetchResult<Value> {
        let started = Instant::now();

        // Dropping the exchange on expiry aborts the in-flight request.
        let outcome = match tokio::time::timeout(self.request_timeout, self.exchange(&body)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::timeout(self.request_timeout.as_millis())),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(success) => {
                tracing::debug!(url = %self.url, status = success.status, elapsed_ms, "request complete");
            }
            Err(e) => {
                tracing::warn!(
                    url = %self.url,
                    kind = %e.kind,
                    status = e.status,
                    elapsed_ms,
                    error = %e.message,
                    "request failed"
                );
            }
        }
        outcome
    }

    fn url(&self) -> &str {
        &self.url
    }
}
