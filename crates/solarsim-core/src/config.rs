//! Endpoint configuration, built once at startup and handed to the gateway.

use std::time::Duration;

use crate::error::ConfigError;

pub const HOST_VAR: &str = "SOLARSIM_SERVER_HOST";
pub const PORT_VAR: &str = "SOLARSIM_SERVER_PORT";
pub const TIMEOUT_VAR: &str = "SOLARSIM_REQUEST_TIMEOUT_MS";

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Where the simulation server lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Scheme and host, e.g. `http://localhost`.
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read the endpoint from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Used by [`Self::from_env`]
    /// and by tests that must not touch the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(HOST_VAR)
            .filter(|h| !h.trim().is_empty())
            .ok_or(ConfigError::MissingVar(HOST_VAR))?;
        let port_raw = lookup(PORT_VAR).ok_or(ConfigError::MissingVar(PORT_VAR))?;
        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue {
                name: PORT_VAR,
                reason: format!("{port_raw:?}: {e}"),
            })?;

        let mut config = Self::new(host.trim().trim_end_matches('/'), port);
        if let Some(raw) = lookup(TIMEOUT_VAR) {
            let ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: TIMEOUT_VAR,
                    reason: format!("{raw:?}: {e}"),
                })?;
            config.request_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// The target URL, `<host>:<port>`.
    pub fn url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
