//! Connection settings shared by the API and transfer clients
//!
//! One `ClientConfig` builds both the API client and the file transfer client;
//! they differ only in their request timeout.

use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::app::retry::RetryPolicy;
use crate::constants::{http, limits, m2m};
use crate::errors::{ConfigError, ConfigResult, TransportError};

/// Configuration for the M2M API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root; endpoint names are joined onto it
    pub base_url: String,
    /// Keep-alive probe interval, `None` to disable
    pub tcp_keepalive: Option<Duration>,
    /// Send small API payloads without Nagle batching
    pub tcp_nodelay: bool,
    /// How long idle pooled connections are kept
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Request timeout
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// API calls allowed per second
    pub rate_limit_rps: u32,
    /// Retry policy for transient failures
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: m2m::BASE_URL.to_string(),
            tcp_keepalive: Some(http::TCP_KEEPALIVE),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Builds the HTTP client with the configured request timeout
    pub fn build_http_client(&self) -> Result<Client, TransportError> {
        self.build_http_client_with_timeout(self.request_timeout)
    }

    /// Builds the HTTP client with an explicit request timeout
    pub fn build_http_client_with_timeout(
        &self,
        request_timeout: Duration,
    ) -> Result<Client, TransportError> {
        let mut client_builder = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(TransportError::Http)
    }

    /// Parse the API root, ensuring a trailing slash so endpoint joins append
    pub fn parsed_base_url(&self) -> ConfigResult<Url> {
        let normalized = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };

        Url::parse(&normalized).map_err(|e| ConfigError::InvalidValue {
            field: "m2m.base_url".to_string(),
            value: self.base_url.clone(),
            reason: e.to_string(),
        })
    }
}
