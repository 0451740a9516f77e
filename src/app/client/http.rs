//! JSON envelope transport for the M2M API
//!
//! Every endpoint is a POST of a JSON payload answered by an envelope carrying
//! either `data` or `errorCode`/`errorMessage`. Requests pass a rate limiter
//! and are retried under the shared [`RetryPolicy`] on transient failures.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::app::client::config::ClientConfig;
use crate::app::models::AccessToken;
use crate::app::retry::RetryPolicy;
use crate::constants::{limits, m2m};
use crate::errors::{ConfigError, ConfigResult, SessionError, SessionResult, TransportError};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// Response envelope shared by every endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Authenticated JSON request/response handling
#[derive(Debug)]
pub struct EnvelopeClient {
    client: Client,
    base_url: Url,
    rate_limiter: DirectRateLimiter,
    retry: RetryPolicy,
}

impl EnvelopeClient {
    /// Creates a new EnvelopeClient from the client configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the base URL is invalid, the rate limit is
    /// zero, or the HTTP client cannot be built
    pub fn new(config: &ClientConfig) -> ConfigResult<Self> {
        let client = config
            .build_http_client()
            .map_err(|e| ConfigError::InvalidValue {
                field: "m2m".to_string(),
                value: config.base_url.clone(),
                reason: e.to_string(),
            })?;
        let rate_limiter = Self::build_rate_limiter(config.rate_limit_rps)?;

        Ok(Self {
            client,
            base_url: config.parsed_base_url()?,
            rate_limiter,
            retry: config.retry.clone(),
        })
    }

    /// Builds the rate limiter with the specified rate limit
    fn build_rate_limiter(rate_limit_rps: u32) -> ConfigResult<DirectRateLimiter> {
        let rate = NonZeroU32::new(rate_limit_rps).ok_or_else(|| ConfigError::InvalidValue {
            field: "m2m.rate_limit_rps".to_string(),
            value: rate_limit_rps.to_string(),
            reason: "Rate limit must be non-zero".to_string(),
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rate)))
    }

    /// POST `payload` to `endpoint` and decode the envelope's `data`
    ///
    /// `data: null` decodes into `Option`, `()` or `Value` response types.
    ///
    /// # Errors
    ///
    /// - `SessionError::RemoteApi` when the envelope carries an error code
    /// - `SessionError::Transport` after exhausting retries
    /// - `SessionError::Decode` when the payload does not match `Resp`
    pub async fn call<Req, Resp>(
        &self,
        endpoint: &str,
        token: Option<&AccessToken>,
        payload: &Req,
    ) -> SessionResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| TransportError::InvalidUrl {
                url: format!("{}{}", self.base_url, endpoint),
                reason: e.to_string(),
            })?;

        let data = self
            .retry
            .run(
                endpoint,
                |_| self.send_once(endpoint, &url, token, payload),
                SessionError::is_retryable,
            )
            .await?;

        serde_json::from_value(data).map_err(|e| SessionError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    /// One rate-limited attempt, returning the envelope's `data`
    async fn send_once<Req>(
        &self,
        endpoint: &str,
        url: &Url,
        token: Option<&AccessToken>,
        payload: &Req,
    ) -> SessionResult<Value>
    where
        Req: Serialize + ?Sized,
    {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let mut request = self.client.post(url.clone()).json(payload);
        if let Some(token) = token {
            request = request.header(m2m::AUTH_HEADER, token.as_str());
        }

        let response = request.send().await.map_err(TransportError::Http)?;
        let status = response.status();

        if limits::RETRYABLE_STATUS_CODES.contains(&status.as_u16()) {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let body = response.text().await.map_err(TransportError::Http)?;
        debug!("{} responded {} ({} bytes)", endpoint, status, body.len());

        let envelope: ApiEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                }
                .into())
            }
            Err(e) => {
                return Err(SessionError::Decode {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if let Some(code) = envelope.error_code.filter(|code| !code.is_empty()) {
            return Err(SessionError::RemoteApi {
                endpoint: endpoint.to_string(),
                code,
                message: envelope.error_message.unwrap_or_default(),
            });
        }

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        Ok(envelope.data.unwrap_or(Value::Null))
    }
}
