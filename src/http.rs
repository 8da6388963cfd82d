//! Blocking JSON client for OpenAI-compatible HTTP APIs.
//!
//! Provider traits are synchronous and run on `spawn_blocking` threads, so
//! this wraps an async `reqwest::Client` and drives each request on the
//! runtime captured at construction. [`JsonClient::post`] must not be called
//! from an async task directly.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;

use crate::error::{ErrorCode, MemoryError, Result};

/// Longest response body excerpt carried in an error message.
const ERROR_BODY_EXCERPT: usize = 300;

pub struct JsonClient {
    client: reqwest::Client,
    handle: Handle,
    base_url: String,
    api_key: Option<String>,
    /// Code reported for failures that are not rate limits, quota, or timeouts.
    failure_code: ErrorCode,
}

impl JsonClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        failure_code: ErrorCode,
    ) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            MemoryError::new(failure_code, "HTTP providers must be created inside a tokio runtime")
                .with_cause(e)
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MemoryError::new(failure_code, "failed to build HTTP client").with_cause(e))?;

        Ok(Self {
            client,
            handle,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            failure_code,
        })
    }

    /// POST `body` as JSON to `{base_url}{path}` and decode the JSON response.
    pub fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        self.handle.block_on(async {
            let mut request = self.client.post(&url).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await.map_err(|e| self.transport_error(&url, e))?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(self.status_error(status, &text).with_context("url", url.as_str()));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| MemoryError::new(ErrorCode::ParseError, "unexpected response body").with_cause(e))
        })
    }

    fn transport_error(&self, url: &str, err: reqwest::Error) -> MemoryError {
        let code = if err.is_timeout() {
            ErrorCode::Timeout
        } else {
            self.failure_code
        };
        MemoryError::new(code, format!("request to {url} failed")).with_cause(err)
    }

    fn status_error(&self, status: reqwest::StatusCode, body: &str) -> MemoryError {
        let code = classify_status(status.as_u16(), self.failure_code);
        let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
        MemoryError::new(code, format!("HTTP {status}: {excerpt}")).with_context("status", status.as_u16())
    }
}

/// Map an HTTP failure status to an error code.
pub fn classify_status(status: u16, fallback: ErrorCode) -> ErrorCode {
    match status {
        429 => ErrorCode::RateLimited,
        402 => ErrorCode::QuotaExceeded,
        408 | 504 => ErrorCode::Timeout,
        _ => fallback,
    }
}
