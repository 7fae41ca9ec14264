use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

pub const APP_USER_AGENT: &str = "InterfaceLauncher/0.1.0";

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(Duration::from_secs(15))
        .build()
}

/// Retry policy for idempotent requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, base_backoff_ms: u64) -> Self {
        Self {
            retries,
            base_backoff: Duration::from_millis(base_backoff_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Exponential: base * 2^attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

pub(crate) fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send a request built by `make`, retrying transport errors and transient
/// statuses (429, 5xx). The final response is returned whatever its status.
pub async fn send_with_retry<F>(policy: RetryPolicy, make: F) -> Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match make().send().await {
            Ok(response) if is_transient(response.status()) && attempt < policy.retries => {
                debug!(
                    "Transient HTTP {} from {}, retrying",
                    response.status(),
                    response.url()
                );
            }
            Ok(response) => return Ok(response),
            Err(err) if attempt < policy.retries => {
                debug!("Request failed ({}), retrying", err);
            }
            Err(err) => return Err(err),
        }

        tokio::time::sleep(policy.backoff(attempt)).await;
        attempt += 1;
    }
}
