//! Transport fetch layer with retry and backoff.
//!
//! Wraps an [`HttpClient`] with status-aware retries: retryable statuses and
//! timeouts back off exponentially (base 0.35 s, doubling, capped at 4 s,
//! jittered), everything else fails fast with a [`FetchError`] carrying the
//! final status and a truncated body excerpt.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::{CoreError, FetchError};

const RETRYABLE_STATUS_CODES: [u16; 8] = [408, 409, 425, 429, 500, 502, 503, 504];
const BACKOFF_BASE: Duration = Duration::from_millis(350);
const BACKOFF_CAP: Duration = Duration::from_secs(4);
const DETAIL_MAX_LEN: usize = 180;

/// Retry policy for one provider's requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before the retry following `attempt` (0-based), capped and jittered.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2_f64.powi(attempt.min(16) as i32);
        let seconds = (BACKOFF_BASE.as_secs_f64() * exp).min(BACKOFF_CAP.as_secs_f64());
        if self.jitter {
            // +/- 50% jitter keeps concurrent retries from synchronizing.
            let factor = 0.5 + fastrand::f64();
            Duration::from_secs_f64((seconds * factor).min(BACKOFF_CAP.as_secs_f64()))
        } else {
            Duration::from_secs_f64(seconds)
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

/// Shared fetch helper used by every provider.
#[derive(Clone)]
pub struct Fetcher {
    http: Arc<dyn HttpClient>,
}

impl Fetcher {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Execute a request, retrying retryable failures per `policy`.
    ///
    /// # Errors
    /// Returns a [`FetchError`] after the final attempt fails or returns a
    /// non-success status.
    pub async fn fetch_text(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<String, FetchError> {
        let url = request.full_url();
        let mut attempts = 0_u32;
        let mut last_status: Option<u16> = None;
        let mut last_detail: Option<String> = None;

        loop {
            attempts += 1;
            match self.http.execute(request.clone()).await {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) => {
                    last_status = Some(response.status);
                    last_detail = extract_detail(&response);
                    if !is_retryable_status(response.status) || attempts > policy.max_retries {
                        break;
                    }
                }
                Err(error) => {
                    last_status = None;
                    last_detail = Some(truncate_detail(error.message()));
                    if attempts > policy.max_retries {
                        break;
                    }
                }
            }
            tokio::time::sleep(policy.delay_for(attempts - 1)).await;
        }

        Err(FetchError {
            url,
            attempts,
            status_code: last_status,
            detail: last_detail,
        })
    }

    /// Fetch and deserialize a JSON body.
    ///
    /// # Errors
    /// Transport failures surface as [`FetchError`]; an unparseable body is
    /// reported the same way with the parse message as detail.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<T, FetchError> {
        let url = request.full_url();
        let body = self.fetch_text(request, policy).await?;
        serde_json::from_str(&body).map_err(|error| FetchError {
            url,
            attempts: 1,
            status_code: None,
            detail: Some(truncate_detail(&format!("invalid JSON payload: {error}"))),
        })
    }
}

/// Wrap a terminal fetch failure into the core taxonomy.
pub fn provider_fetch_error(provider: &'static str, source: FetchError) -> CoreError {
    CoreError::ProviderFetch { provider, source }
}

fn extract_detail(response: &HttpResponse) -> Option<String> {
    let body = response.body.trim();
    if body.is_empty() {
        None
    } else {
        Some(truncate_detail(body))
    }
}

fn truncate_detail(detail: &str) -> String {
    let trimmed = detail.trim();
    if trimmed.len() <= DETAIL_MAX_LEN {
        return trimmed.to_owned();
    }
    let mut cut = DETAIL_MAX_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    trimmed[..cut].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::testing::ScriptedHttpClient;
    use crate::http_client::HttpError;

    fn no_jitter(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            jitter: false,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = no_jitter(5);
        assert_eq!(policy.delay_for(0), Duration::from_millis(350));
        assert_eq!(policy.delay_for(1), Duration::from_millis(700));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_400));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(4));
    }

    #[test]
    fn retryable_statuses_match_policy() {
        for status in [408, 409, 425, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status} should be retryable");
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(status), "{status} should not retry");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_status_then_succeeds() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.respond(
            "example.test",
            HttpResponse {
                status: 503,
                body: "unavailable".to_owned(),
            },
        );
        client.respond("example.test", HttpResponse::ok("payload"));

        let fetcher = Fetcher::new(client.clone());
        let body = fetcher
            .fetch_text(HttpRequest::get("https://example.test/q"), no_jitter(2))
            .await
            .expect("second attempt succeeds");
        assert_eq!(body, "payload");
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn non_retryable_status_fails_fast() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.respond(
            "example.test",
            HttpResponse {
                status: 404,
                body: "missing".to_owned(),
            },
        );

        let fetcher = Fetcher::new(client.clone());
        let error = fetcher
            .fetch_text(HttpRequest::get("https://example.test/q"), no_jitter(3))
            .await
            .expect_err("404 is terminal");
        assert_eq!(error.attempts, 1);
        assert_eq!(error.status_code, Some(404));
        assert_eq!(error.detail.as_deref(), Some("missing"));
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_attempts() {
        let client = Arc::new(ScriptedHttpClient::new());
        for _ in 0..3 {
            client.fail("example.test", HttpError::timed_out("request timeout"));
        }

        let fetcher = Fetcher::new(client.clone());
        let error = fetcher
            .fetch_text(HttpRequest::get("https://example.test/q"), no_jitter(2))
            .await
            .expect_err("all attempts time out");
        assert_eq!(error.attempts, 3);
        assert!(error.detail.as_deref().is_some_and(|d| d.contains("timeout")));
    }

    #[test]
    fn detail_is_truncated_to_180_chars() {
        let long = "x".repeat(500);
        assert_eq!(truncate_detail(&long).len(), 180);
    }
}
