use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::auth::AuthContext;
use crate::error::ConnectorError;

const JSON_TIMEOUT_SECS: u64 = 30;
const BINARY_TIMEOUT_SECS: u64 = 60;

/// Retry policy for the JSON request variant (SPEC_FULL.md §4.3). The binary
/// variant never retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

/// What to do with a failed attempt, decided purely from the observed
/// outcome — kept separate from the retry loop so the predicate can be unit
/// tested without performing any I/O.
#[derive(Debug, PartialEq, Eq)]
enum RetryDecision {
    Retry,
    Fail,
}

fn classify_status(status: StatusCode) -> RetryDecision {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RetryDecision::Retry
    } else {
        RetryDecision::Fail
    }
}

/// Resilient HTTP layer (C3): attaches bearer auth, retries rate limits and
/// server errors with exponential backoff, and fails fast on 401 and other
/// 4xx responses.
pub struct HttpClient {
    http: reqwest::Client,
    auth: Arc<AuthContext>,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(http: reqwest::Client, auth: Arc<AuthContext>) -> Self {
        Self {
            http,
            auth,
            retry: RetryPolicy::default(),
        }
    }

    /// JSON GET with query parameters, bearer auth, and the retry policy
    /// above. Propagates the last error once attempts are exhausted.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ConnectorError> {
        let token = self.auth.ensure_token().await?;
        let mut delay = self.retry.initial_delay;
        let mut last_err = None;

        for attempt in 1..=self.retry.max_attempts {
            let result = self
                .http
                .get(url)
                .query(query)
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/json")
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .timeout(Duration::from_secs(JSON_TIMEOUT_SECS))
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json::<T>().await?);
                    }

                    let body = response.text().await.unwrap_or_default();
                    if status == StatusCode::UNAUTHORIZED {
                        tracing::error!(%status, %body, "authentication failed");
                        return Err(ConnectorError::AuthFailed(body));
                    }

                    let decision = classify_status(status);
                    if decision == RetryDecision::Fail || attempt == self.retry.max_attempts {
                        tracing::error!(%status, %body, "request failed");
                        return Err(ConnectorError::HttpStatus {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    tracing::warn!(%status, attempt, "retryable response, backing off");
                    last_err = Some(ConnectorError::HttpStatus {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(source) => {
                    if attempt == self.retry.max_attempts {
                        tracing::error!(error = %source, "request failed after final attempt");
                        return Err(ConnectorError::Http(source));
                    }
                    tracing::warn!(error = %source, attempt, "transport error, backing off");
                    last_err = Some(ConnectorError::Http(source));
                }
            }

            tokio::time::sleep(delay).await;
            delay *= self.retry.multiplier;
        }

        Err(last_err.unwrap_or(ConnectorError::MissingAccessToken))
    }

    /// Binary GET (document content). Does not retry: on any failure it logs
    /// a warning and returns `None`.
    pub async fn get_binary(&self, url: &str) -> Option<Vec<u8>> {
        let token = match self.auth.ensure_token().await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %err, url, "could not obtain token for binary download");
                return None;
            }
        };

        let result = self
            .http
            .get(url)
            .bearer_auth(&token)
            .timeout(Duration::from_secs(BINARY_TIMEOUT_SECS))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                response.bytes().await.ok().map(|b| b.to_vec())
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), url, "document content download failed");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, url, "document content download failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_and_server_errors_as_retryable() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDecision::Retry
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            RetryDecision::Retry
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            RetryDecision::Retry
        );
    }

    #[test]
    fn classifies_other_4xx_as_fatal() {
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST),
            RetryDecision::Fail
        );
        assert_eq!(classify_status(StatusCode::FORBIDDEN), RetryDecision::Fail);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), RetryDecision::Fail);
    }

    #[test]
    fn default_policy_matches_spec() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.multiplier, 2);
    }
}
