use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;

const TOKEN_LIFETIME_SECS: i64 = 28_800;
const TOKEN_REQUEST_TIMEOUT_SECS: u64 = 30;
const SCOPE: &str = "signature impersonation";

#[derive(Serialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
    aud: String,
    scope: &'static str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Owns the validated configuration and the single-flight-guarded cached
/// access token for the lifetime of one sync invocation. This is the typed
/// replacement for a host platform's pattern of stashing the token back onto
/// a mutable configuration mapping (SPEC_FULL.md §9).
pub struct AuthContext {
    config: ConnectorConfig,
    private_key_pem: String,
    token: Mutex<Option<String>>,
    http: reqwest::Client,
}

impl AuthContext {
    pub fn new(
        config: ConnectorConfig,
        private_key_pem: String,
        http: reqwest::Client,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            private_key_pem,
            token: Mutex::new(None),
            http,
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Returns the cached access token, refreshing it first if absent. Holding
    /// the lock across the whole check-then-refresh sequence is what makes
    /// concurrent callers converge on a single in-flight JWT exchange rather
    /// than each issuing their own.
    pub async fn ensure_token(&self) -> Result<String, ConnectorError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.exchange_token().await?;
        tracing::info!(token = %mask_token(&token), "access token obtained");
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn exchange_token(&self) -> Result<String, ConnectorError> {
        let assertion = self.build_assertion()?;

        let response = self
            .http
            .post(format!(
                "{}/oauth/token",
                oauth_base(&self.config.oauth_base_url)
            ))
            .timeout(std::time::Duration::from_secs(TOKEN_REQUEST_TIMEOUT_SECS))
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = response.json().await?;
        parsed
            .access_token
            .ok_or(ConnectorError::MissingAccessToken)
    }

    fn build_assertion(&self) -> Result<String, ConnectorError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        let claims = Claims {
            iss: self.config.integration_key.clone(),
            sub: self.config.user_id.clone(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
            aud: self.config.oauth_base_url.clone(),
            scope: SCOPE,
        };

        let key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())?;
        let header = Header::new(Algorithm::RS256);
        Ok(encode(&header, &claims, &key)?)
    }
}

/// Resolves the OAuth base into a full origin. `oauth_base_url` is normally a
/// bare hostname (e.g. `account-d.docusign.com`), which defaults to `https://`;
/// a value that already carries a scheme (used by tests against a local mock
/// server) is passed through unchanged.
fn oauth_base(oauth_base_url: &str) -> String {
    if oauth_base_url.starts_with("http://") || oauth_base_url.starts_with("https://") {
        oauth_base_url.trim_end_matches('/').to_string()
    } else {
        format!("https://{oauth_base_url}")
    }
}

/// Masks a token for safe logging, keeping only the last six characters.
pub fn mask_token(token: &str) -> String {
    const VISIBLE: usize = 6;
    if token.len() <= VISIBLE {
        token.to_string()
    } else {
        format!("...{}", &token[token.len() - VISIBLE..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_token_keeps_last_six_chars() {
        assert_eq!(mask_token("1234567890"), "...567890");
    }

    #[test]
    fn mask_token_short_token_unmodified() {
        assert_eq!(mask_token("abc"), "abc");
    }
}
