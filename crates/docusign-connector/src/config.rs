use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

const DEFAULT_PRIVATE_KEY_FILENAME: &str = "private_key";

/// Configuration supplied by the host at invocation start. `private_key` and
/// `private_key_path` are mutually optional — exactly one must resolve to PEM
/// content for [`ConnectorConfig::load_private_key`] to succeed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectorConfig {
    pub integration_key: String,
    pub user_id: String,
    pub oauth_base_url: String,
    pub base_url: String,
    pub account_id: String,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
}

impl ConnectorConfig {
    /// Trims required string fields in place and returns the list of keys that
    /// are missing or blank after trimming. An empty return value means the
    /// configuration is valid.
    pub fn validate(&mut self) -> Result<(), ConnectorError> {
        let mut missing = Vec::new();

        for (name, value) in [
            ("integration_key", &mut self.integration_key),
            ("user_id", &mut self.user_id),
            ("oauth_base_url", &mut self.oauth_base_url),
            ("base_url", &mut self.base_url),
            ("account_id", &mut self.account_id),
        ] {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                missing.push(name.to_string());
            } else {
                *value = trimmed;
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConnectorError::MissingConfig { missing })
        }
    }

    /// Resolves and reads the RS256 private key, either from the inline
    /// `private_key` value or from `private_key_path` (default
    /// `./private_key`, resolved relative to `install_dir` when not absolute).
    pub fn load_private_key(&self, install_dir: &Path) -> Result<String, ConnectorError> {
        if let Some(inline) = &self.private_key {
            let trimmed = inline.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }

        let configured = self
            .private_key_path
            .as_deref()
            .unwrap_or(DEFAULT_PRIVATE_KEY_FILENAME);
        let path = PathBuf::from(configured);
        let resolved = if path.is_absolute() {
            path
        } else {
            install_dir.join(path)
        };

        if !resolved.exists() {
            return Err(ConnectorError::PrivateKeyNotFound { path: resolved });
        }

        std::fs::read_to_string(&resolved).map_err(|source| ConnectorError::PrivateKeyUnreadable {
            path: resolved,
            source,
        })
    }

    /// Base URL for resource fetchers: `{base_url}/v2.1/accounts/{account_id}`.
    pub fn api_base(&self) -> String {
        format!("{}/v2.1/accounts/{}", self.base_url, self.account_id)
    }
}
