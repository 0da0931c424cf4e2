use std::path::PathBuf;

/// Top-level error type for the connector. Library code returns this (or a
/// narrower error convertible into it) rather than panicking.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("missing required configuration values: {missing:?}")]
    MissingConfig { missing: Vec<String> },

    #[error("private key not found at '{path}'")]
    PrivateKeyNotFound { path: PathBuf },

    #[error("failed to read private key at '{path}': {source}")]
    PrivateKeyUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to sign JWT assertion: {0}")]
    JwtSigning(#[from] jsonwebtoken::errors::Error),

    #[error("token endpoint did not return an access_token")]
    MissingAccessToken,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http {status}: {body}")]
    HttpStatus { status: u16, body: String },
}
