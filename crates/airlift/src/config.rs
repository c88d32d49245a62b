#![forbid(unsafe_code)]

use airlift_net::Headers;
use thiserror::Error;
use url::Url;

/// Configuration errors, surfaced synchronously before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid update URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported update URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("runtime version must not be empty")]
    EmptyRuntimeVersion,
}

/// Remote update configuration held by the controller.
///
/// Overriding the active configuration is transactional: the controller
/// restores the prior value exactly if a cycle run under an override fails.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdatesConfig {
    pub update_url: Url,
    pub runtime_version: String,
    /// Headers identifying this client installation (sent on every request).
    pub identity_headers: Headers,
    /// Extra request headers supplied by the host.
    pub request_headers: Headers,
}

impl UpdatesConfig {
    /// Parse and validate a configuration from raw parts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unparseable or non-HTTP URL, or an
    /// empty runtime version.
    pub fn new(update_url: &str, runtime_version: &str) -> Result<Self, ConfigError> {
        let config = Self {
            update_url: Url::parse(update_url)?,
            runtime_version: runtime_version.to_string(),
            identity_headers: Headers::new(),
            request_headers: Headers::new(),
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_identity_headers(mut self, headers: Headers) -> Self {
        self.identity_headers = headers;
        self
    }

    #[must_use]
    pub fn with_request_headers(mut self, headers: Headers) -> Self {
        self.request_headers = headers;
        self
    }

    /// Validate URL scheme and runtime version.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL scheme is not `http`/`https` or
    /// the runtime version is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.update_url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        if self.runtime_version.trim().is_empty() {
            return Err(ConfigError::EmptyRuntimeVersion);
        }
        Ok(())
    }

    /// Headers sent with the top-level update request: identity and host
    /// headers plus the runtime-version negotiation header.
    #[must_use]
    pub fn manifest_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.extend(&self.identity_headers);
        headers.extend(&self.request_headers);
        headers.insert("airlift-runtime-version", self.runtime_version.clone());
        headers.insert("accept", "application/json");
        headers
    }

    /// Headers sent with per-asset byte requests.
    #[must_use]
    pub fn asset_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.extend(&self.identity_headers);
        headers.extend(&self.request_headers);
        headers
    }
}
