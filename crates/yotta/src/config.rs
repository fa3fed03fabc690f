//! Credentials and client configuration.
//!
//! Credentials live in a small key-value file (`~/.yotta/credentials`):
//!
//! ```text
//! userId=<your user id>
//! apikey=<your api key>
//! ```
//!
//! They are loaded once and handed to the API client inside a
//! [`ClientConfig`]; nothing is kept in process-wide state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::providers::traits::ProvisionerError;
use crate::retry::RetryPolicy;

/// Production SDK endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://console.yottalabs.ai/sdk/api";

/// Credentials file location relative to the home directory.
pub const CREDENTIALS_RELATIVE_PATH: &str = ".yotta/credentials";

/// Default timeout for a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Account credentials. `Debug` output never contains the API key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user_id: String,
    api_key: String,
}

impl Credentials {
    /// Create credentials from known values.
    #[must_use]
    pub fn new(user_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Account user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// API key sent with every request.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Default credentials file path under the home directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CREDENTIALS_RELATIVE_PATH))
    }

    /// Parse the contents of a credentials file.
    ///
    /// Blank lines and `#` comments are skipped; later keys override
    /// earlier ones.
    ///
    /// # Errors
    /// Returns [`ProvisionerError::Config`] if `userId` or `apikey` is
    /// missing or empty.
    pub fn parse(contents: &str, source: &Path) -> Result<Self, ProvisionerError> {
        let mut user_id = None;
        let mut api_key = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "userId" => user_id = Some(value.to_string()),
                "apikey" => api_key = Some(value.to_string()),
                _ => {}
            }
        }

        match (user_id, api_key) {
            (Some(user_id), Some(api_key)) if !user_id.is_empty() && !api_key.is_empty() => {
                Ok(Self { user_id, api_key })
            }
            _ => Err(ProvisionerError::Config(format!(
                "missing userId or apikey in {}; expected lines 'userId=<id>' and 'apikey=<key>'",
                source.display()
            ))),
        }
    }

    /// Load credentials from a file.
    ///
    /// # Errors
    /// Returns [`ProvisionerError::Config`] if the file cannot be read or
    /// lacks either key.
    pub fn load(path: &Path) -> Result<Self, ProvisionerError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProvisionerError::Config(format!(
                "cannot read credentials file {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&contents, path)
    }

    /// Load credentials from [`Credentials::default_path`].
    ///
    /// # Errors
    /// Returns [`ProvisionerError::Config`] if the home directory is unknown
    /// or loading fails.
    pub fn load_default() -> Result<Self, ProvisionerError> {
        let path = Self::default_path()
            .ok_or_else(|| ProvisionerError::Config("cannot determine home directory".into()))?;
        Self::load(&path)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Everything the API client needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the SDK API.
    pub endpoint: String,
    /// Shared read-only credentials.
    pub credentials: Arc<Credentials>,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// Retry policy for idempotent calls.
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Configuration with the production endpoint and default policies.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials: Arc::new(credentials),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
