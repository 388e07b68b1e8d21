//! Engine and client configuration.
//!
//! Every struct has sensible defaults, `with_*` builders, and a `from_env`
//! constructor. Unset or unparsable variables fall back to the default.

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::editor::debounce::DEFAULT_DEBOUNCE;

/// Default base URL of the document store
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the autosave engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutosaveConfig {
    /// Quiet period after the last change before a save fires
    pub debounce: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl AutosaveConfig {
    /// Read `AUTOSAVE_DEBOUNCE_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            debounce: env_parse::<u64>("AUTOSAVE_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Settings for the HTTP persistence client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Store base URL, without the `/api/...` path
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Read `DRAFT_SYNC_API_URL` and `DRAFT_SYNC_REQUEST_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("DRAFT_SYNC_API_URL").unwrap_or(defaults.base_url),
            request_timeout: env_parse::<u64>("DRAFT_SYNC_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Parse an environment variable, warning (not failing) on bad values
pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(AutosaveConfig::default().debounce, Duration::from_millis(2000));

        let client = ClientConfig::default();
        assert_eq!(client.base_url, DEFAULT_API_URL);
        assert_eq!(client.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builders() {
        let autosave = AutosaveConfig::default().with_debounce(Duration::from_millis(50));
        assert_eq!(autosave.debounce, Duration::from_millis(50));

        let client = ClientConfig::default()
            .with_base_url("http://store:9000")
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(client.base_url, "http://store:9000");
        assert_eq!(client.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_env_parse() {
        std::env::set_var("DRAFT_SYNC_TEST_GOOD", " 1500 ");
        std::env::set_var("DRAFT_SYNC_TEST_BAD", "soon");

        assert_eq!(env_parse::<u64>("DRAFT_SYNC_TEST_GOOD"), Some(1500));
        assert_eq!(env_parse::<u64>("DRAFT_SYNC_TEST_BAD"), None);
        assert_eq!(env_parse::<u64>("DRAFT_SYNC_TEST_MISSING"), None);
    }
}
