//! Client configuration resolved from the environment.

use std::time::Duration;

use crate::error::HpxError;

pub const API_KEY_ENV: &str = "HYPERPLEXITY_API_KEY";
pub const API_URL_ENV: &str = "HYPERPLEXITY_API_URL";
pub const TIMEOUT_ENV: &str = "HYPERPLEXITY_TIMEOUT_SECS";

pub const DEFAULT_BASE_URL: &str = "https://api.hyperplexity.ai/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Settings for [`crate::client::HyperplexityClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: normalize_base_url(base_url),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a config from `HYPERPLEXITY_API_KEY`, `HYPERPLEXITY_API_URL`
    /// and `HYPERPLEXITY_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, HpxError> {
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        let base_url = std::env::var(API_URL_ENV).ok();
        let timeout = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok());
        Self::resolve(Some(api_key), base_url, timeout)
    }

    /// Build a config from already-parsed values (CLI flags with env fallbacks).
    pub fn resolve(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, HpxError> {
        let api_key = api_key.unwrap_or_default().trim().to_string();
        if api_key.is_empty() {
            return Err(HpxError::Config(format!(
                "{} environment variable is not set. Get your API key at \
                 hyperplexity.ai/account and add it to your MCP client config.",
                API_KEY_ENV
            )));
        }

        let mut config = Self::new(api_key, base_url.as_deref());
        if let Some(secs) = timeout_secs.filter(|s| *s > 0) {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn normalize_base_url(base_url: Option<&str>) -> String {
    let trimmed = base_url.unwrap_or("").trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_config_error() {
        let err = ClientConfig::resolve(Some("  ".into()), None, None).unwrap_err();
        assert!(matches!(err, HpxError::Config(_)));
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn test_base_url_defaults_and_trims() {
        let config = ClientConfig::resolve(Some("hpx_live_x".into()), None, None).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);

        let config = ClientConfig::resolve(
            Some("hpx_live_x".into()),
            Some("http://localhost:8080/v1/".into()),
            Some(5),
        )
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_timeout_keeps_default() {
        let config = ClientConfig::resolve(Some("k".into()), Some(String::new()), Some(0)).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
