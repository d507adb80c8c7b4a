use serde::{Deserialize, Serialize};

/// Top-level client configuration (loadable from cvault.toml).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub fanout: FanoutConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST API
    pub base_url: String,
    /// Per-request timeout in seconds; generous because bulk metadata
    /// operations can legitimately run for minutes
    pub request_timeout_secs: u64,
    /// Delay between retry attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Attempts for mutating endpoints
    pub max_retries: u32,
    /// Attempts for read-mostly endpoints that fall back to cache
    pub max_retries_cacheable: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Concurrent share pushes per propagation batch
    pub share_concurrency: usize,
    /// Concurrent public-link pushes (link creation walks whole trees)
    pub link_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cloudvault.io".into(),
            request_timeout_secs: 900,
            retry_delay_ms: 1000,
            max_retries: 32,
            max_retries_cacheable: 3,
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            share_concurrency: 4,
            link_concurrency: 8,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

impl ClientConfig {
    pub fn from_toml(content: &str) -> Result<Self, crate::CvaultError> {
        toml::from_str(content).map_err(|e| crate::CvaultError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let config = ClientConfig::from_toml("").unwrap();

        assert_eq!(config.api.base_url, "https://api.cloudvault.io");
        assert_eq!(config.api.request_timeout_secs, 900);
        assert_eq!(config.api.retry_delay_ms, 1000);
        assert_eq!(config.api.max_retries, 32);
        assert_eq!(config.api.max_retries_cacheable, 3);
        assert_eq!(config.fanout.share_concurrency, 4);
        assert_eq!(config.fanout.link_concurrency, 8);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
[api]
base_url = "https://api.staging.cloudvault.io"
max_retries = 8

[fanout]
share_concurrency = 2
"#;
        let config = ClientConfig::from_toml(toml_str).unwrap();

        // Overridden
        assert_eq!(config.api.base_url, "https://api.staging.cloudvault.io");
        assert_eq!(config.api.max_retries, 8);
        assert_eq!(config.fanout.share_concurrency, 2);
        // Defaults
        assert_eq!(config.api.max_retries_cacheable, 3);
        assert_eq!(config.fanout.link_concurrency, 8);
    }

    #[test]
    fn serialize_roundtrip() {
        let config = ClientConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = ClientConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.api.base_url, parsed.api.base_url);
        assert_eq!(config.api.max_retries, parsed.api.max_retries);
        assert_eq!(config.fanout.link_concurrency, parsed.fanout.link_concurrency);
    }
}
