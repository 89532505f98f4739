//! Configuration management for the GA4 reporting server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Google Analytics Data API base URL.
const DEFAULT_API_BASE_URL: &str = "https://analyticsdata.googleapis.com/v1beta";

/// Environment variable naming the credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// GA4 property identifier (numeric, e.g. "307310528")
    pub property_id: String,

    /// Path to a service account or authorized user key file.
    /// Falls back to GOOGLE_APPLICATION_CREDENTIALS when absent.
    pub credentials_file: Option<String>,

    /// Static OAuth2 access token, used as-is instead of a credentials file.
    pub access_token: Option<String>,

    /// Override for the Data API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Enable debug mode for MCP message logging
    #[serde(default)]
    pub debug: bool,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Buffer before token expiration to refresh (seconds)
    #[serde(default = "default_token_buffer")]
    pub token_refresh_buffer_seconds: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_token_buffer() -> u64 {
    60
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.property_id.is_empty() {
            return Err(ConfigError::MissingField("property_id".into()));
        }
        if !self.property_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid(format!(
                "property_id must be numeric, got '{}'",
                self.property_id
            )));
        }

        match &self.access_token {
            Some(token) if !token.is_empty() => {}
            _ => {
                if self.credentials_path().is_none() {
                    return Err(ConfigError::MissingField(format!(
                        "credentials_file (or {} / access_token)",
                        CREDENTIALS_ENV
                    )));
                }
            }
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "api_base_url must be an http(s) URL, got '{}'",
                self.api_base_url
            )));
        }

        Ok(())
    }

    /// Resolve the credentials file: explicit config value first, then the environment.
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.credentials_file
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var(CREDENTIALS_ENV)
                    .ok()
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
            })
    }

    /// Whether a static access token is configured.
    pub fn uses_static_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Resource name of the configured property.
    pub fn property(&self) -> String {
        format!("properties/{}", self.property_id)
    }

    /// Base URL without a trailing slash.
    pub fn api_base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    /// Get timeout as Duration.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    /// Get token refresh buffer as chrono Duration.
    pub fn token_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_refresh_buffer_seconds as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_config() -> Config {
        Config {
            property_id: "307310528".to_string(),
            credentials_file: Some("ga4_service_acct.json".to_string()),
            access_token: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            debug: false,
            timeout_seconds: 30,
            token_refresh_buffer_seconds: 60,
        }
    }

    #[test]
    fn test_property_resource_name() {
        let config = base_config();
        assert_eq!(config.property(), "properties/307310528");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_numeric_property_rejected() {
        let config = Config {
            property_id: "properties/123".to_string(),
            ..base_config()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_static_token_needs_no_credentials_file() {
        let config = Config {
            credentials_file: None,
            access_token: Some("ya29.token".to_string()),
            ..base_config()
        };
        assert!(config.uses_static_token());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_credentials_file_wins() {
        let config = base_config();
        assert_eq!(
            config.credentials_path(),
            Some(PathBuf::from("ga4_service_acct.json"))
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = Config {
            api_base_url: "http://localhost:8080/v1beta/".to_string(),
            ..base_config()
        };
        assert_eq!(config.api_base_url(), "http://localhost:8080/v1beta");
    }

    #[test]
    fn test_load_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"property_id": "42", "access_token": "static-token"}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.api_base_url(), DEFAULT_API_BASE_URL);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.token_refresh_buffer_seconds, 60);
        assert!(!config.debug);
    }

    #[test]
    fn test_load_rejects_empty_property() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"property_id": "", "access_token": "t"}}"#).unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }
}
