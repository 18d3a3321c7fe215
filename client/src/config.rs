use std::path::PathBuf;

use crate::auth::CredentialsStoreMode;

/// Base URL of a locally running backend, the development default.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
}

/// Construction-time settings for a client instance. One `Config` produces
/// one `SessionManager`; there is no ambient global configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API root, without a trailing slash. Endpoint paths are appended as-is.
    pub base_url: String,

    /// Directory holding the persisted credentials file.
    pub home: PathBuf,

    pub store_mode: CredentialsStoreMode,
}

impl Config {
    pub fn new(base_url: &str, home: PathBuf) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            home,
            store_mode: CredentialsStoreMode::File,
        })
    }

    pub fn with_store_mode(mut self, store_mode: CredentialsStoreMode) -> Self {
        self.store_mode = store_mode;
        self
    }
}

pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used)]

    use super::*;

    #[test]
    fn normalize_base_url_trims_and_drops_trailing_slash() {
        let normalized =
            normalize_base_url(" http://localhost:8000/api/ ").expect("valid base url");
        assert_eq!(normalized, "http://localhost:8000/api");
    }

    #[test]
    fn normalize_base_url_rejects_empty_input() {
        let error = normalize_base_url("  / ").expect_err("expected error");
        assert_eq!(error, ConfigError::EmptyBaseUrl);
    }

    #[test]
    fn default_base_url_is_already_normalized() {
        assert_eq!(
            normalize_base_url(DEFAULT_BASE_URL).ok().as_deref(),
            Some(DEFAULT_BASE_URL)
        );
    }
}
