//! Credential provider backed by the loaded configuration
//!
//! The API token may live in the config file or in `SESSION_SYNC_API_TOKEN`;
//! the environment wins so secrets can stay out of the file.

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::repositories::CredentialProvider;
use crate::infrastructure::config::ApiConfig;

pub const API_TOKEN_ENV: &str = "SESSION_SYNC_API_TOKEN";

#[derive(Debug, Clone)]
pub struct ConfigCredentialProvider {
    base_url: String,
    token: Option<String>,
}

impl ConfigCredentialProvider {
    pub fn from_config(api: &ApiConfig) -> Self {
        let env_token = std::env::var(API_TOKEN_ENV).ok();
        Self::new(&api.base_url, env_token.or_else(|| api.api_token.clone()))
    }

    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl CredentialProvider for ConfigCredentialProvider {
    fn api_base_url(&self) -> SyncResult<String> {
        if self.base_url.trim().is_empty() {
            return Err(SyncError::configuration("API base URL is not set"));
        }
        Ok(self.base_url.clone())
    }

    fn api_token(&self) -> SyncResult<String> {
        self.token.clone().ok_or_else(|| {
            SyncError::configuration(format!(
                "API token is not set (config api.api_token or {API_TOKEN_ENV})"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_token_is_configuration_error() {
        let provider = ConfigCredentialProvider::new("https://api.test", Some("  ".into()));
        assert!(matches!(provider.api_token(), Err(SyncError::Configuration { .. })));
    }

    #[test]
    fn test_token_and_base_url_are_returned() {
        let provider = ConfigCredentialProvider::new("https://api.test", Some("abc".into()));
        assert_eq!(provider.api_token().unwrap(), "abc");
        assert_eq!(provider.api_base_url().unwrap(), "https://api.test");
    }

    #[test]
    fn test_missing_base_url() {
        let provider = ConfigCredentialProvider::new("", Some("abc".into()));
        assert!(provider.api_base_url().is_err());
    }
}
