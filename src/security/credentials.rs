//! Platform credentials with memory-safe handling and masking
//!
//! Credential values are held as `secrecy::SecretString` so they never show up
//! in `Debug` output or logs. `CredentialStore` resolves credentials for a
//! platform from configuration first and the environment second.

use crate::core::config::PlatformConfig;
use crate::core::error::{PlatformError, PlatformResult};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Credential key for API keys
pub const API_KEY: &str = "api_key";
/// Credential key for bearer/integration tokens
pub const TOKEN: &str = "token";
/// Credential key for user names
pub const USERNAME: &str = "username";
/// Credential key for passwords and application passwords
pub const PASSWORD: &str = "password";

/// Authentication scheme of a credential set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    ApiKey,
    Bearer,
    Basic,
    ApplicationPassword,
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl FromStr for CredentialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "api_key" | "apikey" => Ok(CredentialType::ApiKey),
            "bearer" | "token" => Ok(CredentialType::Bearer),
            "basic" => Ok(CredentialType::Basic),
            "application_password" => Ok(CredentialType::ApplicationPassword),
            "oauth2" | "oauth" => Ok(CredentialType::OAuth2),
            other => Err(format!("unknown credential type: {}", other)),
        }
    }
}

/// Credentials owned by exactly one adapter
///
/// # Examples
///
/// ```
/// use platform_publisher::security::PlatformCredentials;
///
/// let credentials = PlatformCredentials::basic("editor", "abcd efgh ijkl");
/// assert_eq!(credentials.expose("username"), Some("editor"));
/// assert!(!format!("{:?}", credentials).contains("abcd"));
/// ```
#[derive(Clone)]
pub struct PlatformCredentials {
    pub credential_type: CredentialType,
    data: BTreeMap<String, SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
    refresh_token: Option<SecretString>,
}

impl PlatformCredentials {
    pub fn new(credential_type: CredentialType) -> Self {
        Self {
            credential_type,
            data: BTreeMap::new(),
            expires_at: None,
            refresh_token: None,
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self::new(CredentialType::ApiKey).with(API_KEY, key)
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new(CredentialType::Bearer).with(TOKEN, token)
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(CredentialType::Basic)
            .with(USERNAME, username)
            .with(PASSWORD, password)
    }

    pub fn application_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(CredentialType::ApplicationPassword)
            .with(USERNAME, username)
            .with(PASSWORD, password)
    }

    /// Add or replace one value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value: String = value.into();
        self.data.insert(key.into(), SecretString::new(value.into()));
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        let token: String = token.into();
        self.refresh_token = Some(SecretString::new(token.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.data.get(key)
    }

    /// Expose one value for use in a request
    pub fn expose(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|s| s.expose_secret())
    }

    /// Expose a value that the platform requires, failing authentication otherwise
    pub fn require(&self, platform: &str, key: &str) -> PlatformResult<&str> {
        self.expose(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PlatformError::Authentication {
                platform: platform.to_string(),
                message: format!("missing credential '{}'", key),
            })
    }

    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformCredentials")
            .field("credential_type", &self.credential_type)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Resolves credentials for configured platforms
///
/// Configuration values win; otherwise the environment is consulted using
/// the platform name upper-cased with non-alphanumerics replaced by `_`
/// (`<PLATFORM>_API_KEY`, `<PLATFORM>_TOKEN`,
/// `<PLATFORM>_USERNAME` + `<PLATFORM>_PASSWORD`).
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    env: HashMap<String, String>,
}

impl CredentialStore {
    /// Store backed by the process environment
    pub fn from_env() -> Self {
        Self {
            env: std::env::vars().collect(),
        }
    }

    /// Store backed by an explicit variable map
    pub fn with_env(env: HashMap<String, String>) -> Self {
        Self { env }
    }

    /// Resolve credentials for one platform, if any are available
    pub fn resolve(&self, platform: &str, config: &PlatformConfig) -> Option<PlatformCredentials> {
        if !config.credentials.is_empty() {
            let declared = config
                .credential_type
                .as_deref()
                .and_then(|t| t.parse().ok());
            let credential_type = declared.unwrap_or_else(|| infer_type(config.credentials.keys().map(String::as_str)));

            let credentials = config
                .credentials
                .iter()
                .fold(PlatformCredentials::new(credential_type), |acc, (k, v)| {
                    acc.with(k.as_str(), v.as_str())
                });
            return Some(credentials);
        }

        self.resolve_from_env(platform)
    }

    /// Resolve credentials from `<PLATFORM>_*` environment variables
    pub fn resolve_from_env(&self, platform: &str) -> Option<PlatformCredentials> {
        let prefix = env_prefix(platform);
        let var = |suffix: &str| {
            self.env
                .get(&format!("{}_{}", prefix, suffix))
                .filter(|v| !v.is_empty())
        };

        if let (Some(username), Some(password)) = (var("USERNAME"), var("PASSWORD")) {
            return Some(PlatformCredentials::basic(username.as_str(), password.as_str()));
        }
        if let Some(token) = var("TOKEN") {
            return Some(PlatformCredentials::bearer(token.as_str()));
        }
        if let Some(key) = var("API_KEY") {
            return Some(PlatformCredentials::api_key(key.as_str()));
        }

        None
    }
}

/// Environment variable prefix for a platform name ("dev-blog" -> "DEV_BLOG")
pub fn env_prefix(platform: &str) -> String {
    platform
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn infer_type<'a>(mut keys: impl Iterator<Item = &'a str> + Clone) -> CredentialType {
    if keys.clone().any(|k| k == PASSWORD) {
        CredentialType::Basic
    } else if keys.any(|k| k == API_KEY) {
        CredentialType::ApiKey
    } else {
        CredentialType::Bearer
    }
}

/// Masks a secret for safe logging
///
/// Shows only the first 3 and last 3 characters for identification purposes.
/// Secrets shorter than 10 characters are fully masked as "****".
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }

    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", prefix, suffix)
}
