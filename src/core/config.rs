//! Configuration structures and types for platform-publisher
//!
//! This module provides type-safe configuration management with serde support.
//! Every section has defaults, so a configuration file only needs to name the
//! platforms it publishes to.

use crate::core::capabilities::PlatformCapabilities;
use crate::core::retry::RetryOptions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Schema version understood by this release
pub const CONFIG_VERSION: &str = "1.0";

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: String,

    /// Fan-out policy and batching
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Retry/backoff policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Health monitor settings
    #[serde(default)]
    pub health: HealthConfig,

    /// Publish history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Security settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Destination platforms keyed by registry name
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            orchestrator: OrchestratorConfig::default(),
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            history: HistoryConfig::default(),
            security: SecurityConfig::default(),
            platforms: BTreeMap::new(),
        }
    }
}

impl PublisherConfig {
    /// Enabled platforms, sorted by name
    pub fn enabled_platforms(&self) -> impl Iterator<Item = (&String, &PlatformConfig)> {
        self.platforms.iter().filter(|(_, p)| p.enabled)
    }
}

/// Orchestrator policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Platforms published concurrently per batch
    pub max_concurrent: usize,
    /// Pause between batches in milliseconds
    pub delay_between_batches_ms: u64,
    /// All-or-nothing publishing with rollback
    pub require_all_success: bool,
    /// Skip later batches once a batch had a failure
    pub stop_on_first_failure: bool,
    /// Platforms published first, in this order
    pub platform_order: Vec<String>,
    /// Deadline for a whole multi-platform call in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            delay_between_batches_ms: 0,
            require_all_success: false,
            stop_on_first_failure: false,
            platform_order: Vec::new(),
            deadline_secs: None,
        }
    }
}

/// Retry policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub rate_limit_fallback_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            rate_limit_fallback_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn to_options(&self) -> RetryOptions {
        RetryOptions {
            max_retries: self.max_retries.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            rate_limit_fallback: Duration::from_secs(self.rate_limit_fallback_secs),
        }
    }
}

/// Health monitor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthConfig {
    pub interval_secs: u64,
    pub check_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            check_timeout_secs: 30,
        }
    }
}

/// Publish history settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Entries retained before the oldest are evicted
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    /// Allowed environment variable prefixes for `${VAR}` expansion (default: all)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_env_prefixes: Option<Vec<String>>,
}

/// One destination platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    /// Adapter type (memory, webhook, wordpress, medium)
    #[serde(rename = "type")]
    pub adapter_type: String,

    /// Enable this platform (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// API base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Publish endpoint (webhook adapters)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Credential scheme (api_key, bearer, basic, application_password, oauth2)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<String>,

    /// Credential values; `${VAR}` references are expanded at load time
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, String>,

    /// Overrides applied on top of the adapter's own capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<CapabilityOverrides>,

    /// Adapter-specific options
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub options: HashMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl PlatformConfig {
    /// Minimal configuration for an adapter type
    pub fn new(adapter_type: impl Into<String>) -> Self {
        Self {
            adapter_type: adapter_type.into(),
            enabled: true,
            base_url: None,
            endpoint: None,
            credential_type: None,
            credentials: BTreeMap::new(),
            capabilities: None,
            options: HashMap::new(),
        }
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(|v| v.as_bool())
    }
}

/// Partial capability overrides (e.g. a self-hosted blog with a lower limit)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CapabilityOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_content_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_title_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_description_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tags: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_media_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_scheduling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_updates: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_deletion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_analytics: Option<bool>,
}

impl CapabilityOverrides {
    /// Apply the set fields to a descriptor
    pub fn apply(&self, caps: &mut PlatformCapabilities) {
        if let Some(value) = self.max_content_length {
            caps.max_content_length = value;
        }
        if let Some(value) = self.max_title_length {
            caps.max_title_length = value;
        }
        if let Some(value) = self.max_description_length {
            caps.max_description_length = value;
        }
        if self.max_tags.is_some() {
            caps.max_tags = self.max_tags;
        }
        if self.max_media_items.is_some() {
            caps.max_media_items = self.max_media_items;
        }
        if let Some(value) = self.supports_scheduling {
            caps.supports_scheduling = value;
        }
        if let Some(value) = self.supports_updates {
            caps.supports_updates = value;
        }
        if let Some(value) = self.supports_deletion {
            caps.supports_deletion = value;
        }
        if let Some(value) = self.supports_analytics {
            caps.supports_analytics = value;
        }
    }
}
