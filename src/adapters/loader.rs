//! Adapter Loader - Builds platform adapters from configuration
//!
//! Maps the `type` of a platform configuration entry to a factory producing
//! an `Arc<dyn PlatformAdapter>`. The built-in types are `memory`, `webhook`,
//! `wordpress` and `medium`; embedders may register their own.
//!
//! # Example
//!
//! ```
//! use platform_publisher::adapters::loader::AdapterLoader;
//! use platform_publisher::core::config::PlatformConfig;
//!
//! let loader = AdapterLoader::new();
//! let adapter = loader.load("scratch", &PlatformConfig::new("memory")).unwrap();
//!
//! assert_eq!(adapter.name(), "scratch");
//! ```

use crate::adapters::medium_adapter::MediumAdapter;
use crate::adapters::memory_adapter::MemoryAdapter;
use crate::adapters::webhook_adapter::WebhookAdapter;
use crate::adapters::wordpress_adapter::WordPressAdapter;
use crate::core::capabilities::PlatformCapabilities;
use crate::core::config::PlatformConfig;
use crate::core::error::ConfigError;
use crate::core::traits::PlatformAdapter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Built-in adapter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterType {
    Memory,
    Webhook,
    WordPress,
    Medium,
}

impl AdapterType {
    pub const ALL: [AdapterType; 4] = [
        AdapterType::Memory,
        AdapterType::Webhook,
        AdapterType::WordPress,
        AdapterType::Medium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterType::Memory => "memory",
            AdapterType::Webhook => "webhook",
            AdapterType::WordPress => "wordpress",
            AdapterType::Medium => "medium",
        }
    }

    /// Configuration field naming the platform URL, when one is mandatory
    pub fn required_url_field(&self) -> Option<&'static str> {
        match self {
            AdapterType::Webhook => Some("endpoint"),
            AdapterType::WordPress => Some("baseUrl"),
            AdapterType::Memory | AdapterType::Medium => None,
        }
    }
}

impl FromStr for AdapterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdapterType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown adapter type '{}'", s))
    }
}

/// Constructor for one adapter type: `(platform name, config) -> adapter`
pub type AdapterFactory =
    Arc<dyn Fn(&str, &PlatformConfig) -> Result<Arc<dyn PlatformAdapter>, ConfigError> + Send + Sync>;

/// Adapter factory table
#[derive(Clone)]
pub struct AdapterLoader {
    factories: HashMap<String, AdapterFactory>,
}

impl Default for AdapterLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterLoader {
    /// Loader with the built-in adapter types registered
    pub fn new() -> Self {
        let mut loader = Self {
            factories: HashMap::new(),
        };
        for adapter_type in AdapterType::ALL {
            loader.register(adapter_type.as_str(), move |name, config| {
                build_builtin(adapter_type, name, config)
            });
        }
        loader
    }

    /// Register (or replace) the factory for an adapter type
    pub fn register<F>(&mut self, adapter_type: impl Into<String>, factory: F)
    where
        F: Fn(&str, &PlatformConfig) -> Result<Arc<dyn PlatformAdapter>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.factories
            .insert(adapter_type.into().to_lowercase(), Arc::new(factory));
    }

    /// Whether this loader can build the type, built-in or registered
    pub fn supports(&self, adapter_type: &str) -> bool {
        self.factories.contains_key(&adapter_type.to_lowercase())
    }

    /// Whether the type is one of the built-in adapters
    pub fn is_supported(adapter_type: &str) -> bool {
        adapter_type.parse::<AdapterType>().is_ok()
    }

    pub fn supported_types() -> Vec<&'static str> {
        AdapterType::ALL.iter().map(AdapterType::as_str).collect()
    }

    pub fn required_url_field(adapter_type: &str) -> Option<&'static str> {
        adapter_type
            .parse::<AdapterType>()
            .ok()
            .and_then(|t| t.required_url_field())
    }

    /// Build the adapter for one platform entry
    pub fn load(
        &self,
        name: &str,
        config: &PlatformConfig,
    ) -> Result<Arc<dyn PlatformAdapter>, ConfigError> {
        let factory = self
            .factories
            .get(&config.adapter_type.to_lowercase())
            .ok_or_else(|| ConfigError::UnknownAdapterType {
                platform: name.to_string(),
                adapter_type: config.adapter_type.clone(),
            })?;
        factory(name, config)
    }
}

fn build_builtin(
    adapter_type: AdapterType,
    name: &str,
    config: &PlatformConfig,
) -> Result<Arc<dyn PlatformAdapter>, ConfigError> {
    let adapter: Arc<dyn PlatformAdapter> = match adapter_type {
        AdapterType::Memory => {
            let mut capabilities = PlatformCapabilities::full();
            if let Some(overrides) = &config.capabilities {
                overrides.apply(&mut capabilities);
            }
            let adapter = MemoryAdapter::with_capabilities(name, capabilities);
            match config.option_str("requiredToken") {
                Some(token) => Arc::new(adapter.with_required_token(token)),
                None => Arc::new(adapter),
            }
        }
        AdapterType::Webhook => Arc::new(WebhookAdapter::from_config(name, config)?),
        AdapterType::WordPress => Arc::new(WordPressAdapter::from_config(name, config)?),
        AdapterType::Medium => Arc::new(MediumAdapter::from_config(name, config)?),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_type_parsing() {
        assert_eq!("WordPress".parse::<AdapterType>(), Ok(AdapterType::WordPress));
        assert!("ghost".parse::<AdapterType>().is_err());
        assert_eq!(AdapterLoader::supported_types().join(", "), "memory, webhook, wordpress, medium");
    }

    #[test]
    fn test_required_url_field() {
        assert_eq!(AdapterLoader::required_url_field("wordpress"), Some("baseUrl"));
        assert_eq!(AdapterLoader::required_url_field("webhook"), Some("endpoint"));
        assert_eq!(AdapterLoader::required_url_field("medium"), None);
    }

    #[test]
    fn test_load_builtin() {
        let loader = AdapterLoader::new();
        let mut config = PlatformConfig::new("webhook");
        config.endpoint = Some("https://hooks.example.com/in".to_string());

        let adapter = loader.load("hook", &config).unwrap();

        assert_eq!(adapter.name(), "hook");
        assert!(!adapter.capabilities().supports_analytics);
    }

    #[test]
    fn test_load_unknown_type() {
        let loader = AdapterLoader::new();

        let result = loader.load("odd", &PlatformConfig::new("ghost"));

        assert!(matches!(result, Err(ConfigError::UnknownAdapterType { .. })));
    }

    #[test]
    fn test_load_missing_url() {
        let loader = AdapterLoader::new();

        let result = loader.load("blog", &PlatformConfig::new("wordpress"));

        assert!(matches!(result, Err(ConfigError::MissingSetting { .. })));
    }

    #[test]
    fn test_register_custom_factory() {
        let mut loader = AdapterLoader::new();
        loader.register("sandbox", |name, _config| {
            Ok(Arc::new(MemoryAdapter::new(name)) as Arc<dyn PlatformAdapter>)
        });

        assert!(loader.supports("Sandbox"));
        assert!(!AdapterLoader::is_supported("sandbox"));
        assert_eq!(
            loader.load("box", &PlatformConfig::new("sandbox")).unwrap().name(),
            "box"
        );
    }
}
