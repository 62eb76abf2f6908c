//! Configuration file loader for platform-publisher
//!
//! This module provides configuration loading, validation, and layering.

use super::config::*;
use crate::adapters::loader::AdapterLoader;
use crate::core::error::ConfigError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".publisher.yaml";

/// Prefix of environment overrides (e.g. PUBLISHER_MAX_CONCURRENT)
const ENV_PREFIX: &str = "PUBLISHER_";

lazy_static! {
    /// Environment variable pattern (${VAR_NAME})
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Configuration load options
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    /// Explicit config file; a missing explicit file is an error
    pub config_path: Option<PathBuf>,

    /// Directory searched for `.publisher.yaml` when no explicit path is given
    pub project_path: PathBuf,

    /// Environment variables
    pub env: HashMap<String, String>,

    /// CLI overrides (highest priority)
    pub overrides: ConfigOverrides,
}

impl ConfigLoadOptions {
    /// Options reading the process environment and the current directory
    pub fn from_process() -> Self {
        Self {
            config_path: None,
            project_path: PathBuf::from("."),
            env: std::env::vars().collect(),
            overrides: ConfigOverrides::default(),
        }
    }
}

/// Orchestrator settings given on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub max_concurrent: Option<usize>,
    pub require_all_success: Option<bool>,
    pub stop_on_first_failure: Option<bool>,
    pub deadline_secs: Option<u64>,
    pub platform_order: Option<Vec<String>>,
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    /// Is configuration valid?
    pub valid: bool,

    /// Validation errors
    pub errors: Vec<ConfigValidationError>,

    /// Validation warnings
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "platforms.blog.baseUrl")
    pub field: String,

    /// Error message
    pub message: String,

    /// Expected type/value
    pub expected: Option<String>,

    /// Actual type/value
    pub actual: Option<String>,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    /// Field path
    pub field: String,

    /// Warning message
    pub message: String,

    /// Suggestion
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI overrides
    /// 2. Environment variables (`PUBLISHER_*`)
    /// 3. Config file (explicit path or ./.publisher.yaml)
    /// 4. Default values
    ///
    /// `${VAR}` references in platform URLs and credentials are expanded last.
    pub async fn load(options: ConfigLoadOptions) -> Result<PublisherConfig, ConfigError> {
        let mut config = match &options.config_path {
            Some(path) => Self::load_config_file(path)
                .await?
                .ok_or_else(|| ConfigError::NotFound {
                    path: path.display().to_string(),
                })?,
            None => {
                let path = options.project_path.join(CONFIG_FILENAME);
                Self::load_config_file(&path).await?.unwrap_or_default()
            }
        };

        if Self::apply_env_overrides(&mut config, &options.env) {
            debug!("applied environment overrides");
        }
        Self::apply_overrides(&mut config, &options.overrides);

        Ok(Self::expand_env_vars(config, &options.env))
    }

    /// Load configuration from a YAML, TOML or JSON file
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub async fn load_config_file(path: &Path) -> Result<Option<PublisherConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;

        Self::parse_config(path, &content).map(Some)
    }

    /// Parse config text, choosing the format from the file extension
    pub fn parse_config(path: &Path, content: &str) -> Result<PublisherConfig, ConfigError> {
        let display = path.display().to_string();
        let parse_error = |message: String| ConfigError::Parse {
            path: display.clone(),
            message,
        };

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))
            }
            Some("toml") => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
            Some("json") => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat { path: display.clone() }),
        }
    }

    /// Apply `PUBLISHER_*` environment overrides; returns whether any applied
    ///
    /// Unparseable values are logged and ignored.
    fn apply_env_overrides(config: &mut PublisherConfig, env: &HashMap<String, String>) -> bool {
        let mut has_changes = false;

        // PUBLISHER_MAX_CONCURRENT -> orchestrator.maxConcurrent
        if let Some(value) = Self::env_value::<usize>(env, "MAX_CONCURRENT") {
            config.orchestrator.max_concurrent = value;
            has_changes = true;
        }

        // PUBLISHER_DELAY_BETWEEN_BATCHES_MS -> orchestrator.delayBetweenBatchesMs
        if let Some(value) = Self::env_value::<u64>(env, "DELAY_BETWEEN_BATCHES_MS") {
            config.orchestrator.delay_between_batches_ms = value;
            has_changes = true;
        }

        // PUBLISHER_REQUIRE_ALL_SUCCESS -> orchestrator.requireAllSuccess
        if let Some(value) = Self::env_value::<bool>(env, "REQUIRE_ALL_SUCCESS") {
            config.orchestrator.require_all_success = value;
            has_changes = true;
        }

        // PUBLISHER_STOP_ON_FIRST_FAILURE -> orchestrator.stopOnFirstFailure
        if let Some(value) = Self::env_value::<bool>(env, "STOP_ON_FIRST_FAILURE") {
            config.orchestrator.stop_on_first_failure = value;
            has_changes = true;
        }

        // PUBLISHER_DEADLINE_SECS -> orchestrator.deadlineSecs
        if let Some(value) = Self::env_value::<u64>(env, "DEADLINE_SECS") {
            config.orchestrator.deadline_secs = Some(value);
            has_changes = true;
        }

        // PUBLISHER_MAX_RETRIES -> retry.maxRetries
        if let Some(value) = Self::env_value::<u32>(env, "MAX_RETRIES") {
            config.retry.max_retries = value;
            has_changes = true;
        }

        // PUBLISHER_HEALTH_INTERVAL_SECS -> health.intervalSecs
        if let Some(value) = Self::env_value::<u64>(env, "HEALTH_INTERVAL_SECS") {
            config.health.interval_secs = value;
            has_changes = true;
        }

        has_changes
    }

    fn env_value<T: std::str::FromStr>(env: &HashMap<String, String>, key: &str) -> Option<T> {
        let name = format!("{}{}", ENV_PREFIX, key);
        let raw = env.get(&name)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(variable = %name, value = %raw, "ignoring unparseable environment override");
                None
            }
        }
    }

    /// Apply CLI overrides
    pub fn apply_overrides(config: &mut PublisherConfig, overrides: &ConfigOverrides) {
        if let Some(value) = overrides.max_concurrent {
            config.orchestrator.max_concurrent = value;
        }
        if let Some(value) = overrides.require_all_success {
            config.orchestrator.require_all_success = value;
        }
        if let Some(value) = overrides.stop_on_first_failure {
            config.orchestrator.stop_on_first_failure = value;
        }
        if let Some(value) = overrides.deadline_secs {
            config.orchestrator.deadline_secs = Some(value);
        }
        if let Some(order) = &overrides.platform_order {
            config.orchestrator.platform_order = order.clone();
        }
    }

    /// Expand environment variables in platform URLs and credentials
    ///
    /// Only `${VAR_NAME}` references are expanded, and only for names
    /// matching `security.allowedEnvPrefixes` when that list is set.
    fn expand_env_vars(mut config: PublisherConfig, env: &HashMap<String, String>) -> PublisherConfig {
        let allowed_prefixes = config.security.allowed_env_prefixes.clone();

        for platform in config.platforms.values_mut() {
            if let Some(base_url) = &platform.base_url {
                platform.base_url = Some(Self::expand_string(base_url, env, &allowed_prefixes));
            }
            if let Some(endpoint) = &platform.endpoint {
                platform.endpoint = Some(Self::expand_string(endpoint, env, &allowed_prefixes));
            }
            for value in platform.credentials.values_mut() {
                *value = Self::expand_string(value, env, &allowed_prefixes);
            }
        }

        config
    }

    /// Expand environment variables in a single string
    ///
    /// References that are not allowed or not set are left in place.
    fn expand_string(
        input: &str,
        env: &HashMap<String, String>,
        allowed_prefixes: &Option<Vec<String>>,
    ) -> String {
        ENV_VAR
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];

                if let Some(prefixes) = allowed_prefixes
                    && !prefixes.iter().any(|prefix| var_name.starts_with(prefix))
                {
                    warn!(variable = var_name, "environment variable not allowed by prefix whitelist, skipping");
                    return caps[0].to_string();
                }

                match env.get(var_name) {
                    Some(value) => value.clone(),
                    None => {
                        warn!(variable = var_name, "environment variable not found");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    /// Validate configuration
    pub fn validate(config: &PublisherConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Check version
        if config.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "version".to_string(),
                message: "Version is required".to_string(),
                expected: Some(format!("string (e.g., \"{}\")", CONFIG_VERSION)),
                actual: Some("empty".to_string()),
            });
        } else if config.version != CONFIG_VERSION {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("Unknown version: {}", config.version),
                suggestion: Some(format!(
                    "Currently supported version is \"{}\" only",
                    CONFIG_VERSION
                )),
            });
        }

        // 2. Orchestrator and retry policy
        Self::validate_policy(config, &mut errors, &mut warnings);

        // 3. Platforms
        Self::validate_platforms(config, &mut errors, &mut warnings);

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_policy(
        config: &PublisherConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        if config.orchestrator.max_concurrent == 0 {
            errors.push(ConfigValidationError {
                field: "orchestrator.maxConcurrent".to_string(),
                message: "maxConcurrent must be at least 1".to_string(),
                expected: Some("integer >= 1".to_string()),
                actual: Some("0".to_string()),
            });
        }

        if config.orchestrator.deadline_secs == Some(0) {
            errors.push(ConfigValidationError {
                field: "orchestrator.deadlineSecs".to_string(),
                message: "deadlineSecs must be positive".to_string(),
                expected: Some("integer >= 1".to_string()),
                actual: Some("0".to_string()),
            });
        }

        if config.orchestrator.require_all_success && config.orchestrator.stop_on_first_failure {
            warnings.push(ConfigValidationWarning {
                field: "orchestrator.stopOnFirstFailure".to_string(),
                message: "stopOnFirstFailure has no effect when requireAllSuccess is set"
                    .to_string(),
                suggestion: Some("Remove one of the two settings".to_string()),
            });
        }

        for name in &config.orchestrator.platform_order {
            if !config.platforms.contains_key(name) {
                warnings.push(ConfigValidationWarning {
                    field: "orchestrator.platformOrder".to_string(),
                    message: format!("Unknown platform in platformOrder: {}", name),
                    suggestion: Some("Names must match keys under platforms".to_string()),
                });
            }
        }

        if config.retry.max_retries == 0 {
            warnings.push(ConfigValidationWarning {
                field: "retry.maxRetries".to_string(),
                message: "maxRetries of 0 is raised to 1".to_string(),
                suggestion: None,
            });
        }

        if config.retry.base_delay_ms > config.retry.max_delay_ms {
            warnings.push(ConfigValidationWarning {
                field: "retry.baseDelayMs".to_string(),
                message: "baseDelayMs exceeds maxDelayMs; every retry waits maxDelayMs"
                    .to_string(),
                suggestion: None,
            });
        }

        if config.health.check_timeout_secs == 0 {
            errors.push(ConfigValidationError {
                field: "health.checkTimeoutSecs".to_string(),
                message: "checkTimeoutSecs must be positive".to_string(),
                expected: Some("integer >= 1".to_string()),
                actual: Some("0".to_string()),
            });
        }

        if config.history.capacity == 0 {
            errors.push(ConfigValidationError {
                field: "history.capacity".to_string(),
                message: "capacity must be at least 1".to_string(),
                expected: Some("integer >= 1".to_string()),
                actual: Some("0".to_string()),
            });
        }
    }

    fn validate_platforms(
        config: &PublisherConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        if config.enabled_platforms().next().is_none() {
            warnings.push(ConfigValidationWarning {
                field: "platforms".to_string(),
                message: "No enabled platforms configured".to_string(),
                suggestion: Some("Add at least one entry under platforms".to_string()),
            });
        }

        for (name, platform) in &config.platforms {
            let field = |suffix: &str| format!("platforms.{}.{}", name, suffix);

            if !AdapterLoader::is_supported(&platform.adapter_type) {
                errors.push(ConfigValidationError {
                    field: field("type"),
                    message: format!("Unknown adapter type: {}", platform.adapter_type),
                    expected: Some(AdapterLoader::supported_types().join(", ")),
                    actual: Some(platform.adapter_type.clone()),
                });
                continue;
            }

            if let Some(required) = AdapterLoader::required_url_field(&platform.adapter_type) {
                let present = match required {
                    "endpoint" => platform.endpoint.is_some() || platform.base_url.is_some(),
                    _ => platform.base_url.is_some(),
                };
                if !present {
                    errors.push(ConfigValidationError {
                        field: field(required),
                        message: format!("{} is required for {} adapters", required, platform.adapter_type),
                        expected: Some("URL".to_string()),
                        actual: Some("missing".to_string()),
                    });
                }
            }

            for (key, value) in &platform.credentials {
                if ENV_VAR.is_match(value) {
                    warnings.push(ConfigValidationWarning {
                        field: field(&format!("credentials.{}", key)),
                        message: "Credential references an unresolved environment variable"
                            .to_string(),
                        suggestion: Some(
                            "Export the variable or allow its prefix in security.allowedEnvPrefixes"
                                .to_string(),
                        ),
                    });
                }
            }
        }
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
                if let (Some(expected), Some(actual)) = (&error.expected, &error.actual) {
                    lines.push(format!("    Expected: {}", expected));
                    lines.push(format!("    Actual: {}", actual));
                }
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    Suggestion: {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}
