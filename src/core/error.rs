//! Error handling for platform publishing
//!
//! This module provides the error taxonomy shared by adapters, the retry
//! executor and the orchestrator, with retry classification and recovery
//! guidance, using the thiserror crate for ergonomic error handling.

use crate::core::traits::ValidationError;
use std::time::Duration;
use thiserror::Error;

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Main error type for platform publishing operations
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    // Authentication errors
    #[error("[{platform}] authentication failed: {message}")]
    Authentication { platform: String, message: String },

    #[error("[{platform}] not connected; authenticate first")]
    NotConnected { platform: String },

    // Throttling
    #[error("[{platform}] rate limit exceeded{}", format_retry_after(.retry_after))]
    RateLimited {
        platform: String,
        retry_after: Option<Duration>,
    },

    // Content errors
    #[error("[{platform}] content validation failed: {}", summarize_fields(.errors))]
    ContentValidation {
        platform: String,
        errors: Vec<ValidationError>,
    },

    #[error("[{platform}] {operation} is not supported by this platform")]
    NotSupported { platform: String, operation: String },

    #[error("[{platform}] {external_id} not found")]
    NotFound {
        platform: String,
        external_id: String,
    },

    // Request errors
    #[error("[{platform}] platform is not registered")]
    UnknownPlatform { platform: String },

    #[error("no valid platforms in request: {}", .requested.join(", "))]
    NoValidPlatforms { requested: Vec<String> },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    // Transmission errors
    #[error("[{platform}] publishing failed: {message}")]
    Publishing { platform: String, message: String },

    /// The platform accepted the request but the response could not be
    /// interpreted; the operation may already have taken effect
    #[error("[{platform}] unexpected response: {message}")]
    UnexpectedResponse { platform: String, message: String },

    #[error("[{platform}] network error: {message}")]
    Network { platform: String, message: String },

    #[error("[{platform}] deadline exceeded after {}ms", .elapsed.as_millis())]
    Timeout { platform: String, elapsed: Duration },

    #[error("[{platform}] operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        platform: String,
        attempts: u32,
        #[source]
        source: Box<PlatformError>,
    },

    // State errors
    #[error("[{platform}] invalid connection state transition: {from} -> {to}")]
    InvalidStateTransition {
        platform: String,
        from: String,
        to: String,
    },
}

/// Errors raised while loading configuration or building adapters from it
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("unsupported config format: {path} (expected .yaml, .yml, .toml or .json)")]
    UnsupportedFormat { path: String },

    #[error("platform '{platform}' has unknown adapter type '{adapter_type}'")]
    UnknownAdapterType {
        platform: String,
        adapter_type: String,
    },

    #[error("platform '{platform}' is missing required setting '{field}'")]
    MissingSetting { platform: String, field: String },

    #[error("platform '{platform}' has invalid setting '{field}': {message}")]
    InvalidSetting {
        platform: String,
        field: String,
        message: String,
    },
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {}s)", delay.as_secs_f64()),
        None => String::new(),
    }
}

fn summarize_fields(errors: &[ValidationError]) -> String {
    if errors.is_empty() {
        return "no details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PlatformError {
    /// Get the platform name associated with this error, if any
    pub fn platform(&self) -> Option<&str> {
        match self {
            Self::Authentication { platform, .. }
            | Self::NotConnected { platform }
            | Self::RateLimited { platform, .. }
            | Self::ContentValidation { platform, .. }
            | Self::NotSupported { platform, .. }
            | Self::NotFound { platform, .. }
            | Self::UnknownPlatform { platform }
            | Self::Publishing { platform, .. }
            | Self::UnexpectedResponse { platform, .. }
            | Self::Network { platform, .. }
            | Self::Timeout { platform, .. }
            | Self::RetriesExhausted { platform, .. }
            | Self::InvalidStateTransition { platform, .. } => Some(platform),
            Self::NoValidPlatforms { .. } | Self::InvalidRequest { .. } => None,
        }
    }

    /// Check if this error may succeed when the operation is attempted again
    ///
    /// Validation, authentication and request-shape errors never improve on
    /// retry. A timeout means the caller's deadline has passed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Publishing { .. } | Self::Network { .. }
        )
    }

    /// Server-provided wait hint for rate-limit errors
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The innermost error, unwrapping retry exhaustion
    pub fn root_cause(&self) -> &PlatformError {
        match self {
            Self::RetriesExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::Authentication { .. } => vec![
                "Check the platform credentials",
                "Verify that the token has not expired or been revoked",
            ],
            Self::NotConnected { .. } => {
                vec!["Authenticate the platform before publishing"]
            }
            Self::RateLimited { .. } => vec![
                "Wait until the rate limit window resets",
                "Reduce maxConcurrent or add a delay between batches",
            ],
            Self::ContentValidation { .. } => vec![
                "Review the field errors",
                "Shorten or adjust the content for this platform",
            ],
            Self::NotSupported { .. } => {
                vec!["Use a platform whose capabilities include this operation"]
            }
            Self::NotFound { .. } => vec![
                "Check the external id returned by the original publish",
                "The item may already have been removed on the platform",
            ],
            Self::UnknownPlatform { .. } | Self::NoValidPlatforms { .. } => vec![
                "Register the platform with add_platform",
                "Check the platform name for typos",
            ],
            Self::InvalidRequest { .. } => vec!["Fix the request parameters"],
            Self::Publishing { .. } => vec![
                "Check the platform status page",
                "Retry later",
            ],
            Self::UnexpectedResponse { .. } => vec![
                "Check the platform for the item before publishing again",
                "Verify the platform base URL and API version",
            ],
            Self::Network { .. } => vec![
                "Check network connectivity",
                "Verify the platform base URL",
            ],
            Self::Timeout { .. } => vec!["Increase the publish deadline"],
            Self::RetriesExhausted { .. } => vec![
                "Inspect the underlying cause",
                "Retry once the platform recovers",
            ],
            Self::InvalidStateTransition { .. } => {
                vec!["Disconnect and authenticate the platform again"]
            }
        }
    }

    /// Get a stable error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "AUTHENTICATION_FAILED",
            Self::NotConnected { .. } => "NOT_CONNECTED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::ContentValidation { .. } => "CONTENT_VALIDATION_FAILED",
            Self::NotSupported { .. } => "NOT_SUPPORTED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::UnknownPlatform { .. } => "UNKNOWN_PLATFORM",
            Self::NoValidPlatforms { .. } => "NO_VALID_PLATFORMS",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::Publishing { .. } => "PUBLISH_FAILED",
            Self::UnexpectedResponse { .. } => "UNEXPECTED_RESPONSE",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
        }
    }
}
