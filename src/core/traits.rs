//! Core traits and types for platform publishing
//!
//! This module defines the adapter contract every destination platform
//! implements, along with the validation, publish, health and analytics
//! records that flow through it.

use crate::core::capabilities::PlatformCapabilities;
use crate::core::content::{ContentItem, FormatOptions, FormattedContent};
use crate::core::error::PlatformResult;
use crate::core::state_machine::ConnectionState;
use crate::security::credentials::PlatformCredentials;
use crate::validation::ContentValidator;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Validation
// ============================================================================

/// Validation error with field information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    #[serde(default = "default_error_severity")]
    pub severity: String, // Always "error"
}

fn default_error_severity() -> String {
    "error".to_string()
}

/// Validation warning with field information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    #[serde(default = "default_warning_severity")]
    pub severity: String, // Always "warning"
}

fn default_warning_severity() -> String {
    "warning".to_string()
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: default_error_severity(),
        }
    }
}

impl ValidationWarning {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: default_warning_severity(),
        }
    }
}

/// Result of validating formatted content against a platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

// ============================================================================
// Authentication
// ============================================================================

/// Outcome of a successful authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationResult {
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub authenticated_at: DateTime<Utc>,
}

/// Result of re-checking an existing authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

// ============================================================================
// Publishing
// ============================================================================

/// Options for single-platform publish operations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOptions {
    /// Publish as a draft where the platform supports drafts
    #[serde(default)]
    pub draft: bool,
    /// Notify followers/subscribers where the platform supports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_followers: Option<bool>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>, // Adapter-specific options
}

/// Initial engagement numbers reported right after a publish
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub views: u64,
    pub engagements: u64,
    pub shares: u64,
}

/// Result of a publish or update operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub success: bool,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PostMetrics>,
    pub attempts: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl PublishResult {
    /// Successful result as returned by an adapter
    pub fn published(platform: &str, external_id: impl Into<String>, url: Option<String>) -> Self {
        Self {
            success: true,
            platform: platform.to_string(),
            external_id: Some(external_id.into()),
            url,
            error: None,
            error_code: None,
            metrics: None,
            attempts: 1,
            duration_ms: 0,
            published_at: Some(Utc::now()),
            metadata: None,
        }
    }

    /// Failed result with an error message and code
    pub fn failed(platform: &str, error: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            platform: platform.to_string(),
            external_id: None,
            url: None,
            error: Some(error.into()),
            error_code: Some(code.to_string()),
            metrics: None,
            attempts: 0,
            duration_ms: 0,
            published_at: None,
            metadata: None,
        }
    }
}

/// Result of a schedule operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResult {
    pub success: bool,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub duration_ms: u64,
}

impl ScheduleResult {
    pub fn scheduled(platform: &str, schedule_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            platform: platform.to_string(),
            schedule_id: Some(schedule_id.into()),
            scheduled_for: Some(at),
            url: None,
            error: None,
            error_code: None,
            duration_ms: 0,
        }
    }

    pub fn failed(platform: &str, error: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            platform: platform.to_string(),
            schedule_id: None,
            scheduled_for: None,
            url: None,
            error: Some(error.into()),
            error_code: Some(code.to_string()),
            duration_ms: 0,
        }
    }
}

/// Result of a delete operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub success: bool,
    pub platform: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub deleted_at: DateTime<Utc>,
}

impl DeleteResult {
    pub fn deleted(platform: &str, external_id: &str) -> Self {
        Self {
            success: true,
            platform: platform.to_string(),
            external_id: external_id.to_string(),
            error: None,
            deleted_at: Utc::now(),
        }
    }
}

// ============================================================================
// Introspection
// ============================================================================

/// Health of a single adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of one health poll; replaced on every poll
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    /// Build a result whose status follows from the collected messages:
    /// any error is unhealthy, warnings alone are degraded
    pub fn from_findings(response_time_ms: u64, errors: Vec<String>, warnings: Vec<String>) -> Self {
        let status = if !errors.is_empty() {
            HealthStatus::Unhealthy
        } else if !warnings.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            response_time_ms,
            errors,
            warnings,
            checked_at: Utc::now(),
        }
    }
}

/// Request-rate window reported by a platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitStatus {
    pub fn is_exhausted(&self) -> bool {
        self.limit > 0 && self.remaining == 0
    }
}

/// Longer-term usage allowance (e.g. posts per day)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub limit: u64,
    pub used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaStatus {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    /// Fraction of the quota consumed, 0.0 when unlimited
    pub fn usage_ratio(&self) -> f64 {
        if self.limit == 0 {
            0.0
        } else {
            self.used as f64 / self.limit as f64
        }
    }
}

/// Time window for analytics queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Window ending now and covering the last `days` days
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - chrono::Duration::days(days),
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Analytics reported by one platform for a time range
///
/// Rates are percentages (0-100).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAnalytics {
    pub platform: String,
    pub views: u64,
    pub engagements: u64,
    pub shares: u64,
    pub conversions: u64,
    pub revenue: f64,
    pub engagement_rate: f64,
    pub bounce_rate: f64,
    pub click_through_rate: f64,
}

// ============================================================================
// Platform Adapter Trait
// ============================================================================

/// Contract implemented once per destination platform
///
/// Adapters are shared behind `Arc` across concurrent publishes, so every
/// method takes `&self`; mutable state (credentials, rate-limit and quota
/// caches) lives behind the adapter's own locks.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Registry name (e.g., "blog", "medium")
    fn name(&self) -> &str;

    /// Static limits and feature flags
    fn capabilities(&self) -> &PlatformCapabilities;

    /// Current connection state
    async fn connection_state(&self) -> ConnectionState;

    /// Whether publish operations may be attempted
    async fn is_connected(&self) -> bool {
        self.connection_state().await.is_usable()
    }

    /// Validate credentials against the platform and store them on success
    async fn authenticate(&self, credentials: PlatformCredentials) -> PlatformResult<AuthenticationResult>;

    /// Re-check the stored authentication without re-authenticating
    async fn validate_connection(&self) -> PlatformResult<ConnectionValidationResult>;

    /// Drop credentials and cached state
    async fn disconnect(&self);

    /// Render content for this platform
    async fn format_content(
        &self,
        content: &ContentItem,
        options: &FormatOptions,
    ) -> PlatformResult<FormattedContent>;

    /// Check formatted content against this platform's constraints
    fn validate_content(&self, content: &FormattedContent) -> ValidationResult {
        ContentValidator::new().validate(content, self.capabilities())
    }

    /// Publish formatted content
    async fn publish(
        &self,
        content: &FormattedContent,
        options: &PublishOptions,
    ) -> PlatformResult<PublishResult>;

    /// Schedule formatted content for a future time
    async fn schedule(
        &self,
        content: &FormattedContent,
        publish_at: DateTime<Utc>,
        options: &PublishOptions,
    ) -> PlatformResult<ScheduleResult>;

    /// Replace a previously published item
    async fn update(
        &self,
        external_id: &str,
        content: &FormattedContent,
        options: &PublishOptions,
    ) -> PlatformResult<PublishResult>;

    /// Remove a previously published item
    async fn delete(&self, external_id: &str) -> PlatformResult<DeleteResult>;

    /// Engagement metrics over a time range
    async fn get_analytics(&self, range: &TimeRange) -> PlatformResult<PlatformAnalytics>;

    /// Probe the platform and update the connection state accordingly
    async fn health_check(&self) -> HealthCheckResult;

    /// Cached request-rate window, if the platform reported one
    async fn get_rate_limit(&self) -> PlatformResult<Option<RateLimitStatus>>;

    /// Cached usage quota, if the platform reported one
    async fn get_quota(&self) -> PlatformResult<Option<QuotaStatus>>;
}
