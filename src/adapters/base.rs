//! Shared adapter scaffolding
//!
//! Every concrete adapter embeds an [`AdapterBase`] holding its connection
//! state machine, credential slot and cached rate-limit/quota state. Each of
//! these sits behind its own `tokio::sync::RwLock`, so an adapter shared
//! through `Arc` has a single writer per field.

use crate::core::capabilities::{Capability, PlatformCapabilities};
use crate::core::content::{ContentItem, FormatOptions, FormattedContent, format_for_platform};
use crate::core::error::{PlatformError, PlatformResult};
use crate::core::state_machine::{ConnectionState, ConnectionStateMachine};
use crate::core::traits::{
    ConnectionValidationResult, HealthCheckResult, QuotaStatus, RateLimitStatus, ValidationResult,
};
use crate::security::credentials::{API_KEY, PlatformCredentials, TOKEN, USERNAME, mask_secret};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Responses slower than this mark an adapter as degraded
pub const SLOW_RESPONSE: Duration = Duration::from_secs(5);

/// Quota usage above this ratio is reported as a warning
pub const QUOTA_WARNING_RATIO: f64 = 0.9;

/// State shared by all adapters
#[derive(Debug)]
pub struct AdapterBase {
    name: String,
    capabilities: PlatformCapabilities,
    state: RwLock<ConnectionStateMachine>,
    credentials: RwLock<Option<PlatformCredentials>>,
    rate_limit: RwLock<Option<RateLimitStatus>>,
    quota: RwLock<Option<QuotaStatus>>,
    last_health: RwLock<Option<HealthCheckResult>>,
}

impl AdapterBase {
    pub fn new(name: impl Into<String>, capabilities: PlatformCapabilities) -> Self {
        let name = name.into();
        Self {
            state: RwLock::new(ConnectionStateMachine::new(name.clone())),
            name,
            capabilities,
            credentials: RwLock::new(None),
            rate_limit: RwLock::new(None),
            quota: RwLock::new(None),
            last_health: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &PlatformCapabilities {
        &self.capabilities
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.state()
    }

    /// Human-readable transition history
    pub async fn state_history(&self) -> String {
        self.state.read().await.get_history()
    }

    async fn transition(&self, to: ConnectionState, reason: Option<&str>) -> PlatformResult<()> {
        self.state.write().await.transition(to, reason)
    }

    // ------------------------------------------------------------------------
    // Authentication lifecycle
    // ------------------------------------------------------------------------

    /// Enter `Authenticating` from any state
    pub async fn begin_authentication(&self) -> PlatformResult<()> {
        let mut state = self.state.write().await;
        if state.state() == ConnectionState::Authenticating {
            return Ok(());
        }
        // Authenticating is reachable from everywhere except itself
        state.transition(ConnectionState::Authenticating, None)
    }

    /// Store credentials and move to `Connected`
    pub async fn complete_authentication(&self, credentials: PlatformCredentials) -> PlatformResult<()> {
        let identity = [TOKEN, API_KEY, USERNAME]
            .into_iter()
            .find_map(|key| credentials.expose(key))
            .map(mask_secret)
            .unwrap_or_else(|| "****".to_string());

        *self.credentials.write().await = Some(credentials);
        self.transition(ConnectionState::Connected, Some("authenticated"))
            .await?;
        debug!(platform = %self.name, credential = %identity, "authenticated");
        Ok(())
    }

    /// Record a failed authentication: credentials are dropped and the
    /// adapter lands in `Disconnected`; returns the error to propagate
    pub async fn fail_authentication(&self, error: PlatformError) -> PlatformError {
        *self.credentials.write().await = None;
        let reason = error.to_string();
        if let Err(transition_error) = self
            .transition(ConnectionState::Disconnected, Some(&reason))
            .await
        {
            warn!(platform = %self.name, error = %transition_error, "state transition failed");
        }
        warn!(platform = %self.name, error = %error, "authentication failed");
        error
    }

    /// Authentication failure with a message
    pub fn auth_error(&self, message: impl Into<String>) -> PlatformError {
        PlatformError::Authentication {
            platform: self.name.clone(),
            message: message.into(),
        }
    }

    /// Clear credentials and caches and return to `Disconnected`
    pub async fn disconnect(&self) {
        *self.credentials.write().await = None;
        *self.rate_limit.write().await = None;
        *self.quota.write().await = None;
        *self.last_health.write().await = None;
        if let Err(error) = self
            .transition(ConnectionState::Disconnected, Some("disconnect"))
            .await
        {
            warn!(platform = %self.name, error = %error, "state transition failed");
        }
    }

    /// Stored credentials, or `NotConnected` when none are held
    pub async fn credentials(&self) -> PlatformResult<PlatformCredentials> {
        self.credentials
            .read()
            .await
            .clone()
            .ok_or_else(|| PlatformError::NotConnected {
                platform: self.name.clone(),
            })
    }

    /// Result of re-checking the stored credentials without a network call
    pub async fn local_connection_check(&self) -> ConnectionValidationResult {
        let state = self.state().await;
        let error = match self.credentials.read().await.as_ref() {
            None => Some("no credentials stored".to_string()),
            Some(credentials) if credentials.is_expired() => Some("credentials expired".to_string()),
            Some(_) if !state.is_usable() => Some(format!("connection is {}", state)),
            Some(_) => None,
        };

        ConnectionValidationResult {
            valid: error.is_none(),
            error,
            checked_at: Utc::now(),
        }
    }

    // ------------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------------

    /// Fail with `NotConnected` unless the adapter is Connected or Degraded
    pub async fn ensure_connected(&self) -> PlatformResult<()> {
        if self.state().await.is_usable() {
            Ok(())
        } else {
            Err(PlatformError::NotConnected {
                platform: self.name.clone(),
            })
        }
    }

    /// Fail with `NotSupported` unless the capability flag is set
    pub fn ensure_capability(&self, capability: Capability) -> PlatformResult<()> {
        if self.capabilities.supports(capability) {
            Ok(())
        } else {
            Err(PlatformError::NotSupported {
                platform: self.name.clone(),
                operation: capability.operation().to_string(),
            })
        }
    }

    /// Turn a failed validation into `ContentValidation`
    pub fn ensure_valid(&self, validation: ValidationResult) -> PlatformResult<()> {
        if validation.valid {
            Ok(())
        } else {
            Err(PlatformError::ContentValidation {
                platform: self.name.clone(),
                errors: validation.errors,
            })
        }
    }

    /// Generic formatting routine
    pub fn format(&self, content: &ContentItem, options: &FormatOptions) -> FormattedContent {
        format_for_platform(content, &self.name, &self.capabilities, options)
    }

    // ------------------------------------------------------------------------
    // Rate limit and quota caches
    // ------------------------------------------------------------------------

    pub async fn rate_limit(&self) -> Option<RateLimitStatus> {
        self.rate_limit.read().await.clone()
    }

    pub async fn set_rate_limit(&self, status: Option<RateLimitStatus>) {
        *self.rate_limit.write().await = status;
    }

    pub async fn quota(&self) -> Option<QuotaStatus> {
        self.quota.read().await.clone()
    }

    pub async fn set_quota(&self, status: Option<QuotaStatus>) {
        *self.quota.write().await = status;
    }

    // ------------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------------

    pub async fn last_health(&self) -> Option<HealthCheckResult> {
        self.last_health.read().await.clone()
    }

    /// Build a health result from a probe outcome and the cached state, then
    /// apply it to the connection state
    ///
    /// `probe` is the round-trip time of a platform call, or the error it
    /// failed with.
    pub async fn evaluate_health(&self, probe: PlatformResult<Duration>) -> HealthCheckResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let response_time = match probe {
            Ok(elapsed) => {
                if elapsed > SLOW_RESPONSE {
                    warnings.push(format!("slow response: {}ms", elapsed.as_millis()));
                }
                elapsed
            }
            Err(error) => {
                errors.push(error.to_string());
                Duration::ZERO
            }
        };

        let state = self.state().await;
        if !state.is_usable() {
            errors.push(format!("connection is {}", state));
        }

        if let Some(rate) = self.rate_limit().await
            && rate.is_exhausted()
        {
            warnings.push(format!("rate limit exhausted ({} requests)", rate.limit));
        }

        if let Some(quota) = self.quota().await {
            if quota.limit > 0 && quota.remaining() == 0 {
                warnings.push(format!("quota exhausted ({}/{})", quota.used, quota.limit));
            } else if quota.usage_ratio() > QUOTA_WARNING_RATIO {
                warnings.push(format!(
                    "quota at {:.0}% ({}/{})",
                    quota.usage_ratio() * 100.0,
                    quota.used,
                    quota.limit
                ));
            }
        }

        let result = HealthCheckResult::from_findings(response_time.as_millis() as u64, errors, warnings);
        self.record_health(&result).await;
        result
    }

    /// Apply a health result to the connection state
    ///
    /// Errors move Connected/Degraded to Unhealthy, warnings alone move
    /// Connected to Degraded, and a clean check moves Degraded back to
    /// Connected. Unhealthy adapters only recover through authentication.
    pub async fn record_health(&self, result: &HealthCheckResult) {
        use crate::core::traits::HealthStatus;

        {
            let mut state = self.state.write().await;
            let current = state.state();
            let target = match (current, result.status) {
                (ConnectionState::Connected | ConnectionState::Degraded, HealthStatus::Unhealthy) => {
                    Some(ConnectionState::Unhealthy)
                }
                (ConnectionState::Connected | ConnectionState::Degraded, HealthStatus::Degraded) => {
                    Some(ConnectionState::Degraded)
                }
                (ConnectionState::Degraded, HealthStatus::Healthy) => Some(ConnectionState::Connected),
                _ => None,
            };

            if let Some(target) = target {
                let reason = result
                    .errors
                    .first()
                    .or(result.warnings.first())
                    .map(String::as_str);
                if let Err(error) = state.transition(target, reason) {
                    warn!(platform = %self.name, error = %error, "state transition failed");
                } else if target != current {
                    debug!(platform = %self.name, from = %current, to = %target, "health changed connection state");
                }
            }
        }

        *self.last_health.write().await = Some(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::HealthStatus;

    async fn connected_base() -> AdapterBase {
        let base = AdapterBase::new("blog", PlatformCapabilities::default());
        base.begin_authentication().await.unwrap();
        base.complete_authentication(PlatformCredentials::bearer("tok"))
            .await
            .unwrap();
        base
    }

    #[tokio::test]
    async fn test_authentication_lifecycle() {
        let base = connected_base().await;

        assert_eq!(base.state().await, ConnectionState::Connected);
        assert!(base.credentials().await.is_ok());
        assert!(base.local_connection_check().await.valid);

        base.disconnect().await;

        assert_eq!(base.state().await, ConnectionState::Disconnected);
        assert!(matches!(
            base.credentials().await,
            Err(PlatformError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_authentication_disconnects() {
        let base = AdapterBase::new("blog", PlatformCapabilities::default());
        base.begin_authentication().await.unwrap();

        let error = base.fail_authentication(base.auth_error("bad token")).await;

        assert_eq!(error.code(), "AUTHENTICATION_FAILED");
        assert_eq!(base.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_guards() {
        let base = AdapterBase::new("blog", PlatformCapabilities::default());

        assert!(matches!(
            base.ensure_connected().await,
            Err(PlatformError::NotConnected { .. })
        ));
        assert!(matches!(
            base.ensure_capability(Capability::Scheduling),
            Err(PlatformError::NotSupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_health_errors_make_adapter_unhealthy() {
        let base = connected_base().await;

        let result = base
            .evaluate_health(Err(PlatformError::Network {
                platform: "blog".to_string(),
                message: "connection refused".to_string(),
            }))
            .await;

        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(base.state().await, ConnectionState::Unhealthy);

        // A clean probe does not revive an unhealthy adapter
        base.evaluate_health(Ok(Duration::from_millis(5))).await;
        assert_eq!(base.state().await, ConnectionState::Unhealthy);
    }

    #[tokio::test]
    async fn test_quota_warning_degrades_then_recovers() {
        let base = connected_base().await;
        base.set_quota(Some(QuotaStatus {
            limit: 100,
            used: 95,
            reset_at: None,
        }))
        .await;

        let result = base.evaluate_health(Ok(Duration::from_millis(5))).await;
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(base.state().await, ConnectionState::Degraded);

        base.set_quota(None).await;
        let result = base.evaluate_health(Ok(Duration::from_millis(5))).await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(base.state().await, ConnectionState::Connected);
        assert!(base.last_health().await.is_some());
    }

    #[tokio::test]
    async fn test_disconnected_adapter_reports_unhealthy_without_transition() {
        let base = AdapterBase::new("blog", PlatformCapabilities::default());

        let result = base.evaluate_health(Ok(Duration::from_millis(5))).await;

        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(base.state().await, ConnectionState::Disconnected);
    }
}
