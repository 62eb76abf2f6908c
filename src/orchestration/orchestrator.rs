//! Publish Orchestrator - Distributes one content item across platforms
//!
//! Manages the complete multi-platform workflow:
//! - Platform registration with authentication
//! - Up-front rejection of unknown platforms
//! - Best-effort batched publishing with retries
//! - All-or-nothing publishing with compensating rollback
//! - Deadline enforcement over a whole call
//! - Scheduling, unpublishing, health and analytics delegation
//! - Publish history recording

use crate::adapters::loader::AdapterLoader;
use crate::adapters::registry::AdapterRegistry;
use crate::core::capabilities::Capability;
use crate::core::config::{OrchestratorConfig, PublisherConfig};
use crate::core::content::{ContentItem, FormatOptions};
use crate::core::error::{ConfigError, PlatformError, PlatformResult};
use crate::core::retry::{RetryExecutor, RetryOutcome};
use crate::core::state_machine::ConnectionState;
use crate::core::traits::{
    AuthenticationResult, DeleteResult, PlatformAdapter, PublishOptions, PublishResult,
    ScheduleResult, TimeRange,
};
use crate::orchestration::analytics::{
    AggregatedAnalytics, AnalyticsAggregator, ComparativeAnalytics, ComparisonMetric,
};
use crate::orchestration::batch::{BatchScheduler, DEFAULT_MAX_CONCURRENT};
use crate::orchestration::bulk::{BulkPublishOptions, BulkPublishResult, BulkPublisher};
use crate::orchestration::health_monitor::{HealthMonitor, HealthMonitorOptions, PlatformHealthReport};
use crate::orchestration::history::{HistoryEntry, HistoryOperation, PublishHistory};
use crate::security::credentials::{CredentialStore, PlatformCredentials};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, instrument, warn};

/// Code of a platform skipped after an earlier batch failed
pub const SKIPPED: &str = "SKIPPED";
/// Code of a publish removed by rollback
pub const ROLLED_BACK: &str = "ROLLED_BACK";
/// Code of a publish that rollback could not remove
pub const ROLLBACK_INCOMPLETE: &str = "ROLLBACK_INCOMPLETE";
/// Code of a platform never attempted in an all-or-nothing call
pub const NOT_ATTEMPTED: &str = "NOT_ATTEMPTED";

/// Options for a multi-platform call
#[derive(Debug, Clone)]
pub struct MultiPublishOptions {
    /// All-or-nothing: sequential, rolled back on the first failure
    pub require_all_success: bool,
    /// Skip later batches once a batch had a failure
    pub stop_on_first_failure: bool,
    /// Platforms per concurrent batch (minimum 1)
    pub max_concurrent: usize,
    pub delay_between_batches: Duration,
    /// Platforms published first, in this order
    pub platform_order: Vec<String>,
    /// Bound on the whole call
    pub deadline: Option<Duration>,
    pub format: FormatOptions,
    pub publish: PublishOptions,
}

impl Default for MultiPublishOptions {
    fn default() -> Self {
        Self {
            require_all_success: false,
            stop_on_first_failure: false,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            delay_between_batches: Duration::ZERO,
            platform_order: Vec::new(),
            deadline: None,
            format: FormatOptions::default(),
            publish: PublishOptions::default(),
        }
    }
}

impl From<&OrchestratorConfig> for MultiPublishOptions {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            require_all_success: config.require_all_success,
            stop_on_first_failure: config.stop_on_first_failure,
            max_concurrent: config.max_concurrent.max(1),
            delay_between_batches: Duration::from_millis(config.delay_between_batches_ms),
            platform_order: config.platform_order.clone(),
            deadline: config.deadline_secs.map(Duration::from_secs),
            ..Self::default()
        }
    }
}

/// Scheduling request across platforms
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    /// Target platforms; empty means every registered platform
    pub platforms: Vec<String>,
    pub publish_at: DateTime<Utc>,
    /// Batching, ordering, deadline and per-platform options
    /// (`require_all_success` does not apply to scheduling)
    pub options: MultiPublishOptions,
}

impl ScheduleRequest {
    pub fn new(platforms: Vec<String>, publish_at: DateTime<Utc>) -> Self {
        Self {
            platforms,
            publish_at,
            options: MultiPublishOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStatus {
    /// Every earlier publish was removed
    Complete,
    /// Some publishes could not be removed and are still live
    Partial,
}

/// Outcome of an all-or-nothing rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub status: RollbackStatus,
    /// Platform whose failure triggered the rollback
    pub triggered_by: String,
    pub rolled_back: Vec<String>,
    /// Publishes left in place because the platform cannot delete
    pub not_supported: Vec<String>,
    /// Deletions that failed, with the error
    pub failed: BTreeMap<String, String>,
}

/// Per-platform outcome of a multi-platform publish
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiPlatformPublishResult {
    pub content_id: String,
    pub results: BTreeMap<String, PublishResult>,
    pub errors: BTreeMap<String, String>,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped: Vec<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl MultiPlatformPublishResult {
    fn collect(
        content_id: &str,
        results: BTreeMap<String, PublishResult>,
        skipped: Vec<String>,
        rollback: Option<RollbackReport>,
        require_all: bool,
        started: Instant,
    ) -> Self {
        let errors = failure_messages(results.iter().map(|(k, r)| (k, r.success, &r.error)));
        let success_count = results.values().filter(|r| r.success).count();
        let failure_count = results.len() - success_count;
        let success = if require_all {
            failure_count == 0
        } else {
            success_count > 0
        };

        Self {
            content_id: content_id.to_string(),
            results,
            errors,
            success_count,
            failure_count,
            skipped,
            success,
            rollback,
            duration_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        }
    }
}

/// Per-platform outcome of a multi-platform schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiPlatformScheduleResult {
    pub content_id: String,
    pub publish_at: DateTime<Utc>,
    pub results: BTreeMap<String, ScheduleResult>,
    pub errors: BTreeMap<String, String>,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
}

fn failure_messages<'a>(
    results: impl Iterator<Item = (&'a String, bool, &'a Option<String>)>,
) -> BTreeMap<String, String> {
    results
        .filter(|(_, success, _)| !success)
        .map(|(name, _, error)| {
            (
                name.clone(),
                error.clone().unwrap_or_else(|| "unknown error".to_string()),
            )
        })
        .collect()
}

/// Requested names, deduplicated, with `order` entries first
pub fn order_platforms(requested: &[String], order: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::with_capacity(requested.len());
    let preferred = order.iter().filter(|name| requested.contains(*name));

    for name in preferred.chain(requested) {
        if !ordered.contains(name) {
            ordered.push(name.clone());
        }
    }
    ordered
}

/// PublishOrchestrator - Multi-platform publishing coordinator
pub struct PublishOrchestrator {
    registry: Arc<AdapterRegistry>,
    /// Credentials each platform was added with, used to re-authenticate
    /// adapters a health check marked unhealthy
    credentials: RwLock<BTreeMap<String, PlatformCredentials>>,
    retry: RetryExecutor,
    defaults: MultiPublishOptions,
    history: Arc<PublishHistory>,
    health: HealthMonitor,
    analytics: AnalyticsAggregator,
}

impl Default for PublishOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishOrchestrator {
    pub fn new() -> Self {
        Self::with_components(
            RetryExecutor::default(),
            MultiPublishOptions::default(),
            HealthMonitorOptions::default(),
            Arc::new(PublishHistory::default()),
        )
    }

    pub fn with_components(
        retry: RetryExecutor,
        defaults: MultiPublishOptions,
        health_options: HealthMonitorOptions,
        history: Arc<PublishHistory>,
    ) -> Self {
        let registry = Arc::new(AdapterRegistry::new());
        Self {
            health: HealthMonitor::new(Arc::clone(&registry), health_options)
                .with_history(Arc::clone(&history)),
            analytics: AnalyticsAggregator::new(Arc::clone(&registry)),
            registry,
            credentials: RwLock::new(BTreeMap::new()),
            retry,
            defaults,
            history,
        }
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_defaults(mut self, defaults: MultiPublishOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Build adapters for every enabled platform and authenticate them
    ///
    /// A platform whose credentials are missing or rejected is still
    /// registered, disconnected, so it shows up in health reports and fails
    /// its publishes with `NOT_CONNECTED`.
    pub async fn from_config(
        config: &PublisherConfig,
        loader: &AdapterLoader,
        credentials: &CredentialStore,
    ) -> Result<Self, ConfigError> {
        let orchestrator = Self::with_components(
            RetryExecutor::new(config.retry.to_options()),
            MultiPublishOptions::from(&config.orchestrator),
            HealthMonitorOptions::from(&config.health),
            Arc::new(PublishHistory::new(config.history.capacity)),
        );

        for (name, platform) in config.enabled_platforms() {
            let adapter = loader.load(name, platform)?;

            let Some(creds) = credentials.resolve(name, platform) else {
                warn!(platform = %name, "no credentials found; registering disconnected");
                orchestrator.registry.insert(adapter).await;
                continue;
            };

            if let Err(e) = orchestrator.add_platform(Arc::clone(&adapter), creds).await {
                error!(platform = %name, error = %e, "authentication failed; registering disconnected");
                orchestrator.registry.insert(adapter).await;
            }
        }

        info!(platforms = orchestrator.registry.len().await, "orchestrator configured");
        Ok(orchestrator)
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn defaults(&self) -> &MultiPublishOptions {
        &self.defaults
    }

    pub fn history(&self) -> &Arc<PublishHistory> {
        &self.history
    }

    pub fn health_monitor(&self) -> &HealthMonitor {
        &self.health
    }

    // ------------------------------------------------------------------------
    // Platform management
    // ------------------------------------------------------------------------

    /// Authenticate an adapter and register it, replacing (and disconnecting)
    /// any previous adapter of the same name
    pub async fn add_platform(
        &self,
        adapter: Arc<dyn PlatformAdapter>,
        credentials: PlatformCredentials,
    ) -> PlatformResult<AuthenticationResult> {
        let authentication = adapter.authenticate(credentials.clone()).await?;
        self.credentials
            .write()
            .await
            .insert(adapter.name().to_string(), credentials);

        if let Some(previous) = self.registry.insert(Arc::clone(&adapter)).await
            && !Arc::ptr_eq(&previous, &adapter)
        {
            debug!(platform = %adapter.name(), "replacing registered adapter");
            previous.disconnect().await;
        }

        info!(platform = %adapter.name(), "platform added");
        Ok(authentication)
    }

    /// Disconnect and unregister; false when the name was not registered
    pub async fn remove_platform(&self, name: &str) -> bool {
        self.credentials.write().await.remove(name);
        match self.registry.remove(name).await {
            Some(adapter) => {
                adapter.disconnect().await;
                info!(platform = %name, "platform removed");
                true
            }
            None => false,
        }
    }

    /// Registered platform names, sorted
    pub async fn get_platforms(&self) -> Vec<String> {
        self.registry.names().await
    }

    /// Platforms currently Connected or Degraded
    pub async fn get_connected_platforms(&self) -> Vec<String> {
        let mut connected = Vec::new();
        for adapter in self.registry.snapshot().await {
            if adapter.is_connected().await {
                connected.push(adapter.name().to_string());
            }
        }
        connected
    }

    // ------------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------------

    /// Publish to every registered platform
    pub async fn publish_to_all(
        &self,
        content: &ContentItem,
        options: &MultiPublishOptions,
    ) -> PlatformResult<MultiPlatformPublishResult> {
        let platforms = self.registry.names().await;
        self.publish_to_selected(content, &platforms, options).await
    }

    /// Publish to the named platforms
    ///
    /// Unknown names become `UNKNOWN_PLATFORM` entries; a call naming no
    /// registered platform fails with [`PlatformError::NoValidPlatforms`].
    #[instrument(skip(self, content, options), fields(content_id = %content.id))]
    pub async fn publish_to_selected(
        &self,
        content: &ContentItem,
        platforms: &[String],
        options: &MultiPublishOptions,
    ) -> PlatformResult<MultiPlatformPublishResult> {
        let started = Instant::now();
        let deadline = options.deadline.map(|d| started + d);
        let (targets, rejected) = self.resolve_targets(platforms, &options.platform_order).await;

        if targets.is_empty() {
            return Err(PlatformError::NoValidPlatforms {
                requested: platforms.to_vec(),
            });
        }

        info!(
            platforms = targets.len(),
            rejected = rejected.len(),
            all_or_nothing = options.require_all_success,
            "publishing content"
        );

        let result = if options.require_all_success {
            self.publish_all_or_nothing(content, targets, rejected, options, deadline, started)
                .await
        } else {
            self.publish_best_effort(content, targets, rejected, options, deadline, started)
                .await
        };

        for platform_result in result.results.values() {
            self.history
                .record(HistoryEntry::from_publish(&content.id, platform_result))
                .await;
        }

        info!(
            success = result.success,
            succeeded = result.success_count,
            failed = result.failure_count,
            duration_ms = result.duration_ms,
            "publish finished"
        );
        Ok(result)
    }

    async fn publish_best_effort(
        &self,
        content: &ContentItem,
        targets: Vec<Arc<dyn PlatformAdapter>>,
        rejected: Vec<String>,
        options: &MultiPublishOptions,
        deadline: Option<Instant>,
        started: Instant,
    ) -> MultiPlatformPublishResult {
        let scheduler = BatchScheduler::new(options.max_concurrent, options.delay_between_batches);
        let stop_on_failure = options.stop_on_first_failure;
        let this = self;

        let outcome = scheduler
            .run_until(
                targets,
                move |adapter| this.publish_one(adapter, content, options, deadline),
                |settled| stop_on_failure && settled.iter().any(|(_, r)| !r.success),
            )
            .await;

        let mut results = rejected_results(&rejected);
        for (adapter, result) in outcome.completed {
            results.insert(adapter.name().to_string(), result);
        }

        let mut skipped = Vec::new();
        for adapter in outcome.skipped {
            let name = adapter.name().to_string();
            debug!(platform = %name, "skipped after earlier failure");
            results.insert(
                name.clone(),
                PublishResult::failed(&name, "skipped after an earlier batch failed", SKIPPED),
            );
            skipped.push(name);
        }

        MultiPlatformPublishResult::collect(&content.id, results, skipped, None, false, started)
    }

    async fn publish_all_or_nothing(
        &self,
        content: &ContentItem,
        targets: Vec<Arc<dyn PlatformAdapter>>,
        rejected: Vec<String>,
        options: &MultiPublishOptions,
        deadline: Option<Instant>,
        started: Instant,
    ) -> MultiPlatformPublishResult {
        let mut results = rejected_results(&rejected);

        if !rejected.is_empty() {
            warn!(rejected = ?rejected, "unknown platforms in all-or-nothing request; publishing nothing");
            for adapter in &targets {
                let name = adapter.name();
                results.insert(
                    name.to_string(),
                    PublishResult::failed(name, "not attempted: request named unknown platforms", NOT_ATTEMPTED),
                );
            }
            return MultiPlatformPublishResult::collect(&content.id, results, Vec::new(), None, true, started);
        }

        let mut compensations: Vec<(Arc<dyn PlatformAdapter>, Option<String>)> = Vec::new();
        let mut remaining = targets.into_iter();
        let mut trigger = None;

        for adapter in remaining.by_ref() {
            let name = adapter.name().to_string();
            let result = self.publish_one(Arc::clone(&adapter), content, options, deadline).await;

            if !result.success {
                results.insert(name.clone(), result);
                trigger = Some(name);
                break;
            }
            compensations.push((adapter, result.external_id.clone()));
            results.insert(name, result);
        }

        let Some(trigger) = trigger else {
            return MultiPlatformPublishResult::collect(&content.id, results, Vec::new(), None, true, started);
        };

        for adapter in remaining {
            let name = adapter.name();
            results.insert(
                name.to_string(),
                PublishResult::failed(name, format!("not attempted: {} failed first", trigger), NOT_ATTEMPTED),
            );
        }

        let report = self.rollback(compensations, &trigger, &content.id).await;

        for name in &report.rolled_back {
            if let Some(result) = results.get_mut(name) {
                mark_failed(result, format!("rolled back after {} failed", trigger), ROLLED_BACK);
                result.url = None;
            }
        }
        for (name, reason) in report
            .not_supported
            .iter()
            .map(|n| (n, "deletion not supported".to_string()))
            .chain(report.failed.iter().map(|(n, e)| (n, e.clone())))
        {
            if let Some(result) = results.get_mut(name) {
                mark_failed(
                    result,
                    format!("{} failed and this publish could not be removed: {}", trigger, reason),
                    ROLLBACK_INCOMPLETE,
                );
            }
        }

        MultiPlatformPublishResult::collect(&content.id, results, Vec::new(), Some(report), true, started)
    }

    /// Walk the compensation list in reverse, deleting what can be deleted
    ///
    /// A publish that succeeded without an external id cannot be addressed
    /// for deletion and is reported as failed to roll back.
    async fn rollback(
        &self,
        compensations: Vec<(Arc<dyn PlatformAdapter>, Option<String>)>,
        trigger: &str,
        content_id: &str,
    ) -> RollbackReport {
        warn!(triggered_by = %trigger, publishes = compensations.len(), "rolling back");

        let mut rolled_back = Vec::new();
        let mut not_supported = Vec::new();
        let mut failed = BTreeMap::new();

        for (adapter, external_id) in compensations.into_iter().rev() {
            let name = adapter.name().to_string();

            let Some(external_id) = external_id else {
                error!(platform = %name, "cannot roll back: publish returned no external id");
                failed.insert(name, "publish returned no external id".to_string());
                continue;
            };

            if !adapter.capabilities().supports(Capability::Deletion) {
                warn!(platform = %name, external_id = %external_id, "cannot roll back: deletion not supported");
                not_supported.push(name);
                continue;
            }

            let outcome = self.retry.execute(&name, || adapter.delete(&external_id)).await;
            let delete_result = match outcome {
                Ok(result) => {
                    debug!(platform = %name, external_id = %external_id, "rolled back");
                    rolled_back.push(name);
                    result
                }
                Err(e) => {
                    error!(platform = %name, external_id = %external_id, error = %e, "rollback failed");
                    failed.insert(name.clone(), e.to_string());
                    DeleteResult {
                        success: false,
                        platform: name,
                        external_id: external_id.clone(),
                        error: Some(e.to_string()),
                        deleted_at: Utc::now(),
                    }
                }
            };
            self.history
                .record(HistoryEntry::from_delete(
                    HistoryOperation::Rollback,
                    Some(content_id),
                    &delete_result,
                ))
                .await;
        }

        let status = if not_supported.is_empty() && failed.is_empty() {
            RollbackStatus::Complete
        } else {
            RollbackStatus::Partial
        };

        RollbackReport {
            status,
            triggered_by: trigger.to_string(),
            rolled_back,
            not_supported,
            failed,
        }
    }

    /// Format, validate and publish on one platform, bounded by the deadline
    async fn publish_one(
        &self,
        adapter: Arc<dyn PlatformAdapter>,
        content: &ContentItem,
        options: &MultiPublishOptions,
        deadline: Option<Instant>,
    ) -> PublishResult {
        let name = adapter.name().to_string();
        let started = Instant::now();

        let work = async {
            self.recover(adapter.as_ref()).await;
            let formatted = match adapter.format_content(content, &options.format).await {
                Ok(formatted) => formatted,
                Err(e) => return not_attempted(e),
            };

            let validation = adapter.validate_content(&formatted);
            for warning in &validation.warnings {
                debug!(platform = %name, field = %warning.field, "{}", warning.message);
            }
            if !validation.valid {
                return not_attempted(PlatformError::ContentValidation {
                    platform: name.clone(),
                    errors: validation.errors,
                });
            }

            debug!(platform = %name, adaptation_score = formatted.adaptation_score, "publishing");
            self.retry
                .execute_counted(&name, || adapter.publish(&formatted, &options.publish))
                .await
        };

        let outcome = bounded(&name, deadline, started, work).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome.result {
            Ok(mut result) => {
                result.platform = name;
                result.attempts = outcome.attempts;
                result.duration_ms = duration_ms;
                result
            }
            Err(e) => {
                warn!(platform = %name, code = e.code(), error = %e, "publish failed");
                let mut result = PublishResult::failed(&name, e.to_string(), e.code());
                result.attempts = outcome.attempts;
                result.duration_ms = duration_ms;
                result
            }
        }
    }

    /// Re-authenticate an unhealthy adapter with the credentials it was added
    /// with; a failure leaves it disconnected and the call that follows
    /// reports `NOT_CONNECTED`
    async fn recover(&self, adapter: &dyn PlatformAdapter) {
        if adapter.connection_state().await != ConnectionState::Unhealthy {
            return;
        }
        let Some(credentials) = self.credentials.read().await.get(adapter.name()).cloned() else {
            return;
        };

        match adapter.authenticate(credentials).await {
            Ok(_) => info!(platform = %adapter.name(), "re-authenticated unhealthy platform"),
            Err(e) => warn!(platform = %adapter.name(), error = %e, "re-authentication failed"),
        }
    }

    /// Look up requested names in publish order; returns (registered, unknown)
    async fn resolve_targets(
        &self,
        platforms: &[String],
        order: &[String],
    ) -> (Vec<Arc<dyn PlatformAdapter>>, Vec<String>) {
        let mut targets = Vec::new();
        let mut rejected = Vec::new();

        for name in order_platforms(platforms, order) {
            match self.registry.get(&name).await {
                Some(adapter) => targets.push(adapter),
                None => {
                    warn!(platform = %name, "unknown platform rejected");
                    rejected.push(name);
                }
            }
        }

        (targets, rejected)
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Schedule on every requested platform (best effort, batched)
    #[instrument(skip(self, content, request), fields(content_id = %content.id))]
    pub async fn schedule_across_platforms(
        &self,
        content: &ContentItem,
        request: &ScheduleRequest,
    ) -> PlatformResult<MultiPlatformScheduleResult> {
        if request.publish_at <= Utc::now() {
            return Err(PlatformError::InvalidRequest {
                message: format!(
                    "publish time {} is not in the future",
                    request.publish_at.to_rfc3339()
                ),
            });
        }

        let requested = if request.platforms.is_empty() {
            self.registry.names().await
        } else {
            request.platforms.clone()
        };

        let options = &request.options;
        let started = Instant::now();
        let deadline = options.deadline.map(|d| started + d);
        let (targets, rejected) = self.resolve_targets(&requested, &options.platform_order).await;

        if targets.is_empty() {
            return Err(PlatformError::NoValidPlatforms { requested });
        }

        info!(platforms = targets.len(), publish_at = %request.publish_at, "scheduling content");

        let scheduler = BatchScheduler::new(options.max_concurrent, options.delay_between_batches);
        let stop_on_failure = options.stop_on_first_failure;
        let publish_at = request.publish_at;
        let this = self;

        let outcome = scheduler
            .run_until(
                targets,
                move |adapter| this.schedule_one(adapter, content, publish_at, options, deadline),
                |settled| stop_on_failure && settled.iter().any(|(_, r)| !r.success),
            )
            .await;

        let mut results: BTreeMap<String, ScheduleResult> = rejected
            .iter()
            .map(|name| {
                let e = unknown_platform(name);
                (name.clone(), ScheduleResult::failed(name, e.to_string(), e.code()))
            })
            .collect();
        for (adapter, result) in outcome.completed {
            results.insert(adapter.name().to_string(), result);
        }
        let mut skipped = Vec::new();
        for adapter in outcome.skipped {
            let name = adapter.name().to_string();
            results.insert(
                name.clone(),
                ScheduleResult::failed(&name, "skipped after an earlier batch failed", SKIPPED),
            );
            skipped.push(name);
        }

        for result in results.values() {
            self.history
                .record(HistoryEntry::from_schedule(&content.id, result))
                .await;
        }

        let errors = failure_messages(results.iter().map(|(k, r)| (k, r.success, &r.error)));
        let success_count = results.values().filter(|r| r.success).count();
        let failure_count = results.len() - success_count;

        info!(succeeded = success_count, failed = failure_count, "schedule finished");

        Ok(MultiPlatformScheduleResult {
            content_id: content.id.clone(),
            publish_at,
            results,
            errors,
            success_count,
            failure_count,
            skipped,
            success: success_count > 0,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn schedule_one(
        &self,
        adapter: Arc<dyn PlatformAdapter>,
        content: &ContentItem,
        publish_at: DateTime<Utc>,
        options: &MultiPublishOptions,
        deadline: Option<Instant>,
    ) -> ScheduleResult {
        let name = adapter.name().to_string();
        let started = Instant::now();

        if !adapter.capabilities().supports(Capability::Scheduling) {
            let e = PlatformError::NotSupported {
                platform: name.clone(),
                operation: Capability::Scheduling.operation().to_string(),
            };
            return ScheduleResult::failed(&name, e.to_string(), e.code());
        }

        let work = async {
            self.recover(adapter.as_ref()).await;
            let formatted = match adapter.format_content(content, &options.format).await {
                Ok(formatted) => formatted,
                Err(e) => return not_attempted(e),
            };
            let validation = adapter.validate_content(&formatted);
            if !validation.valid {
                return not_attempted(PlatformError::ContentValidation {
                    platform: name.clone(),
                    errors: validation.errors,
                });
            }
            self.retry
                .execute_counted(&name, || adapter.schedule(&formatted, publish_at, &options.publish))
                .await
        };

        let outcome = bounded(&name, deadline, started, work).await;
        let mut result = match outcome.result {
            Ok(mut result) => {
                result.platform = name;
                result
            }
            Err(e) => {
                warn!(platform = %name, code = e.code(), error = %e, "schedule failed");
                ScheduleResult::failed(&name, e.to_string(), e.code())
            }
        };
        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    // ------------------------------------------------------------------------
    // Bulk, unpublish, analytics, health
    // ------------------------------------------------------------------------

    /// Publish several content items to the same platforms
    pub async fn bulk_publish(
        &self,
        contents: &[ContentItem],
        platforms: &[String],
        options: &BulkPublishOptions,
    ) -> BulkPublishResult {
        BulkPublisher::new(self).publish(contents, platforms, options).await
    }

    /// Delete one earlier publish
    pub async fn unpublish(&self, platform: &str, external_id: &str) -> PlatformResult<DeleteResult> {
        let adapter = self
            .registry
            .get(platform)
            .await
            .ok_or_else(|| PlatformError::UnknownPlatform {
                platform: platform.to_string(),
            })?;

        if !adapter.capabilities().supports(Capability::Deletion) {
            return Err(PlatformError::NotSupported {
                platform: platform.to_string(),
                operation: Capability::Deletion.operation().to_string(),
            });
        }

        self.recover(adapter.as_ref()).await;
        let outcome = self.retry.execute(platform, || adapter.delete(external_id)).await;
        let recorded = match &outcome {
            Ok(result) => result.clone(),
            Err(e) => DeleteResult {
                success: false,
                platform: platform.to_string(),
                external_id: external_id.to_string(),
                error: Some(e.to_string()),
                deleted_at: Utc::now(),
            },
        };
        self.history
            .record(HistoryEntry::from_delete(HistoryOperation::Unpublish, None, &recorded))
            .await;

        if outcome.is_ok() {
            info!(platform = %platform, external_id = %external_id, "unpublished");
        }
        outcome
    }

    pub async fn get_aggregated_analytics(&self, range: &TimeRange) -> AggregatedAnalytics {
        self.analytics.get_aggregated_analytics(range).await
    }

    pub async fn get_comparative_analytics(
        &self,
        range: &TimeRange,
        metric: ComparisonMetric,
    ) -> ComparativeAnalytics {
        self.analytics.get_comparative_analytics(range, metric).await
    }

    /// Run a health check cycle now
    pub async fn check_platform_health(&self) -> PlatformHealthReport {
        self.health.check_now().await
    }
}

/// Outcome of work that failed before any platform call was made
fn not_attempted<T>(error: PlatformError) -> RetryOutcome<T> {
    RetryOutcome {
        result: Err(error),
        attempts: 0,
    }
}

/// Run `work` unless the deadline has passed, dropping it at the deadline
async fn bounded<T>(
    platform: &str,
    deadline: Option<Instant>,
    started: Instant,
    work: impl Future<Output = RetryOutcome<T>>,
) -> RetryOutcome<T> {
    let Some(deadline) = deadline else {
        return work.await;
    };

    let timed_out = || {
        warn!(platform, "deadline exceeded");
        not_attempted(PlatformError::Timeout {
            platform: platform.to_string(),
            elapsed: started.elapsed(),
        })
    };

    if Instant::now() >= deadline {
        return timed_out();
    }
    match timeout_at(deadline, work).await {
        Ok(outcome) => outcome,
        Err(_) => timed_out(),
    }
}

fn rejected_results(rejected: &[String]) -> BTreeMap<String, PublishResult> {
    rejected
        .iter()
        .map(|name| {
            let e = unknown_platform(name);
            (name.clone(), PublishResult::failed(name, e.to_string(), e.code()))
        })
        .collect()
}

fn unknown_platform(name: &str) -> PlatformError {
    PlatformError::UnknownPlatform {
        platform: name.to_string(),
    }
}

fn mark_failed(result: &mut PublishResult, message: String, code: &str) {
    result.success = false;
    result.error = Some(message);
    result.error_code = Some(code.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryAdapter;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn orchestrator_with(platforms: &[&str]) -> PublishOrchestrator {
        let orchestrator = PublishOrchestrator::new();
        for name in platforms {
            orchestrator
                .add_platform(Arc::new(MemoryAdapter::new(*name)), PlatformCredentials::bearer("tok"))
                .await
                .unwrap();
        }
        orchestrator
    }

    #[test]
    fn test_order_platforms() {
        let ordered = order_platforms(&names(&["a", "b", "c", "b"]), &names(&["c", "x", "a"]));

        assert_eq!(ordered, names(&["c", "a", "b"]));
    }

    #[test]
    fn test_options_from_config() {
        let config = OrchestratorConfig {
            max_concurrent: 0,
            deadline_secs: Some(30),
            ..Default::default()
        };

        let options = MultiPublishOptions::from(&config);

        assert_eq!(options.max_concurrent, 1);
        assert_eq!(options.deadline, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_unknown_platforms_are_rejected_up_front() {
        let orchestrator = orchestrator_with(&["a"]).await;
        let content = ContentItem::new("post-1", "Title", "Body text");

        let result = orchestrator
            .publish_to_selected(&content, &names(&["a", "ghost"]), &MultiPublishOptions::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.results["ghost"].error_code.as_deref(), Some("UNKNOWN_PLATFORM"));
        assert_eq!(result.results["ghost"].attempts, 0);
    }

    #[tokio::test]
    async fn test_no_valid_platforms() {
        let orchestrator = orchestrator_with(&["a"]).await;
        let content = ContentItem::new("post-1", "Title", "Body text");

        let error = orchestrator
            .publish_to_selected(&content, &names(&["ghost"]), &MultiPublishOptions::default())
            .await
            .unwrap_err();

        assert_eq!(error.code(), "NO_VALID_PLATFORMS");
    }

    #[tokio::test]
    async fn test_all_or_nothing_with_unknown_platform_publishes_nothing() {
        let orchestrator = orchestrator_with(&["a", "b"]).await;
        let content = ContentItem::new("post-1", "Title", "Body text");
        let options = MultiPublishOptions {
            require_all_success: true,
            ..Default::default()
        };

        let result = orchestrator
            .publish_to_selected(&content, &names(&["a", "b", "ghost"]), &options)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.success_count, 0);
        assert_eq!(result.results["a"].error_code.as_deref(), Some(NOT_ATTEMPTED));
        assert!(result.rollback.is_none());
    }

    #[tokio::test]
    async fn test_schedule_rejects_past_time() {
        let orchestrator = orchestrator_with(&["a"]).await;
        let content = ContentItem::new("post-1", "Title", "Body text");
        let request = ScheduleRequest::new(names(&["a"]), Utc::now() - chrono::Duration::minutes(1));

        let error = orchestrator
            .schedule_across_platforms(&content, &request)
            .await
            .unwrap_err();

        assert_eq!(error.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_add_replace_and_remove_platform() {
        let orchestrator = orchestrator_with(&["a"]).await;
        let first = orchestrator.registry().get("a").await.unwrap();

        orchestrator
            .add_platform(Arc::new(MemoryAdapter::new("a")), PlatformCredentials::bearer("tok"))
            .await
            .unwrap();

        assert!(!first.is_connected().await);
        assert_eq!(orchestrator.get_connected_platforms().await, names(&["a"]));
        assert!(orchestrator.remove_platform("a").await);
        assert!(!orchestrator.remove_platform("a").await);
        assert!(orchestrator.get_platforms().await.is_empty());
    }

    #[tokio::test]
    async fn test_unpublish_records_history() {
        let orchestrator = orchestrator_with(&["a"]).await;
        let content = ContentItem::new("post-1", "Title", "Body text");
        let published = orchestrator
            .publish_to_all(&content, &MultiPublishOptions::default())
            .await
            .unwrap();
        let external_id = published.results["a"].external_id.clone().unwrap();

        let deleted = orchestrator.unpublish("a", &external_id).await.unwrap();
        let missing = orchestrator.unpublish("a", &external_id).await.unwrap_err();

        assert!(deleted.success);
        assert_eq!(missing.code(), "NOT_FOUND");
        assert_eq!(orchestrator.history().len().await, 3);
    }
}
