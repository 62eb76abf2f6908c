//! Health Monitor - Periodic fleet health checks
//!
//! Polls every registered adapter on a fixed interval (and on demand),
//! folds the results together with cached rate-limit and quota state into a
//! [`PlatformHealthReport`], and keeps the latest report.

use crate::adapters::base::QUOTA_WARNING_RATIO;
use crate::adapters::registry::AdapterRegistry;
use crate::core::config::HealthConfig;
use crate::core::traits::{HealthCheckResult, HealthStatus, PlatformAdapter};
use crate::orchestration::history::{HistoryFilter, HistoryStatistics, PublishHistory};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Monitor timing
#[derive(Debug, Clone)]
pub struct HealthMonitorOptions {
    /// Time between polls (default: 5 minutes)
    pub interval: Duration,
    /// Per-adapter check timeout (default: 30 seconds)
    pub check_timeout: Duration,
}

impl Default for HealthMonitorOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            check_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&HealthConfig> for HealthMonitorOptions {
    fn from(config: &HealthConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs.max(1)),
            check_timeout: Duration::from_secs(config.check_timeout_secs.max(1)),
        }
    }
}

/// Fleet-wide verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    Error,
    Critical,
}

/// What an issue is about; drives the recommendation text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    Unhealthy,
    Degraded,
    RateLimit,
    Quota,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthIssue {
    pub platform: String,
    pub severity: IssueSeverity,
    pub kind: IssueKind,
    pub message: String,
}

/// Result of one polling cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformHealthReport {
    pub overall: OverallHealth,
    pub platforms: BTreeMap<String, HealthCheckResult>,
    pub issues: Vec<HealthIssue>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl PlatformHealthReport {
    pub fn issues_for(&self, platform: &str) -> impl Iterator<Item = &HealthIssue> {
        self.issues.iter().filter(move |i| i.platform == platform)
    }
}

/// Periodic health checker over a shared registry
pub struct HealthMonitor {
    registry: Arc<AdapterRegistry>,
    options: HealthMonitorOptions,
    latest: Arc<RwLock<Option<PlatformHealthReport>>>,
    history: Option<Arc<PublishHistory>>,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<AdapterRegistry>, options: HealthMonitorOptions) -> Self {
        Self {
            registry,
            options,
            latest: Arc::new(RwLock::new(None)),
            history: None,
            running: Mutex::new(None),
        }
    }

    /// Expose publish history trends alongside health reports
    pub fn with_history(mut self, history: Arc<PublishHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn options(&self) -> &HealthMonitorOptions {
        &self.options
    }

    /// Start polling; a no-op when already running
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let registry = Arc::clone(&self.registry);
        let latest = Arc::clone(&self.latest);
        let options = self.options.clone();
        let cancelled = token.clone();

        info!(interval_secs = options.interval.as_secs(), "starting health monitor");

        let handle = tokio::spawn(async move {
            let mut ticker = interval(options.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = run_checks(&registry, options.check_timeout).await;
                        *latest.write().await = Some(report);
                    }
                }
            }
            debug!("health monitor stopped");
        });

        *running = Some((token, handle));
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(&self) {
        let Some((token, handle)) = self.running.lock().await.take() else {
            return;
        };
        token.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "health monitor task ended abnormally");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Run one polling cycle now and store its report
    pub async fn check_now(&self) -> PlatformHealthReport {
        let report = run_checks(&self.registry, self.options.check_timeout).await;
        *self.latest.write().await = Some(report.clone());
        report
    }

    pub async fn latest_report(&self) -> Option<PlatformHealthReport> {
        self.latest.read().await.clone()
    }

    /// Publish statistics over the rolling history, when one is attached
    pub async fn history_statistics(&self, filter: &HistoryFilter) -> Option<HistoryStatistics> {
        match &self.history {
            Some(history) => Some(history.statistics(filter).await),
            None => None,
        }
    }
}

/// Check every registered adapter concurrently
pub async fn run_checks(registry: &AdapterRegistry, check_timeout: Duration) -> PlatformHealthReport {
    let adapters = registry.snapshot().await;
    let checks = adapters
        .iter()
        .map(|adapter| check_adapter(Arc::clone(adapter), check_timeout));
    let findings = join_all(checks).await;

    let mut platforms = BTreeMap::new();
    let mut issues = Vec::new();
    for (name, result, mut platform_issues) in findings {
        issues.append(&mut platform_issues);
        platforms.insert(name, result);
    }

    let report = build_report(platforms, issues);
    match report.overall {
        OverallHealth::Healthy => debug!(platforms = report.platforms.len(), "all platforms healthy"),
        OverallHealth::Degraded => warn!(issues = report.issues.len(), "platform health degraded"),
        OverallHealth::Critical => error!(issues = report.issues.len(), "platform health critical"),
    }
    report
}

async fn check_adapter(
    adapter: Arc<dyn PlatformAdapter>,
    check_timeout: Duration,
) -> (String, HealthCheckResult, Vec<HealthIssue>) {
    let name = adapter.name().to_string();

    let result = match timeout(check_timeout, adapter.health_check()).await {
        Ok(result) => result,
        Err(_) => {
            error!(platform = %name, timeout_secs = check_timeout.as_secs(), "health check timed out");
            HealthCheckResult::from_findings(
                check_timeout.as_millis() as u64,
                vec![format!("health check timed out after {}s", check_timeout.as_secs())],
                Vec::new(),
            )
        }
    };

    let mut issues = health_issues(&name, &result);

    if let Ok(Some(rate)) = adapter.get_rate_limit().await
        && rate.is_exhausted()
    {
        let reset = rate
            .reset_at
            .map(|at| format!(" until {}", at.to_rfc3339()))
            .unwrap_or_default();
        issues.push(HealthIssue {
            platform: name.clone(),
            severity: IssueSeverity::Error,
            kind: IssueKind::RateLimit,
            message: format!("rate limit exhausted ({} requests){}", rate.limit, reset),
        });
    }

    if let Ok(Some(quota)) = adapter.get_quota().await {
        if quota.remaining() == 0 {
            issues.push(HealthIssue {
                platform: name.clone(),
                severity: IssueSeverity::Error,
                kind: IssueKind::Quota,
                message: format!("quota exhausted ({}/{})", quota.used, quota.limit),
            });
        } else if quota.usage_ratio() > QUOTA_WARNING_RATIO {
            issues.push(HealthIssue {
                platform: name.clone(),
                severity: IssueSeverity::Warning,
                kind: IssueKind::Quota,
                message: format!("quota {:.0}% used", quota.usage_ratio() * 100.0),
            });
        }
    }

    (name, result, issues)
}

fn health_issues(platform: &str, result: &HealthCheckResult) -> Vec<HealthIssue> {
    let issue = |severity, kind, message: &str| HealthIssue {
        platform: platform.to_string(),
        severity,
        kind,
        message: message.to_string(),
    };

    match result.status {
        HealthStatus::Unhealthy if result.errors.is_empty() => {
            vec![issue(IssueSeverity::Critical, IssueKind::Unhealthy, "platform unhealthy")]
        }
        HealthStatus::Unhealthy => result
            .errors
            .iter()
            .map(|e| issue(IssueSeverity::Critical, IssueKind::Unhealthy, e))
            .collect(),
        HealthStatus::Degraded => result
            .warnings
            .iter()
            .map(|w| issue(IssueSeverity::Warning, IssueKind::Degraded, w))
            .collect(),
        HealthStatus::Healthy => Vec::new(),
    }
}

/// Fold per-platform results and issues into a report
pub fn build_report(
    platforms: BTreeMap<String, HealthCheckResult>,
    issues: Vec<HealthIssue>,
) -> PlatformHealthReport {
    let any_unhealthy = platforms.values().any(|r| r.status == HealthStatus::Unhealthy);
    let any_degraded = platforms.values().any(|r| r.status == HealthStatus::Degraded)
        || !issues.is_empty();

    let overall = if any_unhealthy {
        OverallHealth::Critical
    } else if any_degraded {
        OverallHealth::Degraded
    } else {
        OverallHealth::Healthy
    };

    let mut recommendations: Vec<String> = Vec::new();
    for issue in issues.iter().filter(|i| i.severity >= IssueSeverity::Error) {
        let recommendation = recommendation_for(issue);
        if !recommendations.contains(&recommendation) {
            recommendations.push(recommendation);
        }
    }

    PlatformHealthReport {
        overall,
        platforms,
        issues,
        recommendations,
        generated_at: Utc::now(),
    }
}

fn recommendation_for(issue: &HealthIssue) -> String {
    let message = issue.message.to_lowercase();
    match issue.kind {
        IssueKind::RateLimit => format!("Wait for the rate limit reset on {}", issue.platform),
        IssueKind::Quota => format!(
            "Wait for the quota reset on {} or raise the plan limit",
            issue.platform
        ),
        IssueKind::Unhealthy
            if message.contains("authentic")
                || message.contains("credential")
                || message.contains("connection is") =>
        {
            format!("Check credentials for {} and re-authenticate", issue.platform)
        }
        IssueKind::Unhealthy | IssueKind::Degraded => {
            format!("Verify connectivity to {}", issue.platform)
        }
    }
}
