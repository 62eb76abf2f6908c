//! Memory Adapter - In-process destination for dry runs and tests
//!
//! Stores published and scheduled posts in memory. Capabilities are
//! configurable (everything is supported by default), and failures, quota
//! and analytics can be injected to exercise the orchestrator.

use crate::adapters::base::AdapterBase;
use crate::core::capabilities::{Capability, PlatformCapabilities};
use crate::core::content::{ContentItem, FormatOptions, FormattedContent};
use crate::core::error::{PlatformError, PlatformResult};
use crate::core::state_machine::ConnectionState;
use crate::core::traits::{
    AuthenticationResult, ConnectionValidationResult, DeleteResult, HealthCheckResult,
    PlatformAdapter, PlatformAnalytics, PostMetrics, PublishOptions, PublishResult,
    QuotaStatus, RateLimitStatus, ScheduleResult, TimeRange,
};
use crate::security::credentials::{PlatformCredentials, TOKEN};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// A post held by a [`MemoryAdapter`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPost {
    pub external_id: String,
    pub content: FormattedContent,
    pub draft: bool,
    pub published_at: DateTime<Utc>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub metrics: PostMetrics,
}

/// In-memory platform adapter
pub struct MemoryAdapter {
    base: AdapterBase,
    required_token: Option<String>,
    posts: RwLock<BTreeMap<String, StoredPost>>,
    outage: RwLock<Option<String>>,
    analytics: RwLock<Option<PlatformAnalytics>>,
    initial_metrics: RwLock<PostMetrics>,
    next_id: AtomicU64,
}

impl MemoryAdapter {
    /// Adapter supporting every capability
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capabilities(name, PlatformCapabilities::full())
    }

    pub fn with_capabilities(name: impl Into<String>, capabilities: PlatformCapabilities) -> Self {
        Self {
            base: AdapterBase::new(name, capabilities),
            required_token: None,
            posts: RwLock::new(BTreeMap::new()),
            outage: RwLock::new(None),
            analytics: RwLock::new(None),
            initial_metrics: RwLock::new(PostMetrics::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Only accept credentials whose `token` equals this value
    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Make publishes and health probes fail with this message (`None` clears)
    pub async fn set_outage(&self, message: Option<String>) {
        *self.outage.write().await = message;
    }

    /// Analytics returned by `get_analytics` instead of the computed totals
    pub async fn set_analytics(&self, analytics: PlatformAnalytics) {
        *self.analytics.write().await = Some(analytics);
    }

    /// Metrics attached to subsequent publishes
    pub async fn set_initial_metrics(&self, metrics: PostMetrics) {
        *self.initial_metrics.write().await = metrics;
    }

    pub async fn set_rate_limit(&self, status: Option<RateLimitStatus>) {
        self.base.set_rate_limit(status).await;
    }

    pub async fn set_quota(&self, status: Option<QuotaStatus>) {
        self.base.set_quota(status).await;
    }

    pub async fn post(&self, external_id: &str) -> Option<StoredPost> {
        self.posts.read().await.get(external_id).cloned()
    }

    pub async fn post_count(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn state_history(&self) -> String {
        self.base.state_history().await
    }

    fn url_for(&self, external_id: &str) -> String {
        format!("memory://{}/{}", self.base.name(), external_id)
    }

    async fn check_outage(&self) -> PlatformResult<()> {
        match self.outage.read().await.as_ref() {
            Some(message) => Err(PlatformError::Publishing {
                platform: self.base.name().to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Shared preflight for writes: connection, validation, injected outage
    async fn prepare_write(&self, content: &FormattedContent, options: &PublishOptions) -> PlatformResult<()> {
        self.base.ensure_connected().await?;
        if options.draft {
            self.base.ensure_capability(Capability::Drafts)?;
        }
        self.base.ensure_valid(self.validate_content(content))?;
        self.check_outage().await
    }

    async fn store(
        &self,
        content: &FormattedContent,
        options: &PublishOptions,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> String {
        let external_id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let post = StoredPost {
            external_id: external_id.clone(),
            content: content.clone(),
            draft: options.draft,
            published_at: Utc::now(),
            scheduled_for,
            metrics: self.initial_metrics.read().await.clone(),
        };
        self.posts.write().await.insert(external_id.clone(), post);
        external_id
    }
}

#[async_trait]
impl PlatformAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn capabilities(&self) -> &PlatformCapabilities {
        self.base.capabilities()
    }

    async fn connection_state(&self) -> ConnectionState {
        self.base.state().await
    }

    async fn authenticate(&self, credentials: PlatformCredentials) -> PlatformResult<AuthenticationResult> {
        self.base.begin_authentication().await?;

        if credentials.is_expired() {
            return Err(self
                .base
                .fail_authentication(self.base.auth_error("credentials expired"))
                .await);
        }
        if let Some(required) = &self.required_token
            && credentials.expose(TOKEN) != Some(required.as_str())
        {
            return Err(self
                .base
                .fail_authentication(self.base.auth_error("invalid token"))
                .await);
        }

        self.base.complete_authentication(credentials).await?;

        Ok(AuthenticationResult {
            platform: self.base.name().to_string(),
            account_id: Some(format!("{}-account", self.base.name())),
            account_name: Some(self.base.name().to_string()),
            expires_at: None,
            authenticated_at: Utc::now(),
        })
    }

    async fn validate_connection(&self) -> PlatformResult<ConnectionValidationResult> {
        Ok(self.base.local_connection_check().await)
    }

    async fn disconnect(&self) {
        self.base.disconnect().await;
    }

    async fn format_content(
        &self,
        content: &ContentItem,
        options: &FormatOptions,
    ) -> PlatformResult<FormattedContent> {
        Ok(self.base.format(content, options))
    }

    async fn publish(
        &self,
        content: &FormattedContent,
        options: &PublishOptions,
    ) -> PlatformResult<PublishResult> {
        self.prepare_write(content, options).await?;

        let external_id = self.store(content, options, None).await;
        let mut result = PublishResult::published(self.base.name(), &external_id, Some(self.url_for(&external_id)));
        result.metrics = Some(self.initial_metrics.read().await.clone());
        Ok(result)
    }

    async fn schedule(
        &self,
        content: &FormattedContent,
        publish_at: DateTime<Utc>,
        options: &PublishOptions,
    ) -> PlatformResult<ScheduleResult> {
        self.base.ensure_capability(Capability::Scheduling)?;
        if publish_at <= Utc::now() {
            return Err(PlatformError::InvalidRequest {
                message: format!("publish time {} is in the past", publish_at.to_rfc3339()),
            });
        }
        self.prepare_write(content, options).await?;

        let external_id = self.store(content, options, Some(publish_at)).await;
        let mut result = ScheduleResult::scheduled(self.base.name(), &external_id, publish_at);
        result.url = Some(self.url_for(&external_id));
        Ok(result)
    }

    async fn update(
        &self,
        external_id: &str,
        content: &FormattedContent,
        options: &PublishOptions,
    ) -> PlatformResult<PublishResult> {
        self.base.ensure_capability(Capability::Updates)?;
        self.prepare_write(content, options).await?;

        let mut posts = self.posts.write().await;
        let post = posts
            .get_mut(external_id)
            .ok_or_else(|| PlatformError::NotFound {
                platform: self.base.name().to_string(),
                external_id: external_id.to_string(),
            })?;
        post.content = content.clone();
        post.draft = options.draft;

        Ok(PublishResult::published(
            self.base.name(),
            external_id,
            Some(self.url_for(external_id)),
        ))
    }

    async fn delete(&self, external_id: &str) -> PlatformResult<DeleteResult> {
        self.base.ensure_capability(Capability::Deletion)?;
        self.base.ensure_connected().await?;

        self.posts
            .write()
            .await
            .remove(external_id)
            .ok_or_else(|| PlatformError::NotFound {
                platform: self.base.name().to_string(),
                external_id: external_id.to_string(),
            })?;

        Ok(DeleteResult::deleted(self.base.name(), external_id))
    }

    async fn get_analytics(&self, range: &TimeRange) -> PlatformResult<PlatformAnalytics> {
        self.base.ensure_capability(Capability::Analytics)?;
        self.base.ensure_connected().await?;

        if let Some(analytics) = self.analytics.read().await.clone() {
            return Ok(analytics);
        }

        let posts = self.posts.read().await;
        let mut analytics = PlatformAnalytics {
            platform: self.base.name().to_string(),
            ..Default::default()
        };
        for post in posts.values().filter(|p| range.contains(p.published_at)) {
            analytics.views += post.metrics.views;
            analytics.engagements += post.metrics.engagements;
            analytics.shares += post.metrics.shares;
        }
        if analytics.views > 0 {
            analytics.engagement_rate = analytics.engagements as f64 / analytics.views as f64 * 100.0;
        }
        Ok(analytics)
    }

    async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let probe = self
            .check_outage()
            .await
            .map(|_| started.elapsed().max(Duration::from_millis(1)));
        self.base.evaluate_health(probe).await
    }

    async fn get_rate_limit(&self) -> PlatformResult<Option<RateLimitStatus>> {
        Ok(self.base.rate_limit().await)
    }

    async fn get_quota(&self) -> PlatformResult<Option<QuotaStatus>> {
        Ok(self.base.quota().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::HealthStatus;

    async fn connected(adapter: MemoryAdapter) -> MemoryAdapter {
        adapter
            .authenticate(PlatformCredentials::bearer("tok"))
            .await
            .unwrap();
        adapter
    }

    async fn formatted(adapter: &MemoryAdapter) -> FormattedContent {
        let mut item = ContentItem::new("post-1", "Release notes", "<p>Version 2 is out.</p>");
        item.excerpt = Some("Version 2".to_string());
        adapter
            .format_content(&item, &FormatOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let adapter = MemoryAdapter::new("mem");
        let content = formatted(&adapter).await;

        let error = adapter
            .publish(&content, &PublishOptions::default())
            .await
            .unwrap_err();

        assert_eq!(error.code(), "NOT_CONNECTED");
    }

    #[tokio::test]
    async fn test_publish_update_delete() {
        let adapter = connected(MemoryAdapter::new("mem")).await;
        let content = formatted(&adapter).await;

        let published = adapter
            .publish(&content, &PublishOptions::default())
            .await
            .unwrap();
        let id = published.external_id.clone().unwrap();
        assert!(published.success);
        assert_eq!(published.url.as_deref(), Some("memory://mem/mem-1"));

        let mut changed = content.clone();
        changed.title = "Release notes (updated)".to_string();
        adapter
            .update(&id, &changed, &PublishOptions::default())
            .await
            .unwrap();
        assert_eq!(adapter.post(&id).await.unwrap().content.title, "Release notes (updated)");

        adapter.delete(&id).await.unwrap();
        assert_eq!(adapter.post_count().await, 0);
        assert_eq!(adapter.delete(&id).await.unwrap_err().code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_content_fails_validation() {
        let adapter = connected(MemoryAdapter::new("mem")).await;
        let mut content = formatted(&adapter).await;
        content.title = String::new();

        let error = adapter
            .publish(&content, &PublishOptions::default())
            .await
            .unwrap_err();

        assert_eq!(error.code(), "CONTENT_VALIDATION_FAILED");
        assert_eq!(adapter.post_count().await, 0);
    }

    #[tokio::test]
    async fn test_capability_gating() {
        let adapter = connected(MemoryAdapter::with_capabilities(
            "limited",
            PlatformCapabilities::default(),
        ))
        .await;
        let content = formatted(&adapter).await;
        let at = Utc::now() + chrono::Duration::hours(1);

        let schedule = adapter.schedule(&content, at, &PublishOptions::default()).await;
        let delete = adapter.delete("mem-1").await;

        assert_eq!(schedule.unwrap_err().code(), "NOT_SUPPORTED");
        assert_eq!(delete.unwrap_err().code(), "NOT_SUPPORTED");
    }

    #[tokio::test]
    async fn test_required_token() {
        let adapter = MemoryAdapter::new("mem").with_required_token("secret-token");

        let error = adapter
            .authenticate(PlatformCredentials::bearer("wrong"))
            .await
            .unwrap_err();
        assert_eq!(error.code(), "AUTHENTICATION_FAILED");
        assert_eq!(adapter.connection_state().await, ConnectionState::Disconnected);

        adapter
            .authenticate(PlatformCredentials::bearer("secret-token"))
            .await
            .unwrap();
        assert!(adapter.is_connected().await);
    }

    #[tokio::test]
    async fn test_outage_fails_publish_and_health() {
        let adapter = connected(MemoryAdapter::new("mem")).await;
        let content = formatted(&adapter).await;
        adapter.set_outage(Some("maintenance".to_string())).await;

        let error = adapter
            .publish(&content, &PublishOptions::default())
            .await
            .unwrap_err();
        let health = adapter.health_check().await;

        assert!(error.is_retryable());
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(adapter.connection_state().await, ConnectionState::Unhealthy);
    }

    #[tokio::test]
    async fn test_computed_analytics() {
        let adapter = connected(MemoryAdapter::new("mem")).await;
        adapter
            .set_initial_metrics(PostMetrics {
                views: 200,
                engagements: 10,
                shares: 2,
            })
            .await;
        let content = formatted(&adapter).await;
        adapter.publish(&content, &PublishOptions::default()).await.unwrap();

        let analytics = adapter.get_analytics(&TimeRange::last_days(1)).await.unwrap();

        assert_eq!(analytics.views, 200);
        assert_eq!(analytics.shares, 2);
        assert!((analytics.engagement_rate - 5.0).abs() < 1e-9);
    }
}
