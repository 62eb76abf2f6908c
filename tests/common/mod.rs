//! Shared fixtures for the orchestrator integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use platform_publisher::adapters::MemoryAdapter;
use platform_publisher::core::{
    AuthenticationResult, ConnectionState, ConnectionValidationResult, ContentItem, DeleteResult,
    FormatOptions, FormattedContent, HealthCheckResult, PlatformAdapter, PlatformAnalytics,
    PlatformCapabilities, PlatformError, PlatformResult, PublishOptions, PublishResult,
    QuotaStatus, RateLimitStatus, RetryExecutor, RetryOptions, ScheduleResult, TimeRange,
    ValidationResult,
};
use platform_publisher::orchestration::PublishOrchestrator;
use platform_publisher::security::PlatformCredentials;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-flight counter shared by several adapters
#[derive(Debug, Default)]
pub struct Concurrency {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a Concurrency);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a Concurrency) -> Self {
        let now = counter.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counter.peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Memory adapter wrapper with injectable latency and failures
pub struct ProbeAdapter {
    inner: MemoryAdapter,
    concurrency: Arc<Concurrency>,
    delay: Duration,
    scripted: Mutex<VecDeque<PlatformError>>,
    always: Option<PlatformError>,
    strip_ids: bool,
    publish_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl ProbeAdapter {
    pub fn new(name: &str) -> Self {
        Self::with_capabilities(name, PlatformCapabilities::full())
    }

    pub fn with_capabilities(name: &str, capabilities: PlatformCapabilities) -> Self {
        Self {
            inner: MemoryAdapter::with_capabilities(name, capabilities),
            concurrency: Arc::new(Concurrency::default()),
            delay: Duration::ZERO,
            scripted: Mutex::new(VecDeque::new()),
            always: None,
            strip_ids: false,
            publish_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn sharing(mut self, concurrency: &Arc<Concurrency>) -> Self {
        self.concurrency = Arc::clone(concurrency);
        self
    }

    /// Fail every publish with this error
    pub fn failing(mut self, error: PlatformError) -> Self {
        self.always = Some(error);
        self
    }

    /// Fail the next publishes with these errors, in order
    pub fn failing_first(self, errors: Vec<PlatformError>) -> Self {
        self.scripted.lock().unwrap().extend(errors);
        self
    }

    /// Report successful publishes without an external id
    pub fn without_ids(mut self) -> Self {
        self.strip_ids = true;
        self
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn memory(&self) -> &MemoryAdapter {
        &self.inner
    }

    fn injected_failure(&self) -> Option<PlatformError> {
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.always.clone())
    }
}

#[async_trait]
impl PlatformAdapter for ProbeAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> &PlatformCapabilities {
        self.inner.capabilities()
    }

    async fn connection_state(&self) -> ConnectionState {
        self.inner.connection_state().await
    }

    async fn authenticate(&self, credentials: PlatformCredentials) -> PlatformResult<AuthenticationResult> {
        self.inner.authenticate(credentials).await
    }

    async fn validate_connection(&self) -> PlatformResult<ConnectionValidationResult> {
        self.inner.validate_connection().await
    }

    async fn disconnect(&self) {
        self.inner.disconnect().await
    }

    async fn format_content(
        &self,
        content: &ContentItem,
        options: &FormatOptions,
    ) -> PlatformResult<FormattedContent> {
        self.inner.format_content(content, options).await
    }

    fn validate_content(&self, content: &FormattedContent) -> ValidationResult {
        self.inner.validate_content(content)
    }

    async fn publish(
        &self,
        content: &FormattedContent,
        options: &PublishOptions,
    ) -> PlatformResult<PublishResult> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.concurrency);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.injected_failure() {
            return Err(error);
        }
        let mut result = self.inner.publish(content, options).await?;
        if self.strip_ids {
            result.external_id = None;
        }
        Ok(result)
    }

    async fn schedule(
        &self,
        content: &FormattedContent,
        publish_at: DateTime<Utc>,
        options: &PublishOptions,
    ) -> PlatformResult<ScheduleResult> {
        self.inner.schedule(content, publish_at, options).await
    }

    async fn update(
        &self,
        external_id: &str,
        content: &FormattedContent,
        options: &PublishOptions,
    ) -> PlatformResult<PublishResult> {
        self.inner.update(external_id, content, options).await
    }

    async fn delete(&self, external_id: &str) -> PlatformResult<DeleteResult> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(external_id).await
    }

    async fn get_analytics(&self, range: &TimeRange) -> PlatformResult<PlatformAnalytics> {
        self.inner.get_analytics(range).await
    }

    async fn health_check(&self) -> HealthCheckResult {
        self.inner.health_check().await
    }

    async fn get_rate_limit(&self) -> PlatformResult<Option<RateLimitStatus>> {
        self.inner.get_rate_limit().await
    }

    async fn get_quota(&self) -> PlatformResult<Option<QuotaStatus>> {
        self.inner.get_quota().await
    }
}

pub fn fast_retry() -> RetryExecutor {
    RetryExecutor::new(RetryOptions {
        max_retries: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        rate_limit_fallback: Duration::from_millis(5),
    })
}

/// Orchestrator with fast retries and every adapter authenticated
pub async fn orchestrator(adapters: &[Arc<ProbeAdapter>]) -> PublishOrchestrator {
    let orchestrator = PublishOrchestrator::new().with_retry(fast_retry());
    for adapter in adapters {
        let dyn_adapter: Arc<dyn PlatformAdapter> = adapter.clone();
        orchestrator
            .add_platform(dyn_adapter, PlatformCredentials::bearer("tok"))
            .await
            .unwrap();
    }
    orchestrator
}

pub fn content(id: &str) -> ContentItem {
    let mut item = ContentItem::new(id, format!("Release {}", id), "<p>Version 2 is out.</p>");
    item.excerpt = Some("Version 2".to_string());
    item
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn revoked(platform: &str) -> PlatformError {
    PlatformError::Authentication {
        platform: platform.to_string(),
        message: "token revoked".to_string(),
    }
}

pub fn server_error(platform: &str) -> PlatformError {
    PlatformError::Publishing {
        platform: platform.to_string(),
        message: "HTTP 502".to_string(),
    }
}

pub fn network(platform: &str) -> PlatformError {
    PlatformError::Network {
        platform: platform.to_string(),
        message: "connection reset".to_string(),
    }
}
