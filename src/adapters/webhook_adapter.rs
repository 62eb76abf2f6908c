//! Webhook Adapter - Generic JSON-over-HTTP destination
//!
//! Posts formatted content as JSON to a configured endpoint. Updates and
//! deletions address `{endpoint}/{id}` and are only attempted when enabled in
//! the platform options. Authentication is a bearer token or an API key.

use crate::adapters::base::AdapterBase;
use crate::adapters::http::{HttpTransport, json_id};
use crate::core::capabilities::{BodyFormat, Capability, MediaType, PlatformCapabilities};
use crate::core::config::PlatformConfig;
use crate::core::content::{ContentItem, FormatOptions, FormattedContent};
use crate::core::error::{ConfigError, PlatformError, PlatformResult};
use crate::core::state_machine::ConnectionState;
use crate::core::traits::{
    AuthenticationResult, ConnectionValidationResult, DeleteResult, HealthCheckResult,
    PlatformAdapter, PlatformAnalytics, PublishOptions, PublishResult, QuotaStatus,
    RateLimitStatus, ScheduleResult, TimeRange,
};
use crate::security::credentials::{API_KEY, PlatformCredentials, TOKEN};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::debug;

/// Generic webhook adapter
pub struct WebhookAdapter {
    base: AdapterBase,
    transport: HttpTransport,
    endpoint: String,
    health_url: Option<String>,
}

impl WebhookAdapter {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        capabilities: PlatformCapabilities,
    ) -> PlatformResult<Self> {
        let name = name.into();
        Ok(Self {
            transport: HttpTransport::new(name.clone())?,
            base: AdapterBase::new(name, capabilities),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            health_url: None,
        })
    }

    /// URL probed by `authenticate` and `health_check`
    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }

    /// Build from configuration
    ///
    /// Options: `supportsScheduling`, `supportsUpdates`, `supportsDeletion`
    /// (booleans, default false) and `healthUrl`.
    pub fn from_config(name: &str, config: &PlatformConfig) -> Result<Self, ConfigError> {
        let endpoint = config
            .endpoint
            .clone()
            .or_else(|| config.base_url.clone())
            .ok_or_else(|| ConfigError::MissingSetting {
                platform: name.to_string(),
                field: "endpoint".to_string(),
            })?;

        let mut capabilities = Self::default_capabilities();
        capabilities.supports_scheduling = config.option_bool("supportsScheduling").unwrap_or(false);
        capabilities.supports_updates = config.option_bool("supportsUpdates").unwrap_or(false);
        capabilities.supports_deletion = config.option_bool("supportsDeletion").unwrap_or(false);
        if let Some(overrides) = &config.capabilities {
            overrides.apply(&mut capabilities);
        }

        let adapter = Self::new(name, endpoint, capabilities).map_err(|e| ConfigError::InvalidSetting {
            platform: name.to_string(),
            field: "endpoint".to_string(),
            message: e.to_string(),
        })?;

        Ok(match config.option_str("healthUrl") {
            Some(url) => adapter.with_health_url(url),
            None => adapter,
        })
    }

    pub fn default_capabilities() -> PlatformCapabilities {
        PlatformCapabilities {
            supported_media_types: vec![
                MediaType::Image,
                MediaType::Video,
                MediaType::Audio,
                MediaType::Document,
            ],
            supported_formats: vec![BodyFormat::Html, BodyFormat::Markdown, BodyFormat::Plain],
            supports_drafts: true,
            supports_tags: true,
            supports_categories: true,
            ..PlatformCapabilities::default()
        }
    }

    fn authorize(&self, request: RequestBuilder, credentials: &PlatformCredentials) -> RequestBuilder {
        match (credentials.expose(TOKEN), credentials.expose(API_KEY)) {
            (Some(token), _) => request.bearer_auth(token),
            (None, Some(key)) => request.header("X-API-Key", key),
            (None, None) => request,
        }
    }

    fn item_url(&self, external_id: &str) -> String {
        format!("{}/{}", self.endpoint, external_id)
    }

    async fn send(&self, request: RequestBuilder) -> PlatformResult<Value> {
        let credentials = self.base.credentials().await?;
        self.transport
            .send_json(&self.base, self.authorize(request, &credentials))
            .await
    }

    async fn preflight(&self, content: &FormattedContent, options: &PublishOptions) -> PlatformResult<()> {
        self.base.ensure_connected().await?;
        if options.draft {
            self.base.ensure_capability(Capability::Drafts)?;
        }
        self.base.ensure_valid(self.validate_content(content))
    }

    fn publish_result(&self, response: &Value) -> PublishResult {
        let external_id = extract_id(response).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let url = response
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string);
        PublishResult::published(self.base.name(), external_id, url)
    }
}

/// JSON document sent to the webhook
pub fn build_payload(
    content: &FormattedContent,
    options: &PublishOptions,
    publish_at: Option<DateTime<Utc>>,
) -> Value {
    let mut payload = json!({
        "sourceId": content.source_id,
        "title": content.title,
        "body": content.body,
        "format": content.body_format,
        "excerpt": content.excerpt,
        "slug": content.metadata.slug,
        "tags": content.metadata.tags,
        "categories": content.metadata.categories,
        "canonicalUrl": content.metadata.canonical_url,
        "media": content.media,
        "draft": options.draft,
    });

    if let Some(at) = publish_at {
        payload["publishAt"] = json!(at.to_rfc3339());
    }
    if let Value::Object(map) = &mut payload {
        for (key, value) in &options.extra {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    payload
}

fn extract_id(response: &Value) -> Option<String> {
    response
        .get("id")
        .or_else(|| response.get("externalId"))
        .and_then(json_id)
}

#[async_trait]
impl PlatformAdapter for WebhookAdapter {
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

        if credentials.expose(TOKEN).is_none() && credentials.expose(API_KEY).is_none() {
            return Err(self
                .base
                .fail_authentication(self.base.auth_error("token or api_key is required"))
                .await);
        }

        if let Some(health_url) = &self.health_url {
            let request = self.authorize(self.transport.client().get(health_url), &credentials);
            if let Err(error) = self.transport.send_json(&self.base, request).await {
                return Err(self.base.fail_authentication(error).await);
            }
        }

        self.base.complete_authentication(credentials).await?;

        Ok(AuthenticationResult {
            platform: self.base.name().to_string(),
            account_id: None,
            account_name: None,
            expires_at: None,
            authenticated_at: Utc::now(),
        })
    }

    async fn validate_connection(&self) -> PlatformResult<ConnectionValidationResult> {
        let local = self.base.local_connection_check().await;
        if !local.valid {
            return Ok(local);
        }

        let Some(health_url) = &self.health_url else {
            return Ok(local);
        };
        let outcome = self.send(self.transport.client().get(health_url)).await;
        Ok(ConnectionValidationResult {
            valid: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
            checked_at: Utc::now(),
        })
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
        self.preflight(content, options).await?;

        let payload = build_payload(content, options, None);
        let response = self
            .send(self.transport.client().post(&self.endpoint).json(&payload))
            .await?;

        let result = self.publish_result(&response);
        debug!(platform = %self.base.name(), external_id = ?result.external_id, "webhook accepted post");
        Ok(result)
    }

    async fn schedule(
        &self,
        content: &FormattedContent,
        publish_at: DateTime<Utc>,
        options: &PublishOptions,
    ) -> PlatformResult<ScheduleResult> {
        self.base.ensure_capability(Capability::Scheduling)?;
        self.preflight(content, options).await?;

        let payload = build_payload(content, options, Some(publish_at));
        let response = self
            .send(self.transport.client().post(&self.endpoint).json(&payload))
            .await?;

        let published = self.publish_result(&response);
        let mut result = ScheduleResult::scheduled(
            self.base.name(),
            published.external_id.unwrap_or_default(),
            publish_at,
        );
        result.url = published.url;
        Ok(result)
    }

    async fn update(
        &self,
        external_id: &str,
        content: &FormattedContent,
        options: &PublishOptions,
    ) -> PlatformResult<PublishResult> {
        self.base.ensure_capability(Capability::Updates)?;
        self.preflight(content, options).await?;

        let payload = build_payload(content, options, None);
        let response = self
            .send(self.transport.client().put(self.item_url(external_id)).json(&payload))
            .await?;

        let url = response.get("url").and_then(Value::as_str).map(str::to_string);
        Ok(PublishResult::published(self.base.name(), external_id, url))
    }

    async fn delete(&self, external_id: &str) -> PlatformResult<DeleteResult> {
        self.base.ensure_capability(Capability::Deletion)?;
        self.base.ensure_connected().await?;

        self.send(self.transport.client().delete(self.item_url(external_id)))
            .await?;

        Ok(DeleteResult::deleted(self.base.name(), external_id))
    }

    async fn get_analytics(&self, _range: &TimeRange) -> PlatformResult<PlatformAnalytics> {
        // Webhooks have no read-back channel
        Err(PlatformError::NotSupported {
            platform: self.base.name().to_string(),
            operation: Capability::Analytics.operation().to_string(),
        })
    }

    async fn health_check(&self) -> HealthCheckResult {
        let probe = match &self.health_url {
            Some(url) => {
                let started = Instant::now();
                self.send(self.transport.client().get(url))
                    .await
                    .map(|_| started.elapsed())
            }
            None => Ok(Duration::ZERO),
        };
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
    use crate::core::content::format_for_platform;

    fn formatted() -> FormattedContent {
        let mut item = ContentItem::new("post-7", "Launch day", "<p>We shipped.</p>");
        item.metadata.tags = vec!["release".to_string()];
        format_for_platform(
            &item,
            "hook",
            &WebhookAdapter::default_capabilities(),
            &FormatOptions::default(),
        )
    }

    #[test]
    fn test_build_payload() {
        let mut options = PublishOptions::default();
        options.extra.insert("channel".to_string(), json!("news"));
        options.extra.insert("title".to_string(), json!("ignored"));
        let at = Utc::now() + chrono::Duration::hours(2);

        let payload = build_payload(&formatted(), &options, Some(at));

        assert_eq!(payload["sourceId"], "post-7");
        assert_eq!(payload["title"], "Launch day");
        assert_eq!(payload["format"], "html");
        assert_eq!(payload["tags"], json!(["release"]));
        assert_eq!(payload["channel"], "news");
        assert_eq!(payload["draft"], false);
        assert_eq!(payload["publishAt"], json!(at.to_rfc3339()));
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id(&json!({"id": 17})), Some("17".to_string()));
        assert_eq!(extract_id(&json!({"externalId": "abc"})), Some("abc".to_string()));
        assert_eq!(extract_id(&Value::Null), None);
    }

    #[test]
    fn test_from_config() {
        let mut config = PlatformConfig::new("webhook");
        config.endpoint = Some("https://hooks.example.com/posts/".to_string());
        config.options.insert("supportsDeletion".to_string(), json!(true));

        let adapter = WebhookAdapter::from_config("hook", &config).unwrap();

        assert_eq!(adapter.endpoint, "https://hooks.example.com/posts");
        assert_eq!(adapter.item_url("9"), "https://hooks.example.com/posts/9");
        assert!(adapter.capabilities().supports_deletion);
        assert!(!adapter.capabilities().supports_scheduling);
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        let config = PlatformConfig::new("webhook");

        let result = WebhookAdapter::from_config("hook", &config);

        assert!(matches!(result, Err(ConfigError::MissingSetting { .. })));
    }

    #[tokio::test]
    async fn test_authenticate_requires_token_or_key() {
        let adapter = WebhookAdapter::new(
            "hook",
            "https://hooks.example.com/posts",
            WebhookAdapter::default_capabilities(),
        )
        .unwrap();

        let error = adapter
            .authenticate(PlatformCredentials::basic("user", "pass"))
            .await
            .unwrap_err();
        assert_eq!(error.code(), "AUTHENTICATION_FAILED");

        adapter
            .authenticate(PlatformCredentials::api_key("key_123"))
            .await
            .unwrap();
        assert!(adapter.is_connected().await);
    }

    #[tokio::test]
    async fn test_delete_is_gated_before_any_request() {
        let adapter = WebhookAdapter::new(
            "hook",
            "http://127.0.0.1:9/posts",
            WebhookAdapter::default_capabilities(),
        )
        .unwrap();
        adapter
            .authenticate(PlatformCredentials::bearer("tok"))
            .await
            .unwrap();

        let error = adapter.delete("1").await.unwrap_err();

        assert_eq!(error.code(), "NOT_SUPPORTED");
    }
}
