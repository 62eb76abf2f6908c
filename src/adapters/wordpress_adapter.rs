//! WordPress Adapter - WordPress REST API v2 publishing implementation
//!
//! Authenticates with an application password (HTTP basic auth) and talks to
//! `{baseUrl}/wp-json/wp/v2`. Tags and categories are resolved to term ids,
//! creating missing terms on the fly.

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
use crate::security::credentials::{PASSWORD, PlatformCredentials, USERNAME};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

const API_PATH: &str = "/wp-json/wp/v2";

/// Term taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Taxonomy {
    Tags,
    Categories,
}

impl Taxonomy {
    fn path(&self) -> &'static str {
        match self {
            Taxonomy::Tags => "tags",
            Taxonomy::Categories => "categories",
        }
    }
}

/// WordPress REST API adapter
pub struct WordPressAdapter {
    base: AdapterBase,
    transport: HttpTransport,
    api_root: String,
    term_cache: RwLock<HashMap<(Taxonomy, String), u64>>,
}

impl WordPressAdapter {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        capabilities: PlatformCapabilities,
    ) -> PlatformResult<Self> {
        let name = name.into();
        Ok(Self {
            transport: HttpTransport::new(name.clone())?,
            base: AdapterBase::new(name, capabilities),
            api_root: api_root(base_url),
            term_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_config(name: &str, config: &PlatformConfig) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSetting {
                platform: name.to_string(),
                field: "baseUrl".to_string(),
            })?;

        let mut capabilities = Self::default_capabilities();
        if let Some(overrides) = &config.capabilities {
            overrides.apply(&mut capabilities);
        }

        Self::new(name, base_url, capabilities).map_err(|e| ConfigError::InvalidSetting {
            platform: name.to_string(),
            field: "baseUrl".to_string(),
            message: e.to_string(),
        })
    }

    pub fn default_capabilities() -> PlatformCapabilities {
        PlatformCapabilities {
            max_content_length: 500_000,
            max_title_length: 200,
            max_description_length: 300,
            max_tags: None,
            max_media_items: None,
            supported_media_types: vec![
                MediaType::Image,
                MediaType::Video,
                MediaType::Audio,
                MediaType::Document,
            ],
            supported_formats: vec![BodyFormat::Html],
            supports_scheduling: true,
            supports_drafts: true,
            supports_updates: true,
            supports_deletion: true,
            supports_analytics: false,
            supports_categories: true,
            supports_tags: true,
            supports_bulk_operations: false,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path.trim_start_matches('/'))
    }

    fn authorize(request: RequestBuilder, credentials: &PlatformCredentials) -> RequestBuilder {
        request.basic_auth(
            credentials.expose(USERNAME).unwrap_or_default(),
            credentials.expose(PASSWORD),
        )
    }

    async fn send(&self, request: RequestBuilder) -> PlatformResult<Value> {
        let credentials = self.base.credentials().await?;
        self.transport
            .send_json(&self.base, Self::authorize(request, &credentials))
            .await
    }

    /// Resolve term names to ids, creating terms that do not exist yet
    async fn resolve_terms(&self, taxonomy: Taxonomy, names: &[String]) -> PlatformResult<Vec<u64>> {
        let mut ids = Vec::with_capacity(names.len());

        for name in names {
            let key = (taxonomy, name.to_lowercase());
            if let Some(id) = self.term_cache.read().await.get(&key) {
                ids.push(*id);
                continue;
            }

            let found = self
                .send(
                    self.transport
                        .client()
                        .get(self.url(taxonomy.path()))
                        .query(&[("search", name.as_str()), ("per_page", "100")]),
                )
                .await?;
            let id = match find_term(&found, name) {
                Some(id) => id,
                None => {
                    let created = self
                        .send(
                            self.transport
                                .client()
                                .post(self.url(taxonomy.path()))
                                .json(&json!({ "name": name })),
                        )
                        .await?;
                    debug!(platform = %self.base.name(), taxonomy = taxonomy.path(), term = %name, "created term");
                    created
                        .get("id")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| PlatformError::Publishing {
                            platform: self.base.name().to_string(),
                            message: format!("term '{}' was created without an id", name),
                        })?
                }
            };

            self.term_cache.write().await.insert(key, id);
            ids.push(id);
        }

        Ok(ids)
    }

    async fn write_post(
        &self,
        external_id: Option<&str>,
        content: &FormattedContent,
        options: &PublishOptions,
        publish_at: Option<DateTime<Utc>>,
    ) -> PlatformResult<Value> {
        self.base.ensure_connected().await?;
        if options.draft {
            self.base.ensure_capability(Capability::Drafts)?;
        }
        self.base.ensure_valid(self.validate_content(content))?;

        let tags = self.resolve_terms(Taxonomy::Tags, &content.metadata.tags).await?;
        let categories = self
            .resolve_terms(Taxonomy::Categories, &content.metadata.categories)
            .await?;
        let payload = build_post_payload(content, options, publish_at, &tags, &categories);

        let path = match external_id {
            Some(id) => format!("posts/{}", id),
            None => "posts".to_string(),
        };
        self.send(self.transport.client().post(self.url(&path)).json(&payload))
            .await
    }

    fn post_result(&self, response: &Value) -> PlatformResult<PublishResult> {
        let external_id = response
            .get("id")
            .and_then(json_id)
            .ok_or_else(|| PlatformError::UnexpectedResponse {
                platform: self.base.name().to_string(),
                message: "response did not include a post id".to_string(),
            })?;
        let url = response.get("link").and_then(Value::as_str).map(str::to_string);
        Ok(PublishResult::published(self.base.name(), external_id, url))
    }
}

/// `{base}/wp-json/wp/v2`, tolerating a base URL that already names the API
fn api_root(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with(API_PATH) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, API_PATH)
    }
}

/// Exact (case-insensitive) name match in a term search response
fn find_term(response: &Value, name: &str) -> Option<u64> {
    response.as_array()?.iter().find_map(|term| {
        let term_name = term.get("name")?.as_str()?;
        if term_name.eq_ignore_ascii_case(name) {
            term.get("id")?.as_u64()
        } else {
            None
        }
    })
}

/// Body of a create/update post request
///
/// Status is `future` when scheduled, `draft` for drafts, otherwise
/// `publish` unless overridden by a `status` option (e.g. "pending").
pub fn build_post_payload(
    content: &FormattedContent,
    options: &PublishOptions,
    publish_at: Option<DateTime<Utc>>,
    tag_ids: &[u64],
    category_ids: &[u64],
) -> Value {
    let status = if publish_at.is_some() {
        "future".to_string()
    } else if options.draft {
        "draft".to_string()
    } else {
        options
            .extra
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("publish")
            .to_string()
    };

    let mut payload = json!({
        "title": content.title,
        "content": content.body,
        "excerpt": content.excerpt,
        "status": status,
        "tags": tag_ids,
        "categories": category_ids,
    });

    if let Some(slug) = &content.metadata.slug {
        payload["slug"] = json!(slug);
    }
    if let Some(at) = publish_at {
        payload["date_gmt"] = json!(at.format("%Y-%m-%dT%H:%M:%S").to_string());
    }

    payload
}

#[async_trait]
impl PlatformAdapter for WordPressAdapter {
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

        let checked = credentials
            .require(self.base.name(), USERNAME)
            .and_then(|_| credentials.require(self.base.name(), PASSWORD));
        if let Err(error) = checked {
            return Err(self.base.fail_authentication(error).await);
        }

        let request = Self::authorize(
            self.transport
                .client()
                .get(self.url("users/me"))
                .query(&[("context", "edit")]),
            &credentials,
        );
        let me = match self.transport.send_json(&self.base, request).await {
            Ok(me) => me,
            Err(error) => return Err(self.base.fail_authentication(error).await),
        };

        self.base.complete_authentication(credentials).await?;

        Ok(AuthenticationResult {
            platform: self.base.name().to_string(),
            account_id: me.get("id").and_then(json_id),
            account_name: me.get("name").and_then(Value::as_str).map(str::to_string),
            expires_at: None,
            authenticated_at: Utc::now(),
        })
    }

    async fn validate_connection(&self) -> PlatformResult<ConnectionValidationResult> {
        let local = self.base.local_connection_check().await;
        if !local.valid {
            return Ok(local);
        }

        let outcome = self.send(self.transport.client().get(self.url("users/me"))).await;
        Ok(ConnectionValidationResult {
            valid: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
            checked_at: Utc::now(),
        })
    }

    async fn disconnect(&self) {
        self.term_cache.write().await.clear();
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
        let response = self.write_post(None, content, options, None).await?;
        self.post_result(&response)
    }

    async fn schedule(
        &self,
        content: &FormattedContent,
        publish_at: DateTime<Utc>,
        options: &PublishOptions,
    ) -> PlatformResult<ScheduleResult> {
        self.base.ensure_capability(Capability::Scheduling)?;

        let response = self.write_post(None, content, options, Some(publish_at)).await?;
        let published = self.post_result(&response)?;

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

        let response = self
            .write_post(Some(external_id), content, options, None)
            .await?;
        self.post_result(&response)
    }

    async fn delete(&self, external_id: &str) -> PlatformResult<DeleteResult> {
        self.base.ensure_capability(Capability::Deletion)?;
        self.base.ensure_connected().await?;

        self.send(
            self.transport
                .client()
                .delete(self.url(&format!("posts/{}", external_id)))
                .query(&[("force", "true")]),
        )
        .await?;

        Ok(DeleteResult::deleted(self.base.name(), external_id))
    }

    async fn get_analytics(&self, _range: &TimeRange) -> PlatformResult<PlatformAnalytics> {
        // Core WordPress exposes no traffic statistics
        Err(PlatformError::NotSupported {
            platform: self.base.name().to_string(),
            operation: Capability::Analytics.operation().to_string(),
        })
    }

    async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let probe = self
            .transport
            .send_json(&self.base, self.transport.client().get(&self.api_root))
            .await
            .map(|_| started.elapsed());
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
        let mut item = ContentItem::new("post-3", "Hello WordPress", "<p>Body</p>");
        item.excerpt = Some("Summary".to_string());
        format_for_platform(
            &item,
            "blog",
            &WordPressAdapter::default_capabilities(),
            &FormatOptions::default(),
        )
    }

    #[test]
    fn test_api_root() {
        assert_eq!(api_root("https://blog.example.com/"), "https://blog.example.com/wp-json/wp/v2");
        assert_eq!(
            api_root("https://blog.example.com/wp-json/wp/v2"),
            "https://blog.example.com/wp-json/wp/v2"
        );
    }

    #[test]
    fn test_publish_payload() {
        let payload = build_post_payload(&formatted(), &PublishOptions::default(), None, &[3, 4], &[]);

        assert_eq!(payload["status"], "publish");
        assert_eq!(payload["title"], "Hello WordPress");
        assert_eq!(payload["tags"], json!([3, 4]));
        assert_eq!(payload["slug"], "hello-wordpress");
        assert!(payload.get("date_gmt").is_none());
    }

    #[test]
    fn test_draft_and_pending_payloads() {
        let draft = PublishOptions {
            draft: true,
            ..Default::default()
        };
        let mut pending = PublishOptions::default();
        pending.extra.insert("status".to_string(), json!("pending"));

        assert_eq!(build_post_payload(&formatted(), &draft, None, &[], &[])["status"], "draft");
        assert_eq!(build_post_payload(&formatted(), &pending, None, &[], &[])["status"], "pending");
    }

    #[test]
    fn test_scheduled_payload() {
        let at = DateTime::parse_from_rfc3339("2030-05-01T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let payload = build_post_payload(&formatted(), &PublishOptions::default(), Some(at), &[], &[7]);

        assert_eq!(payload["status"], "future");
        assert_eq!(payload["date_gmt"], "2030-05-01T09:30:00");
        assert_eq!(payload["categories"], json!([7]));
    }

    #[test]
    fn test_post_result_without_id_is_not_retryable() {
        let adapter = WordPressAdapter::new(
            "blog",
            "http://127.0.0.1:9",
            WordPressAdapter::default_capabilities(),
        )
        .unwrap();

        let error = adapter
            .post_result(&json!({"link": "https://blog.example.com/?p=1"}))
            .unwrap_err();

        assert_eq!(error.code(), "UNEXPECTED_RESPONSE");
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_find_term() {
        let response = json!([
            {"id": 5, "name": "Rustacean"},
            {"id": 9, "name": "Rust"}
        ]);

        assert_eq!(find_term(&response, "rust"), Some(9));
        assert_eq!(find_term(&response, "go"), None);
    }

    #[test]
    fn test_from_config_requires_base_url() {
        let config = PlatformConfig::new("wordpress");

        assert!(matches!(
            WordPressAdapter::from_config("blog", &config),
            Err(ConfigError::MissingSetting { .. })
        ));
    }

    #[tokio::test]
    async fn test_authenticate_requires_password() {
        let adapter = WordPressAdapter::new(
            "blog",
            "http://127.0.0.1:9",
            WordPressAdapter::default_capabilities(),
        )
        .unwrap();

        let error = adapter
            .authenticate(PlatformCredentials::bearer("tok"))
            .await
            .unwrap_err();

        assert!(error.to_string().contains("missing credential 'username'"));
        assert_eq!(adapter.connection_state().await, ConnectionState::Disconnected);
    }
}
