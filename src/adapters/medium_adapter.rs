//! Medium Adapter - Medium publishing API implementation
//!
//! Medium accepts new posts only: there is no endpoint for scheduling,
//! editing, deleting or reading stats, so those operations report
//! `NotSupported`.

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
use crate::security::credentials::{PlatformCredentials, TOKEN};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::time::Instant;
use tokio::sync::RwLock;

pub const DEFAULT_BASE_URL: &str = "https://api.medium.com/v1";

/// Medium caps tags per post
pub const MAX_TAGS: usize = 5;

/// Medium integration-token adapter
pub struct MediumAdapter {
    base: AdapterBase,
    transport: HttpTransport,
    base_url: String,
    user_id: RwLock<Option<String>>,
}

impl MediumAdapter {
    pub fn new(name: impl Into<String>, base_url: Option<&str>) -> PlatformResult<Self> {
        Self::with_capabilities(name, base_url, Self::default_capabilities())
    }

    pub fn with_capabilities(
        name: impl Into<String>,
        base_url: Option<&str>,
        capabilities: PlatformCapabilities,
    ) -> PlatformResult<Self> {
        let name = name.into();
        Ok(Self {
            transport: HttpTransport::new(name.clone())?,
            base: AdapterBase::new(name, capabilities),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            user_id: RwLock::new(None),
        })
    }

    pub fn from_config(name: &str, config: &PlatformConfig) -> Result<Self, ConfigError> {
        let mut capabilities = Self::default_capabilities();
        if let Some(overrides) = &config.capabilities {
            overrides.apply(&mut capabilities);
        }

        Self::with_capabilities(name, config.base_url.as_deref(), capabilities).map_err(|e| {
            ConfigError::InvalidSetting {
                platform: name.to_string(),
                field: "baseUrl".to_string(),
                message: e.to_string(),
            }
        })
    }

    pub fn default_capabilities() -> PlatformCapabilities {
        PlatformCapabilities {
            max_content_length: 100_000,
            max_title_length: 100,
            max_description_length: 140,
            max_tags: Some(MAX_TAGS),
            max_media_items: None,
            supported_media_types: vec![MediaType::Image],
            supported_formats: vec![BodyFormat::Markdown, BodyFormat::Html],
            supports_scheduling: false,
            supports_drafts: true,
            supports_updates: false,
            supports_deletion: false,
            supports_analytics: false,
            supports_categories: false,
            supports_tags: true,
            supports_bulk_operations: false,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_me(&self, token: &str) -> PlatformResult<Value> {
        let me = self
            .transport
            .send_json(
                &self.base,
                self.transport.client().get(self.url("me")).bearer_auth(token),
            )
            .await?;
        // Medium wraps every payload in `data`
        Ok(me.get("data").cloned().unwrap_or(me))
    }

    fn unsupported(&self, capability: Capability) -> PlatformError {
        PlatformError::NotSupported {
            platform: self.base.name().to_string(),
            operation: capability.operation().to_string(),
        }
    }
}

/// Body of `POST /users/{id}/posts`
pub fn build_post_payload(content: &FormattedContent, options: &PublishOptions) -> Value {
    let content_format = match content.body_format {
        BodyFormat::Markdown => "markdown",
        _ => "html",
    };
    let tags: Vec<&String> = content.metadata.tags.iter().take(MAX_TAGS).collect();

    let mut payload = json!({
        "title": content.title,
        "contentFormat": content_format,
        "content": content.body,
        "tags": tags,
        "publishStatus": if options.draft { "draft" } else { "public" },
    });

    if let Some(canonical) = &content.metadata.canonical_url {
        payload["canonicalUrl"] = json!(canonical);
    }
    if let Some(notify) = options.notify_followers {
        payload["notifyFollowers"] = json!(notify);
    }
    if let Some(license) = options.extra.get("license") {
        payload["license"] = license.clone();
    }

    payload
}

#[async_trait]
impl PlatformAdapter for MediumAdapter {
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

        let token = match credentials.require(self.base.name(), TOKEN) {
            Ok(token) => token.to_string(),
            Err(error) => return Err(self.base.fail_authentication(error).await),
        };

        let me = match self.get_me(&token).await {
            Ok(me) => me,
            Err(error) => return Err(self.base.fail_authentication(error).await),
        };
        let Some(user_id) = me.get("id").and_then(json_id) else {
            let error = self.base.auth_error("profile response did not include a user id");
            return Err(self.base.fail_authentication(error).await);
        };

        *self.user_id.write().await = Some(user_id.clone());
        self.base.complete_authentication(credentials).await?;

        Ok(AuthenticationResult {
            platform: self.base.name().to_string(),
            account_id: Some(user_id),
            account_name: me.get("username").and_then(Value::as_str).map(str::to_string),
            expires_at: None,
            authenticated_at: Utc::now(),
        })
    }

    async fn validate_connection(&self) -> PlatformResult<ConnectionValidationResult> {
        let local = self.base.local_connection_check().await;
        if !local.valid {
            return Ok(local);
        }

        let credentials = self.base.credentials().await?;
        let token = credentials.require(self.base.name(), TOKEN)?;
        let outcome = self.get_me(token).await;
        Ok(ConnectionValidationResult {
            valid: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
            checked_at: Utc::now(),
        })
    }

    async fn disconnect(&self) {
        *self.user_id.write().await = None;
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
        self.base.ensure_connected().await?;
        self.base.ensure_valid(self.validate_content(content))?;

        let user_id = self
            .user_id
            .read()
            .await
            .clone()
            .ok_or_else(|| PlatformError::NotConnected {
                platform: self.base.name().to_string(),
            })?;
        let credentials = self.base.credentials().await?;
        let token = credentials.require(self.base.name(), TOKEN)?;

        let response = self
            .transport
            .send_json(
                &self.base,
                self.transport
                    .client()
                    .post(self.url(&format!("users/{}/posts", user_id)))
                    .bearer_auth(token)
                    .json(&build_post_payload(content, options)),
            )
            .await?;

        post_result(self.base.name(), &response)
    }

    async fn schedule(
        &self,
        _content: &FormattedContent,
        _publish_at: DateTime<Utc>,
        _options: &PublishOptions,
    ) -> PlatformResult<ScheduleResult> {
        Err(self.unsupported(Capability::Scheduling))
    }

    async fn update(
        &self,
        _external_id: &str,
        _content: &FormattedContent,
        _options: &PublishOptions,
    ) -> PlatformResult<PublishResult> {
        Err(self.unsupported(Capability::Updates))
    }

    async fn delete(&self, _external_id: &str) -> PlatformResult<DeleteResult> {
        Err(self.unsupported(Capability::Deletion))
    }

    async fn get_analytics(&self, _range: &TimeRange) -> PlatformResult<PlatformAnalytics> {
        Err(self.unsupported(Capability::Analytics))
    }

    async fn health_check(&self) -> HealthCheckResult {
        let probe = match self.base.credentials().await {
            Ok(credentials) => match credentials.require(self.base.name(), TOKEN) {
                Ok(token) => {
                    let started = Instant::now();
                    self.get_me(token).await.map(|_| started.elapsed())
                }
                Err(error) => Err(error),
            },
            Err(error) => Err(error),
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

/// Read the created post out of a publish response
///
/// A 2xx response without an id is not retried: the post may already exist.
fn post_result(platform: &str, response: &Value) -> PlatformResult<PublishResult> {
    let data = response.get("data").unwrap_or(response);
    let external_id = data
        .get("id")
        .and_then(json_id)
        .ok_or_else(|| PlatformError::UnexpectedResponse {
            platform: platform.to_string(),
            message: "response did not include a post id".to_string(),
        })?;
    let url = data.get("url").and_then(Value::as_str).map(str::to_string);

    Ok(PublishResult::published(platform, external_id, url))
}
