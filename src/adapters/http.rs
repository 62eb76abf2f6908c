//! HTTP plumbing shared by the remote adapters
//!
//! Maps transport failures and HTTP status codes onto [`PlatformError`] and
//! keeps each adapter's rate-limit cache in sync with the `X-RateLimit-*`
//! headers of every response.

use crate::adapters::base::AdapterBase;
use crate::core::error::{PlatformError, PlatformResult};
use crate::core::traits::{RateLimitStatus, ValidationError};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("platform-publisher/", env!("CARGO_PKG_VERSION"));

/// Longest response excerpt carried in error messages
const MAX_ERROR_BODY: usize = 200;

/// reqwest client bound to one platform
#[derive(Debug, Clone)]
pub struct HttpTransport {
    platform: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(platform: impl Into<String>) -> PlatformResult<Self> {
        let platform = platform.into();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PlatformError::Network {
                platform: platform.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { platform, client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request and decode its JSON body
    ///
    /// Rate-limit headers are recorded on `base` whatever the status; an
    /// empty successful body decodes as `Value::Null`.
    pub async fn send_json(&self, base: &AdapterBase, request: RequestBuilder) -> PlatformResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&self.platform, &e))?;

        let status = response.status();
        let headers = response.headers().clone();
        if let Some(rate) = parse_rate_limit(&headers) {
            base.set_rate_limit(Some(rate)).await;
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&self.platform, &e))?;

        debug!(platform = %self.platform, status = status.as_u16(), "HTTP response");

        if !status.is_success() {
            return Err(error_for_status(&self.platform, status, &headers, &body, Utc::now()));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| PlatformError::Publishing {
            platform: self.platform.clone(),
            message: format!("invalid JSON response: {}", e),
        })
    }
}

/// Map a reqwest transport failure
pub fn transport_error(platform: &str, error: &reqwest::Error) -> PlatformError {
    let message = if error.is_timeout() {
        format!("request timed out: {}", error)
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };

    PlatformError::Network {
        platform: platform.to_string(),
        message,
    }
}

/// Map an unsuccessful HTTP status
pub fn error_for_status(
    platform: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> PlatformError {
    let detail = error_excerpt(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication {
            platform: platform.to_string(),
            message: format!("HTTP {}: {}", status.as_u16(), detail),
        },
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited {
            platform: platform.to_string(),
            retry_after: parse_retry_after(headers, now),
        },
        StatusCode::NOT_FOUND => PlatformError::NotFound {
            platform: platform.to_string(),
            external_id: detail,
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PlatformError::ContentValidation {
                platform: platform.to_string(),
                errors: vec![ValidationError::new(
                    "request",
                    format!("rejected by platform: {}", detail),
                )],
            }
        }
        _ => PlatformError::Publishing {
            platform: platform.to_string(),
            message: format!("HTTP {}: {}", status.as_u16(), detail),
        },
    }
}

/// Wait hint from `Retry-After` (seconds or HTTP date) or `X-RateLimit-Reset`
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(value) = header_str(headers, RETRY_AFTER.as_str()) {
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }
        if let Ok(date) = DateTime::parse_from_rfc2822(value) {
            return Some(until(date.with_timezone(&Utc), now));
        }
    }

    header_str(headers, "x-ratelimit-reset")
        .and_then(parse_epoch)
        .map(|reset| until(reset, now))
}

/// Rate-limit window from `X-RateLimit-Limit/Remaining/Reset`
pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitStatus> {
    let limit = header_str(headers, "x-ratelimit-limit")?.parse().ok()?;
    let remaining = header_str(headers, "x-ratelimit-remaining")?.parse().ok()?;
    let reset_at = header_str(headers, "x-ratelimit-reset").and_then(parse_epoch);

    Some(RateLimitStatus {
        limit,
        remaining,
        reset_at,
    })
}

/// String id from a JSON value that may be a string or a number
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn parse_epoch(value: &str) -> Option<DateTime<Utc>> {
    let seconds = value.parse::<i64>().ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}

fn until(instant: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (instant - now).to_std().unwrap_or(Duration::ZERO)
}

fn error_excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response".to_string();
    }
    let mut excerpt: String = trimmed.chars().take(MAX_ERROR_BODY).collect();
    if trimmed.chars().count() > MAX_ERROR_BODY {
        excerpt.push_str("...");
    }
    excerpt
}
