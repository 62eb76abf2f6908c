//! Publish History - Bounded record of publish outcomes
//!
//! Features:
//! - Ring buffer keeping the most recent entries (default 1000)
//! - Filtered queries, newest first
//! - Per-platform statistics (attempts, success rate, duration)
//! - JSON export

use crate::core::traits::{DeleteResult, PublishResult, ScheduleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::RwLock;

/// Default number of retained entries
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Kind of recorded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOperation {
    Publish,
    Schedule,
    Rollback,
    Unpublish,
}

/// One recorded platform operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub operation: HistoryOperation,
    pub platform: String,
    pub content_id: Option<String>,
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    fn new(operation: HistoryOperation, platform: &str, content_id: Option<&str>, success: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            platform: platform.to_string(),
            content_id: content_id.map(str::to_string),
            success,
            external_id: None,
            error: None,
            error_code: None,
            attempts: 0,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn from_publish(content_id: &str, result: &PublishResult) -> Self {
        Self {
            external_id: result.external_id.clone(),
            error: result.error.clone(),
            error_code: result.error_code.clone(),
            attempts: result.attempts,
            duration_ms: result.duration_ms,
            ..Self::new(HistoryOperation::Publish, &result.platform, Some(content_id), result.success)
        }
    }

    pub fn from_schedule(content_id: &str, result: &ScheduleResult) -> Self {
        Self {
            external_id: result.schedule_id.clone(),
            error: result.error.clone(),
            error_code: result.error_code.clone(),
            attempts: u32::from(result.success),
            duration_ms: result.duration_ms,
            ..Self::new(HistoryOperation::Schedule, &result.platform, Some(content_id), result.success)
        }
    }

    /// Deletion outcome; `operation` is `Rollback` or `Unpublish`
    pub fn from_delete(
        operation: HistoryOperation,
        content_id: Option<&str>,
        result: &DeleteResult,
    ) -> Self {
        Self {
            external_id: Some(result.external_id.clone()),
            error: result.error.clone(),
            attempts: 1,
            ..Self::new(operation, &result.platform, content_id, result.success)
        }
    }
}

/// Query options; every set field must match
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub platform: Option<String>,
    pub content_id: Option<String>,
    pub operation: Option<HistoryOperation>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub success_only: bool,
    pub failures_only: bool,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(ref platform) = self.platform
            && &entry.platform != platform
        {
            return false;
        }
        if let Some(ref content_id) = self.content_id
            && entry.content_id.as_ref() != Some(content_id)
        {
            return false;
        }
        if let Some(operation) = self.operation
            && entry.operation != operation
        {
            return false;
        }
        if let Some(start) = self.start
            && entry.timestamp < start
        {
            return false;
        }
        if let Some(end) = self.end
            && entry.timestamp > end
        {
            return false;
        }
        if self.success_only && !entry.success {
            return false;
        }
        if self.failures_only && entry.success {
            return false;
        }
        true
    }
}

/// Per-platform statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformHistoryStats {
    pub platform: String,
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    /// Percentage, 0-100
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub last_attempt: DateTime<Utc>,
}

/// Statistics over a filtered slice of the history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStatistics {
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub by_platform: BTreeMap<String, PlatformHistoryStats>,
}

/// Bounded publish history
pub struct PublishHistory {
    capacity: usize,
    entries: RwLock<VecDeque<HistoryEntry>>,
}

impl Default for PublishHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl PublishHistory {
    /// `capacity` is raised to at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, evicting the oldest when full
    pub async fn record(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Matching entries, newest first
    pub async fn query(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        let entries = self.entries.read().await;
        let matching = entries.iter().rev().filter(|e| filter.matches(e)).cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Statistics over the matching entries (the filter's limit applies)
    pub async fn statistics(&self, filter: &HistoryFilter) -> HistoryStatistics {
        let entries = self.query(filter).await;
        if entries.is_empty() {
            return HistoryStatistics::default();
        }

        let success_count = entries.iter().filter(|e| e.success).count();
        let total_duration: u64 = entries.iter().map(|e| e.duration_ms).sum();

        let mut grouped: BTreeMap<&str, Vec<&HistoryEntry>> = BTreeMap::new();
        for entry in &entries {
            grouped.entry(entry.platform.as_str()).or_default().push(entry);
        }

        let by_platform = grouped
            .into_iter()
            .filter_map(|(platform, platform_entries)| {
                let attempts = platform_entries.len();
                let successes = platform_entries.iter().filter(|e| e.success).count();
                let duration: u64 = platform_entries.iter().map(|e| e.duration_ms).sum();
                let last_attempt = platform_entries.iter().map(|e| e.timestamp).max()?;

                Some((
                    platform.to_string(),
                    PlatformHistoryStats {
                        platform: platform.to_string(),
                        attempts,
                        successes,
                        failures: attempts - successes,
                        success_rate: percentage(successes, attempts),
                        average_duration_ms: duration as f64 / attempts as f64,
                        last_attempt,
                    },
                ))
            })
            .collect();

        HistoryStatistics {
            total: entries.len(),
            success_count,
            failure_count: entries.len() - success_count,
            success_rate: percentage(success_count, entries.len()),
            average_duration_ms: total_duration as f64 / entries.len() as f64,
            by_platform,
        }
    }

    /// Matching entries and their statistics as pretty JSON
    pub async fn export_json(&self, filter: &HistoryFilter) -> Result<String, serde_json::Error> {
        let data = serde_json::json!({
            "generatedAt": Utc::now().to_rfc3339(),
            "statistics": self.statistics(filter).await,
            "entries": self.query(filter).await,
        });

        serde_json::to_string_pretty(&data)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}
