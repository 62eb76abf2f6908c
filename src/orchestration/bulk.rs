//! Bulk Publisher - Publishes many content items to the same platforms
//!
//! Content items are processed in batches of `max_concurrent`. Every
//! (content, platform) pair ends up with exactly one result, including the
//! pairs of content items skipped by `stop_on_error`.

use crate::core::content::ContentItem;
use crate::core::traits::PublishResult;
use crate::orchestration::batch::{BatchScheduler, DEFAULT_MAX_CONCURRENT};
use crate::orchestration::orchestrator::{
    MultiPublishOptions, PublishOrchestrator, SKIPPED, order_platforms,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Bulk publish options
#[derive(Debug, Clone)]
pub struct BulkPublishOptions {
    /// Content items published concurrently
    pub max_concurrent: usize,
    pub delay_between_batches: Duration,
    /// Skip remaining content items once one had any failure
    pub stop_on_error: bool,
    /// Options applied to each content item's multi-platform publish
    pub publish: MultiPublishOptions,
}

impl Default for BulkPublishOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            delay_between_batches: Duration::ZERO,
            stop_on_error: false,
            publish: MultiPublishOptions::default(),
        }
    }
}

/// Result for one (content, platform) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItem {
    pub content_id: String,
    pub platform: String,
    pub result: PublishResult,
}

/// Bulk publish result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPublishResult {
    pub results: Vec<BulkItem>,
    /// Content items times distinct platforms
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_contents: Vec<String>,
    pub duration_ms: u64,
}

impl BulkPublishResult {
    pub fn results_for<'a>(&'a self, content_id: &'a str) -> impl Iterator<Item = &'a BulkItem> {
        self.results.iter().filter(move |item| item.content_id == content_id)
    }
}

/// Runs bulk publishes through an orchestrator
pub struct BulkPublisher<'a> {
    orchestrator: &'a PublishOrchestrator,
}

impl<'a> BulkPublisher<'a> {
    pub fn new(orchestrator: &'a PublishOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn publish(
        &self,
        contents: &[ContentItem],
        platforms: &[String],
        options: &BulkPublishOptions,
    ) -> BulkPublishResult {
        let started = Instant::now();
        let platforms = order_platforms(platforms, &[]);
        let scheduler = BatchScheduler::new(options.max_concurrent, options.delay_between_batches);

        info!(
            contents = contents.len(),
            platforms = platforms.len(),
            "starting bulk publish"
        );

        let orchestrator = self.orchestrator;
        let targets = platforms.as_slice();
        let publish_options = &options.publish;
        let stop_on_error = options.stop_on_error;

        let outcome = scheduler
            .run_until(
                contents.iter().collect::<Vec<&ContentItem>>(),
                move |content| orchestrator.publish_to_selected(content, targets, publish_options),
                |settled| {
                    stop_on_error
                        && settled.iter().any(|(_, outcome)| match outcome {
                            Ok(result) => result.failure_count > 0,
                            Err(_) => true,
                        })
                },
            )
            .await;

        let mut results = Vec::with_capacity(contents.len() * platforms.len());

        for (content, outcome) in outcome.completed {
            match outcome {
                Ok(multi) => {
                    for platform in &platforms {
                        let result = multi.results.get(platform).cloned().unwrap_or_else(|| {
                            PublishResult::failed(platform, "no result recorded", "PUBLISH_FAILED")
                        });
                        results.push(BulkItem {
                            content_id: content.id.clone(),
                            platform: platform.clone(),
                            result,
                        });
                    }
                }
                Err(e) => {
                    warn!(content_id = %content.id, error = %e, "content publish rejected");
                    for platform in &platforms {
                        results.push(BulkItem {
                            content_id: content.id.clone(),
                            platform: platform.clone(),
                            result: PublishResult::failed(platform, e.to_string(), e.code()),
                        });
                    }
                }
            }
        }

        let mut skipped_contents = Vec::new();
        for content in outcome.skipped {
            for platform in &platforms {
                results.push(BulkItem {
                    content_id: content.id.clone(),
                    platform: platform.clone(),
                    result: PublishResult::failed(
                        platform,
                        "skipped after an earlier content item failed",
                        SKIPPED,
                    ),
                });
            }
            skipped_contents.push(content.id.clone());
        }

        let success_count = results.iter().filter(|item| item.result.success).count();
        let result = BulkPublishResult {
            total_items: contents.len() * platforms.len(),
            success_count,
            failure_count: results.len() - success_count,
            results,
            skipped_contents,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            total = result.total_items,
            succeeded = result.success_count,
            failed = result.failure_count,
            skipped = result.skipped_contents.len(),
            "bulk publish finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryAdapter;
    use crate::security::credentials::PlatformCredentials;
    use std::sync::Arc;

    fn contents(count: usize) -> Vec<ContentItem> {
        (1..=count)
            .map(|i| ContentItem::new(format!("post-{}", i), format!("Post {}", i), "Body text"))
            .collect()
    }

    #[tokio::test]
    async fn test_every_pair_has_a_result() {
        let orchestrator = PublishOrchestrator::new();
        for name in ["a", "b"] {
            orchestrator
                .add_platform(Arc::new(MemoryAdapter::new(name)), PlatformCredentials::bearer("tok"))
                .await
                .unwrap();
        }
        let platforms = vec!["a".to_string(), "b".to_string(), "a".to_string()];

        let result = orchestrator
            .bulk_publish(&contents(3), &platforms, &BulkPublishOptions::default())
            .await;

        assert_eq!(result.total_items, 6);
        assert_eq!(result.results.len(), 6);
        assert_eq!(result.success_count + result.failure_count, result.total_items);
        assert_eq!(result.results_for("post-2").count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_platforms_fail_every_pair() {
        let orchestrator = PublishOrchestrator::new();
        let platforms = vec!["ghost".to_string()];

        let result = orchestrator
            .bulk_publish(&contents(2), &platforms, &BulkPublishOptions::default())
            .await;

        assert_eq!(result.failure_count, 2);
        assert!(
            result
                .results
                .iter()
                .all(|item| item.result.error_code.as_deref() == Some("NO_VALID_PLATFORMS"))
        );
    }
}
