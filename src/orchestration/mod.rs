//! Orchestration layer for multi-platform publishing
//!
//! This module provides the high-level components that distribute content
//! across registered platform adapters: batching, the publish orchestrator,
//! bulk publishing, publish history, health monitoring and analytics.

pub mod analytics;
pub mod batch;
pub mod bulk;
pub mod health_monitor;
pub mod history;
pub mod orchestrator;

// Re-export main types for convenience
pub use analytics::{AggregatedAnalytics, AnalyticsAggregator, ComparativeAnalytics, ComparisonMetric};
pub use batch::{BatchOutcome, BatchScheduler};
pub use bulk::{BulkItem, BulkPublishOptions, BulkPublishResult, BulkPublisher};
pub use health_monitor::{HealthMonitor, HealthMonitorOptions, OverallHealth, PlatformHealthReport};
pub use history::{HistoryEntry, HistoryFilter, HistoryOperation, HistoryStatistics, PublishHistory};
pub use orchestrator::{
    MultiPlatformPublishResult, MultiPlatformScheduleResult, MultiPublishOptions, PublishOrchestrator,
    RollbackReport, RollbackStatus, ScheduleRequest,
};
