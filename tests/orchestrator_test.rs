//! End-to-end orchestrator behavior over instrumented in-memory adapters

mod common;

use chrono::Utc;
use common::*;
use platform_publisher::adapters::AdapterLoader;
use platform_publisher::core::config_loader::{ConfigLoadOptions, ConfigLoader};
use platform_publisher::core::{
    ConnectionState, ELLIPSIS, PlatformAdapter, PlatformCapabilities, PlatformError,
};
use platform_publisher::orchestration::health_monitor::IssueSeverity;
use platform_publisher::orchestration::{
    BulkPublishOptions, HistoryFilter, MultiPublishOptions, OverallHealth, PublishOrchestrator,
    RollbackStatus, ScheduleRequest,
};
use platform_publisher::security::CredentialStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn all_or_nothing() -> MultiPublishOptions {
    MultiPublishOptions {
        require_all_success: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn best_effort_keeps_partial_success() {
    let a = Arc::new(ProbeAdapter::new("a"));
    let b = Arc::new(ProbeAdapter::new("b").failing(revoked("b")));
    let c = Arc::new(ProbeAdapter::new("c"));
    let orchestrator = orchestrator(&[a.clone(), b.clone(), c.clone()]).await;

    let result = orchestrator
        .publish_to_all(&content("post-1"), &MultiPublishOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.success_count, 2);
    assert_eq!(result.failure_count, 1);
    assert_eq!(result.results["b"].error_code.as_deref(), Some("AUTHENTICATION_FAILED"));
    assert_eq!(result.results["b"].attempts, 1);
    assert!(result.errors.contains_key("b"));
    assert_eq!(a.memory().post_count().await, 1);
    assert_eq!(c.memory().post_count().await, 1);
}

#[tokio::test]
async fn retryable_failures_exhaust_attempts() {
    let a = Arc::new(ProbeAdapter::new("a").failing(network("a")));
    let orchestrator = orchestrator(&[a.clone()]).await;

    let result = orchestrator
        .publish_to_all(&content("post-1"), &MultiPublishOptions::default())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(a.publish_calls(), 3);
    assert_eq!(result.results["a"].attempts, 3);
    assert_eq!(result.results["a"].error_code.as_deref(), Some("RETRIES_EXHAUSTED"));
}

#[tokio::test]
async fn rate_limit_waits_for_the_hint_then_succeeds() {
    let a = Arc::new(ProbeAdapter::new("a").failing_first(vec![PlatformError::RateLimited {
        platform: "a".to_string(),
        retry_after: Some(Duration::from_millis(60)),
    }]));
    let orchestrator = orchestrator(&[a.clone()]).await;
    let started = Instant::now();

    let result = orchestrator
        .publish_to_all(&content("post-1"), &MultiPublishOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.results["a"].attempts, 2);
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn all_or_nothing_rolls_back_earlier_publishes() {
    let a = Arc::new(ProbeAdapter::new("a"));
    let b = Arc::new(ProbeAdapter::new("b"));
    let c = Arc::new(ProbeAdapter::new("c").failing(revoked("c")));
    let d = Arc::new(ProbeAdapter::new("d"));
    let orchestrator = orchestrator(&[a.clone(), b.clone(), c.clone(), d.clone()]).await;

    let result = orchestrator
        .publish_to_selected(&content("post-1"), &names(&["a", "b", "c", "d"]), &all_or_nothing())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.success_count, 0);
    assert_eq!(result.failure_count, 4);
    assert_eq!(a.delete_calls(), 1);
    assert_eq!(b.delete_calls(), 1);
    assert_eq!(c.delete_calls(), 0);
    assert_eq!(d.publish_calls(), 0);
    assert_eq!(a.memory().post_count().await, 0);
    assert_eq!(b.memory().post_count().await, 0);
    assert_eq!(result.results["a"].error_code.as_deref(), Some("ROLLED_BACK"));
    assert_eq!(result.results["c"].error_code.as_deref(), Some("AUTHENTICATION_FAILED"));
    assert_eq!(result.results["d"].error_code.as_deref(), Some("NOT_ATTEMPTED"));

    let rollback = result.rollback.unwrap();
    assert_eq!(rollback.status, RollbackStatus::Complete);
    assert_eq!(rollback.triggered_by, "c");
    // reverse publish order
    assert_eq!(rollback.rolled_back, names(&["b", "a"]));
}

#[tokio::test]
async fn abc_scenario_under_both_policies() {
    for require_all_success in [false, true] {
        let a = Arc::new(ProbeAdapter::new("a"));
        let b = Arc::new(ProbeAdapter::new("b").failing(revoked("b")));
        let c = Arc::new(ProbeAdapter::new("c"));
        let orchestrator = orchestrator(&[a.clone(), b.clone(), c.clone()]).await;
        let options = MultiPublishOptions {
            require_all_success,
            ..Default::default()
        };

        let result = orchestrator
            .publish_to_selected(&content("post-1"), &names(&["a", "b", "c"]), &options)
            .await
            .unwrap();

        assert!(result.errors.contains_key("b"));
        if require_all_success {
            assert_eq!(result.success_count, 0);
            assert_eq!(a.delete_calls(), 1);
            assert_eq!(c.publish_calls(), 0);
        } else {
            assert_eq!(result.success_count, 2);
            assert_eq!(result.failure_count, 1);
            assert!(result.results["a"].success);
            assert_eq!(a.delete_calls(), 0);
        }
    }
}

#[tokio::test]
async fn rollback_is_partial_when_deletion_is_unsupported() {
    let caps = PlatformCapabilities {
        supports_deletion: false,
        ..PlatformCapabilities::full()
    };
    let a = Arc::new(ProbeAdapter::with_capabilities("a", caps));
    let b = Arc::new(ProbeAdapter::new("b").failing(revoked("b")));
    let orchestrator = orchestrator(&[a.clone(), b.clone()]).await;

    let result = orchestrator
        .publish_to_selected(&content("post-1"), &names(&["a", "b"]), &all_or_nothing())
        .await
        .unwrap();

    let rollback = result.rollback.unwrap();
    assert_eq!(rollback.status, RollbackStatus::Partial);
    assert_eq!(rollback.not_supported, names(&["a"]));
    assert_eq!(a.delete_calls(), 0);
    assert_eq!(a.memory().post_count().await, 1);
    assert_eq!(result.results["a"].error_code.as_deref(), Some("ROLLBACK_INCOMPLETE"));
    assert!(result.results["a"].external_id.is_some());
}

#[tokio::test]
async fn server_error_is_retried_before_rollback() {
    let a = Arc::new(ProbeAdapter::new("a"));
    let b = Arc::new(ProbeAdapter::new("b").failing(server_error("b")));
    let c = Arc::new(ProbeAdapter::new("c"));
    let orchestrator = orchestrator(&[a.clone(), b.clone(), c.clone()]).await;

    let result = orchestrator
        .publish_to_selected(&content("post-1"), &names(&["a", "b", "c"]), &all_or_nothing())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.success_count, 0);
    assert_eq!(b.publish_calls(), 3);
    assert_eq!(result.results["b"].error_code.as_deref(), Some("RETRIES_EXHAUSTED"));
    assert_eq!(a.delete_calls(), 1);
    assert_eq!(a.memory().post_count().await, 0);
    assert_eq!(c.publish_calls(), 0);
    assert_eq!(result.rollback.unwrap().status, RollbackStatus::Complete);
}

#[tokio::test]
async fn publish_without_id_cannot_be_rolled_back() {
    let a = Arc::new(ProbeAdapter::new("a").without_ids());
    let b = Arc::new(ProbeAdapter::new("b").failing(revoked("b")));
    let orchestrator = orchestrator(&[a.clone(), b.clone()]).await;

    let result = orchestrator
        .publish_to_selected(&content("post-1"), &names(&["a", "b"]), &all_or_nothing())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.success_count, 0);
    assert!(!result.results["a"].success);
    assert_eq!(result.results["a"].error_code.as_deref(), Some("ROLLBACK_INCOMPLETE"));
    assert_eq!(a.delete_calls(), 0);

    let rollback = result.rollback.unwrap();
    assert_eq!(rollback.status, RollbackStatus::Partial);
    assert!(rollback.failed.contains_key("a"));
}

#[tokio::test]
async fn all_or_nothing_success_publishes_everywhere() {
    let a = Arc::new(ProbeAdapter::new("a"));
    let b = Arc::new(ProbeAdapter::new("b"));
    let orchestrator = orchestrator(&[a.clone(), b.clone()]).await;

    let result = orchestrator
        .publish_to_all(&content("post-1"), &all_or_nothing())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.success_count, 2);
    assert!(result.rollback.is_none());
}

#[tokio::test]
async fn concurrency_never_exceeds_the_batch_size() {
    let concurrency = Arc::new(Concurrency::default());
    let adapters: Vec<Arc<ProbeAdapter>> = ["p1", "p2", "p3", "p4", "p5"]
        .iter()
        .map(|name| {
            Arc::new(
                ProbeAdapter::new(name)
                    .with_delay(Duration::from_millis(30))
                    .sharing(&concurrency),
            )
        })
        .collect();
    let orchestrator = orchestrator(&adapters).await;
    let options = MultiPublishOptions {
        max_concurrent: 2,
        ..Default::default()
    };

    let result = orchestrator
        .publish_to_all(&content("post-1"), &options)
        .await
        .unwrap();

    assert_eq!(result.success_count, 5);
    assert_eq!(concurrency.peak(), 2);
}

#[tokio::test]
async fn stop_on_first_failure_skips_later_batches() {
    let p1 = Arc::new(ProbeAdapter::new("p1").failing(revoked("p1")));
    let p2 = Arc::new(ProbeAdapter::new("p2"));
    let p3 = Arc::new(ProbeAdapter::new("p3"));
    let p4 = Arc::new(ProbeAdapter::new("p4"));
    let orchestrator = orchestrator(&[p1.clone(), p2.clone(), p3.clone(), p4.clone()]).await;
    let options = MultiPublishOptions {
        max_concurrent: 2,
        stop_on_first_failure: true,
        ..Default::default()
    };

    let result = orchestrator
        .publish_to_all(&content("post-1"), &options)
        .await
        .unwrap();

    // the failing batch settles in full
    assert!(result.results["p2"].success);
    assert_eq!(result.skipped, names(&["p3", "p4"]));
    assert_eq!(result.results["p3"].error_code.as_deref(), Some("SKIPPED"));
    assert_eq!(p3.publish_calls() + p4.publish_calls(), 0);
}

#[tokio::test]
async fn platform_order_runs_first() {
    let a = Arc::new(ProbeAdapter::new("a"));
    let b = Arc::new(ProbeAdapter::new("b").failing(revoked("b")));
    let orchestrator = orchestrator(&[a.clone(), b.clone()]).await;
    let options = MultiPublishOptions {
        require_all_success: true,
        platform_order: names(&["b"]),
        ..Default::default()
    };

    let result = orchestrator.publish_to_all(&content("post-1"), &options).await.unwrap();

    assert_eq!(a.publish_calls(), 0);
    assert_eq!(result.results["a"].error_code.as_deref(), Some("NOT_ATTEMPTED"));
    assert!(result.rollback.unwrap().rolled_back.is_empty());
}

#[tokio::test]
async fn long_titles_are_truncated_to_the_platform_limit() {
    let caps = PlatformCapabilities {
        max_title_length: 20,
        ..PlatformCapabilities::full()
    };
    let a = Arc::new(ProbeAdapter::with_capabilities("a", caps));
    let orchestrator = orchestrator(&[a.clone()]).await;
    let mut item = content("post-1");
    item.title = "A remarkably long headline about the new release".to_string();

    let result = orchestrator
        .publish_to_all(&item, &MultiPublishOptions::default())
        .await
        .unwrap();

    let external_id = result.results["a"].external_id.clone().unwrap();
    let post = a.memory().post(&external_id).await.unwrap();
    assert!(post.content.title.chars().count() <= 20);
    assert!(post.content.title.ends_with(ELLIPSIS));
    assert!(post.content.adaptation_score > 0.0);
}

#[tokio::test]
async fn deadline_bounds_the_whole_call() {
    let slow = Arc::new(ProbeAdapter::new("slow").with_delay(Duration::from_millis(300)));
    let later = Arc::new(ProbeAdapter::new("later"));
    let orchestrator = orchestrator(&[slow.clone(), later.clone()]).await;
    let options = MultiPublishOptions {
        max_concurrent: 1,
        platform_order: names(&["slow", "later"]),
        deadline: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let started = Instant::now();

    let result = orchestrator.publish_to_all(&content("post-1"), &options).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(result.results["slow"].error_code.as_deref(), Some("TIMEOUT"));
    assert_eq!(result.results["later"].error_code.as_deref(), Some("TIMEOUT"));
    assert_eq!(later.publish_calls(), 0);
    assert!(!result.success);
}

#[tokio::test]
async fn scheduling_respects_capabilities() {
    let caps = PlatformCapabilities {
        supports_scheduling: false,
        ..PlatformCapabilities::full()
    };
    let a = Arc::new(ProbeAdapter::new("a"));
    let b = Arc::new(ProbeAdapter::with_capabilities("b", caps));
    let orchestrator = orchestrator(&[a.clone(), b.clone()]).await;
    let at = Utc::now() + chrono::Duration::hours(2);

    let result = orchestrator
        .schedule_across_platforms(&content("post-1"), &ScheduleRequest::new(Vec::new(), at))
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.results["a"].success);
    assert_eq!(result.results["b"].error_code.as_deref(), Some("NOT_SUPPORTED"));
    assert_eq!(b.memory().post_count().await, 0);
}

#[tokio::test]
async fn bulk_stop_on_error_accounts_for_every_pair() {
    let good = Arc::new(ProbeAdapter::new("good"));
    let bad = Arc::new(ProbeAdapter::new("bad").failing(revoked("bad")));
    let orchestrator = orchestrator(&[good.clone(), bad.clone()]).await;
    let contents = vec![content("post-1"), content("post-2"), content("post-3")];
    let options = BulkPublishOptions {
        max_concurrent: 1,
        stop_on_error: true,
        ..Default::default()
    };

    let result = orchestrator
        .bulk_publish(&contents, &names(&["good", "bad"]), &options)
        .await;

    assert_eq!(result.total_items, 6);
    assert_eq!(result.results.len(), 6);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 5);
    assert_eq!(result.skipped_contents, names(&["post-2", "post-3"]));
    assert_eq!(good.publish_calls(), 1);
    assert!(
        result
            .results_for("post-3")
            .all(|item| item.result.error_code.as_deref() == Some("SKIPPED"))
    );
}

#[tokio::test]
async fn unhealthy_platform_makes_the_report_critical() {
    let a = Arc::new(ProbeAdapter::new("a"));
    let b = Arc::new(ProbeAdapter::new("b"));
    let orchestrator = orchestrator(&[a.clone(), b.clone()]).await;
    b.memory().set_outage(Some("503 Service Unavailable".to_string())).await;

    let report = orchestrator.check_platform_health().await;

    assert_eq!(report.overall, OverallHealth::Critical);
    assert!(
        report
            .issues_for("b")
            .any(|issue| issue.severity == IssueSeverity::Critical)
    );
    assert_eq!(report.issues_for("a").count(), 0);
    assert!(!report.recommendations.is_empty());
}

#[tokio::test]
async fn unhealthy_platform_recovers_once_the_outage_clears() {
    let a = Arc::new(ProbeAdapter::new("a"));
    let orchestrator = orchestrator(&[a.clone()]).await;

    a.memory().set_outage(Some("503 Service Unavailable".to_string())).await;
    orchestrator.check_platform_health().await;
    assert_eq!(a.connection_state().await, ConnectionState::Unhealthy);

    a.memory().set_outage(None).await;
    let result = orchestrator
        .publish_to_all(&content("post-1"), &MultiPublishOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.results["a"].success);
    assert_eq!(a.connection_state().await, ConnectionState::Connected);
    assert_eq!(a.memory().post_count().await, 1);
}

#[tokio::test]
async fn history_records_every_platform_outcome() {
    let a = Arc::new(ProbeAdapter::new("a"));
    let b = Arc::new(ProbeAdapter::new("b").failing(revoked("b")));
    let orchestrator = orchestrator(&[a, b]).await;

    orchestrator
        .publish_to_all(&content("post-1"), &MultiPublishOptions::default())
        .await
        .unwrap();

    let stats = orchestrator.history().statistics(&HistoryFilter::default()).await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.failure_count, 1);
    assert!((stats.by_platform["a"].success_rate - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn orchestrator_builds_from_a_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("publisher.yaml");
    std::fs::write(
        &path,
        r#"
version: "1.0"
orchestrator:
  maxConcurrent: 2
  requireAllSuccess: true
platforms:
  notes:
    type: memory
    options:
      requiredToken: secret-1
    credentials:
      token: ${NOTES_TOKEN}
  drafts:
    type: memory
    options:
      requiredToken: secret-2
    credentials:
      token: wrong
  archive:
    type: memory
    enabled: false
"#,
    )
    .unwrap();

    let env = HashMap::from([("NOTES_TOKEN".to_string(), "secret-1".to_string())]);
    let config = ConfigLoader::load(ConfigLoadOptions {
        config_path: Some(path),
        env: env.clone(),
        ..Default::default()
    })
    .await
    .unwrap();

    let orchestrator = PublishOrchestrator::from_config(
        &config,
        &AdapterLoader::new(),
        &CredentialStore::with_env(env),
    )
    .await
    .unwrap();

    assert!(orchestrator.defaults().require_all_success);
    assert_eq!(orchestrator.defaults().max_concurrent, 2);
    assert_eq!(orchestrator.get_platforms().await, names(&["drafts", "notes"]));
    assert_eq!(orchestrator.get_connected_platforms().await, names(&["notes"]));

    let result = orchestrator
        .publish_to_selected(&content("post-1"), &names(&["drafts"]), &MultiPublishOptions::default())
        .await
        .unwrap();
    assert_eq!(result.results["drafts"].error_code.as_deref(), Some("NOT_CONNECTED"));
}
