//! Platform Publisher CLI
//!
//! Publishes content to every configured platform from one command

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use platform_publisher::adapters::AdapterLoader;
use platform_publisher::core::config_loader::{ConfigLoadOptions, ConfigLoader, ConfigOverrides};
use platform_publisher::core::{ContentItem, TimeRange};
use platform_publisher::core::config::PublisherConfig;
use platform_publisher::orchestration::analytics::generate_markdown_report;
use platform_publisher::orchestration::{
    BulkPublishOptions, BulkPublishResult, ComparisonMetric, MultiPlatformPublishResult,
    MultiPlatformScheduleResult, MultiPublishOptions, OverallHealth, PlatformHealthReport,
    PublishOrchestrator, ScheduleRequest,
};
use platform_publisher::security::CredentialStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Multi-platform content publishing orchestrator
#[derive(Parser)]
#[command(name = "platform-publisher")]
#[command(version)]
#[command(about = "Multi-platform content publishing orchestrator", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./.publisher.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a content file to platforms
    Publish {
        /// Content file (YAML or JSON)
        #[arg(value_name = "CONTENT_FILE")]
        content: PathBuf,

        /// Comma-separated platforms (defaults to every configured platform)
        #[arg(short, long, value_delimiter = ',')]
        platforms: Vec<String>,

        /// Publish everywhere or nowhere
        #[arg(long)]
        all_or_nothing: bool,

        /// Skip later batches after a failure
        #[arg(long)]
        stop_on_failure: bool,

        /// Maximum concurrent platforms
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Deadline for the whole call, in seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Publish as draft where supported
        #[arg(long)]
        draft: bool,
    },

    /// Schedule a content file for later publication
    Schedule {
        /// Content file (YAML or JSON)
        #[arg(value_name = "CONTENT_FILE")]
        content: PathBuf,

        /// Publish time (RFC 3339, e.g. 2026-11-01T09:00:00Z)
        #[arg(long)]
        at: DateTime<Utc>,

        /// Comma-separated platforms (defaults to every configured platform)
        #[arg(short, long, value_delimiter = ',')]
        platforms: Vec<String>,
    },

    /// Publish several content files to the same platforms
    Bulk {
        /// Content files (YAML or JSON, one item or a list each)
        #[arg(value_name = "CONTENT_FILES", required = true)]
        contents: Vec<PathBuf>,

        /// Comma-separated platforms (defaults to every configured platform)
        #[arg(short, long, value_delimiter = ',')]
        platforms: Vec<String>,

        /// Maximum concurrent content items
        #[arg(long, default_value = "3")]
        max_concurrent: usize,

        /// Skip remaining content after a failure
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Delete a published post
    Unpublish {
        platform: String,
        external_id: String,
    },

    /// Check platform health
    Health {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Aggregate analytics across platforms
    Analytics {
        /// Analytics window in days
        #[arg(long, default_value = "30")]
        days: i64,

        /// Rank platforms by a metric (views, engagement-rate, ...)
        #[arg(long)]
        compare: Option<ComparisonMetric>,
    },

    /// Validate the configuration file
    CheckConfig,
}

/// A content file holds one item or a list of items
#[derive(Deserialize)]
#[serde(untagged)]
enum ContentFile {
    One(ContentItem),
    Many(Vec<ContentItem>),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut overrides = ConfigOverrides::default();
    if let Commands::Publish {
        all_or_nothing,
        stop_on_failure,
        max_concurrent,
        deadline,
        ..
    } = &cli.command
    {
        overrides.max_concurrent = *max_concurrent;
        overrides.require_all_success = all_or_nothing.then_some(true);
        overrides.stop_on_first_failure = stop_on_failure.then_some(true);
        overrides.deadline_secs = *deadline;
    }

    let config = ConfigLoader::load(ConfigLoadOptions {
        config_path: cli.config.clone(),
        overrides,
        ..ConfigLoadOptions::from_process()
    })
    .await
    .context("failed to load configuration")?;

    if let Commands::CheckConfig = cli.command {
        return Ok(check_config_command(&config, cli.json));
    }

    let validation = ConfigLoader::validate(&config);
    if !validation.valid {
        eprintln!("{}", ConfigLoader::format_validation_result(&validation));
        return Ok(2);
    }

    let orchestrator =
        PublishOrchestrator::from_config(&config, &AdapterLoader::new(), &CredentialStore::from_env())
            .await
            .context("failed to build platform adapters")?;

    match cli.command {
        Commands::Publish {
            content,
            platforms,
            draft,
            ..
        } => {
            let item = read_single(&content).await?;
            let mut options = orchestrator.defaults().clone();
            options.publish.draft = draft;
            publish_command(&orchestrator, &item, platforms, &options, cli.json).await
        }
        Commands::Schedule {
            content,
            at,
            platforms,
        } => {
            let item = read_single(&content).await?;
            let request = ScheduleRequest {
                platforms,
                publish_at: at,
                options: orchestrator.defaults().clone(),
            };
            schedule_command(&orchestrator, &item, &request, cli.json).await
        }
        Commands::Bulk {
            contents,
            platforms,
            max_concurrent,
            stop_on_error,
        } => {
            let mut items = Vec::new();
            for path in &contents {
                items.extend(read_content_file(path).await?);
            }
            let platforms = if platforms.is_empty() {
                orchestrator.get_platforms().await
            } else {
                platforms
            };
            let options = BulkPublishOptions {
                max_concurrent,
                stop_on_error,
                publish: orchestrator.defaults().clone(),
                ..Default::default()
            };
            let result = orchestrator.bulk_publish(&items, &platforms, &options).await;
            print_bulk(&result, cli.json)?;
            Ok(if result.failure_count == 0 { 0 } else { 1 })
        }
        Commands::Unpublish {
            platform,
            external_id,
        } => match orchestrator.unpublish(&platform, &external_id).await {
            Ok(result) => {
                if cli.json {
                    print_json(&result)?;
                } else {
                    println!("🗑️  Deleted {} from {}", result.external_id, result.platform);
                }
                Ok(0)
            }
            Err(e) => {
                eprintln!("❌ Unpublish failed [{}]: {}", e.code(), e);
                for action in e.suggested_actions() {
                    eprintln!("  - {}", action);
                }
                Ok(1)
            }
        },
        Commands::Health { watch } => health_command(&orchestrator, watch, cli.json).await,
        Commands::Analytics { days, compare } => {
            let range = TimeRange::last_days(days);
            match compare {
                Some(metric) => {
                    let comparison = orchestrator.get_comparative_analytics(&range, metric).await;
                    if cli.json {
                        print_json(&comparison)?;
                    } else {
                        println!("\n📊 Platforms ranked by {}\n", metric);
                        for ranking in &comparison.rankings {
                            println!("  {}. {} ({:.2})", ranking.rank, ranking.platform, ranking.value);
                        }
                    }
                }
                None => {
                    let analytics = orchestrator.get_aggregated_analytics(&range).await;
                    if cli.json {
                        print_json(&analytics)?;
                    } else {
                        println!("{}", generate_markdown_report(&analytics));
                    }
                }
            }
            Ok(0)
        }
        Commands::CheckConfig => Ok(0),
    }
}

async fn publish_command(
    orchestrator: &PublishOrchestrator,
    content: &ContentItem,
    platforms: Vec<String>,
    options: &MultiPublishOptions,
    json: bool,
) -> Result<i32> {
    let outcome = if platforms.is_empty() {
        orchestrator.publish_to_all(content, options).await
    } else {
        orchestrator.publish_to_selected(content, &platforms, options).await
    };

    match outcome {
        Ok(result) => {
            print_publish(&result, json)?;
            Ok(if result.success { 0 } else { 1 })
        }
        Err(e) => {
            eprintln!("\n❌ Publishing failed [{}]: {}", e.code(), e);
            Ok(1)
        }
    }
}

async fn schedule_command(
    orchestrator: &PublishOrchestrator,
    content: &ContentItem,
    request: &ScheduleRequest,
    json: bool,
) -> Result<i32> {
    match orchestrator.schedule_across_platforms(content, request).await {
        Ok(result) => {
            print_schedule(&result, json)?;
            Ok(if result.success { 0 } else { 1 })
        }
        Err(e) => {
            eprintln!("\n❌ Scheduling failed [{}]: {}", e.code(), e);
            Ok(1)
        }
    }
}

async fn health_command(orchestrator: &PublishOrchestrator, watch: bool, json: bool) -> Result<i32> {
    if !watch {
        let report = orchestrator.check_platform_health().await;
        print_health(&report, json)?;
        return Ok(if report.overall == OverallHealth::Critical { 1 } else { 0 });
    }

    let monitor = orchestrator.health_monitor();
    let interval = monitor.options().interval;
    monitor.start().await;
    println!("👀 Watching platform health every {}s (Ctrl-C to stop)", interval.as_secs());

    // first tick fires immediately
    tokio::time::sleep(Duration::from_millis(100)).await;
    loop {
        if let Some(report) = monitor.latest_report().await {
            print_health(&report, json)?;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    monitor.stop().await;
    Ok(0)
}

fn check_config_command(config: &PublisherConfig, json: bool) -> i32 {
    let result = ConfigLoader::validate(config);
    if json {
        let errors: Vec<String> = result
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        let warnings: Vec<String> = result
            .warnings
            .iter()
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();
        println!(
            "{}",
            serde_json::json!({ "valid": result.valid, "errors": errors, "warnings": warnings })
        );
    } else {
        println!("\n🔍 Configuration Check\n");
        println!("Platforms: {}", config.platforms.keys().cloned().collect::<Vec<_>>().join(", "));
        println!("{}", ConfigLoader::format_validation_result(&result));
    }
    if result.valid { 0 } else { 2 }
}

// ============================================================================
// Content files
// ============================================================================

async fn read_content_file(path: &Path) -> Result<Vec<ContentItem>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let parsed: ContentFile = if is_json {
        serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))?
    } else {
        serde_yaml::from_str(&text).with_context(|| format!("invalid YAML in {}", path.display()))?
    };

    Ok(match parsed {
        ContentFile::One(item) => vec![item],
        ContentFile::Many(items) => items,
    })
}

async fn read_single(path: &Path) -> Result<ContentItem> {
    let mut items = read_content_file(path).await?;
    if items.len() != 1 {
        bail!(
            "{} holds {} content items; use `bulk` for more than one",
            path.display(),
            items.len()
        );
    }
    Ok(items.remove(0))
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_publish(result: &MultiPlatformPublishResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    println!("\n📦 Publish Summary: {}\n", result.content_id);
    for (platform, outcome) in &result.results {
        if outcome.success {
            let location = outcome.url.as_deref().or(outcome.external_id.as_deref()).unwrap_or("-");
            println!("  ✅ {}: {} ({} attempt(s), {}ms)", platform, location, outcome.attempts, outcome.duration_ms);
        } else {
            println!(
                "  ❌ {}: [{}] {}",
                platform,
                outcome.error_code.as_deref().unwrap_or("ERROR"),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if let Some(rollback) = &result.rollback {
        println!("\n↩️  Rollback ({:?}) after {} failed", rollback.status, rollback.triggered_by);
        for platform in &rollback.not_supported {
            println!("  ⚠️  {}: deletion not supported, post is still live", platform);
        }
        for (platform, error) in &rollback.failed {
            println!("  ⚠️  {}: {}", platform, error);
        }
    }

    println!(
        "\nSucceeded: {} | Failed: {} | Duration: {}ms",
        result.success_count, result.failure_count, result.duration_ms
    );
    Ok(())
}

fn print_schedule(result: &MultiPlatformScheduleResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    println!("\n🗓️  Scheduled {} for {}\n", result.content_id, result.publish_at.to_rfc3339());
    for (platform, outcome) in &result.results {
        match (&outcome.schedule_id, &outcome.error) {
            (Some(id), _) if outcome.success => println!("  ✅ {}: {}", platform, id),
            (_, error) => println!(
                "  ❌ {}: [{}] {}",
                platform,
                outcome.error_code.as_deref().unwrap_or("ERROR"),
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!("\nSucceeded: {} | Failed: {}", result.success_count, result.failure_count);
    Ok(())
}

fn print_bulk(result: &BulkPublishResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    println!("\n📦 Bulk Publish Summary\n");
    for item in &result.results {
        let mark = if item.result.success { "✅" } else { "❌" };
        println!(
            "  {} {} → {}{}",
            mark,
            item.content_id,
            item.platform,
            item.result
                .error_code
                .as_deref()
                .map(|code| format!(" [{}]", code))
                .unwrap_or_default()
        );
    }
    if !result.skipped_contents.is_empty() {
        println!("\n⏭️  Skipped: {}", result.skipped_contents.join(", "));
    }
    println!(
        "\nTotal: {} | Succeeded: {} | Failed: {} | Duration: {}ms",
        result.total_items, result.success_count, result.failure_count, result.duration_ms
    );
    Ok(())
}

fn print_health(report: &PlatformHealthReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    let badge = match report.overall {
        OverallHealth::Healthy => "🟢 healthy",
        OverallHealth::Degraded => "🟡 degraded",
        OverallHealth::Critical => "🔴 critical",
    };
    println!("\n🩺 Platform Health: {}\n", badge);
    for (platform, check) in &report.platforms {
        println!("  {}: {:?} ({}ms)", platform, check.status, check.response_time_ms);
    }
    for issue in &report.issues {
        println!("  ⚠️  [{:?}] {}: {}", issue.severity, issue.platform, issue.message);
    }
    for recommendation in &report.recommendations {
        println!("  💡 {}", recommendation);
    }
    Ok(())
}
