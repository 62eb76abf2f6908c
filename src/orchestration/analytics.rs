//! Analytics Aggregator - Cross-platform engagement analytics
//!
//! Features:
//! - Collect analytics concurrently from every adapter that supports them
//! - Totals, averaged rates and the top platform
//! - Insights and per-platform recommendations
//! - Comparative ranking by a chosen metric
//! - Markdown report

use crate::adapters::registry::AdapterRegistry;
use crate::core::capabilities::Capability;
use crate::core::traits::{PlatformAdapter, PlatformAnalytics, TimeRange};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Engagement rate multiple over the fleet average flagged as an opportunity
pub const OPPORTUNITY_FACTOR: f64 = 1.5;

/// Engagement rate (percent) below which a platform gets a recommendation
pub const LOW_ENGAGEMENT_RATE: f64 = 2.0;

/// Bounce rate (percent) above which a platform gets a recommendation
pub const HIGH_BOUNCE_RATE: f64 = 70.0;

/// Summed counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTotals {
    pub views: u64,
    pub engagements: u64,
    pub shares: u64,
    pub conversions: u64,
    pub revenue: f64,
}

/// Rates averaged over the reporting platforms (percentages)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsAverages {
    pub engagement_rate: f64,
    pub bounce_rate: f64,
    pub click_through_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsightKind {
    TopPerformer,
    Opportunity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsInsight {
    pub kind: InsightKind,
    pub platform: String,
    pub message: String,
}

/// Analytics across the fleet for one time range
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedAnalytics {
    pub range: TimeRange,
    pub platforms: BTreeMap<String, PlatformAnalytics>,
    pub totals: AnalyticsTotals,
    pub averages: AnalyticsAverages,
    pub top_platform: Option<String>,
    pub insights: Vec<AnalyticsInsight>,
    pub recommendations: BTreeMap<String, Vec<String>>,
    /// Platforms whose analytics call failed, with the error
    pub failed_platforms: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
}

/// Metric used to rank platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonMetric {
    Views,
    Engagements,
    Shares,
    Conversions,
    Revenue,
    EngagementRate,
    BounceRate,
    ClickThroughRate,
}

impl ComparisonMetric {
    pub const ALL: [ComparisonMetric; 8] = [
        ComparisonMetric::Views,
        ComparisonMetric::Engagements,
        ComparisonMetric::Shares,
        ComparisonMetric::Conversions,
        ComparisonMetric::Revenue,
        ComparisonMetric::EngagementRate,
        ComparisonMetric::BounceRate,
        ComparisonMetric::ClickThroughRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonMetric::Views => "views",
            ComparisonMetric::Engagements => "engagements",
            ComparisonMetric::Shares => "shares",
            ComparisonMetric::Conversions => "conversions",
            ComparisonMetric::Revenue => "revenue",
            ComparisonMetric::EngagementRate => "engagement-rate",
            ComparisonMetric::BounceRate => "bounce-rate",
            ComparisonMetric::ClickThroughRate => "click-through-rate",
        }
    }

    pub fn value(&self, analytics: &PlatformAnalytics) -> f64 {
        match self {
            ComparisonMetric::Views => analytics.views as f64,
            ComparisonMetric::Engagements => analytics.engagements as f64,
            ComparisonMetric::Shares => analytics.shares as f64,
            ComparisonMetric::Conversions => analytics.conversions as f64,
            ComparisonMetric::Revenue => analytics.revenue,
            ComparisonMetric::EngagementRate => analytics.engagement_rate,
            ComparisonMetric::BounceRate => analytics.bounce_rate,
            ComparisonMetric::ClickThroughRate => analytics.click_through_rate,
        }
    }
}

impl fmt::Display for ComparisonMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        ComparisonMetric::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = ComparisonMetric::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown metric '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRanking {
    pub rank: usize,
    pub platform: String,
    pub value: f64,
    /// Percentage of the metric total across ranked platforms
    pub share_of_total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparativeAnalytics {
    pub metric: ComparisonMetric,
    pub range: TimeRange,
    pub rankings: Vec<PlatformRanking>,
    pub total: f64,
    pub failed_platforms: BTreeMap<String, String>,
}

/// Collects analytics from registered adapters
pub struct AnalyticsAggregator {
    registry: Arc<AdapterRegistry>,
}

impl AnalyticsAggregator {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Analytics of every adapter that supports them, plus failures
    async fn collect(
        &self,
        range: &TimeRange,
    ) -> (BTreeMap<String, PlatformAnalytics>, BTreeMap<String, String>) {
        let adapters: Vec<Arc<dyn PlatformAdapter>> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|a| a.capabilities().supports(Capability::Analytics))
            .collect();

        let fetched = join_all(adapters.iter().map(|adapter| async move {
            (adapter.name().to_string(), adapter.get_analytics(range).await)
        }))
        .await;

        let mut platforms = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for (name, outcome) in fetched {
            match outcome {
                Ok(mut analytics) => {
                    analytics.platform = name.clone();
                    platforms.insert(name, analytics);
                }
                Err(e) => {
                    warn!(platform = %name, error = %e, "analytics unavailable");
                    failed.insert(name, e.to_string());
                }
            }
        }

        debug!(reporting = platforms.len(), failed = failed.len(), "collected analytics");
        (platforms, failed)
    }

    pub async fn get_aggregated_analytics(&self, range: &TimeRange) -> AggregatedAnalytics {
        let (platforms, failed) = self.collect(range).await;
        aggregate(range.clone(), platforms, failed)
    }

    pub async fn get_comparative_analytics(
        &self,
        range: &TimeRange,
        metric: ComparisonMetric,
    ) -> ComparativeAnalytics {
        let (platforms, failed) = self.collect(range).await;
        compare(range.clone(), &platforms, metric, failed)
    }
}

/// Fold per-platform analytics into fleet totals, insights and recommendations
pub fn aggregate(
    range: TimeRange,
    platforms: BTreeMap<String, PlatformAnalytics>,
    failed_platforms: BTreeMap<String, String>,
) -> AggregatedAnalytics {
    let mut totals = AnalyticsTotals::default();
    for analytics in platforms.values() {
        totals.views += analytics.views;
        totals.engagements += analytics.engagements;
        totals.shares += analytics.shares;
        totals.conversions += analytics.conversions;
        totals.revenue += analytics.revenue;
    }

    let count = platforms.len().max(1) as f64;
    let averages = AnalyticsAverages {
        engagement_rate: platforms.values().map(|a| a.engagement_rate).sum::<f64>() / count,
        bounce_rate: platforms.values().map(|a| a.bounce_rate).sum::<f64>() / count,
        click_through_rate: platforms.values().map(|a| a.click_through_rate).sum::<f64>() / count,
    };

    // BTreeMap order makes ties resolve to the first name
    let top_platform = platforms
        .values()
        .fold(None::<&PlatformAnalytics>, |best, a| match best {
            Some(b) if b.views + b.engagements >= a.views + a.engagements => Some(b),
            _ => Some(a),
        })
        .map(|a| a.platform.clone());

    let mut insights = Vec::new();
    if let Some(top) = &top_platform {
        insights.push(AnalyticsInsight {
            kind: InsightKind::TopPerformer,
            platform: top.clone(),
            message: format!("{} has the most views and engagements", top),
        });
    }
    for analytics in platforms.values() {
        if averages.engagement_rate > 0.0
            && analytics.engagement_rate > averages.engagement_rate * OPPORTUNITY_FACTOR
        {
            insights.push(AnalyticsInsight {
                kind: InsightKind::Opportunity,
                platform: analytics.platform.clone(),
                message: format!(
                    "{} engagement rate {:.1}% is well above the {:.1}% average; consider publishing more there",
                    analytics.platform, analytics.engagement_rate, averages.engagement_rate
                ),
            });
        }
    }

    let mut recommendations = BTreeMap::new();
    for analytics in platforms.values() {
        let mut advice = Vec::new();
        if analytics.engagement_rate < LOW_ENGAGEMENT_RATE {
            advice.push(format!(
                "Engagement rate is {:.1}%: try stronger calls to action or different topics",
                analytics.engagement_rate
            ));
        }
        if analytics.bounce_rate > HIGH_BOUNCE_RATE {
            advice.push(format!(
                "Bounce rate is {:.1}%: improve the opening and internal linking",
                analytics.bounce_rate
            ));
        }
        if !advice.is_empty() {
            recommendations.insert(analytics.platform.clone(), advice);
        }
    }

    AggregatedAnalytics {
        range,
        platforms,
        totals,
        averages,
        top_platform,
        insights,
        recommendations,
        failed_platforms,
        generated_at: Utc::now(),
    }
}

/// Rank platforms by `metric`, highest first
pub fn compare(
    range: TimeRange,
    platforms: &BTreeMap<String, PlatformAnalytics>,
    metric: ComparisonMetric,
    failed_platforms: BTreeMap<String, String>,
) -> ComparativeAnalytics {
    let mut values: Vec<(&String, f64)> = platforms
        .iter()
        .map(|(name, analytics)| (name, metric.value(analytics)))
        .collect();
    values.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let total: f64 = values.iter().map(|(_, v)| v).sum();
    let rankings = values
        .into_iter()
        .enumerate()
        .map(|(i, (name, value))| PlatformRanking {
            rank: i + 1,
            platform: name.clone(),
            value,
            share_of_total: if total > 0.0 { value / total * 100.0 } else { 0.0 },
        })
        .collect();

    ComparativeAnalytics {
        metric,
        range,
        rankings,
        total,
        failed_platforms,
    }
}

/// Markdown summary of aggregated analytics
pub fn generate_markdown_report(analytics: &AggregatedAnalytics) -> String {
    let mut lines = Vec::new();

    lines.push("# Cross-Platform Analytics Report\n".to_string());
    lines.push(format!(
        "**Period**: {} to {}\n",
        analytics.range.start.format("%Y-%m-%d"),
        analytics.range.end.format("%Y-%m-%d")
    ));

    lines.push("## Totals\n".to_string());
    lines.push(format!("- **Views**: {}", analytics.totals.views));
    lines.push(format!("- **Engagements**: {}", analytics.totals.engagements));
    lines.push(format!("- **Shares**: {}", analytics.totals.shares));
    lines.push(format!("- **Conversions**: {}", analytics.totals.conversions));
    lines.push(format!("- **Revenue**: {:.2}", analytics.totals.revenue));
    lines.push(format!(
        "- **Avg Engagement Rate**: {:.2}%\n",
        analytics.averages.engagement_rate
    ));

    if !analytics.platforms.is_empty() {
        lines.push("## Platforms\n".to_string());
        lines.push("| Platform | Views | Engagements | Shares | Engagement Rate | Bounce Rate |".to_string());
        lines.push("|----------|-------|-------------|--------|-----------------|-------------|".to_string());
        for a in analytics.platforms.values() {
            lines.push(format!(
                "| {} | {} | {} | {} | {:.1}% | {:.1}% |",
                a.platform, a.views, a.engagements, a.shares, a.engagement_rate, a.bounce_rate
            ));
        }
        lines.push(String::new());
    }

    if !analytics.insights.is_empty() {
        lines.push("## Insights\n".to_string());
        for insight in &analytics.insights {
            lines.push(format!("- {}", insight.message));
        }
        lines.push(String::new());
    }

    if !analytics.recommendations.is_empty() {
        lines.push("## Recommendations\n".to_string());
        for (platform, advice) in &analytics.recommendations {
            for item in advice {
                lines.push(format!("- **{}**: {}", platform, item));
            }
        }
        lines.push(String::new());
    }

    if !analytics.failed_platforms.is_empty() {
        lines.push("## Unavailable\n".to_string());
        for (platform, error) in &analytics.failed_platforms {
            lines.push(format!("- ⚠️ {}: {}", platform, error));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analytics(platform: &str, views: u64, engagements: u64, rate: f64, bounce: f64) -> PlatformAnalytics {
        PlatformAnalytics {
            platform: platform.to_string(),
            views,
            engagements,
            engagement_rate: rate,
            bounce_rate: bounce,
            ..Default::default()
        }
    }

    fn fleet() -> BTreeMap<String, PlatformAnalytics> {
        [
            analytics("a", 1000, 50, 5.0, 40.0),
            analytics("b", 400, 80, 20.0, 30.0),
            analytics("c", 2000, 10, 0.5, 85.0),
        ]
        .into_iter()
        .map(|a| (a.platform.clone(), a))
        .collect()
    }

    #[test]
    fn test_aggregate_totals_and_top_platform() {
        let result = aggregate(TimeRange::last_days(7), fleet(), BTreeMap::new());

        assert_eq!(result.totals.views, 3400);
        assert_eq!(result.totals.engagements, 140);
        assert!((result.averages.engagement_rate - 8.5).abs() < 1e-9);
        assert_eq!(result.top_platform.as_deref(), Some("c"));
    }

    #[test]
    fn test_insights_and_recommendations() {
        let result = aggregate(TimeRange::last_days(7), fleet(), BTreeMap::new());

        let opportunities: Vec<&str> = result
            .insights
            .iter()
            .filter(|i| i.kind == InsightKind::Opportunity)
            .map(|i| i.platform.as_str())
            .collect();
        assert_eq!(opportunities, vec!["b"]);
        assert_eq!(result.recommendations["c"].len(), 2);
        assert!(!result.recommendations.contains_key("a"));
    }

    #[test]
    fn test_compare_by_metric() {
        let result = compare(
            TimeRange::last_days(7),
            &fleet(),
            ComparisonMetric::Engagements,
            BTreeMap::new(),
        );

        let order: Vec<&str> = result.rankings.iter().map(|r| r.platform.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(result.rankings[0].rank, 1);
        assert!((result.rankings[0].share_of_total - 80.0 / 140.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("engagement_rate".parse::<ComparisonMetric>(), Ok(ComparisonMetric::EngagementRate));
        assert_eq!("Views".parse::<ComparisonMetric>(), Ok(ComparisonMetric::Views));
        assert!("likes".parse::<ComparisonMetric>().is_err());
    }

    #[test]
    fn test_markdown_report() {
        let mut failed = BTreeMap::new();
        failed.insert("hook".to_string(), "not supported".to_string());

        let report = generate_markdown_report(&aggregate(TimeRange::last_days(7), fleet(), failed));

        assert!(report.contains("# Cross-Platform Analytics Report"));
        assert!(report.contains("| b | 400 | 80 |"));
        assert!(report.contains("## Unavailable"));
    }

    #[tokio::test]
    async fn test_collect_skips_adapters_without_analytics() {
        use crate::adapters::memory_adapter::MemoryAdapter;
        use crate::core::capabilities::PlatformCapabilities;

        let registry = Arc::new(AdapterRegistry::new());
        let reporting = Arc::new(MemoryAdapter::new("mem"));
        reporting
            .authenticate(crate::security::credentials::PlatformCredentials::bearer("tok"))
            .await
            .unwrap();
        reporting.set_analytics(analytics("mem", 10, 1, 10.0, 0.0)).await;
        registry.insert(reporting).await;
        registry
            .insert(Arc::new(MemoryAdapter::with_capabilities(
                "quiet",
                PlatformCapabilities::default(),
            )))
            .await;

        let result = AnalyticsAggregator::new(registry)
            .get_aggregated_analytics(&TimeRange::last_days(1))
            .await;

        assert_eq!(result.platforms.len(), 1);
        assert!(result.failed_platforms.is_empty());
        assert_eq!(result.totals.views, 10);
    }
}
