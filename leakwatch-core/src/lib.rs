//! Leakwatch core library - risk scoring and aggregation for personal-data access logs

// Global invariants enforced in this crate:
// - Scoring is strictly per-record and depends only on the record's fields
// - A dataset is immutable once published; every view is derived from it
// - No global mutable state
// - No randomness, clocks, threads, or async
// - Deterministic ordering must be explicit (stable sorts, first-encountered groups)
// - Identical input yields byte-for-byte identical output

pub mod aggregates;
pub mod cache;
pub mod config;
pub mod encoding;
pub mod filter;
pub mod ingest;
pub mod record;
pub mod report;
pub mod scenario;
pub mod scoring;
pub mod summary;

pub use aggregates::{AggregationResult, GroupValue, RankingMetric};
pub use cache::DatasetCache;
pub use config::ResolvedConfig;
pub use ingest::{ingest_bytes, ingest_file, Dataset, IngestOptions, IngestStats};
pub use record::{Column, LogRecord};
pub use report::{render_json, render_text, ReportRow};
pub use scenario::ScenarioId;
pub use scoring::ScoringStrategy;
pub use summary::Summary;

use anyhow::Result;
use serde::Serialize;

/// Every derived view of one dataset under one configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Analysis {
    pub scoring: ScoringStrategy,
    pub ingest: IngestStats,
    /// Headline metrics over the category-filtered records
    pub summary: Summary,
    /// Name of the active selection ("all", a scenario id, or ids joined by "+")
    pub selection: String,
    pub active_scenarios: Vec<ScenarioId>,
    pub sort_key: Column,
    /// Display set, sorted by `sort_key` descending
    pub records: Vec<ReportRow>,
    pub hourly_mean_risk: AggregationResult<u8>,
    pub hourly_access_counts: AggregationResult<u8>,
    pub ranking_metric: RankingMetric,
    pub top_employees: AggregationResult<String>,
    /// Category-filtered records at or above the review threshold
    pub review: Vec<ReportRow>,
}

/// Run the full pipeline over an ingested dataset
///
/// The category allow-list narrows every view. Time series and rankings are
/// computed over the display set.
pub fn analyze(dataset: &Dataset, config: &ResolvedConfig) -> Result<Analysis> {
    let policy = &config.filter;
    let display = filter::apply(dataset.records(), policy)?;
    let in_scope = filter::filter_categories(dataset.records(), &policy.categories);

    let summary = summary::summarize(
        in_scope.iter().copied(),
        &policy.thresholds,
        config.scraping_metric_threshold,
    );
    let ranking_metric = RankingMetric::for_scenarios(&display.active);
    let records = report::build_report(&display);

    Ok(Analysis {
        scoring: dataset.strategy(),
        ingest: dataset.stats().clone(),
        summary,
        selection: display.name.clone(),
        active_scenarios: display.active.clone(),
        sort_key: display.sort_key,
        hourly_mean_risk: aggregates::hourly_mean_risk(display.records.iter().copied()),
        hourly_access_counts: aggregates::hourly_access_counts(display.records.iter().copied()),
        top_employees: aggregates::top_employees(
            display.records.iter().copied(),
            ranking_metric,
            config.top_k,
        ),
        ranking_metric,
        review: report::review_report(
            in_scope.iter().copied(),
            config.review_threshold,
            dataset.strategy(),
        ),
        records,
    })
}

/// Ingest a file and analyze it in one step
pub fn analyze_file(path: &std::path::Path, config: &ResolvedConfig) -> Result<Analysis> {
    let dataset = ingest_file(path, &config.ingest)?;
    analyze(&dataset, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_record;

    fn dataset() -> Dataset {
        let mut a = test_record("E1", 23);
        a.mask_disabled = true;
        a.is_night_shift = true;
        a.query_length = 320;
        let mut b = test_record("E2", 10);
        b.query_length = 600;
        let mut c = test_record("E3", 2);
        c.is_night_shift = true;
        c.task_category = Some("정산".to_string());
        Dataset::from_records(vec![a, b, c], ScoringStrategy::Additive)
    }

    #[test]
    fn test_analyze_defaults() {
        let config = ResolvedConfig::defaults().unwrap();
        let analysis = analyze(&dataset(), &config).unwrap();
        assert_eq!(analysis.selection, "all");
        assert_eq!(analysis.records.len(), 3);
        assert_eq!(analysis.records[0].employee_id, "E1");
        assert_eq!(analysis.records[0].risk_score, 100);
        assert_eq!(analysis.summary.immediate_review, 1);
        assert_eq!(analysis.summary.scraping_suspects, 1);
        assert_eq!(analysis.summary.night_access, 2);
        assert_eq!(analysis.hourly_mean_risk.len(), 24);
        assert_eq!(analysis.ranking_metric, RankingMetric::RiskScore);
        assert_eq!(analysis.top_employees.groups[0].key, "E1");
        let review: Vec<&str> = analysis.review.iter().map(|r| r.employee_id.as_str()).collect();
        // E3 scores 30 (night only) and stays below the review threshold
        assert_eq!(review, vec!["E1"]);
    }

    #[test]
    fn test_bulk_scenario_ranks_by_length() {
        let mut config = ResolvedConfig::defaults().unwrap();
        config.filter.active = vec![ScenarioId::BulkQuerySuspect];
        let analysis = analyze(&dataset(), &config).unwrap();
        assert_eq!(analysis.sort_key, Column::QueryLength);
        assert_eq!(analysis.ranking_metric, RankingMetric::QueryLength);
        let ids: Vec<&str> = analysis.records.iter().map(|r| r.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["E2", "E1"]);
        assert_eq!(analysis.top_employees.groups[0].key, "E2");
    }

    #[test]
    fn test_categories_narrow_every_view() {
        let mut config = ResolvedConfig::defaults().unwrap();
        config.filter.categories = vec!["정산".to_string()];
        let analysis = analyze(&dataset(), &config).unwrap();
        assert_eq!(analysis.records.len(), 1);
        assert_eq!(analysis.summary.total, 1);
        assert_eq!(analysis.summary.immediate_review, 0);
        assert_eq!(analysis.review.len(), 0);
    }
}
