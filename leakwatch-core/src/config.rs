//! Configuration file support for Leakwatch
//!
//! Loads analysis settings from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.leakwatchrc.json` in the working directory
//! 3. `leakwatch.config.json` in the working directory
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::aggregates::DEFAULT_TOP_K;
use crate::encoding::SourceEncoding;
use crate::filter::{FilterMode, FilterPolicy};
use crate::ingest::{IngestOptions, DEFAULT_MASK_DISABLED_VALUES, DEFAULT_NIGHT_SHIFT_LABELS};
use crate::scenario::{
    ScenarioId, Thresholds, BULK_LENGTH_THRESHOLD_RANGE, DEFAULT_BULK_LENGTH_THRESHOLD,
    DEFAULT_HIGH_RISK_THRESHOLD,
};
use crate::scoring::ScoringMode;
use crate::summary::{DEFAULT_REVIEW_THRESHOLD, DEFAULT_SCRAPING_METRIC_THRESHOLD};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Highest score the additive rules can produce
const MAX_RISK_SCORE: u32 = 100;

/// Leakwatch configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeakwatchConfig {
    /// Scenarios active when none are given on the command line
    #[serde(default)]
    pub active_scenarios: Vec<ScenarioId>,

    /// How active scenarios combine (default: any)
    #[serde(default)]
    pub filter_mode: Option<FilterMode>,

    /// Query length for the bulk-query scenario (default: 300, range 100-1000)
    #[serde(default)]
    pub bulk_length_threshold: Option<u32>,

    /// Risk score needing immediate review (default: 80)
    #[serde(default)]
    pub high_risk_threshold: Option<u32>,

    /// Minimum risk score in the review report (default: 50)
    #[serde(default)]
    pub review_threshold: Option<u32>,

    /// Query length counted as scraping in the summary (default: 500)
    #[serde(default)]
    pub scraping_metric_threshold: Option<u32>,

    /// Employees shown in rankings (default: 5)
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Source and export encoding (default: utf-8)
    #[serde(default)]
    pub encoding: Option<String>,

    /// Field delimiter, a single ASCII character (default: ",")
    #[serde(default)]
    pub delimiter: Option<String>,

    /// Scoring strategy selection (default: auto)
    #[serde(default)]
    pub scoring: Option<ScoringMode>,

    /// Shift labels that mark night access
    #[serde(default)]
    pub night_shift_labels: Option<Vec<String>>,

    /// Flag values that mark a mask-disabled access
    #[serde(default)]
    pub mask_disabled_values: Option<Vec<String>>,

    /// Task-category allow-list (empty means all)
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Resolved configuration ready for use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub ingest: IngestOptions,
    pub filter: FilterPolicy,
    pub review_threshold: u32,
    pub scraping_metric_threshold: u32,
    pub top_k: usize,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

fn parse_delimiter(value: &str) -> Result<u8> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() && !matches!(c, '"' | '\n' | '\r') => Ok(c as u8),
        _ => anyhow::bail!(
            "delimiter must be a single ASCII character other than a quote or newline (got {:?})",
            value
        ),
    }
}

fn validate_labels(field: &str, labels: &[String]) -> Result<()> {
    if labels.is_empty() {
        anyhow::bail!("{} must not be empty", field);
    }
    if labels.iter().any(|l| l.trim().is_empty()) {
        anyhow::bail!("{} must not contain blank values", field);
    }
    Ok(())
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl LeakwatchConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(bulk) = self.bulk_length_threshold {
            if !BULK_LENGTH_THRESHOLD_RANGE.contains(&bulk) {
                anyhow::bail!(
                    "bulk_length_threshold must be between {} and {} (got {})",
                    BULK_LENGTH_THRESHOLD_RANGE.start(),
                    BULK_LENGTH_THRESHOLD_RANGE.end(),
                    bulk
                );
            }
        }

        for (name, value) in [
            ("high_risk_threshold", self.high_risk_threshold),
            ("review_threshold", self.review_threshold),
        ] {
            if let Some(v) = value {
                if v > MAX_RISK_SCORE {
                    anyhow::bail!("{} must be at most {} (got {})", name, MAX_RISK_SCORE, v);
                }
            }
        }

        if self.scraping_metric_threshold == Some(0) {
            anyhow::bail!("scraping_metric_threshold must be positive (got 0)");
        }

        if self.top_k == Some(0) {
            anyhow::bail!("top_k must be at least 1 (got 0)");
        }

        if let Some(ref encoding) = self.encoding {
            encoding
                .parse::<SourceEncoding>()
                .map_err(anyhow::Error::msg)
                .context("invalid encoding")?;
        }

        if let Some(ref delimiter) = self.delimiter {
            parse_delimiter(delimiter)?;
        }

        if let Some(ref labels) = self.night_shift_labels {
            validate_labels("night_shift_labels", labels)?;
        }
        if let Some(ref values) = self.mask_disabled_values {
            validate_labels("mask_disabled_values", values)?;
        }

        if self.filter_mode == Some(FilterMode::Single) && self.active_scenarios.len() > 1 {
            anyhow::bail!(
                "filter_mode \"single\" accepts at most one active scenario (got {})",
                self.active_scenarios.len()
            );
        }

        Ok(())
    }

    /// Resolve config into the form the pipeline consumes
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let encoding = match &self.encoding {
            Some(e) => e.parse::<SourceEncoding>().map_err(anyhow::Error::msg)?,
            None => SourceEncoding::default(),
        };
        let delimiter = match &self.delimiter {
            Some(d) => parse_delimiter(d)?,
            None => b',',
        };

        let ingest = IngestOptions {
            encoding,
            delimiter,
            scoring: self.scoring.unwrap_or_default(),
            night_shift_labels: self
                .night_shift_labels
                .clone()
                .unwrap_or_else(|| owned(DEFAULT_NIGHT_SHIFT_LABELS)),
            mask_disabled_values: self
                .mask_disabled_values
                .clone()
                .unwrap_or_else(|| owned(DEFAULT_MASK_DISABLED_VALUES)),
        };

        let filter = FilterPolicy {
            mode: self.filter_mode.unwrap_or_default(),
            active: self.active_scenarios.clone(),
            thresholds: Thresholds {
                high_risk: self.high_risk_threshold.unwrap_or(DEFAULT_HIGH_RISK_THRESHOLD),
                bulk_length: self
                    .bulk_length_threshold
                    .unwrap_or(DEFAULT_BULK_LENGTH_THRESHOLD),
            },
            categories: self.categories.clone(),
        };

        Ok(ResolvedConfig {
            ingest,
            filter,
            review_threshold: self.review_threshold.unwrap_or(DEFAULT_REVIEW_THRESHOLD),
            scraping_metric_threshold: self
                .scraping_metric_threshold
                .unwrap_or(DEFAULT_SCRAPING_METRIC_THRESHOLD),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        LeakwatchConfig::default().resolve()
    }

    /// Fully populated config equivalent to this resolution
    pub fn effective(&self) -> LeakwatchConfig {
        LeakwatchConfig {
            active_scenarios: self.filter.active.clone(),
            filter_mode: Some(self.filter.mode),
            bulk_length_threshold: Some(self.filter.thresholds.bulk_length),
            high_risk_threshold: Some(self.filter.thresholds.high_risk),
            review_threshold: Some(self.review_threshold),
            scraping_metric_threshold: Some(self.scraping_metric_threshold),
            top_k: Some(self.top_k),
            encoding: Some(self.ingest.encoding.as_str().to_string()),
            delimiter: Some((self.ingest.delimiter as char).to_string()),
            scoring: Some(self.ingest.scoring),
            night_shift_labels: Some(self.ingest.night_shift_labels.clone()),
            mask_disabled_values: Some(self.ingest.mask_disabled_values.clone()),
            categories: self.filter.categories.clone(),
        }
    }
}

/// Discover and load a config file from a directory
///
/// Search order:
/// 1. `.leakwatchrc.json`
/// 2. `leakwatch.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(dir: &Path) -> Result<Option<(LeakwatchConfig, PathBuf)>> {
    for name in [".leakwatchrc.json", "leakwatch.config.json"] {
        let path = dir.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<LeakwatchConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: LeakwatchConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `dir`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(dir: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(dir)? {
            Some((config, path)) => (config, Some(path)),
            None => (LeakwatchConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config_is_valid() {
        let config = LeakwatchConfig::default();
        config.validate().expect("default config should be valid");
        let resolved = config.resolve().expect("default config should resolve");
        assert_eq!(resolved.filter.mode, FilterMode::Any);
        assert!(resolved.filter.active.is_empty());
        assert_eq!(resolved.filter.thresholds.bulk_length, 300);
        assert_eq!(resolved.filter.thresholds.high_risk, 80);
        assert_eq!(resolved.review_threshold, 50);
        assert_eq!(resolved.scraping_metric_threshold, 500);
        assert_eq!(resolved.top_k, 5);
        assert_eq!(resolved.ingest, IngestOptions::default());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: LeakwatchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LeakwatchConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "active_scenarios": ["night-access"],
            "filter_mode": "single",
            "bulk_length_threshold": 450,
            "high_risk_threshold": 70,
            "review_threshold": 30,
            "scraping_metric_threshold": 800,
            "top_k": 10,
            "encoding": "cp949",
            "delimiter": ";",
            "scoring": "legacy",
            "night_shift_labels": ["야간"],
            "mask_disabled_values": ["Y", "예"],
            "categories": ["상담"]
        }"#;
        let config: LeakwatchConfig = serde_json::from_str(json).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.filter.mode, FilterMode::Single);
        assert_eq!(resolved.filter.active, vec![ScenarioId::NightAccess]);
        assert_eq!(resolved.filter.thresholds.bulk_length, 450);
        assert_eq!(resolved.filter.thresholds.high_risk, 70);
        assert_eq!(resolved.review_threshold, 30);
        assert_eq!(resolved.scraping_metric_threshold, 800);
        assert_eq!(resolved.top_k, 10);
        assert_eq!(resolved.ingest.encoding, SourceEncoding::Cp949);
        assert_eq!(resolved.ingest.delimiter, b';');
        assert_eq!(resolved.ingest.scoring, ScoringMode::Legacy);
        assert_eq!(resolved.ingest.night_shift_labels, vec!["야간"]);
        assert_eq!(resolved.ingest.mask_disabled_values, vec!["Y", "예"]);
        assert_eq!(resolved.filter.categories, vec!["상담"]);
    }

    #[test]
    fn test_reject_unknown_fields() {
        let result: std::result::Result<LeakwatchConfig, _> =
            serde_json::from_str(r#"{"bulk_threshold": 300}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_unknown_scenario() {
        let result: std::result::Result<LeakwatchConfig, _> =
            serde_json::from_str(r#"{"active_scenarios": ["everything"]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_bulk_threshold_bounds() {
        for (value, ok) in [(99, false), (100, true), (1000, true), (1001, false)] {
            let config = LeakwatchConfig {
                bulk_length_threshold: Some(value),
                ..LeakwatchConfig::default()
            };
            assert_eq!(config.validate().is_ok(), ok, "bulk threshold {}", value);
        }
    }

    #[test]
    fn test_reject_threshold_above_max_score() {
        let config = LeakwatchConfig {
            high_risk_threshold: Some(101),
            ..LeakwatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_zero_top_k() {
        let config = LeakwatchConfig {
            top_k: Some(0),
            ..LeakwatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_bad_encoding_and_delimiter() {
        let config = LeakwatchConfig {
            encoding: Some("latin-1".to_string()),
            ..LeakwatchConfig::default()
        };
        assert!(config.validate().is_err());

        for bad in ["", ";;", "\"", "가"] {
            let config = LeakwatchConfig {
                delimiter: Some(bad.to_string()),
                ..LeakwatchConfig::default()
            };
            assert!(config.validate().is_err(), "delimiter {:?}", bad);
        }
    }

    #[test]
    fn test_reject_multiple_scenarios_in_single_mode() {
        let config = LeakwatchConfig {
            filter_mode: Some(FilterMode::Single),
            active_scenarios: vec![ScenarioId::NightAccess, ScenarioId::ImmediateReview],
            ..LeakwatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_empty_label_lists() {
        let config = LeakwatchConfig {
            night_shift_labels: Some(vec![]),
            ..LeakwatchConfig::default()
        };
        assert!(config.validate().is_err());
        let config = LeakwatchConfig {
            mask_disabled_values: Some(vec![" ".to_string()]),
            ..LeakwatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_discover_leakwatchrc() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".leakwatchrc.json"),
            r#"{"top_k": 3}"#,
        )
        .unwrap();

        let (config, path) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.top_k, Some(3));
        assert!(path.ends_with(".leakwatchrc.json"));
    }

    #[test]
    fn test_discover_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".leakwatchrc.json"), r#"{"top_k": 3}"#).unwrap();
        fs::write(dir.path().join("leakwatch.config.json"), r#"{"top_k": 7}"#).unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.top_k, Some(3));

        fs::remove_file(dir.path().join(".leakwatchrc.json")).unwrap();
        let (config, path) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.top_k, Some(7));
        assert!(path.ends_with("leakwatch.config.json"));
    }

    #[test]
    fn test_no_config_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_and_resolve_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = load_and_resolve(dir.path(), None).unwrap();
        assert!(resolved.config_path.is_none());
        assert_eq!(resolved.top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn test_load_and_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.json");
        fs::write(&custom, r#"{"bulk_length_threshold": 500}"#).unwrap();

        let resolved = load_and_resolve(dir.path(), Some(&custom)).unwrap();
        assert_eq!(resolved.filter.thresholds.bulk_length, 500);
        assert_eq!(resolved.config_path.as_deref(), Some(custom.as_path()));
    }

    #[test]
    fn test_invalid_file_names_path_in_error() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("bad.json");
        fs::write(&custom, r#"{"bulk_length_threshold": 5}"#).unwrap();

        let err = load_config_file(&custom).unwrap_err();
        assert!(format!("{:#}", err).contains("bad.json"));
        assert!(format!("{:#}", err).contains("bulk_length_threshold"));
    }

    #[test]
    fn test_effective_config_round_trips() {
        let resolved = ResolvedConfig::defaults().unwrap();
        let effective = resolved.effective();
        let json = serde_json::to_string(&effective).unwrap();
        let parsed: LeakwatchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.resolve().unwrap(), resolved);
    }
}
