//! Classifier / filter engine
//!
//! Selects the display subset of a scored dataset from the active scenarios.
//!
//! Global invariants enforced:
//! - `Any` mode with no active scenario is "no filter": the full set
//! - `Any` mode returns a union in input order, each record at most once
//! - `Single` mode pairs the subset with its scenario's sort column
//! - Filtering never reorders or mutates records

use crate::record::{Column, LogRecord};
use crate::scenario::{ScenarioId, Thresholds};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How active scenarios combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Union of every active scenario (multi-select OR)
    #[default]
    Any,
    /// Exactly one scenario, or all records
    Single,
}

impl FilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMode::Any => "any",
            FilterMode::Single => "single",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "or" => Ok(FilterMode::Any),
            "single" => Ok(FilterMode::Single),
            other => Err(format!(
                "unknown filter mode '{}' (expected any or single)",
                other
            )),
        }
    }
}

/// Single-select choice: one scenario or the implicit "all records"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    All,
    Scenario(ScenarioId),
}

impl Selection {
    /// Sort column for presentation
    pub fn sort_key(&self) -> Column {
        match self {
            Selection::All => Column::RiskScore,
            Selection::Scenario(id) => id.scenario().sort_key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Selection::All => "all",
            Selection::Scenario(id) => id.as_str(),
        }
    }

    pub fn matches(&self, record: &LogRecord, thresholds: &Thresholds) -> bool {
        match self {
            Selection::All => true,
            Selection::Scenario(id) => id.scenario().matches(record, thresholds),
        }
    }
}

/// Complete filter configuration for one request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterPolicy {
    pub mode: FilterMode,
    pub active: Vec<ScenarioId>,
    pub thresholds: Thresholds,
    /// Task-category allow-list applied before scenarios (empty = all)
    pub categories: Vec<String>,
}

/// The records chosen for display, with their presentation sort column
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySet<'a> {
    pub records: Vec<&'a LogRecord>,
    pub sort_key: Column,
    /// Name of the active selection, used to label exports
    pub name: String,
    pub active: Vec<ScenarioId>,
}

/// Keep records whose task category is in the allow-list
///
/// An empty allow-list keeps everything. Records with no category never
/// match a non-empty allow-list.
pub fn filter_categories<'a>(records: &'a [LogRecord], categories: &[String]) -> Vec<&'a LogRecord> {
    if categories.is_empty() {
        return records.iter().collect();
    }
    records
        .iter()
        .filter(|r| {
            r.task_category
                .as_deref()
                .is_some_and(|c| categories.iter().any(|allowed| allowed == c))
        })
        .collect()
}

/// Multi-select OR: records matching any active scenario
pub fn select_any<'a>(
    records: &[&'a LogRecord],
    active: &[ScenarioId],
    thresholds: &Thresholds,
) -> Vec<&'a LogRecord> {
    if active.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .copied()
        .filter(|r| {
            active
                .iter()
                .any(|id| id.scenario().matches(r, thresholds))
        })
        .collect()
}

/// Single-select: the selection's subset and its sort column
pub fn select_single<'a>(
    records: &[&'a LogRecord],
    selection: Selection,
    thresholds: &Thresholds,
) -> (Vec<&'a LogRecord>, Column) {
    let subset = records
        .iter()
        .copied()
        .filter(|r| selection.matches(r, thresholds))
        .collect();
    (subset, selection.sort_key())
}

/// Resolve the single-select choice from a list of active scenarios
pub fn single_selection(active: &[ScenarioId]) -> Result<Selection> {
    match active {
        [] => Ok(Selection::All),
        [id] => Ok(Selection::Scenario(*id)),
        _ => anyhow::bail!(
            "single filter mode accepts at most one scenario (got {})",
            active.len()
        ),
    }
}

/// Apply a full filter policy to a scored record set
pub fn apply<'a>(records: &'a [LogRecord], policy: &FilterPolicy) -> Result<DisplaySet<'a>> {
    let candidates = filter_categories(records, &policy.categories);

    let display = match policy.mode {
        FilterMode::Any => {
            let mut active = policy.active.clone();
            active.sort();
            active.dedup();
            let subset = select_any(&candidates, &active, &policy.thresholds);
            let (sort_key, name) = match active.as_slice() {
                [] => (Column::RiskScore, "all".to_string()),
                [id] => (id.scenario().sort_key, id.as_str().to_string()),
                many => (
                    Column::RiskScore,
                    many.iter().map(|id| id.as_str()).collect::<Vec<_>>().join("+"),
                ),
            };
            DisplaySet {
                records: subset,
                sort_key,
                name,
                active,
            }
        }
        FilterMode::Single => {
            let selection = single_selection(&policy.active)?;
            let (subset, sort_key) = select_single(&candidates, selection, &policy.thresholds);
            DisplaySet {
                records: subset,
                sort_key,
                name: selection.name().to_string(),
                active: policy.active.clone(),
            }
        }
    };

    log::debug!(
        "{} filter '{}' selected {} of {} records",
        policy.mode,
        display.name,
        display.records.len(),
        records.len()
    );
    Ok(display)
}
