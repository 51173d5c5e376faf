//! Named risk scenarios
//!
//! A scenario is a static predicate over a scored record plus the column
//! its results are ranked by. The scenario table is fixed at compile time;
//! only the numeric thresholds it reads are configurable.

use crate::record::{Column, LogRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default risk score at which a record needs immediate review
pub const DEFAULT_HIGH_RISK_THRESHOLD: u32 = 80;

/// Default query length at which a record is a bulk-query suspect
pub const DEFAULT_BULK_LENGTH_THRESHOLD: u32 = 300;

/// Allowed range for the bulk-query threshold
pub const BULK_LENGTH_THRESHOLD_RANGE: std::ops::RangeInclusive<u32> = 100..=1000;

/// Thresholds read by scenario predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Thresholds {
    pub high_risk: u32,
    pub bulk_length: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            high_risk: DEFAULT_HIGH_RISK_THRESHOLD,
            bulk_length: DEFAULT_BULK_LENGTH_THRESHOLD,
        }
    }
}

/// Scenario identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioId {
    ImmediateReview,
    BulkQuerySuspect,
    NightAccess,
}

impl ScenarioId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioId::ImmediateReview => "immediate-review",
            ScenarioId::BulkQuerySuspect => "bulk-query-suspect",
            ScenarioId::NightAccess => "night-access",
        }
    }

    /// The static scenario definition for this id
    pub fn scenario(&self) -> &'static RiskScenario {
        match self {
            ScenarioId::ImmediateReview => &SCENARIOS[0],
            ScenarioId::BulkQuerySuspect => &SCENARIOS[1],
            ScenarioId::NightAccess => &SCENARIOS[2],
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "immediate-review" => Ok(ScenarioId::ImmediateReview),
            "bulk-query-suspect" => Ok(ScenarioId::BulkQuerySuspect),
            "night-access" => Ok(ScenarioId::NightAccess),
            other => Err(format!(
                "unknown scenario '{}' (expected immediate-review, bulk-query-suspect, or night-access)",
                other
            )),
        }
    }
}

/// A named filter + sort policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskScenario {
    pub id: ScenarioId,
    /// Short human-readable title
    pub title: &'static str,
    /// Column results are sorted by (descending)
    pub sort_key: Column,
}

/// All scenarios, in presentation order
pub static SCENARIOS: [RiskScenario; 3] = [
    RiskScenario {
        id: ScenarioId::ImmediateReview,
        title: "Immediate review (high risk score)",
        sort_key: Column::RiskScore,
    },
    RiskScenario {
        id: ScenarioId::BulkQuerySuspect,
        title: "Bulk query suspect (long query condition)",
        sort_key: Column::QueryLength,
    },
    RiskScenario {
        id: ScenarioId::NightAccess,
        title: "Night access (off-hours shift)",
        sort_key: Column::ProcessedHour,
    },
];

impl RiskScenario {
    /// Does the record match this scenario?
    ///
    /// Missing fields never match: a record with an unknown shift label is
    /// not night access.
    pub fn matches(&self, record: &LogRecord, thresholds: &Thresholds) -> bool {
        match self.id {
            ScenarioId::ImmediateReview => record.risk_score >= thresholds.high_risk,
            ScenarioId::BulkQuerySuspect => record.query_length >= thresholds.bulk_length,
            ScenarioId::NightAccess => record.is_night_shift,
        }
    }
}
