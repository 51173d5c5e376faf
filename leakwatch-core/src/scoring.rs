//! Risk scoring
//!
//! Two mutually exclusive strategies:
//! - `Additive`: the authoritative policy, an ordered table of
//!   `(predicate, weight)` rules summed over one record
//! - `LegacyLabelLookup`: maps the categorical risk label carried by
//!   older-format exports to a fixed score
//!
//! Global invariants enforced:
//! - Scoring is a pure function of one record (no hidden state)
//! - Every additive rule is evaluated; none short-circuits another
//! - One strategy per dataset; the two are never blended

use crate::record::LogRecord;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Query condition length at which the bulk-query rule fires (inclusive)
pub const BULK_QUERY_SCORE_THRESHOLD: u32 = 300;

/// Identity of an additive rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    MaskDisabled,
    NightShift,
    BulkQuery,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::MaskDisabled => "mask-disabled",
            RuleId::NightShift => "night-shift",
            RuleId::BulkQuery => "bulk-query",
        }
    }
}

/// One additive scoring rule
#[derive(Clone, Copy)]
pub struct ScoringRule {
    pub id: RuleId,
    pub weight: u32,
    pub predicate: fn(&LogRecord) -> bool,
}

impl fmt::Debug for ScoringRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoringRule")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .finish()
    }
}

fn mask_disabled(record: &LogRecord) -> bool {
    record.mask_disabled
}

fn night_shift(record: &LogRecord) -> bool {
    record.is_night_shift
}

fn bulk_query(record: &LogRecord) -> bool {
    record.query_length >= BULK_QUERY_SCORE_THRESHOLD
}

/// The additive rule table, in evaluation order
pub const ADDITIVE_RULES: &[ScoringRule] = &[
    ScoringRule {
        id: RuleId::MaskDisabled,
        weight: 50,
        predicate: mask_disabled,
    },
    ScoringRule {
        id: RuleId::NightShift,
        weight: 30,
        predicate: night_shift,
    },
    ScoringRule {
        id: RuleId::BulkQuery,
        weight: 20,
        predicate: bulk_query,
    },
];

/// Contribution of a single rule to a record's score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RuleHit {
    pub rule: RuleId,
    pub weight: u32,
}

/// Breakdown of an additive score
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskFactors {
    pub hits: Vec<RuleHit>,
    pub total: u32,
}

/// Evaluate every additive rule against a record
pub fn explain(record: &LogRecord) -> RiskFactors {
    let hits: Vec<RuleHit> = ADDITIVE_RULES
        .iter()
        .filter(|rule| (rule.predicate)(record))
        .map(|rule| RuleHit {
            rule: rule.id,
            weight: rule.weight,
        })
        .collect();
    let total = hits.iter().map(|h| h.weight).sum();
    RiskFactors { hits, total }
}

/// Additive score: sum of the weights of all matching rules
pub fn additive_score(record: &LogRecord) -> u32 {
    ADDITIVE_RULES
        .iter()
        .filter(|rule| (rule.predicate)(record))
        .map(|rule| rule.weight)
        .sum()
}

/// Legacy label table: severe = 100, caution = 50, anything else = 0
pub fn legacy_label_score(label: Option<&str>) -> u32 {
    let Some(label) = label.map(str::trim) else {
        return 0;
    };
    match label {
        "1단계_심각" => 100,
        "2단계_주의" => 50,
        "보통" => 0,
        other if other.eq_ignore_ascii_case("severe") => 100,
        other if other.eq_ignore_ascii_case("caution") => 50,
        _ => 0,
    }
}

/// Scoring strategy applied to a whole dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    Additive,
    LegacyLabelLookup,
}

impl ScoringStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringStrategy::Additive => "additive",
            ScoringStrategy::LegacyLabelLookup => "legacy-label-lookup",
        }
    }

    /// Score one record under this strategy
    pub fn score(&self, record: &LogRecord) -> u32 {
        match self {
            ScoringStrategy::Additive => additive_score(record),
            ScoringStrategy::LegacyLabelLookup => {
                legacy_label_score(record.risk_level_label.as_deref())
            }
        }
    }
}

/// Attach a freshly computed score to every record
///
/// Any score already present on the input is discarded.
pub fn score_all(records: Vec<LogRecord>, strategy: ScoringStrategy) -> Vec<LogRecord> {
    records
        .into_iter()
        .map(|mut record| {
            record.risk_score = strategy.score(&record);
            record
        })
        .collect()
}

/// Requested scoring mode (configuration surface)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Pick from the columns present in the input
    #[default]
    Auto,
    Additive,
    Legacy,
}

impl ScoringMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringMode::Auto => "auto",
            ScoringMode::Additive => "additive",
            ScoringMode::Legacy => "legacy",
        }
    }

    /// Resolve the mode against the columns present in the input schema
    ///
    /// `Auto` selects the legacy lookup only for older-format files: the
    /// label column is present and the mask flag column is not.
    pub fn select(&self, has_legacy_label: bool, has_mask_flag: bool) -> Result<ScoringStrategy> {
        match self {
            ScoringMode::Auto => {
                if has_legacy_label && !has_mask_flag {
                    Ok(ScoringStrategy::LegacyLabelLookup)
                } else if has_mask_flag {
                    Ok(ScoringStrategy::Additive)
                } else {
                    anyhow::bail!(
                        "input has neither a mask_disabled_flag column nor a legacy risk label column; cannot score"
                    )
                }
            }
            ScoringMode::Additive => {
                if !has_mask_flag {
                    anyhow::bail!("additive scoring requires a mask_disabled_flag column");
                }
                Ok(ScoringStrategy::Additive)
            }
            ScoringMode::Legacy => {
                if !has_legacy_label {
                    anyhow::bail!("legacy scoring requires a legacy_risk_level_label column");
                }
                Ok(ScoringStrategy::LegacyLabelLookup)
            }
        }
    }
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ScoringMode::Auto),
            "additive" => Ok(ScoringMode::Additive),
            "legacy" => Ok(ScoringMode::Legacy),
            other => Err(format!(
                "unknown scoring mode '{}' (expected auto, additive, or legacy)",
                other
            )),
        }
    }
}
