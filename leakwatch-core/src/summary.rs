//! Headline metrics for a scored dataset

use crate::record::LogRecord;
use crate::scenario::Thresholds;
use serde::{Deserialize, Serialize};

/// Default query length counted as a scraping suspect in the headline metrics
pub const DEFAULT_SCRAPING_METRIC_THRESHOLD: u32 = 500;

/// Default minimum score for the review report
pub const DEFAULT_REVIEW_THRESHOLD: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// At least one record needs immediate review
    Alert,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Summary {
    pub total: usize,
    pub immediate_review: usize,
    pub scraping_suspects: usize,
    pub night_access: usize,
    pub alert: AlertLevel,
    pub message: String,
}

/// Count headline metrics over a record set
pub fn summarize<'a, I>(records: I, thresholds: &Thresholds, scraping_threshold: u32) -> Summary
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let mut total = 0;
    let mut immediate_review = 0;
    let mut scraping_suspects = 0;
    let mut night_access = 0;

    for record in records {
        total += 1;
        if record.risk_score >= thresholds.high_risk {
            immediate_review += 1;
        }
        if record.query_length >= scraping_threshold {
            scraping_suspects += 1;
        }
        if record.is_night_shift {
            night_access += 1;
        }
    }

    let (alert, message) = if immediate_review > 0 {
        (
            AlertLevel::Alert,
            format!(
                "{} high-risk log(s) detected; repeated mask-disabled access during night hours is a strong leak precursor",
                immediate_review
            ),
        )
    } else {
        (
            AlertLevel::Clear,
            "no high-risk logs detected; keep monitoring".to_string(),
        )
    };

    Summary {
        total,
        immediate_review,
        scraping_suspects,
        night_access,
        alert,
        message,
    }
}
