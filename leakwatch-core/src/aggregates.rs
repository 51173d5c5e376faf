//! Aggregation views over scored records
//!
//! Global invariants enforced:
//! - Aggregates are strictly derived (never stored, always computed)
//! - Groups are collected in first-encountered order
//! - Time series are ordered by key; rankings by value descending with a
//!   stable sort, so ties keep first-encountered order
//! - An empty group is `NoData`, never zero

use crate::record::LogRecord;
use crate::scenario::ScenarioId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

/// Default length of employee rankings
pub const DEFAULT_TOP_K: usize = 5;

/// Number of hour buckets in a day
pub const HOURS_PER_DAY: u8 = 24;

/// How a group's values collapse into one number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Mean,
    Sum,
    Count,
}

impl Reducer {
    /// Reduce a group's values; an empty group has no data
    pub fn reduce(&self, values: &[f64]) -> GroupValue {
        if values.is_empty() {
            return GroupValue::NoData;
        }
        let sum: f64 = values.iter().sum();
        match self {
            Reducer::Mean => GroupValue::Value(sum / values.len() as f64),
            Reducer::Sum => GroupValue::Value(sum),
            Reducer::Count => GroupValue::Value(values.len() as f64),
        }
    }
}

/// Summary value of one group
///
/// Serializes as a number, or `null` for a group without data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Value(f64),
    NoData,
}

impl GroupValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            GroupValue::Value(v) => Some(*v),
            GroupValue::NoData => None,
        }
    }

    /// Descending order with `NoData` last
    fn cmp_desc(&self, other: &GroupValue) -> Ordering {
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// One group of an aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupSummary<K> {
    pub key: K,
    pub value: GroupValue,
    pub count: usize,
}

/// Grouped summary, in the order documented by the producing function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AggregationResult<K> {
    pub groups: Vec<GroupSummary<K>>,
}

impl<K> AggregationResult<K> {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Order groups by key ascending (time-series view)
    pub fn sorted_by_key(mut self) -> Self
    where
        K: Ord,
    {
        self.groups.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }

    /// Order groups by value descending and keep the first `k` (ranking view)
    ///
    /// The sort is stable: equal values keep first-encountered order.
    pub fn ranked(mut self, k: usize) -> Self {
        self.groups.sort_by(|a, b| a.value.cmp_desc(&b.value));
        self.groups.truncate(k);
        self
    }
}

impl<K: PartialEq> AggregationResult<K> {
    /// Look up a group by key
    pub fn get(&self, key: &K) -> Option<&GroupSummary<K>> {
        self.groups.iter().find(|g| &g.key == key)
    }
}

/// Group records by key and reduce a per-record value within each group
pub fn aggregate_by_group<'a, K, I, FK, FV>(
    records: I,
    key_fn: FK,
    value_fn: FV,
    reducer: Reducer,
) -> AggregationResult<K>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = &'a LogRecord>,
    FK: Fn(&LogRecord) -> K,
    FV: Fn(&LogRecord) -> f64,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut buckets: Vec<(K, Vec<f64>)> = Vec::new();

    for record in records {
        let key = key_fn(record);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            buckets.push((key, Vec::new()));
            buckets.len() - 1
        });
        buckets[slot].1.push(value_fn(record));
    }

    let groups = buckets
        .into_iter()
        .map(|(key, values)| GroupSummary {
            value: reducer.reduce(&values),
            count: values.len(),
            key,
        })
        .collect();

    AggregationResult { groups }
}

/// Mean risk score for every hour of the day, ascending by hour
///
/// Hours without records are present with `NoData`.
pub fn hourly_mean_risk<'a, I>(records: I) -> AggregationResult<u8>
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let observed = aggregate_by_group(
        records,
        |r| r.processed_hour,
        |r| r.risk_score as f64,
        Reducer::Mean,
    );
    let groups = (0..HOURS_PER_DAY)
        .map(|hour| match observed.get(&hour) {
            Some(group) => group.clone(),
            None => GroupSummary {
                key: hour,
                value: GroupValue::NoData,
                count: 0,
            },
        })
        .collect();
    AggregationResult { groups }
}

/// Number of records per observed hour, ascending by hour
pub fn hourly_access_counts<'a, I>(records: I) -> AggregationResult<u8>
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    aggregate_by_group(records, |r| r.processed_hour, |_| 1.0, Reducer::Count).sorted_by_key()
}

/// Value summed per employee for rankings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    RiskScore,
    QueryLength,
}

impl RankingMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingMetric::RiskScore => "risk_score",
            RankingMetric::QueryLength => "query_length",
        }
    }

    /// Rank by query volume when bulk-query suspects are the sole focus
    pub fn for_scenarios(active: &[ScenarioId]) -> Self {
        match active {
            [ScenarioId::BulkQuerySuspect] => RankingMetric::QueryLength,
            _ => RankingMetric::RiskScore,
        }
    }

    fn value(&self, record: &LogRecord) -> f64 {
        match self {
            RankingMetric::RiskScore => record.risk_score as f64,
            RankingMetric::QueryLength => record.query_length as f64,
        }
    }
}

/// Top-`k` employees by summed metric, descending
pub fn top_employees<'a, I>(records: I, metric: RankingMetric, k: usize) -> AggregationResult<String>
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    aggregate_by_group(
        records,
        |r| r.employee_id.clone(),
        |r| metric.value(r),
        Reducer::Sum,
    )
    .ranked(k)
}
