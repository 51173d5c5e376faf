//! Ingestion: decode, parse, normalize, and score an access log file
//!
//! Global invariants enforced:
//! - Rows missing an employee id or a valid hour are dropped, never fatal
//! - Non-mandatory numeric fields fall back to 0 instead of dropping the row
//! - Source-level failures (unreadable, undecodable, missing mandatory
//!   columns) abort before any scoring runs; no partial dataset exists
//! - A `Dataset` is built completely before it is returned

use crate::encoding::SourceEncoding;
use crate::record::{Column, LogRecord};
use crate::scoring::{self, ScoringMode, ScoringStrategy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Default night-shift labels recognised in the shift column
pub const DEFAULT_NIGHT_SHIFT_LABELS: &[&str] = &["보안취약(야간)", "night"];

/// Default mask-disabled flag values
pub const DEFAULT_MASK_DISABLED_VALUES: &[&str] = &["Y"];

/// Options controlling how a source is read and interpreted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IngestOptions {
    pub encoding: SourceEncoding,
    pub delimiter: u8,
    pub scoring: ScoringMode,
    pub night_shift_labels: Vec<String>,
    pub mask_disabled_values: Vec<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            encoding: SourceEncoding::default(),
            delimiter: b',',
            scoring: ScoringMode::default(),
            night_shift_labels: DEFAULT_NIGHT_SHIFT_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mask_disabled_values: DEFAULT_MASK_DISABLED_VALUES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Why a row was dropped during normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingEmployeeId,
    MissingHour,
    UnparseableHour,
    HourOutOfRange,
}

/// Raw, untyped field values of one source row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// Source line the row starts on, when read from a file
    pub line: Option<u64>,
    pub employee_id: Option<String>,
    pub processed_hour: Option<String>,
    pub task_category: Option<String>,
    pub screen_name: Option<String>,
    pub query_length: Option<String>,
    pub customer_id: Option<String>,
    pub mask_disabled_flag: Option<String>,
    pub night_shift_label: Option<String>,
    pub risk_level_label: Option<String>,
}

/// Ingestion counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestStats {
    pub total_rows: usize,
    pub retained: usize,
    pub rejected: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub rejected_by_reason: BTreeMap<RejectReason, usize>,
    /// Rows whose query length was missing or unparseable and defaulted to 0
    pub query_length_fallbacks: usize,
}

/// An immutable, fully normalized and scored dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    records: Vec<LogRecord>,
    strategy: ScoringStrategy,
    stats: IngestStats,
    fingerprint: Option<String>,
}

impl Dataset {
    /// Score already-normalized records into a dataset
    ///
    /// Used for fixtures and for callers that produce records themselves.
    pub fn from_records(records: Vec<LogRecord>, strategy: ScoringStrategy) -> Self {
        let stats = IngestStats {
            total_rows: records.len(),
            retained: records.len(),
            ..IngestStats::default()
        };
        Dataset {
            records: scoring::score_all(records, strategy),
            strategy,
            stats,
            fingerprint: None,
        }
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn strategy(&self) -> ScoringStrategy {
        self.strategy
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Content fingerprint of the source bytes (None for in-memory datasets)
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Source column positions resolved from the header row
#[derive(Debug, Clone, Default)]
struct Layout {
    positions: HashMap<Column, usize>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut positions = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(column) = Column::from_header(header) {
                // First occurrence wins for duplicated headers
                positions.entry(column).or_insert(idx);
            }
        }
        Layout { positions }
    }

    fn has(&self, column: Column) -> bool {
        self.positions.contains_key(&column)
    }

    fn cell(&self, row: &csv::StringRecord, column: Column) -> Option<String> {
        let idx = *self.positions.get(&column)?;
        let value = row.get(idx)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    fn raw_row(&self, row: &csv::StringRecord) -> RawRow {
        RawRow {
            line: row.position().map(|p| p.line()),
            employee_id: self.cell(row, Column::EmployeeId),
            processed_hour: self.cell(row, Column::ProcessedHour),
            task_category: self.cell(row, Column::TaskCategory),
            screen_name: self.cell(row, Column::ScreenName),
            query_length: self.cell(row, Column::QueryLength),
            customer_id: self.cell(row, Column::CustomerId),
            mask_disabled_flag: self.cell(row, Column::MaskDisabledFlag),
            night_shift_label: self.cell(row, Column::NightShiftLabel),
            risk_level_label: self.cell(row, Column::LegacyRiskLevelLabel),
        }
    }
}

/// Parse an integer that may have been rendered as an integral float ("9.0")
fn parse_integral(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    let f = value.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parse a processed hour, which must be an integer in 0..=23
pub fn parse_hour(value: Option<&str>) -> std::result::Result<u8, RejectReason> {
    let value = value.ok_or(RejectReason::MissingHour)?;
    let hour = parse_integral(value).ok_or(RejectReason::UnparseableHour)?;
    if (0..=23).contains(&hour) {
        Ok(hour as u8)
    } else {
        Err(RejectReason::HourOutOfRange)
    }
}

/// Parse a query length; `None` means the documented fallback (0) applies
///
/// Fractional values are truncated toward zero; negatives are unparseable.
pub fn parse_query_length(value: Option<&str>) -> Option<u32> {
    let f = value?.trim().parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f <= u32::MAX as f64 {
        Some(f.trunc() as u32)
    } else {
        None
    }
}

/// Normalize an employee id to its stable string form
///
/// Numeric sources may render ids as floats ("1001.0"); those collapse to
/// the integer text so string and numeric exports group together.
pub fn normalize_employee_id(value: &str) -> String {
    let value = value.trim();
    if let Some((int, frac)) = value.split_once('.') {
        let int_ok = !int.is_empty() && int.bytes().all(|b| b.is_ascii_digit());
        let frac_zero = !frac.is_empty() && frac.bytes().all(|b| b == b'0');
        if int_ok && frac_zero {
            return int.to_string();
        }
    }
    value.to_string()
}

/// Normalize one raw row into an unscored record
///
/// Returns the reject reason when mandatory identity fields are unusable.
/// The boolean reports whether the query length fell back to 0.
pub fn normalize_row(
    row: RawRow,
    options: &IngestOptions,
) -> std::result::Result<(LogRecord, bool), RejectReason> {
    let employee_id = row
        .employee_id
        .as_deref()
        .map(normalize_employee_id)
        .filter(|id| !id.is_empty())
        .ok_or(RejectReason::MissingEmployeeId)?;
    let processed_hour = parse_hour(row.processed_hour.as_deref())?;

    let parsed_length = parse_query_length(row.query_length.as_deref());
    let fell_back = parsed_length.is_none();

    let mask_disabled = row
        .mask_disabled_flag
        .as_deref()
        .is_some_and(|flag| options.mask_disabled_values.iter().any(|v| v == flag.trim()));
    let is_night_shift = row
        .night_shift_label
        .as_deref()
        .is_some_and(|label| options.night_shift_labels.iter().any(|v| v == label.trim()));

    let record = LogRecord {
        employee_id,
        processed_hour,
        task_category: row.task_category,
        screen_name: row.screen_name,
        customer_id: row.customer_id,
        query_length: parsed_length.unwrap_or(0),
        mask_disabled_flag: row.mask_disabled_flag,
        mask_disabled,
        night_shift_label: row.night_shift_label,
        is_night_shift,
        risk_level_label: row.risk_level_label,
        risk_score: 0,
    };
    Ok((record, fell_back))
}

/// Normalize a batch of raw rows, dropping rejected rows
pub fn normalize_rows<I>(rows: I, options: &IngestOptions) -> (Vec<LogRecord>, IngestStats)
where
    I: IntoIterator<Item = RawRow>,
{
    let mut records = Vec::new();
    let mut stats = IngestStats::default();

    for row in rows {
        stats.total_rows += 1;
        let line = row.line;
        match normalize_row(row, options) {
            Ok((record, fell_back)) => {
                if fell_back {
                    stats.query_length_fallbacks += 1;
                }
                records.push(record);
            }
            Err(reason) => {
                match line {
                    Some(line) => log::debug!("rejected row at line {}: {:?}", line, reason),
                    None => log::debug!("rejected row: {:?}", reason),
                }
                record_rejection(&mut stats, reason);
            }
        }
    }

    stats.retained = records.len();
    (records, stats)
}

fn record_rejection(stats: &mut IngestStats, reason: RejectReason) {
    stats.rejected += 1;
    *stats.rejected_by_reason.entry(reason).or_insert(0) += 1;
}

/// Ingest an in-memory source
pub fn ingest_bytes(bytes: &[u8], options: &IngestOptions) -> Result<Dataset> {
    let text = options
        .encoding
        .decode(bytes)
        .context("failed to decode access log")?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .context("failed to read access log header row")?
        .clone();
    let layout = Layout::from_headers(&headers);

    for required in [Column::EmployeeId, Column::ProcessedHour] {
        if !layout.has(required) {
            anyhow::bail!(
                "access log is missing required column '{}'",
                required.as_str()
            );
        }
    }

    let strategy = options.scoring.select(
        layout.has(Column::LegacyRiskLevelLabel),
        layout.has(Column::MaskDisabledFlag),
    )?;

    // Rows are flexible, so short or long rows parse; missing cells read as blank
    let raw_rows = reader
        .records()
        .map(|result| {
            result
                .map(|row| layout.raw_row(&row))
                .context("failed to parse access log row")
        })
        .collect::<Result<Vec<_>>>()?;

    let (records, stats) = normalize_rows(raw_rows, options);

    if stats.rejected > 0 {
        log::warn!(
            "dropped {} of {} rows lacking a usable employee id or hour",
            stats.rejected,
            stats.total_rows
        );
    }
    if stats.query_length_fallbacks > 0 {
        log::warn!(
            "{} rows had a missing or unparseable query length (defaulted to 0)",
            stats.query_length_fallbacks
        );
    }
    log::info!(
        "ingested {} records ({} scoring)",
        stats.retained,
        strategy.as_str()
    );

    Ok(Dataset {
        records: scoring::score_all(records, strategy),
        strategy,
        stats,
        fingerprint: Some(crate::cache::fingerprint(bytes)),
    })
}

/// Ingest an access log file
pub fn ingest_file(path: &Path, options: &IngestOptions) -> Result<Dataset> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read access log: {}", path.display()))?;
    ingest_bytes(&bytes, options)
        .with_context(|| format!("failed to ingest access log: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "직원번호,처리시각,업무 분류,화면명,길이,고객ID,마스크해제여부,야간 근무 여부\n";

    fn ingest(body: &str) -> Dataset {
        let text = format!("{}{}", HEADER, body);
        ingest_bytes(text.as_bytes(), &IngestOptions::default()).unwrap()
    }

    #[test]
    fn test_rows_without_identity_are_dropped() {
        let dataset = ingest(
            "E1,22,상담,고객조회,350,C1,Y,보안취약(야간)\n\
             ,10,상담,고객조회,10,C2,N,주간\n\
             E3,,상담,고객조회,10,C3,N,주간\n\
             E4,abc,상담,고객조회,10,C4,N,주간\n\
             E5,24,상담,고객조회,10,C5,N,주간\n",
        );
        assert_eq!(dataset.len(), 1);
        let stats = dataset.stats();
        assert_eq!(stats.total_rows, 5);
        assert_eq!(stats.rejected, 4);
        assert_eq!(stats.rejected_by_reason[&RejectReason::MissingEmployeeId], 1);
        assert_eq!(stats.rejected_by_reason[&RejectReason::MissingHour], 1);
        assert_eq!(stats.rejected_by_reason[&RejectReason::UnparseableHour], 1);
        assert_eq!(stats.rejected_by_reason[&RejectReason::HourOutOfRange], 1);
    }

    #[test]
    fn test_short_rows_are_read_with_blank_cells() {
        let dataset = ingest(
            "E1,22\n\
             E2\n\
             E3,9,상담,고객조회,10,C3,Y,주간,extra\n",
        );
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.stats().total_rows, 3);
        assert_eq!(dataset.stats().rejected_by_reason[&RejectReason::MissingHour], 1);
        assert_eq!(dataset.records()[0].query_length, 0);
        assert_eq!(dataset.records()[1].risk_score, 50);
    }

    #[test]
    fn test_raw_rows_carry_source_lines() {
        let text = format!(
            "{}E1,9,상담,\"고객\n조회\",10,C1,N,주간\nE2,10,상담,고객조회,10,C2,N,주간\n",
            HEADER
        );
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let layout = Layout::from_headers(&reader.headers().unwrap().clone());
        let lines: Vec<Option<u64>> = reader
            .records()
            .map(|row| layout.raw_row(&row.unwrap()).line)
            .collect();
        // The quoted newline pushes the second row to line 4
        assert_eq!(lines, vec![Some(2), Some(4)]);
    }

    #[test]
    fn test_query_length_falls_back_to_zero() {
        let dataset = ingest(
            "E1,9,상담,고객조회,,C1,N,주간\n\
             E2,9,상담,고객조회,long,C2,N,주간\n\
             E3,9,상담,고객조회,-5,C3,N,주간\n\
             E4,9,상담,고객조회,300.0,C4,N,주간\n",
        );
        let lengths: Vec<u32> = dataset.records().iter().map(|r| r.query_length).collect();
        assert_eq!(lengths, vec![0, 0, 0, 300]);
        assert_eq!(dataset.stats().query_length_fallbacks, 3);
    }

    #[test]
    fn test_records_are_scored_on_ingest() {
        let dataset = ingest("E1,23,상담,고객조회,300,C1,Y,보안취약(야간)\n");
        assert_eq!(dataset.strategy(), ScoringStrategy::Additive);
        assert_eq!(dataset.records()[0].risk_score, 100);
        assert!(dataset.records()[0].mask_disabled);
        assert!(dataset.records()[0].is_night_shift);
    }

    #[test]
    fn test_unknown_shift_label_is_not_night() {
        let dataset = ingest("E1,23,상담,고객조회,0,C1,N,\n");
        assert!(!dataset.records()[0].is_night_shift);
        assert_eq!(dataset.records()[0].night_shift_label, None);
    }

    #[test]
    fn test_employee_id_normalization() {
        assert_eq!(normalize_employee_id("1001.0"), "1001");
        assert_eq!(normalize_employee_id(" 1001 "), "1001");
        assert_eq!(normalize_employee_id("1001.5"), "1001.5");
        assert_eq!(normalize_employee_id("A.0"), "A.0");
        assert_eq!(normalize_employee_id("E-7"), "E-7");
    }

    #[test]
    fn test_float_rendered_ids_group_with_string_ids() {
        let dataset = ingest(
            "1001,9,상담,고객조회,0,C1,N,주간\n\
             1001.0,10,상담,고객조회,0,C1,N,주간\n",
        );
        assert_eq!(dataset.records()[0].employee_id, dataset.records()[1].employee_id);
    }

    #[test]
    fn test_hour_parsing() {
        assert_eq!(parse_hour(Some("0")), Ok(0));
        assert_eq!(parse_hour(Some("23")), Ok(23));
        assert_eq!(parse_hour(Some("9.0")), Ok(9));
        assert_eq!(parse_hour(Some("9.5")), Err(RejectReason::UnparseableHour));
        assert_eq!(parse_hour(Some("-1")), Err(RejectReason::HourOutOfRange));
        assert_eq!(parse_hour(None), Err(RejectReason::MissingHour));
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let text = "직원번호,화면명,마스크해제여부\nE1,고객조회,Y\n";
        let err = ingest_bytes(text.as_bytes(), &IngestOptions::default()).unwrap_err();
        assert!(err.to_string().contains("processed_hour"));
    }

    #[test]
    fn test_legacy_file_uses_label_lookup() {
        let text = "직원번호,처리시각,업무 분류,화면명,길이,고객ID,위험지수\n\
                    E1,22,상담,고객조회,10,C1,1단계_심각\n\
                    E2,10,상담,고객조회,10,C2,보통\n";
        let dataset = ingest_bytes(text.as_bytes(), &IngestOptions::default()).unwrap();
        assert_eq!(dataset.strategy(), ScoringStrategy::LegacyLabelLookup);
        let scores: Vec<u32> = dataset.records().iter().map(|r| r.risk_score).collect();
        assert_eq!(scores, vec![100, 0]);
    }

    #[test]
    fn test_blank_header_columns_are_ignored() {
        let text = "직원번호,처리시각,마스크해제여부,,\nE1,3,Y,,\n";
        let dataset = ingest_bytes(text.as_bytes(), &IngestOptions::default()).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records()[0].risk_score, 50);
    }

    #[test]
    fn test_semicolon_delimiter() {
        let text = "employee_id;processed_hour;mask_disabled_flag\nE1;3;Y\n";
        let options = IngestOptions {
            delimiter: b';',
            ..IngestOptions::default()
        };
        let dataset = ingest_bytes(text.as_bytes(), &options).unwrap();
        assert_eq!(dataset.records()[0].employee_id, "E1");
    }

    #[test]
    fn test_fingerprint_is_set_for_ingested_sources() {
        let dataset = ingest("E1,3,상담,고객조회,0,C1,N,주간\n");
        assert_eq!(dataset.fingerprint().map(str::len), Some(64));
        let fixture = Dataset::from_records(vec![], ScoringStrategy::Additive);
        assert!(fixture.fingerprint().is_none());
    }
}
