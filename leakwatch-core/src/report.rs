//! Reporting and export
//!
//! Global invariants enforced:
//! - Purely presentational: no score is recomputed here
//! - Sorting is stable, so equal keys keep dataset order
//! - Export uses the same encoding convention as ingestion

use crate::encoding::SourceEncoding;
use crate::filter::DisplaySet;
use crate::record::{Column, LogRecord};
use crate::scenario::ScenarioId;
use crate::scoring::{self, RuleId, ScoringStrategy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Columns projected into reports and exports, in output order
pub const REPORT_COLUMNS: [Column; 8] = [
    Column::EmployeeId,
    Column::ProcessedHour,
    Column::TaskCategory,
    Column::ScreenName,
    Column::NightShiftLabel,
    Column::MaskDisabledFlag,
    Column::QueryLength,
    Column::RiskScore,
];

/// Export columns for a dataset scored with `strategy`
///
/// Label-scored exports carry the risk label in place of the mask flag, so a
/// re-ingest in `auto` mode selects the label lookup again.
pub fn export_columns(strategy: ScoringStrategy) -> [Column; 8] {
    let mut columns = REPORT_COLUMNS;
    if strategy == ScoringStrategy::LegacyLabelLookup {
        columns[5] = Column::LegacyRiskLevelLabel;
    }
    columns
}

/// One projected report row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportRow {
    pub employee_id: String,
    pub processed_hour: u8,
    pub task_category: String,
    pub screen_name: String,
    pub night_shift_label: String,
    pub mask_disabled_flag: String,
    pub query_length: u32,
    pub risk_score: u32,
    /// Source risk label (older-format exports only)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub risk_level_label: String,
    /// Additive rules that fired, when the report explains scores
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_factors: Vec<RuleId>,
}

impl ReportRow {
    pub fn from_record(record: &LogRecord) -> Self {
        ReportRow {
            employee_id: record.employee_id.clone(),
            processed_hour: record.processed_hour,
            task_category: record.field(Column::TaskCategory),
            screen_name: record.field(Column::ScreenName),
            night_shift_label: record.field(Column::NightShiftLabel),
            mask_disabled_flag: record.field(Column::MaskDisabledFlag),
            query_length: record.query_length,
            risk_score: record.risk_score,
            risk_level_label: record.field(Column::LegacyRiskLevelLabel),
            risk_factors: Vec::new(),
        }
    }

    /// Project a record together with its additive score breakdown
    pub fn explained(record: &LogRecord) -> Self {
        ReportRow {
            risk_factors: scoring::explain(record).hits.iter().map(|h| h.rule).collect(),
            ..ReportRow::from_record(record)
        }
    }

    fn value(&self, column: Column) -> String {
        match column {
            Column::EmployeeId => self.employee_id.clone(),
            Column::ProcessedHour => self.processed_hour.to_string(),
            Column::TaskCategory => self.task_category.clone(),
            Column::ScreenName => self.screen_name.clone(),
            Column::NightShiftLabel => self.night_shift_label.clone(),
            Column::MaskDisabledFlag => self.mask_disabled_flag.clone(),
            Column::LegacyRiskLevelLabel => self.risk_level_label.clone(),
            Column::QueryLength => self.query_length.to_string(),
            Column::RiskScore => self.risk_score.to_string(),
            Column::CustomerId => String::new(),
        }
    }
}

/// Descending comparison on one column (numeric where possible)
fn compare_desc(a: &LogRecord, b: &LogRecord, column: Column) -> Ordering {
    match (a.numeric_value(column), b.numeric_value(column)) {
        (Some(x), Some(y)) => y.cmp(&x),
        _ => b.field(column).cmp(&a.field(column)),
    }
}

/// Sort records by a column, descending, keeping input order for ties
pub fn sort_desc<'a>(mut records: Vec<&'a LogRecord>, column: Column) -> Vec<&'a LogRecord> {
    records.sort_by(|a, b| compare_desc(a, b, column));
    records
}

/// Project and order a display set for presentation
pub fn build_report(display: &DisplaySet<'_>) -> Vec<ReportRow> {
    sort_desc(display.records.clone(), display.sort_key)
        .into_iter()
        .map(ReportRow::from_record)
        .collect()
}

/// Records at or above the review threshold, highest risk first
///
/// Additive scores carry their rule breakdown; label-derived scores have none.
pub fn review_report<'a, I>(
    records: I,
    review_threshold: u32,
    strategy: ScoringStrategy,
) -> Vec<ReportRow>
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let selected: Vec<&LogRecord> = records
        .into_iter()
        .filter(|r| r.risk_score >= review_threshold)
        .collect();
    let project: fn(&LogRecord) -> ReportRow = match strategy {
        ScoringStrategy::Additive => ReportRow::explained,
        ScoringStrategy::LegacyLabelLookup => ReportRow::from_record,
    };
    sort_desc(selected, Column::RiskScore)
        .into_iter()
        .map(project)
        .collect()
}

/// Columns to emphasise when a scenario is active (presentation lookup)
pub fn highlight_columns(scenario: ScenarioId) -> &'static [Column] {
    match scenario {
        ScenarioId::ImmediateReview => &[Column::RiskScore, Column::MaskDisabledFlag],
        ScenarioId::BulkQuerySuspect => &[Column::QueryLength],
        ScenarioId::NightAccess => &[Column::ProcessedHour, Column::NightShiftLabel],
    }
}

/// Render report rows as a fixed-width text table
///
/// Highlighted columns are marked with `*` in the header. A trailing
/// FACTORS column appears when any row carries a score breakdown.
pub fn render_text(rows: &[ReportRow], highlighted: &[Column]) -> String {
    const WIDTHS: [usize; 8] = [12, 5, 14, 18, 16, 5, 7, 5];

    let explained = rows.iter().any(|r| !r.risk_factors.is_empty());
    let mut output = String::new();
    let header: Vec<String> = REPORT_COLUMNS
        .iter()
        .zip(WIDTHS)
        .map(|(column, width)| {
            let name = if highlighted.contains(column) {
                format!("*{}", header_label(*column))
            } else {
                header_label(*column).to_string()
            };
            truncate_or_pad(&name, width)
        })
        .collect();
    let mut header = header.join(" ");
    if explained {
        header.push_str(" FACTORS");
    }
    output.push_str(header.trim_end());
    output.push('\n');

    for row in rows {
        let cells: Vec<String> = REPORT_COLUMNS
            .iter()
            .zip(WIDTHS)
            .map(|(column, width)| truncate_or_pad(&row.value(*column), width))
            .collect();
        let mut line = cells.join(" ");
        if explained {
            let factors: Vec<&str> = row.risk_factors.iter().map(|f| f.as_str()).collect();
            line.push(' ');
            line.push_str(&factors.join("+"));
        }
        output.push_str(line.trim_end());
        output.push('\n');
    }

    output
}

fn header_label(column: Column) -> &'static str {
    match column {
        Column::EmployeeId => "EMPLOYEE",
        Column::ProcessedHour => "HOUR",
        Column::TaskCategory => "CATEGORY",
        Column::ScreenName => "SCREEN",
        Column::NightShiftLabel => "SHIFT",
        Column::MaskDisabledFlag => "MASK",
        Column::QueryLength => "LENGTH",
        Column::RiskScore => "RISK",
        Column::CustomerId => "CUSTOMER",
        Column::LegacyRiskLevelLabel => "LABEL",
    }
}

/// Render any serializable report value as pretty JSON
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize report to JSON")
}

/// Serialize rows to delimited text with the canonical column headers
///
/// Fields containing the delimiter, quotes, or newlines are quoted.
pub fn write_csv(rows: &[ReportRow], strategy: ScoringStrategy, delimiter: u8) -> Result<String> {
    let columns = export_columns(strategy);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer
        .write_record(columns.iter().map(|c| c.as_str()))
        .context("failed to write export header")?;
    for row in rows {
        writer
            .write_record(columns.iter().map(|c| row.value(*c)))
            .context("failed to write export row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush export: {}", e.error()))?;
    String::from_utf8(bytes).context("export is not valid UTF-8")
}

/// Export file name for a selection, e.g. `leakwatch_night-access.csv`
pub fn export_filename(selection_name: &str) -> String {
    let slug: String = selection_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("leakwatch_{}.csv", slug)
}

/// Write an export into `dir`, returning the file path
///
/// The file is written to a temporary sibling and renamed into place, so
/// readers never observe a partially written export.
pub fn export_to_dir(
    dir: &Path,
    selection_name: &str,
    rows: &[ReportRow],
    strategy: ScoringStrategy,
    encoding: SourceEncoding,
    delimiter: u8,
) -> Result<PathBuf> {
    let text = write_csv(rows, strategy, delimiter)?;
    let bytes = encoding
        .encode(&text)
        .with_context(|| format!("failed to encode export as {}", encoding))?;
    let path = dir.join(export_filename(selection_name));
    atomic_write(&path, &bytes)?;
    log::info!("exported {} rows to {}", rows.len(), path.display());
    Ok(path)
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    use std::fs;
    use std::io::Write;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)
        .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
    file.write_all(contents)
        .with_context(|| format!("failed to write to temp file: {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync temp file: {}", temp_path.display()))?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Truncate or pad string to fixed width (in characters)
fn truncate_or_pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{}{}", s, " ".repeat(width - len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_record;

    fn scored(employee: &str, hour: u8, score: u32, length: u32) -> LogRecord {
        let mut r = test_record(employee, hour);
        r.risk_score = score;
        r.query_length = length;
        r
    }

    #[test]
    fn test_sort_desc_is_stable() {
        let records = vec![
            scored("A", 1, 50, 0),
            scored("B", 2, 80, 0),
            scored("C", 3, 50, 0),
        ];
        let refs: Vec<&LogRecord> = records.iter().collect();
        let sorted = sort_desc(refs, Column::RiskScore);
        let ids: Vec<&str> = sorted.iter().map(|r| r.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_build_report_uses_display_sort_key() {
        let records = vec![scored("A", 1, 100, 10), scored("B", 2, 0, 900)];
        let display = DisplaySet {
            records: records.iter().collect(),
            sort_key: Column::QueryLength,
            name: "bulk-query-suspect".to_string(),
            active: vec![ScenarioId::BulkQuerySuspect],
        };
        let rows = build_report(&display);
        assert_eq!(rows[0].employee_id, "B");
        assert_eq!(rows[1].employee_id, "A");
    }

    #[test]
    fn test_review_report_threshold_inclusive() {
        let records = vec![
            scored("A", 1, 49, 0),
            scored("B", 2, 50, 0),
            scored("C", 3, 100, 0),
        ];
        let rows = review_report(&records, 50, ScoringStrategy::LegacyLabelLookup);
        let ids: Vec<&str> = rows.iter().map(|r| r.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B"]);
        assert!(rows.iter().all(|r| r.risk_factors.is_empty()));
    }

    #[test]
    fn test_review_report_explains_additive_scores() {
        let mut record = scored("E1", 23, 80, 10);
        record.mask_disabled = true;
        record.is_night_shift = true;
        let records = vec![record];
        let rows = review_report(&records, 50, ScoringStrategy::Additive);
        assert_eq!(
            rows[0].risk_factors,
            vec![RuleId::MaskDisabled, RuleId::NightShift]
        );

        let text = render_text(&rows, &[]);
        assert!(text.lines().next().unwrap().ends_with("FACTORS"));
        assert!(text.lines().nth(1).unwrap().ends_with("mask-disabled+night-shift"));
    }

    #[test]
    fn test_csv_quotes_fields_with_delimiter() {
        let mut record = scored("E1", 22, 50, 0);
        record.screen_name = Some("고객조회, 상세".to_string());
        let rows = vec![ReportRow::from_record(&record)];
        let csv = write_csv(&rows, ScoringStrategy::Additive, b',').unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "employee_id,processed_hour,task_category,screen_name,night_shift_label,mask_disabled_flag,query_length,risk_score"
        );
        assert_eq!(
            lines.next().unwrap(),
            "E1,22,상담,\"고객조회, 상세\",주간,N,0,50"
        );
    }

    #[test]
    fn test_label_scored_export_carries_label_instead_of_mask() {
        let mut record = scored("L1", 23, 100, 700);
        record.mask_disabled_flag = None;
        record.risk_level_label = Some("1단계_심각".to_string());
        let rows = vec![ReportRow::from_record(&record)];
        let csv = write_csv(&rows, ScoringStrategy::LegacyLabelLookup, b',').unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.contains("legacy_risk_level_label"));
        assert!(!header.contains("mask_disabled_flag"));
        assert_eq!(lines.next().unwrap(), "L1,23,상담,고객조회,주간,1단계_심각,700,100");

        let additive = write_csv(&rows, ScoringStrategy::Additive, b',').unwrap();
        assert!(!additive.contains("legacy_risk_level_label"));
    }

    #[test]
    fn test_export_filename_from_selection() {
        assert_eq!(export_filename("night-access"), "leakwatch_night-access.csv");
        assert_eq!(
            export_filename("bulk-query-suspect+night-access"),
            "leakwatch_bulk-query-suspect_night-access.csv"
        );
    }

    #[test]
    fn test_export_to_dir_writes_encoded_file() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![ReportRow::from_record(&scored("E1", 22, 80, 0))];
        let path = export_to_dir(
            dir.path(),
            "all",
            &rows,
            ScoringStrategy::Additive,
            SourceEncoding::Cp949,
            b',',
        )
        .unwrap();
        assert_eq!(path.file_name().unwrap(), "leakwatch_all.csv");
        let bytes = std::fs::read(&path).unwrap();
        let text = SourceEncoding::Cp949.decode(&bytes).unwrap();
        assert!(text.contains("E1,22,상담"));
        assert!(!dir.path().join("leakwatch_all.tmp").exists());
    }

    #[test]
    fn test_highlight_lookup() {
        assert_eq!(
            highlight_columns(ScenarioId::BulkQuerySuspect),
            &[Column::QueryLength]
        );
        assert!(highlight_columns(ScenarioId::NightAccess).contains(&Column::ProcessedHour));
    }

    #[test]
    fn test_render_text_marks_highlighted_columns() {
        let rows = vec![ReportRow::from_record(&scored("E1", 22, 80, 0))];
        let text = render_text(&rows, &[Column::RiskScore]);
        let header = text.lines().next().unwrap();
        assert!(header.contains("*RISK"));
        assert!(header.starts_with("EMPLOYEE"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_truncate_or_pad_counts_characters() {
        assert_eq!(truncate_or_pad("야간", 4), "야간  ");
        assert_eq!(truncate_or_pad("abcdefgh", 6), "abc...");
    }
}
