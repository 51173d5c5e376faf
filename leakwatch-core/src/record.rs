//! Access log record model
//!
//! Global invariants enforced:
//! - Every retained record has a non-empty `employee_id` and an hour in 0..=23
//! - `employee_id` is always string-typed
//! - `risk_score` is computed by the scorer, never read from the source

use serde::{Deserialize, Serialize};

/// One personal-data access event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogRecord {
    pub employee_id: String,
    pub processed_hour: u8,
    pub task_category: Option<String>,
    pub screen_name: Option<String>,
    pub customer_id: Option<String>,
    pub query_length: u32,
    /// Raw mask flag as it appeared in the source ('Y' / other)
    pub mask_disabled_flag: Option<String>,
    pub mask_disabled: bool,
    /// Raw shift label as it appeared in the source
    pub night_shift_label: Option<String>,
    pub is_night_shift: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level_label: Option<String>,
    pub risk_score: u32,
}

/// Named columns of the access log schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    EmployeeId,
    ProcessedHour,
    TaskCategory,
    ScreenName,
    QueryLength,
    CustomerId,
    MaskDisabledFlag,
    NightShiftLabel,
    LegacyRiskLevelLabel,
    RiskScore,
}

impl Column {
    /// Canonical (English) header name
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::EmployeeId => "employee_id",
            Column::ProcessedHour => "processed_hour",
            Column::TaskCategory => "task_category",
            Column::ScreenName => "screen_name",
            Column::QueryLength => "query_length",
            Column::CustomerId => "customer_id",
            Column::MaskDisabledFlag => "mask_disabled_flag",
            Column::NightShiftLabel => "night_shift_label",
            Column::LegacyRiskLevelLabel => "legacy_risk_level_label",
            Column::RiskScore => "risk_score",
        }
    }

    /// Resolve a source header to a column.
    ///
    /// Accepts the canonical English names and the Korean headers used by
    /// the operational log exports. Surrounding whitespace is ignored.
    pub fn from_header(header: &str) -> Option<Column> {
        let header = header.trim().trim_start_matches('\u{feff}');
        let column = match header {
            "employee_id" | "직원번호" => Column::EmployeeId,
            "processed_hour" | "처리시각" => Column::ProcessedHour,
            "task_category" | "업무 분류" | "업무분류" => Column::TaskCategory,
            "screen_name" | "화면명" => Column::ScreenName,
            "query_length" | "길이" => Column::QueryLength,
            "customer_id" | "고객ID" => Column::CustomerId,
            "mask_disabled_flag" | "마스크해제여부" => Column::MaskDisabledFlag,
            "night_shift_label" | "야간 근무 여부" | "야간근무여부" => Column::NightShiftLabel,
            "legacy_risk_level_label" | "risk_level_label" | "위험지수" => {
                Column::LegacyRiskLevelLabel
            }
            "risk_score" | "총_위험점수" => Column::RiskScore,
            _ => return None,
        };
        Some(column)
    }
}

impl LogRecord {
    /// Numeric value of a sortable column, `None` for text columns
    pub fn numeric_value(&self, column: Column) -> Option<u32> {
        match column {
            Column::ProcessedHour => Some(self.processed_hour as u32),
            Column::QueryLength => Some(self.query_length),
            Column::RiskScore => Some(self.risk_score),
            _ => None,
        }
    }

    /// Text rendering of a column for projection and export
    pub fn field(&self, column: Column) -> String {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        match column {
            Column::EmployeeId => self.employee_id.clone(),
            Column::ProcessedHour => self.processed_hour.to_string(),
            Column::TaskCategory => text(&self.task_category),
            Column::ScreenName => text(&self.screen_name),
            Column::QueryLength => self.query_length.to_string(),
            Column::CustomerId => text(&self.customer_id),
            Column::MaskDisabledFlag => text(&self.mask_disabled_flag),
            Column::NightShiftLabel => text(&self.night_shift_label),
            Column::LegacyRiskLevelLabel => text(&self.risk_level_label),
            Column::RiskScore => self.risk_score.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_record(employee_id: &str, hour: u8) -> LogRecord {
    LogRecord {
        employee_id: employee_id.to_string(),
        processed_hour: hour,
        task_category: Some("상담".to_string()),
        screen_name: Some("고객조회".to_string()),
        customer_id: None,
        query_length: 0,
        mask_disabled_flag: Some("N".to_string()),
        mask_disabled: false,
        night_shift_label: Some("주간".to_string()),
        is_night_shift: false,
        risk_level_label: None,
        risk_score: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_korean_and_english_headers_resolve_to_same_column() {
        assert_eq!(Column::from_header("직원번호"), Some(Column::EmployeeId));
        assert_eq!(Column::from_header("employee_id"), Some(Column::EmployeeId));
        assert_eq!(Column::from_header(" 야간 근무 여부 "), Some(Column::NightShiftLabel));
        assert_eq!(Column::from_header("\u{feff}직원번호"), Some(Column::EmployeeId));
        assert_eq!(Column::from_header("Unnamed: 9"), None);
    }

    #[test]
    fn test_canonical_names_round_trip() {
        for column in [
            Column::EmployeeId,
            Column::ProcessedHour,
            Column::TaskCategory,
            Column::ScreenName,
            Column::QueryLength,
            Column::CustomerId,
            Column::MaskDisabledFlag,
            Column::NightShiftLabel,
            Column::LegacyRiskLevelLabel,
            Column::RiskScore,
        ] {
            assert_eq!(Column::from_header(column.as_str()), Some(column));
        }
    }

    #[test]
    fn test_numeric_value_only_for_numeric_columns() {
        let mut record = test_record("E1", 22);
        record.query_length = 310;
        record.risk_score = 50;
        assert_eq!(record.numeric_value(Column::ProcessedHour), Some(22));
        assert_eq!(record.numeric_value(Column::QueryLength), Some(310));
        assert_eq!(record.numeric_value(Column::RiskScore), Some(50));
        assert_eq!(record.numeric_value(Column::ScreenName), None);
    }
}
