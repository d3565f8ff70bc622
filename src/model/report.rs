use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

/// Report types, keyed by the short name used for templates and exports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, AsRefStr, EnumString, EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ReportKind {
    EmployeeSnapshot,
    AttendanceSummary,
    Leave,
    PayslipSummary,
    PayslipComponent,
    ProvidentFund,
    EmployeeDeclaration,
    AttendanceTimeLog,
}

impl ReportKind {
    pub fn full_name(&self) -> &'static str {
        match self {
            ReportKind::EmployeeSnapshot => "Employees Snapshot Report",
            ReportKind::AttendanceSummary => "Attendance Summary Report",
            ReportKind::Leave => "Leave Report",
            ReportKind::PayslipSummary => "Payslip Summary Report",
            ReportKind::PayslipComponent => "Payslip Component Report",
            ReportKind::ProvidentFund => "Provident Fund Report",
            ReportKind::EmployeeDeclaration => "Employee Declaration Report",
            ReportKind::AttendanceTimeLog => "Attendance Time log Report",
        }
    }

    pub fn from_full_name(name: &str) -> Option<Self> {
        ReportKind::iter().find(|k| k.full_name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum ReportFrequency {
    Daily,
    Weekly,
    Monthly,
}

varchar_enum!(ReportFrequency);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum ReportFormat {
    #[serde(rename = "CSV")]
    #[strum(serialize = "CSV")]
    Csv,
    Excel,
    #[serde(rename = "PDF")]
    #[strum(serialize = "PDF")]
    Pdf,
}

varchar_enum!(ReportFormat);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Report {
    pub id: String,
    pub snum: String,
    /// Full report type name, e.g. "Leave Report"
    pub report_type: String,
    pub name: String,
    pub description: Option<String>,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ScheduleReport {
    pub id: String,
    pub report_id: String,
    pub frequency: ReportFrequency,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    pub hours: i32,
    pub minutes: i32,
    pub format: ReportFormat,
    #[schema(value_type = Vec<String>)]
    pub recipients: Json<Vec<String>>,
    #[schema(value_type = Vec<String>)]
    pub cc: Json<Vec<String>>,
    pub subject: String,
    pub body: String,
    /// Epoch millis of the next run
    pub next_run_date: i64,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct ReportTemplate {
    pub id: String,
    pub template_type: String,
    #[schema(value_type = Object)]
    pub flags: Json<Map<String, Value>>,
}

impl ReportTemplate {
    pub fn enabled(&self, column: &str) -> bool {
        self.flags.get(column).and_then(Value::as_bool).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HistoryAction {
    Create,
    Update,
    Delete,
}

varchar_enum!(HistoryAction);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ReportHistory {
    pub id: String,
    /// RFC 3339 timestamp
    pub time: String,
    pub object: String,
    pub action: HistoryAction,
    pub message: String,
    pub who: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_keys_map_to_full_names() {
        let kind: ReportKind = "payslipComponent".parse().unwrap();
        assert_eq!(kind, ReportKind::PayslipComponent);
        assert_eq!(kind.full_name(), "Payslip Component Report");
        assert_eq!(ReportKind::Leave.as_ref(), "leave");
        assert_eq!(
            ReportKind::from_full_name("Attendance Time log Report"),
            Some(ReportKind::AttendanceTimeLog)
        );
        assert_eq!(ReportKind::from_full_name("Weekly Report"), None);
    }

    #[test]
    fn formats_use_display_names() {
        assert_eq!(ReportFormat::Csv.as_ref(), "CSV");
        assert_eq!("Excel".parse::<ReportFormat>().unwrap(), ReportFormat::Excel);
        assert_eq!(serde_json::to_value(ReportFormat::Pdf).unwrap(), "PDF");
    }

    #[test]
    fn missing_or_non_bool_flags_are_disabled() {
        let mut flags = Map::new();
        flags.insert("name".into(), Value::Bool(true));
        flags.insert("pan".into(), Value::String("yes".into()));
        let template = ReportTemplate {
            id: "t".into(),
            template_type: "employeeSnapshot".into(),
            flags: Json(flags),
        };

        assert!(template.enabled("name"));
        assert!(!template.enabled("pan"));
        assert!(!template.enabled("email"));
    }
}
