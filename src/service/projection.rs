use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::model::employee::Employee;
use crate::model::leave::LeaveType;
use crate::model::payslip::{Component, DEDUCTION, EARNING};
use crate::model::report::{ReportKind, ReportTemplate};
use crate::service::attendance::AttendanceMetrics;
use crate::service::payslip::total_of_type;

pub type Record = Map<String, Value>;

const EMPLOYEE_SNAPSHOT: &[&str] = &[
    "name",
    "emp_id",
    "status",
    "joining_date",
    "designation",
    "department",
    "location",
    "gender",
    "email",
    "pan",
    "gross_salary",
    "lossOfPay",
    "taxPaid",
    "netPay",
    "leave",
    "leaveAdjustment",
    "leaveBalance",
    "workingPattern",
    "phone",
];

const ATTENDANCE_SUMMARY: &[&str] = &[
    "emp_id",
    "name",
    "status",
    "attendanceStatus",
    "date",
    "inTime",
    "outTime",
    "timeSpent",
    "lateBy",
    "earlyBy",
    "overTime",
];

const LEAVE: &[&str] = &["emp_id", "name", "status", "privileged", "sick", "casual", "planned"];

const PAYSLIP_SUMMARY: &[&str] = &[
    "name",
    "emp_id",
    "status",
    "designation",
    "department",
    "location",
    "basic",
    "hra",
    "conveyance",
    "totalEarnings",
    "totalDeductions",
    "pf",
    "pt",
    "esi",
    "epf",
    "eesi",
];

const PAYSLIP_COMPONENT: &[&str] = &[
    "name",
    "emp_id",
    "status",
    "phoneNum",
    "designation",
    "department",
    "location",
    "componentName",
    "code",
    "type",
    "amount",
];

/// Column order of a report kind, or an error for kinds without a projection.
pub fn columns(kind: ReportKind) -> Result<&'static [&'static str], AppError> {
    match kind {
        ReportKind::EmployeeSnapshot => Ok(EMPLOYEE_SNAPSHOT),
        ReportKind::AttendanceSummary => Ok(ATTENDANCE_SUMMARY),
        ReportKind::Leave => Ok(LEAVE),
        ReportKind::PayslipSummary => Ok(PAYSLIP_SUMMARY),
        ReportKind::PayslipComponent => Ok(PAYSLIP_COMPONENT),
        other => Err(AppError::bad_request(format!(
            "{} cannot be generated",
            other.full_name()
        ))),
    }
}

/// Emits every column in order, nulling the ones the template hides.
pub fn project(template: &ReportTemplate, columns: &[&str], mut source: Record) -> Record {
    let mut out = Map::with_capacity(columns.len());
    for &column in columns {
        let value = if template.enabled(column) {
            source.remove(column).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        out.insert(column.to_string(), value);
    }
    out
}

/// Checks a template edit against the columns of its kind.
pub fn validate_flags(kind: ReportKind, flags: &Map<String, Value>) -> Result<(), AppError> {
    let known = columns(kind)?;
    if flags.is_empty() {
        return Err(AppError::bad_request("No template fields provided"));
    }

    for (key, value) in flags {
        if !known.contains(&key.as_str()) {
            return Err(AppError::bad_request(format!(
                "Unknown field {key} for {}",
                kind.full_name()
            )));
        }
        if !value.is_boolean() {
            return Err(AppError::bad_request(format!("Field {key} must be a boolean")));
        }
    }
    Ok(())
}

fn record(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Record {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

pub fn employee_snapshot_source(e: &Employee) -> Record {
    record([
        ("name", json!(e.full_name())),
        ("emp_id", json!(e.emp_code)),
        ("status", json!(e.status)),
        ("joining_date", json!(e.joining_date.format("%Y-%m-%d").to_string())),
        ("designation", json!(e.designation)),
        ("department", json!(e.department)),
        ("location", json!(e.location)),
        ("gender", json!(e.gender)),
        ("email", json!(e.primary_email)),
        ("pan", json!(e.pan_num)),
        ("gross_salary", json!(e.ctc_annual)),
        ("lossOfPay", json!(e.loss_of_pay)),
        ("taxPaid", json!(e.tax_paid)),
        ("netPay", json!(e.net_pay)),
        ("leave", json!(e.leave_type)),
        ("leaveAdjustment", json!(e.leave_adjustment)),
        ("leaveBalance", json!(e.leave_balance)),
        ("workingPattern", json!(e.work_week)),
        ("phone", json!(e.phone_num)),
    ])
}

/// One attendance row joined with its employee.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceReportRow {
    pub emp_code: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub emp_status: String,
    pub status: String,
    pub date: chrono::NaiveDate,
    pub in_time: Option<String>,
    pub out_time: Option<String>,
}

pub fn attendance_source(row: &AttendanceReportRow, metrics: AttendanceMetrics) -> Record {
    let name = format!("{} {}", row.first_name, row.last_name.as_deref().unwrap_or_default());
    record([
        ("emp_id", json!(row.emp_code)),
        ("name", json!(name.trim())),
        ("status", json!(row.emp_status)),
        ("attendanceStatus", json!(row.status)),
        ("date", json!(row.date.format("%Y-%m-%d").to_string())),
        ("inTime", json!(row.in_time)),
        ("outTime", json!(row.out_time)),
        ("timeSpent", json!(metrics.time_spent)),
        ("lateBy", json!(metrics.late_by)),
        ("earlyBy", json!(metrics.early_by)),
        ("overTime", json!(metrics.over_time)),
    ])
}

pub fn leave_source(e: &Employee, balances: &HashMap<LeaveType, f64>) -> Record {
    let balance = |t: LeaveType| json!(balances.get(&t));
    record([
        ("emp_id", json!(e.emp_code)),
        ("name", json!(e.full_name())),
        ("status", json!(e.status)),
        ("privileged", balance(LeaveType::Privileged)),
        ("sick", balance(LeaveType::Sick)),
        ("casual", balance(LeaveType::Casual)),
        ("planned", balance(LeaveType::Planned)),
    ])
}

/// Component value as a number when it is one, otherwise the raw text.
fn component_value(c: &Component) -> Value {
    c.value
        .trim()
        .parse::<f64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(c.value.clone()))
}

pub fn payslip_summary_source(e: &Employee, components: &[Component]) -> Record {
    let by_code: HashMap<String, &Component> = components
        .iter()
        .map(|c| (c.code.to_lowercase(), c))
        .collect();
    let code = |k: &str| by_code.get(k).map(|c| component_value(c)).unwrap_or(Value::Null);

    record([
        ("name", json!(e.full_name())),
        ("emp_id", json!(e.emp_code)),
        ("status", json!(e.status)),
        ("designation", json!(e.designation)),
        ("department", json!(e.department)),
        ("location", json!(e.location)),
        ("basic", code("basic")),
        ("hra", code("hra")),
        ("conveyance", code("conveyance")),
        ("totalEarnings", json!(total_of_type(components, EARNING))),
        ("totalDeductions", json!(total_of_type(components, DEDUCTION))),
        ("pf", code("pf")),
        ("pt", code("pt")),
        ("esi", code("esi")),
        ("epf", code("epf")),
        ("eesi", code("eesi")),
    ])
}

pub fn payslip_component_sources(e: &Employee, components: &[Component]) -> Vec<Record> {
    components
        .iter()
        .map(|c| {
            record([
                ("name", json!(e.full_name())),
                ("emp_id", json!(e.emp_code)),
                ("status", json!(e.status)),
                ("phoneNum", json!(e.phone_num)),
                ("designation", json!(e.designation)),
                ("department", json!(e.department)),
                ("location", json!(e.location)),
                ("componentName", json!(c.name)),
                ("code", json!(c.code)),
                ("type", json!(c.component_type)),
                ("amount", component_value(c)),
            ])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::employee::{EmployeeStatus, Gender};
    use crate::model::payslip::CalculationType;
    use chrono::NaiveDate;
    use sqlx::types::Json;

    fn template(kind: ReportKind, enabled: &[&str]) -> ReportTemplate {
        let flags = columns(kind)
            .unwrap()
            .iter()
            .map(|c| (c.to_string(), Value::Bool(enabled.contains(c))))
            .collect();
        ReportTemplate {
            id: "tpl".into(),
            template_type: kind.as_ref().into(),
            flags: Json(flags),
        }
    }

    pub(crate) fn employee() -> Employee {
        Employee {
            id: "e1".into(),
            emp_code: "EMP7".into(),
            title: None,
            first_name: "Ada".into(),
            last_name: Some("Lovelace".into()),
            gender: Gender::Female,
            primary_email: "ada@example.com".into(),
            phone_code: None,
            phone_num: "555-0101".into(),
            status: EmployeeStatus::Active,
            pan_num: None,
            joining_date: NaiveDate::from_ymd_opt(2023, 4, 1).unwrap(),
            department: "R&D".into(),
            designation: "Analyst".into(),
            location: "London".into(),
            reporting_manager: "Babbage".into(),
            work_week: "Mon-Fri".into(),
            holiday_group: "UK".into(),
            ctc_annual: 120000.0,
            payslip_component: "Standard".into(),
            role: "Employee".into(),
            leave_type: "Standard".into(),
            loss_of_pay: Some(0.0),
            tax_paid: None,
            net_pay: None,
            leave_adjustment: None,
            leave_balance: None,
            is_deleted: false,
            created_at: 0,
            updated_at: None,
        }
    }

    fn component(code: &str, kind: &str, value: &str) -> Component {
        Component {
            id: code.into(),
            group_id: Some("S".into()),
            component_type: kind.into(),
            show_on_payslip: true,
            name: code.to_uppercase(),
            code: code.into(),
            calculation_type: CalculationType::Fixed,
            value: value.into(),
            min_value: None,
            max_value: None,
            test_amount: "0".into(),
            taxable: false,
            leave_based: false,
            ctc: false,
            adjustment_balanced: false,
            is_default: false,
            is_deleted: false,
            created_at: 0,
            updated_at: None,
        }
    }

    #[test]
    fn every_column_is_emitted_in_order() {
        let kind = ReportKind::EmployeeSnapshot;
        let tpl = template(kind, &["name", "email"]);
        let row = project(&tpl, columns(kind).unwrap(), employee_snapshot_source(&employee()));

        let keys: Vec<_> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, EMPLOYEE_SNAPSHOT);
        assert_eq!(row["name"], "Ada Lovelace");
        assert_eq!(row["email"], "ada@example.com");
        assert_eq!(row["emp_id"], Value::Null);
        assert_eq!(row["gross_salary"], Value::Null);
    }

    #[test]
    fn enabled_column_without_value_is_null() {
        let kind = ReportKind::EmployeeSnapshot;
        let tpl = template(kind, &["pan", "status"]);
        let row = project(&tpl, columns(kind).unwrap(), employee_snapshot_source(&employee()));
        assert_eq!(row["pan"], Value::Null);
        assert_eq!(row["status"], "Active");
    }

    #[test]
    fn kinds_without_projection_are_rejected() {
        assert!(matches!(columns(ReportKind::ProvidentFund), Err(AppError::BadRequest(_))));
        assert!(columns(ReportKind::Leave).is_ok());
    }

    #[test]
    fn template_edits_only_accept_known_boolean_fields() {
        let mut flags = Map::new();
        flags.insert("sick".into(), Value::Bool(false));
        assert!(validate_flags(ReportKind::Leave, &flags).is_ok());

        flags.insert("bonus".into(), Value::Bool(true));
        assert!(validate_flags(ReportKind::Leave, &flags).is_err());

        let mut flags = Map::new();
        flags.insert("sick".into(), json!("yes"));
        assert!(validate_flags(ReportKind::Leave, &flags).is_err());
        assert!(validate_flags(ReportKind::Leave, &Map::new()).is_err());
    }

    #[test]
    fn leave_row_pivots_balances() {
        let balances: HashMap<_, _> = [(LeaveType::Sick, 4.0), (LeaveType::Casual, 2.5)].into();
        let kind = ReportKind::Leave;
        let all = columns(kind).unwrap();
        let row = project(&template(kind, all), all, leave_source(&employee(), &balances));

        assert_eq!(row["sick"], 4.0);
        assert_eq!(row["casual"], 2.5);
        assert_eq!(row["planned"], Value::Null);
    }

    #[test]
    fn payslip_summary_sums_by_type() {
        let comps = vec![
            component("BASIC", EARNING, "5000"),
            component("hra", EARNING, "2000.456"),
            component("pf", DEDUCTION, "600"),
            component("pt", DEDUCTION, "basic * 0.01"),
        ];
        let kind = ReportKind::PayslipSummary;
        let all = columns(kind).unwrap();
        let row = project(&template(kind, all), all, payslip_summary_source(&employee(), &comps));

        assert_eq!(row["basic"], 5000.0);
        assert_eq!(row["totalEarnings"], 7000.46);
        assert_eq!(row["totalDeductions"], 600.0);
        assert_eq!(row["pt"], "basic * 0.01");
        assert_eq!(row["esi"], Value::Null);
    }

    #[test]
    fn component_report_has_one_row_per_component() {
        let comps = vec![component("basic", EARNING, "5000"), component("pf", DEDUCTION, "600")];
        let rows = payslip_component_sources(&employee(), &comps);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["type"], DEDUCTION);
        assert_eq!(rows[1]["amount"], 600.0);
    }

    #[test]
    fn attendance_row_carries_metrics() {
        let row = AttendanceReportRow {
            emp_code: "EMP7".into(),
            first_name: "Ada".into(),
            last_name: None,
            emp_status: "Active".into(),
            status: "P".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            in_time: Some("09:10".into()),
            out_time: Some("18:30".into()),
        };
        let metrics = AttendanceMetrics {
            time_spent: Some(560),
            late_by: Some(10),
            early_by: Some(0),
            over_time: Some(30),
        };
        let source = attendance_source(&row, metrics);
        assert_eq!(source["name"], "Ada");
        assert_eq!(source["date"], "2024-01-02");
        assert_eq!(source["lateBy"], 10);
    }
}
