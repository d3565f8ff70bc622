use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, MySql, MySqlPool, QueryBuilder};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::config::Config;
use crate::db::new_id;
use crate::error::AppError;
use crate::model::employee::Employee;
use crate::model::leave::LeaveType;
use crate::model::payslip::Component;
use crate::model::report::{HistoryAction, ReportKind};
use crate::service::attendance::AttendanceMetrics;
use crate::service::payslip::resolve_by_group_name;
use crate::service::projection::{self, AttendanceReportRow, Record};
use crate::utils::db_utils::{Filters, SqlValue, bind_as, bind_scalar};
use crate::utils::template_cache;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct OfficeHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl OfficeHours {
    pub fn from_config(config: &Config) -> Self {
        Self {
            start: config.office_start,
            end: config.office_end,
        }
    }
}

/// Query filters shared by every report kind; each kind reads the ones it knows.
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ReportFilters {
    /// Employee status (Active / Inactive)
    pub status: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    #[param(value_type = Option<String>, format = "date")]
    pub joining_from: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    #[param(value_type = Option<String>, format = "date")]
    pub joining_to: Option<NaiveDate>,
    pub gross_from: Option<f64>,
    pub gross_to: Option<f64>,
    pub loss_of_pay_from: Option<f64>,
    pub loss_of_pay_to: Option<f64>,
    pub tax_paid_from: Option<f64>,
    pub tax_paid_to: Option<f64>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    /// Attendance date range
    #[schema(value_type = Option<String>, format = "date")]
    #[param(value_type = Option<String>, format = "date")]
    pub date_from: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    #[param(value_type = Option<String>, format = "date")]
    pub date_to: Option<NaiveDate>,
    pub attendance_status: Option<String>,
    /// Substring of the employee's full name
    pub name: Option<String>,
    pub emp_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub limit: u32,
}

impl Paging {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(DEFAULT_PAGE).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 1000),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// In-memory page of an already filtered list.
    pub fn slice<T>(&self, mut items: Vec<T>) -> Vec<T> {
        let start = (self.offset() as usize).min(items.len());
        let end = (start + self.limit as usize).min(items.len());
        items.truncate(end);
        items.drain(..start);
        items
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectedReport {
    pub template_id: String,
    pub report_id: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub total: i64,
    #[serde(skip)]
    pub columns: &'static [&'static str],
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Record>,
}

/// Projects a report kind through its template. `paging: None` returns every row.
pub async fn generate(
    pool: &MySqlPool,
    kind: ReportKind,
    filters: &ReportFilters,
    paging: Option<Paging>,
    office: OfficeHours,
) -> Result<ProjectedReport, AppError> {
    let columns = projection::columns(kind)?;

    let report_id = sqlx::query_scalar::<_, String>(
        "SELECT id FROM reports WHERE report_type = ? AND is_deleted = FALSE LIMIT 1",
    )
    .bind(kind.full_name())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        AppError::not_found(format!(
            "Report for type \"{}\" not found. Please create this report first.",
            kind.as_ref()
        ))
    })?;

    let template = template_cache::get_by_type(pool, kind.as_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Template not found"))?;

    let (total, sources) = match kind {
        ReportKind::EmployeeSnapshot => employee_snapshot(pool, filters, paging).await?,
        ReportKind::AttendanceSummary => attendance_summary(pool, filters, paging, office).await?,
        ReportKind::Leave => leave_balances(pool, filters, paging).await?,
        ReportKind::PayslipSummary | ReportKind::PayslipComponent => {
            payslip(pool, kind, filters, paging).await?
        }
        // columns() already rejected the rest
        _ => (0, Vec::new()),
    };

    let rows: Vec<Record> = sources
        .into_iter()
        .map(|source| projection::project(&template, columns, source))
        .collect();

    info!(report = kind.as_ref(), total, returned = rows.len(), "Report generated");

    Ok(ProjectedReport {
        template_id: template.id,
        report_id,
        page: paging.map(|p| p.page),
        limit: paging.map(|p| p.limit),
        total,
        columns,
        rows,
    })
}

fn employee_filters(filters: &ReportFilters) -> Filters {
    let mut f = Filters::new("is_deleted = FALSE");
    f.push_opt("status = ?", filters.status.clone(), SqlValue::String);
    f.push_opt("joining_date >= ?", filters.joining_from, SqlValue::Date);
    f.push_opt("joining_date <= ?", filters.joining_to, SqlValue::Date);
    f.push_opt("ctc_annual >= ?", filters.gross_from, SqlValue::F64);
    f.push_opt("ctc_annual <= ?", filters.gross_to, SqlValue::F64);
    f.push_opt("loss_of_pay >= ?", filters.loss_of_pay_from, SqlValue::F64);
    f.push_opt("loss_of_pay <= ?", filters.loss_of_pay_to, SqlValue::F64);
    f.push_opt("tax_paid >= ?", filters.tax_paid_from, SqlValue::F64);
    f.push_opt("tax_paid <= ?", filters.tax_paid_to, SqlValue::F64);
    f.push_opt("designation = ?", filters.designation.clone(), SqlValue::String);
    f.push_opt("department = ?", filters.department.clone(), SqlValue::String);
    f.push_opt("location = ?", filters.location.clone(), SqlValue::String);
    f
}

fn name_filters(filters: &ReportFilters) -> Filters {
    let mut f = Filters::new("is_deleted = FALSE");
    if let Some(name) = filters.name.as_deref().filter(|n| !n.trim().is_empty()) {
        f.push(
            "CONCAT_WS(' ', first_name, last_name) LIKE ?",
            SqlValue::String(format!("%{}%", name.trim())),
        );
    }
    f.push_opt("emp_code = ?", filters.emp_code.clone(), SqlValue::String);
    f
}

async fn fetch_employees(
    pool: &MySqlPool,
    f: &Filters,
    paging: Option<Paging>,
) -> Result<(i64, Vec<Employee>), sqlx::Error> {
    let count_sql = format!("SELECT COUNT(*) FROM employees{}", f.sql);
    let total = bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql), &f.args)
        .fetch_one(pool)
        .await?;

    let mut data_sql = format!("SELECT * FROM employees{} ORDER BY emp_code", f.sql);
    if let Some(p) = paging {
        data_sql.push_str(&format!(" LIMIT {} OFFSET {}", p.limit, p.offset()));
    }
    debug!(sql = %data_sql, args = ?f.args, "Fetching report employees");

    let employees = bind_as(sqlx::query_as::<_, Employee>(&data_sql), &f.args)
        .fetch_all(pool)
        .await?;
    Ok((total, employees))
}

async fn employee_snapshot(
    pool: &MySqlPool,
    filters: &ReportFilters,
    paging: Option<Paging>,
) -> Result<(i64, Vec<Record>), AppError> {
    let (total, employees) = fetch_employees(pool, &employee_filters(filters), paging).await?;
    Ok((total, employees.iter().map(projection::employee_snapshot_source).collect()))
}

async fn attendance_summary(
    pool: &MySqlPool,
    filters: &ReportFilters,
    paging: Option<Paging>,
    office: OfficeHours,
) -> Result<(i64, Vec<Record>), AppError> {
    let mut f = Filters::new("e.is_deleted = FALSE");
    f.push_opt("a.date >= ?", filters.date_from, SqlValue::Date);
    f.push_opt("a.date <= ?", filters.date_to, SqlValue::Date);
    f.push_opt("a.status = ?", filters.attendance_status.clone(), SqlValue::String);

    let from = "FROM attendance a JOIN employees e ON e.emp_code = a.emp_code";
    let count_sql = format!("SELECT COUNT(*) {from}{}", f.sql);
    let total = bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql), &f.args)
        .fetch_one(pool)
        .await?;

    let mut data_sql = format!(
        "SELECT a.emp_code, e.first_name, e.last_name, e.status AS emp_status, a.status, a.date, a.in_time, a.out_time {from}{} ORDER BY a.date, a.emp_code",
        f.sql
    );
    if let Some(p) = paging {
        data_sql.push_str(&format!(" LIMIT {} OFFSET {}", p.limit, p.offset()));
    }

    let rows = bind_as(sqlx::query_as::<_, AttendanceReportRow>(&data_sql), &f.args)
        .fetch_all(pool)
        .await?;

    let records = rows
        .iter()
        .map(|row| {
            let metrics = AttendanceMetrics::compute(
                row.in_time.as_deref(),
                row.out_time.as_deref(),
                office.start,
                office.end,
            );
            projection::attendance_source(row, metrics)
        })
        .collect();
    Ok((total, records))
}

async fn leave_balances(
    pool: &MySqlPool,
    filters: &ReportFilters,
    paging: Option<Paging>,
) -> Result<(i64, Vec<Record>), AppError> {
    let (total, employees) = fetch_employees(pool, &name_filters(filters), paging).await?;
    if employees.is_empty() {
        return Ok((total, Vec::new()));
    }

    let mut builder: QueryBuilder<MySql> =
        QueryBuilder::new("SELECT emp_code, leave_type, balance FROM leave_balances WHERE emp_code IN (");
    let mut separated = builder.separated(", ");
    for e in &employees {
        separated.push_bind(e.emp_code.clone());
    }
    separated.push_unseparated(")");

    let rows = builder
        .build_query_as::<(String, LeaveType, f64)>()
        .fetch_all(pool)
        .await?;

    let mut by_employee: HashMap<String, HashMap<LeaveType, f64>> = HashMap::new();
    for (code, leave_type, balance) in rows {
        by_employee.entry(code).or_default().insert(leave_type, balance);
    }

    let empty = HashMap::new();
    let records = employees
        .iter()
        .map(|e| projection::leave_source(e, by_employee.get(&e.emp_code).unwrap_or(&empty)))
        .collect();
    Ok((total, records))
}

/// Payslip kinds resolve each employee's structure; employees whose structure
/// cannot be resolved are skipped, so paging happens after resolution.
async fn payslip(
    pool: &MySqlPool,
    kind: ReportKind,
    filters: &ReportFilters,
    paging: Option<Paging>,
) -> Result<(i64, Vec<Record>), AppError> {
    let (_, employees) = fetch_employees(pool, &name_filters(filters), None).await?;

    let mut structures: HashMap<String, Option<Vec<Component>>> = HashMap::new();
    let mut records = Vec::new();

    for e in &employees {
        if !structures.contains_key(&e.payslip_component) {
            let resolved = match resolve_by_group_name(pool, &e.payslip_component).await {
                Ok((_, components)) if !components.is_empty() => Some(components),
                Ok(_) => None,
                Err(AppError::NotFound(_)) => None,
                Err(other) => return Err(other),
            };
            structures.insert(e.payslip_component.clone(), resolved);
        }

        let Some(Some(components)) = structures.get(&e.payslip_component) else {
            debug!(emp_code = %e.emp_code, group = %e.payslip_component, "Skipping employee without structure");
            continue;
        };

        match kind {
            ReportKind::PayslipSummary => {
                records.push(projection::payslip_summary_source(e, components))
            }
            _ => records.extend(projection::payslip_component_sources(e, components)),
        }
    }

    if records.is_empty() {
        warn!(report = kind.as_ref(), "No payslip rows resolved");
    }

    let total = records.len() as i64;
    let records = match paging {
        Some(p) => p.slice(records),
        None => records,
    };
    Ok((total, records))
}

/// Appends an audit entry for a report, schedule or template change.
pub async fn record_history<'c, E>(
    executor: E,
    object: &str,
    action: HistoryAction,
    message: &str,
    who: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query(
        "INSERT INTO report_history (id, time, object, action, message, who) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(object)
    .bind(action)
    .bind(message)
    .bind(who)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_clamps() {
        assert_eq!(Paging::new(None, None), Paging { page: 1, limit: 10 });
        assert_eq!(Paging::new(Some(0), Some(0)), Paging { page: 1, limit: 1 });
        assert_eq!(Paging::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn slicing_pages_through_filtered_rows() {
        let items: Vec<u32> = (1..=25).collect();
        assert_eq!(Paging::new(Some(3), Some(10)).slice(items.clone()), vec![21, 22, 23, 24, 25]);
        assert_eq!(Paging::new(Some(2), Some(10)).slice(items.clone()).len(), 10);
        assert!(Paging::new(Some(9), Some(10)).slice(items).is_empty());
    }

    #[test]
    fn employee_filters_cover_ranges() {
        let filters = ReportFilters {
            status: Some("Active".into()),
            gross_from: Some(1000.0),
            tax_paid_to: Some(50.0),
            department: Some("R&D".into()),
            ..Default::default()
        };
        let f = employee_filters(&filters);
        assert_eq!(
            f.sql,
            " WHERE is_deleted = FALSE AND status = ? AND ctc_annual >= ? AND tax_paid <= ? AND department = ?"
        );
        assert_eq!(f.args[1], SqlValue::F64(1000.0));
    }

    #[test]
    fn name_filter_is_a_substring_match() {
        let filters = ReportFilters {
            name: Some(" Ada ".into()),
            emp_code: Some("EMP7".into()),
            ..Default::default()
        };
        let f = name_filters(&filters);
        assert!(f.sql.contains("LIKE ?"));
        assert_eq!(f.args[0], SqlValue::String("%Ada%".into()));
        assert_eq!(f.args[1], SqlValue::String("EMP7".into()));
    }
}
