use std::collections::{BTreeMap, HashSet};

use crate::auth::auth::AuthUser;
use crate::db::{BATCH_LIMIT, insert_in_batches, new_id, now_millis};
use crate::error::AppError;
use crate::model::attendance::{AttendanceStatus, EmpCodeEntry};
use crate::service::attendance::{
    PlannedDay, calendar, derive_clock_status, derive_leave_status, days_in_month, parse_import_date,
    plan_missing_days, yearly_summary,
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

/// Clock-in/out spreadsheet row.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ClockImportRow {
    #[serde(rename = "Employee Id")]
    pub emp_code: String,
    #[serde(rename = "Date (dd/mm/yy)")]
    pub date: String,
    #[serde(rename = "In Time (24 hour format)", default)]
    pub in_time: Option<String>,
    #[serde(rename = "Out Time (24 hour format)", default)]
    pub out_time: Option<String>,
}

/// Leave-aware spreadsheet row.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LeaveImportRow {
    #[serde(rename = "Employee Code")]
    pub emp_code: String,
    #[serde(rename = "Date (dd/mm/yy)")]
    pub date: String,
    #[serde(rename = "Hours", default, deserialize_with = "lenient_hours")]
    pub hours: Option<f64>,
    #[serde(rename = "Leaves ID", default, deserialize_with = "lenient_text")]
    pub leave_id: Option<String>,
    #[serde(rename = "Type", default, deserialize_with = "lenient_text")]
    pub leave_type: Option<String>,
}

/// Spreadsheet cells arrive as numbers or strings.
fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_hours<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Deserialize, ToSchema)]
pub struct MissingRequest {
    pub year: i32,
    /// 1-12
    pub month: u32,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct YearQuery {
    /// Defaults to the current year
    pub year: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct EditAttendance {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Serialize, ToSchema)]
pub struct ImportSummary {
    pub imported: usize,
}

/// Row ready for the attendance upsert.
struct DayRecord {
    emp_code: String,
    date: NaiveDate,
    status: AttendanceStatus,
    hours: Option<f64>,
    in_time: Option<String>,
    out_time: Option<String>,
    leave_type: Option<String>,
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    parse_import_date(raw)
        .ok_or_else(|| AppError::bad_request(format!("Invalid date {raw:?}, expected dd/mm/yy")))
}

fn clock_records(rows: Vec<ClockImportRow>) -> Result<Vec<DayRecord>, AppError> {
    rows.into_iter()
        .map(|row| {
            let date = parse_date(&row.date)?;
            let (hours, status) = derive_clock_status(row.in_time.as_deref(), row.out_time.as_deref());
            Ok(DayRecord {
                emp_code: row.emp_code.trim().to_string(),
                date,
                status,
                hours,
                in_time: row.in_time,
                out_time: row.out_time,
                leave_type: None,
            })
        })
        .collect()
}

fn leave_records(rows: Vec<LeaveImportRow>) -> Result<Vec<DayRecord>, AppError> {
    rows.into_iter()
        .map(|row| {
            let date = parse_date(&row.date)?;
            let status = derive_leave_status(row.hours, row.leave_id.as_deref(), row.leave_type.as_deref());
            Ok(DayRecord {
                emp_code: row.emp_code.trim().to_string(),
                date,
                status,
                hours: row.hours,
                in_time: None,
                out_time: None,
                leave_type: (status == AttendanceStatus::Leave).then_some(row.leave_type).flatten(),
            })
        })
        .collect()
}

/// Upserts every record in one transaction; a later row for the same
/// (employee, date) replaces the stored status.
async fn upsert_records(pool: &MySqlPool, records: &[DayRecord]) -> Result<(), AppError> {
    let now = now_millis();
    let mut tx = pool.begin().await?;

    for chunk in records.chunks(BATCH_LIMIT) {
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO attendance (id, emp_code, date, year, status, hours, in_time, out_time, leave_type, created_at) ",
        );
        builder.push_values(chunk, |mut b, r| {
            b.push_bind(new_id())
                .push_bind(r.emp_code.clone())
                .push_bind(r.date)
                .push_bind(r.date.year())
                .push_bind(r.status)
                .push_bind(r.hours)
                .push_bind(r.in_time.clone())
                .push_bind(r.out_time.clone())
                .push_bind(r.leave_type.clone())
                .push_bind(now);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE status = VALUES(status), hours = VALUES(hours), in_time = VALUES(in_time), \
             out_time = VALUES(out_time), leave_type = VALUES(leave_type), updated_at = ",
        );
        builder.push_bind(now);
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Import clock-in/out rows
#[utoipa::path(
    post,
    path = "/api/attendance/create",
    request_body = Vec<ClockImportRow>,
    responses(
        (status = 201, description = "Rows imported", body = ImportSummary),
        (status = 400, description = "A row has an unparseable date")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn import_clock(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<Vec<ClockImportRow>>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let records = clock_records(body.into_inner())?;
    upsert_records(pool.get_ref(), &records).await?;

    info!(rows = records.len(), by = %auth.username, "Clock attendance imported");
    Ok(HttpResponse::Created().json(ImportSummary { imported: records.len() }))
}

/// Import leave-aware rows
#[utoipa::path(
    post,
    path = "/api/attendance/create/leave",
    request_body = Vec<LeaveImportRow>,
    responses(
        (status = 201, description = "Rows imported", body = ImportSummary),
        (status = 400, description = "A row has an unparseable date")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn import_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<Vec<LeaveImportRow>>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let records = leave_records(body.into_inner())?;
    upsert_records(pool.get_ref(), &records).await?;

    info!(rows = records.len(), by = %auth.username, "Leave attendance imported");
    Ok(HttpResponse::Created().json(ImportSummary { imported: records.len() }))
}

async fn active_employees(pool: &MySqlPool) -> Result<Vec<EmpCodeEntry>, sqlx::Error> {
    sqlx::query_as::<_, EmpCodeEntry>(
        r#"
        SELECT c.emp_code, c.fname, c.lname
        FROM emp_codes c
        JOIN employees e ON e.id = c.employee_id
        WHERE c.is_deleted = FALSE AND e.status = 'Active'
        ORDER BY c.emp_code
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Fill holidays and week-offs
#[utoipa::path(
    post,
    path = "/api/attendance/missing",
    request_body = MissingRequest,
    responses(
        (status = 200, description = "Missing non-working days filled", body = Object, example = json!({"inserted": 124})),
        (status = 400, description = "Invalid month")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn fill_missing(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<MissingRequest>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let MissingRequest { year, month } = body.into_inner();

    let days = days_in_month(year, month)?;
    let (Some(first), Some(last)) = (days.first().copied(), days.last().copied()) else {
        return Err(AppError::bad_request("Month has no days"));
    };

    let employees: Vec<String> = active_employees(pool.get_ref())
        .await?
        .into_iter()
        .map(|e| e.emp_code)
        .collect();

    let existing: HashSet<(String, NaiveDate)> = sqlx::query_as::<_, (String, NaiveDate)>(
        "SELECT emp_code, date FROM attendance WHERE date BETWEEN ? AND ?",
    )
    .bind(first)
    .bind(last)
    .fetch_all(pool.get_ref())
    .await?
    .into_iter()
    .collect();

    let holidays: HashSet<NaiveDate> =
        sqlx::query_scalar::<_, NaiveDate>("SELECT date FROM holidays WHERE date BETWEEN ? AND ?")
            .bind(first)
            .bind(last)
            .fetch_all(pool.get_ref())
            .await?
            .into_iter()
            .collect();

    let planned = plan_missing_days(year, month, &employees, &existing, &holidays)?;
    if planned.is_empty() {
        warn!(year, month, "No missing attendance days to fill");
        return Ok(HttpResponse::Ok().json(json!({ "inserted": 0 })));
    }

    let now = now_millis();
    let inserted = insert_in_batches(
        pool.get_ref(),
        "INSERT IGNORE INTO attendance (id, emp_code, date, year, status, created_at) ",
        &planned,
        |mut b, day: &PlannedDay| {
            b.push_bind(new_id())
                .push_bind(day.emp_code.clone())
                .push_bind(day.date)
                .push_bind(day.date.year())
                .push_bind(day.status)
                .push_bind(now);
        },
    )
    .await?;

    info!(year, month, employees = employees.len(), inserted, "Filled missing attendance");
    Ok(HttpResponse::Ok().json(json!({ "inserted": inserted })))
}

/// Yearly summary for all employees
#[utoipa::path(
    get,
    path = "/api/attendance/getAll",
    params(YearQuery),
    responses((status = 200, description = "Per-employee monthly status counts", body = Vec<EmployeeYearSummary>)),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn yearly(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<YearQuery>,
) -> Result<HttpResponse, AppError> {
    let year = query.year.unwrap_or_else(|| Utc::now().year());

    let employees = active_employees(pool.get_ref()).await?;
    let rows = sqlx::query_as::<_, (String, NaiveDate, AttendanceStatus)>(
        "SELECT emp_code, date, status FROM attendance WHERE year = ?",
    )
    .bind(year)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(yearly_summary(year, &employees, &rows)))
}

/// Yearly calendar of one employee
#[utoipa::path(
    get,
    path = "/api/attendance/get/{code}",
    params(("code", Path, description = "Employee code"), YearQuery),
    responses((status = 200, description = "month -> day -> status", body = Object)),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn employee_calendar(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    query: web::Query<YearQuery>,
) -> Result<HttpResponse, AppError> {
    let code = path.into_inner();
    let year = query.year.unwrap_or_else(|| Utc::now().year());

    let rows = sqlx::query_as::<_, (NaiveDate, AttendanceStatus)>(
        "SELECT date, status FROM attendance WHERE emp_code = ? AND year = ? ORDER BY date",
    )
    .bind(&code)
    .bind(year)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "emp_code": code,
        "year": year,
        "months": calendar(&rows),
    })))
}

/// One month of one employee
#[utoipa::path(
    get,
    path = "/api/attendance/getMonthly/{code}/{year}/{month}",
    params(
        ("code", Path, description = "Employee code"),
        ("year", Path, description = "Year"),
        ("month", Path, description = "Month, 1-12")
    ),
    responses((status = 200, description = "day -> status", body = Object)),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn employee_month(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(String, i32, u32)>,
) -> Result<HttpResponse, AppError> {
    let (code, year, month) = path.into_inner();
    let days = days_in_month(year, month)?;
    let (Some(first), Some(last)) = (days.first().copied(), days.last().copied()) else {
        return Err(AppError::bad_request("Month has no days"));
    };

    let rows = sqlx::query_as::<_, (NaiveDate, AttendanceStatus)>(
        "SELECT date, status FROM attendance WHERE emp_code = ? AND date BETWEEN ? AND ? ORDER BY date",
    )
    .bind(&code)
    .bind(first)
    .bind(last)
    .fetch_all(pool.get_ref())
    .await?;

    let by_day: BTreeMap<u32, AttendanceStatus> = rows.into_iter().map(|(d, s)| (d.day(), s)).collect();
    Ok(HttpResponse::Ok().json(json!({
        "emp_code": code,
        "year": year,
        "month": month,
        "days": by_day,
    })))
}

/// Edit one day's status
#[utoipa::path(
    patch,
    path = "/api/attendance/edit/{code}",
    params(("code", Path, description = "Employee code")),
    request_body = EditAttendance,
    responses(
        (status = 200, description = "Status updated"),
        (status = 404, description = "No attendance row for that day")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn edit_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    body: web::Json<EditAttendance>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let code = path.into_inner();

    let result = sqlx::query("UPDATE attendance SET status = ?, updated_at = ? WHERE emp_code = ? AND date = ?")
        .bind(body.status)
        .bind(now_millis())
        .bind(&code)
        .bind(body.date)
        .execute(pool.get_ref())
        .await?;

    // MySQL reports 0 affected rows when the status is unchanged
    if result.rows_affected() == 0 {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM attendance WHERE emp_code = ? AND date = ?)",
        )
        .bind(&code)
        .bind(body.date)
        .fetch_one(pool.get_ref())
        .await?;
        if !exists {
            return Err(AppError::not_found("Attendance record not found"));
        }
    }

    info!(emp_code = %code, date = %body.date, status = body.status.as_ref(), "Attendance edited");
    Ok(HttpResponse::Ok().json(json!({ "message": "Attendance updated successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_rows_use_spreadsheet_headers() {
        let rows: Vec<ClockImportRow> = serde_json::from_value(json!([
            {"Employee Id": "EMP1", "Date (dd/mm/yy)": "02/01/24", "In Time (24 hour format)": "09:00", "Out Time (24 hour format)": "17:30"},
            {"Employee Id": "EMP2", "Date (dd/mm/yy)": "02/01/24", "In Time (24 hour format)": "10:00", "Out Time (24 hour format)": "15:00"},
            {"Employee Id": "EMP3", "Date (dd/mm/yy)": "02/01/24"}
        ]))
        .unwrap();

        let records = clock_records(rows).unwrap();
        assert_eq!(records[0].status, AttendanceStatus::Present);
        assert_eq!(records[0].hours, Some(8.5));
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(records[1].status, AttendanceStatus::HalfDay);
        assert_eq!(records[2].status, AttendanceStatus::Absent);
        assert_eq!(records[2].hours, None);
    }

    #[test]
    fn one_bad_date_rejects_the_import() {
        let rows: Vec<ClockImportRow> = serde_json::from_value(json!([
            {"Employee Id": "EMP1", "Date (dd/mm/yy)": "02/01/24"},
            {"Employee Id": "EMP1", "Date (dd/mm/yy)": "31/02/24"}
        ]))
        .unwrap();
        assert!(matches!(clock_records(rows), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn leave_rows_accept_numeric_cells() {
        let rows: Vec<LeaveImportRow> = serde_json::from_value(json!([
            {"Employee Code": "EMP1", "Date (dd/mm/yy)": "03/01/24", "Hours": 0, "Leaves ID": 42, "Type": "Sick"},
            {"Employee Code": "EMP2", "Date (dd/mm/yy)": "03/01/24", "Hours": "6"},
            {"Employee Code": "EMP3", "Date (dd/mm/yy)": "03/01/24", "Hours": 9, "Leaves ID": "", "Type": "Sick"}
        ]))
        .unwrap();

        let records = leave_records(rows).unwrap();
        assert_eq!(records[0].status, AttendanceStatus::Leave);
        assert_eq!(records[0].leave_type.as_deref(), Some("Sick"));
        assert_eq!(records[1].status, AttendanceStatus::HalfDay);
        assert_eq!(records[2].status, AttendanceStatus::Present);
        assert_eq!(records[2].leave_type, None);
    }
}
