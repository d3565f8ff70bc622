use std::sync::Arc;

use crate::{
    api::{Page, PageQuery},
    auth::auth::AuthUser,
    db::{new_id, now_millis},
    error::AppError,
    model::report::{
        HistoryAction, Report, ReportFormat, ReportFrequency, ReportHistory, ReportKind, ReportTemplate,
        ScheduleReport,
    },
    model::sequence::REPORT_SEQUENCE,
    service::{
        export::{self, ExportFormat},
        job::{JobRunSummary, SqlJobStore, run_scheduled_jobs},
        mailer::Mailer,
        projection::validate_flags,
        report::{OfficeHours, Paging, ProjectedReport, ReportFilters, generate, record_history},
        schedule::{format_next_run, next_run_after},
        sequence::next_code,
    },
    utils::template_cache,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{MySqlPool, types::Json};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const REPORT_OBJECT: &str = "Report";
const SCHEDULE_OBJECT: &str = "Schedule Report";
const TEMPLATE_OBJECT: &str = "Report Template";

/// Accepts either the short key (`leave`) or the full name (`Leave Report`).
fn parse_kind(raw: &str) -> Result<ReportKind, AppError> {
    ReportKind::from_full_name(raw)
        .or_else(|| raw.parse().ok())
        .ok_or_else(|| AppError::bad_request(format!("Unknown report type {raw}")))
}

fn duplicate_report(kind: ReportKind) -> AppError {
    AppError::Conflict(format!("{} already exists", kind.full_name()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReport {
    #[schema(example = "Leave Report")]
    pub report_type: String,
    #[schema(example = "Quarterly leave")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DataQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// `excel` (default) or `csv`
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScheduleRequest {
    pub frequency: ReportFrequency,
    #[schema(example = "2026-11-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = 9)]
    pub hours: i32,
    #[schema(example = 30)]
    pub minutes: i32,
    pub format: ReportFormat,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

impl ScheduleRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.recipients.iter().all(|r| r.trim().is_empty()) {
            return Err(AppError::bad_request("At least one recipient is required"));
        }
        if self.subject.trim().is_empty() {
            return Err(AppError::bad_request("Subject is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSchedule {
    pub frequency: Option<ReportFrequency>,
    #[schema(format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    pub hours: Option<i32>,
    pub minutes: Option<i32>,
    pub format: Option<ReportFormat>,
    pub recipients: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl UpdateSchedule {
    fn changes_timing(&self) -> bool {
        self.frequency.is_some() || self.start_date.is_some() || self.hours.is_some() || self.minutes.is_some()
    }

    /// Current schedule with the supplied fields laid over it.
    fn merge(self, current: &ScheduleReport) -> ScheduleRequest {
        ScheduleRequest {
            frequency: self.frequency.unwrap_or(current.frequency),
            start_date: self.start_date.unwrap_or(current.start_date),
            hours: self.hours.unwrap_or(current.hours),
            minutes: self.minutes.unwrap_or(current.minutes),
            format: self.format.unwrap_or(current.format),
            recipients: self.recipients.unwrap_or_else(|| current.recipients.0.clone()),
            cc: self.cc.unwrap_or_else(|| current.cc.0.clone()),
            subject: self.subject.unwrap_or_else(|| current.subject.clone()),
            body: self.body.unwrap_or_else(|| current.body.clone()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: ScheduleReport,
    /// Human readable next run, e.g. "05 Mar 2026, 09:30 AM"
    pub next_run: String,
}

impl From<ScheduleReport> for ScheduleView {
    fn from(schedule: ScheduleReport) -> Self {
        Self {
            next_run: format_next_run(schedule.next_run_date),
            schedule,
        }
    }
}

/// Create a report
#[utoipa::path(
    post,
    path = "/api/report",
    request_body = CreateReport,
    responses(
        (status = 201, description = "Report created", body = Report),
        (status = 400, description = "Unknown report type"),
        (status = 409, description = "A report of this type already exists")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn create_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateReport>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let p = payload.into_inner();
    let kind = parse_kind(p.report_type.trim())?;
    if p.name.trim().is_empty() {
        return Err(AppError::bad_request("Report name is required"));
    }

    // The sequence row lock serializes concurrent creates
    let mut tx = pool.begin().await?;
    let snum = next_code(&mut tx, REPORT_SEQUENCE).await?;
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM reports WHERE report_type = ? AND is_deleted = FALSE)",
    )
    .bind(kind.full_name())
    .fetch_one(&mut *tx)
    .await?;
    if taken {
        return Err(duplicate_report(kind));
    }

    let report = Report {
        id: new_id(),
        snum,
        report_type: kind.full_name().to_string(),
        name: p.name.trim().to_string(),
        description: p.description,
        is_deleted: false,
        created_at: now_millis(),
        updated_at: None,
    };

    sqlx::query(
        "INSERT INTO reports (id, snum, report_type, name, description, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&report.id)
    .bind(&report.snum)
    .bind(&report.report_type)
    .bind(&report.name)
    .bind(&report.description)
    .bind(report.created_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23000") => duplicate_report(kind),
        other => other.into(),
    })?;

    record_history(
        &mut *tx,
        REPORT_OBJECT,
        HistoryAction::Create,
        &format!("{} created as {}", report.report_type, report.snum),
        &auth.username,
    )
    .await?;
    tx.commit().await?;

    info!(report_id = %report.id, snum = %report.snum, kind = kind.as_ref(), "Report created");
    Ok(HttpResponse::Created().json(report))
}

/// List reports
#[utoipa::path(
    get,
    path = "/api/report",
    params(PageQuery),
    responses((status = 200, description = "Live reports, newest first", body = ReportListResponse)),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn list_reports(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, per_page, offset) = query.bounds();

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reports WHERE is_deleted = FALSE")
        .fetch_one(pool.get_ref())
        .await?;

    let reports = sqlx::query_as::<_, Report>(
        "SELECT * FROM reports WHERE is_deleted = FALSE ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(Page::new(reports, page, per_page, total)))
}

/// Soft delete a report together with its schedules
#[utoipa::path(
    delete,
    path = "/api/report/{id}",
    params(("id", Path, description = "Report ID")),
    responses(
        (status = 204, description = "Report deleted"),
        (status = 404, description = "Report not found")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn delete_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    let now = now_millis();

    let mut tx = pool.begin().await?;
    let report = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = ? AND is_deleted = FALSE FOR UPDATE")
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Report not found"))?;

    sqlx::query("UPDATE reports SET is_deleted = TRUE, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    let schedules = sqlx::query(
        "UPDATE schedule_reports SET is_deleted = TRUE, updated_at = ? WHERE report_id = ? AND is_deleted = FALSE",
    )
    .bind(now)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    record_history(
        &mut *tx,
        REPORT_OBJECT,
        HistoryAction::Delete,
        &format!("{} ({}) deleted", report.report_type, report.snum),
        &auth.username,
    )
    .await?;
    tx.commit().await?;

    info!(report_id = %id, schedules = schedules.rows_affected(), "Report deleted");
    Ok(HttpResponse::NoContent().finish())
}

async fn fetch_template(pool: &MySqlPool, id: &str) -> Result<ReportTemplate, AppError> {
    sqlx::query_as::<_, ReportTemplate>("SELECT id, template_type, flags FROM report_templates WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Template not found"))
}

/// Get a report template
#[utoipa::path(
    get,
    path = "/api/report/template/{id}",
    params(("id", Path, description = "Template ID")),
    responses(
        (status = 200, description = "Template flags", body = ReportTemplate),
        (status = 404, description = "Template not found")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn get_template(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let template = fetch_template(pool.get_ref(), &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(template))
}

/// Toggle template columns
#[utoipa::path(
    patch,
    path = "/api/report/template/{id}",
    params(("id", Path, description = "Template ID")),
    request_body(content = Object, description = "Column name to boolean", example = json!({"email": true, "pan": false})),
    responses(
        (status = 200, description = "Template updated", body = ReportTemplate),
        (status = 400, description = "Unknown column or non-boolean value"),
        (status = 404, description = "Template not found")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn edit_template(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<Map<String, Value>>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let mut template = fetch_template(pool.get_ref(), &path.into_inner()).await?;
    let kind = parse_kind(&template.template_type)?;
    let changes = payload.into_inner();
    validate_flags(kind, &changes)?;

    let changed: Vec<String> = changes.keys().cloned().collect();
    template.flags.0.extend(changes);

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE report_templates SET flags = ? WHERE id = ?")
        .bind(Json(&template.flags.0))
        .bind(&template.id)
        .execute(&mut *tx)
        .await?;
    record_history(
        &mut *tx,
        TEMPLATE_OBJECT,
        HistoryAction::Update,
        &format!("{} template updated: {}", kind.full_name(), changed.join(", ")),
        &auth.username,
    )
    .await?;
    tx.commit().await?;
    template_cache::invalidate(&template.template_type).await;

    info!(template = %template.template_type, fields = changed.len(), "Report template updated");
    Ok(HttpResponse::Ok().json(template))
}

/// Projected report rows
#[utoipa::path(
    get,
    path = "/api/report/data/{report_type}",
    params(
        ("report_type", Path, description = "Short report key, e.g. employeeSnapshot"),
        DataQuery,
        ReportFilters
    ),
    responses(
        (status = 200, description = "One page of projected rows", body = ProjectedReport),
        (status = 400, description = "Report type has no projection"),
        (status = 404, description = "Report or template missing")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn report_data(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    office: web::Data<OfficeHours>,
    path: web::Path<String>,
    paging: web::Query<DataQuery>,
    filters: web::Query<ReportFilters>,
) -> Result<HttpResponse, AppError> {
    let kind = parse_kind(&path.into_inner())?;
    let paging = Paging::new(paging.page, paging.limit);

    let projected = generate(pool.get_ref(), kind, &filters, Some(paging), **office).await?;
    Ok(HttpResponse::Ok().json(projected))
}

/// Download a report as XLSX or CSV
#[utoipa::path(
    get,
    path = "/api/report/export/{report_type}",
    params(
        ("report_type", Path, description = "Short report key, e.g. leave"),
        ExportQuery,
        ReportFilters
    ),
    responses(
        (status = 200, description = "File download", content_type = "application/octet-stream"),
        (status = 400, description = "Unsupported type or format"),
        (status = 404, description = "No rows to export")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn export_report(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    office: web::Data<OfficeHours>,
    path: web::Path<String>,
    query: web::Query<ExportQuery>,
    filters: web::Query<ReportFilters>,
) -> Result<HttpResponse, AppError> {
    let kind = parse_kind(&path.into_inner())?;
    let raw_format = query.format.as_deref().unwrap_or("excel");
    let format = ExportFormat::parse(raw_format)
        .ok_or_else(|| AppError::bad_request(format!("Unsupported export format {raw_format}")))?;

    let projected = generate(pool.get_ref(), kind, &filters, None, **office).await?;
    if projected.rows.is_empty() {
        return Err(AppError::not_found("No data found to export"));
    }

    let content = export::render(format, kind.full_name(), projected.columns, &projected.rows)?;
    let filename = format!("{}.{}", kind.as_ref(), format.extension());

    info!(kind = kind.as_ref(), rows = projected.rows.len(), bytes = content.len(), "Report exported");
    Ok(HttpResponse::Ok()
        .content_type(format.content_type())
        .insert_header(("Content-Disposition", format!("attachment; filename=\"{filename}\"")))
        .body(content))
}

/// Schedule a report for email delivery
#[utoipa::path(
    post,
    path = "/api/report/{id}/schedule",
    params(("id", Path, description = "Report ID")),
    request_body = ScheduleRequest,
    responses(
        (status = 201, description = "Schedule created", body = ScheduleView),
        (status = 400, description = "Invalid schedule"),
        (status = 404, description = "Report not found")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn create_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<ScheduleRequest>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let report_id = path.into_inner();
    let p = payload.into_inner();
    p.validate()?;

    let report = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = ? AND is_deleted = FALSE")
        .bind(&report_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Report not found"))?;

    let now = now_millis();
    let schedule = ScheduleReport {
        id: new_id(),
        report_id,
        next_run_date: next_run_after(p.start_date, p.hours, p.minutes, p.frequency, now)?,
        frequency: p.frequency,
        start_date: p.start_date,
        hours: p.hours,
        minutes: p.minutes,
        format: p.format,
        recipients: Json(p.recipients),
        cc: Json(p.cc),
        subject: p.subject,
        body: p.body,
        is_deleted: false,
        created_at: now,
        updated_at: None,
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO schedule_reports
            (id, report_id, frequency, start_date, hours, minutes, format, recipients, cc,
             subject, body, next_run_date, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&schedule.id)
    .bind(&schedule.report_id)
    .bind(schedule.frequency)
    .bind(schedule.start_date)
    .bind(schedule.hours)
    .bind(schedule.minutes)
    .bind(schedule.format)
    .bind(&schedule.recipients)
    .bind(&schedule.cc)
    .bind(&schedule.subject)
    .bind(&schedule.body)
    .bind(schedule.next_run_date)
    .bind(schedule.created_at)
    .execute(&mut *tx)
    .await?;

    record_history(
        &mut *tx,
        SCHEDULE_OBJECT,
        HistoryAction::Create,
        &format!("{} scheduled {}", report.report_type, schedule.frequency.as_ref()),
        &auth.username,
    )
    .await?;
    tx.commit().await?;

    info!(schedule_id = %schedule.id, report_id = %schedule.report_id, next_run = schedule.next_run_date, "Report scheduled");
    Ok(HttpResponse::Created().json(ScheduleView::from(schedule)))
}

/// List schedules
#[utoipa::path(
    get,
    path = "/api/report/schedule",
    params(PageQuery),
    responses((status = 200, description = "Live schedules with formatted next run", body = ScheduleListResponse)),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn list_schedules(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, per_page, offset) = query.bounds();

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM schedule_reports WHERE is_deleted = FALSE")
        .fetch_one(pool.get_ref())
        .await?;

    let schedules = sqlx::query_as::<_, ScheduleReport>(
        "SELECT * FROM schedule_reports WHERE is_deleted = FALSE ORDER BY next_run_date LIMIT ? OFFSET ?",
    )
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    let views: Vec<ScheduleView> = schedules.into_iter().map(ScheduleView::from).collect();
    Ok(HttpResponse::Ok().json(Page::new(views, page, per_page, total)))
}

/// Update a schedule
#[utoipa::path(
    patch,
    path = "/api/report/schedule/{id}",
    params(("id", Path, description = "Schedule ID")),
    request_body = UpdateSchedule,
    responses(
        (status = 200, description = "Schedule updated", body = ScheduleView),
        (status = 400, description = "Invalid schedule"),
        (status = 404, description = "Schedule not found")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn update_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<UpdateSchedule>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    let changes = payload.into_inner();

    let mut tx = pool.begin().await?;
    let current = sqlx::query_as::<_, ScheduleReport>(
        "SELECT * FROM schedule_reports WHERE id = ? AND is_deleted = FALSE FOR UPDATE",
    )
    .bind(&id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Schedule not found"))?;

    let now = now_millis();
    let retime = changes.changes_timing();
    let merged = changes.merge(&current);
    merged.validate()?;
    let next_run_date = if retime {
        next_run_after(merged.start_date, merged.hours, merged.minutes, merged.frequency, now)?
    } else {
        current.next_run_date
    };

    sqlx::query(
        r#"
        UPDATE schedule_reports
        SET frequency = ?, start_date = ?, hours = ?, minutes = ?, format = ?, recipients = ?, cc = ?,
            subject = ?, body = ?, next_run_date = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(merged.frequency)
    .bind(merged.start_date)
    .bind(merged.hours)
    .bind(merged.minutes)
    .bind(merged.format)
    .bind(Json(&merged.recipients))
    .bind(Json(&merged.cc))
    .bind(&merged.subject)
    .bind(&merged.body)
    .bind(next_run_date)
    .bind(now)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    record_history(
        &mut *tx,
        SCHEDULE_OBJECT,
        HistoryAction::Update,
        &format!("Schedule {id} updated"),
        &auth.username,
    )
    .await?;
    tx.commit().await?;

    let updated = ScheduleReport {
        frequency: merged.frequency,
        start_date: merged.start_date,
        hours: merged.hours,
        minutes: merged.minutes,
        format: merged.format,
        recipients: Json(merged.recipients),
        cc: Json(merged.cc),
        subject: merged.subject,
        body: merged.body,
        next_run_date,
        updated_at: Some(now),
        ..current
    };

    info!(schedule_id = %id, retimed = retime, next_run = next_run_date, "Schedule updated");
    Ok(HttpResponse::Ok().json(ScheduleView::from(updated)))
}

/// Soft delete a schedule
#[utoipa::path(
    delete,
    path = "/api/report/schedule/{id}",
    params(("id", Path, description = "Schedule ID")),
    responses(
        (status = 204, description = "Schedule deleted"),
        (status = 404, description = "Schedule not found")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn delete_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE schedule_reports SET is_deleted = TRUE, updated_at = ? WHERE id = ? AND is_deleted = FALSE",
    )
    .bind(now_millis())
    .bind(&id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Schedule not found"));
    }

    record_history(
        &mut *tx,
        SCHEDULE_OBJECT,
        HistoryAction::Delete,
        &format!("Schedule {id} deleted"),
        &auth.username,
    )
    .await?;
    tx.commit().await?;

    info!(schedule_id = %id, "Schedule deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// Audit trail of report changes
#[utoipa::path(
    get,
    path = "/api/report/history",
    params(PageQuery),
    responses((status = 200, description = "History entries, newest first", body = HistoryListResponse)),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn list_history(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, per_page, offset) = query.bounds();

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM report_history")
        .fetch_one(pool.get_ref())
        .await?;

    let history = sqlx::query_as::<_, ReportHistory>(
        "SELECT * FROM report_history ORDER BY time DESC LIMIT ? OFFSET ?",
    )
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(Page::new(history, page, per_page, total)))
}

/// Run every due scheduled report now
#[utoipa::path(
    post,
    path = "/api/report/jobs/run",
    responses(
        (status = 200, description = "Run summary", body = JobRunSummary),
        (status = 403, description = "Admin only")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn run_jobs(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    office: web::Data<OfficeHours>,
    mailer: web::Data<Arc<dyn Mailer>>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;

    let store = SqlJobStore {
        pool: pool.get_ref().clone(),
        office: **office,
    };
    let summary = run_scheduled_jobs(&store, mailer.get_ref().as_ref(), now_millis()).await?;

    info!(attempted = summary.attempted, failed = summary.failed, by = %auth.username, "Manual job run finished");
    Ok(HttpResponse::Ok().json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> ScheduleReport {
        ScheduleReport {
            id: "s-1".into(),
            report_id: "r-1".into(),
            frequency: ReportFrequency::Weekly,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            hours: 9,
            minutes: 0,
            format: ReportFormat::Excel,
            recipients: Json(vec!["hr@example.com".into()]),
            cc: Json(vec![]),
            subject: "Weekly".into(),
            body: String::new(),
            next_run_date: 1,
            is_deleted: false,
            created_at: 0,
            updated_at: None,
        }
    }

    #[test]
    fn kinds_parse_from_key_or_full_name() {
        assert_eq!(parse_kind("leave").unwrap(), ReportKind::Leave);
        assert_eq!(parse_kind("Payslip Summary Report").unwrap(), ReportKind::PayslipSummary);
        assert!(parse_kind("Weekly Report").is_err());
    }

    #[test]
    fn live_report_types_are_unique() {
        let err = duplicate_report(ReportKind::Leave);
        assert!(matches!(err, AppError::Conflict(ref m) if m.starts_with("Leave")));

        let schema = include_str!("../../migrations/20260101000000_init.sql");
        assert!(schema.contains("UNIQUE KEY uq_live_report_type (live_report_type)"));
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let changes = UpdateSchedule {
            subject: Some("Renamed".into()),
            ..Default::default()
        };
        assert!(!changes.changes_timing());

        let merged = changes.merge(&schedule());
        assert_eq!(merged.subject, "Renamed");
        assert_eq!(merged.frequency, ReportFrequency::Weekly);
        assert_eq!(merged.recipients, vec!["hr@example.com".to_string()]);
    }

    #[test]
    fn timing_fields_trigger_recompute() {
        let changes = UpdateSchedule {
            hours: Some(18),
            ..Default::default()
        };
        assert!(changes.changes_timing());
    }

    #[test]
    fn schedule_needs_recipient_and_subject() {
        let mut req = UpdateSchedule::default().merge(&schedule());
        assert!(req.validate().is_ok());

        req.recipients = vec![" ".into()];
        assert!(req.validate().is_err());

        req.recipients = vec!["a@b.c".into()];
        req.subject = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn view_formats_next_run() {
        let mut s = schedule();
        s.next_run_date = 0;
        let view = ScheduleView::from(s);
        assert_eq!(view.next_run, "01 Jan 1970, 12:00 AM");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], "s-1");
        assert_eq!(json["next_run"], "01 Jan 1970, 12:00 AM");
    }
}
