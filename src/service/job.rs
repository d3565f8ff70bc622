use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::db::now_millis;
use crate::model::report::{Report, ReportKind, ScheduleReport};
use crate::service::export::{self, ExportFormat};
use crate::service::mailer::{MailAttachment, Mailer, OutgoingMail};
use crate::service::report::{self as report_service, OfficeHours};
use crate::service::schedule::next_run_after;

/// Rendered attachment for one scheduled job.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn due_jobs(&self, now: i64) -> Result<Vec<ScheduleReport>>;
    async fn render(&self, job: &ScheduleReport) -> Result<RenderedReport>;
    async fn advance(&self, job_id: &str, next_run: i64, now: i64) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct JobRunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs every due schedule. A failing job is logged and keeps its next run,
/// so it is retried on the next tick.
pub async fn run_scheduled_jobs(store: &dyn JobStore, mailer: &dyn Mailer, now: i64) -> Result<JobRunSummary> {
    info!("Running scheduled report jobs");

    let jobs = store.due_jobs(now).await?;
    if jobs.is_empty() {
        info!("No scheduled jobs to run");
        return Ok(JobRunSummary::default());
    }

    let mut summary = JobRunSummary::default();
    for job in &jobs {
        summary.attempted += 1;
        match run_one(store, mailer, job, now).await {
            Ok(next_run) => {
                summary.succeeded += 1;
                info!(job_id = %job.id, report_id = %job.report_id, next_run, "Scheduled job completed");
            }
            Err(e) => {
                summary.failed += 1;
                error!(job_id = %job.id, report_id = %job.report_id, error = %e, "Scheduled job failed");
            }
        }
    }

    Ok(summary)
}

async fn run_one(store: &dyn JobStore, mailer: &dyn Mailer, job: &ScheduleReport, now: i64) -> Result<i64> {
    let rendered = store.render(job).await?;

    mailer
        .send(OutgoingMail {
            to: job.recipients.0.clone(),
            cc: job.cc.0.clone(),
            subject: job.subject.clone(),
            body: job.body.clone(),
            attachments: vec![MailAttachment {
                filename: rendered.filename,
                content_type: rendered.content_type,
                content: rendered.content,
            }],
        })
        .await?;

    let next_run = next_run_after(job.start_date, job.hours, job.minutes, job.frequency, now)?;
    store.advance(&job.id, next_run, now).await?;
    Ok(next_run)
}

/// Database-backed job store.
pub struct SqlJobStore {
    pub pool: MySqlPool,
    pub office: OfficeHours,
}

#[async_trait]
impl JobStore for SqlJobStore {
    async fn due_jobs(&self, now: i64) -> Result<Vec<ScheduleReport>> {
        let jobs = sqlx::query_as::<_, ScheduleReport>(
            "SELECT * FROM schedule_reports WHERE is_deleted = FALSE AND next_run_date <= ? ORDER BY next_run_date",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn render(&self, job: &ScheduleReport) -> Result<RenderedReport> {
        let format = ExportFormat::for_schedule(job.format)
            .ok_or_else(|| anyhow!("Unsupported format: {}", job.format.as_ref()))?;

        let report = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = ? AND is_deleted = FALSE")
            .bind(&job.report_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("Report {} not found", job.report_id))?;

        let kind = ReportKind::from_full_name(&report.report_type)
            .ok_or_else(|| anyhow!("Unsupported report type: {}", report.report_type))?;

        let projected = report_service::generate(&self.pool, kind, &Default::default(), None, self.office)
            .await?;
        if projected.rows.is_empty() {
            warn!(report_id = %report.id, "Scheduled report has no rows");
        }

        let content = export::render(format, kind.full_name(), projected.columns, &projected.rows)?;
        Ok(RenderedReport {
            filename: format!("report-{}.{}", report.id, format.extension()),
            content_type: format.content_type().to_string(),
            content,
        })
    }

    async fn advance(&self, job_id: &str, next_run: i64, now: i64) -> Result<()> {
        sqlx::query("UPDATE schedule_reports SET next_run_date = ?, updated_at = ? WHERE id = ?")
            .bind(next_run)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Ticks every `interval_secs` on the actix runtime; each tick awaits the
/// previous run so runs never overlap.
pub fn spawn_ticker(pool: MySqlPool, mailer: Arc<dyn Mailer>, office: OfficeHours, interval_secs: u64) {
    if interval_secs == 0 {
        info!("Scheduled report ticker disabled");
        return;
    }

    actix_web::rt::spawn(async move {
        let store = SqlJobStore { pool, office };
        let mut interval = actix_web::rt::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = run_scheduled_jobs(&store, &*mailer, now_millis()).await {
                error!(error = %e, "Scheduled job scan failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::report::{ReportFormat, ReportFrequency};
    use chrono::NaiveDate;
    use sqlx::types::Json;
    use std::sync::Mutex;

    fn job(id: &str, report_id: &str) -> ScheduleReport {
        ScheduleReport {
            id: id.into(),
            report_id: report_id.into(),
            frequency: ReportFrequency::Daily,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            hours: 9,
            minutes: 0,
            format: ReportFormat::Csv,
            recipients: Json(vec!["ops@example.com".into()]),
            cc: Json(vec![]),
            subject: "Daily".into(),
            body: "See attached".into(),
            next_run_date: 0,
            is_deleted: false,
            created_at: 0,
            updated_at: None,
        }
    }

    #[derive(Default)]
    struct FakeStore {
        jobs: Vec<ScheduleReport>,
        broken_reports: Vec<String>,
        advanced: Mutex<Vec<(String, i64)>>,
    }

    #[async_trait]
    impl JobStore for FakeStore {
        async fn due_jobs(&self, _now: i64) -> Result<Vec<ScheduleReport>> {
            Ok(self.jobs.clone())
        }

        async fn render(&self, job: &ScheduleReport) -> Result<RenderedReport> {
            if self.broken_reports.contains(&job.report_id) {
                return Err(anyhow!("Report {} not found", job.report_id));
            }
            Ok(RenderedReport {
                filename: format!("report-{}.csv", job.report_id),
                content_type: "text/csv".into(),
                content: b"emp_id\nEMP1\n".to_vec(),
            })
        }

        async fn advance(&self, job_id: &str, next_run: i64, _now: i64) -> Result<()> {
            self.advanced.lock().unwrap().push((job_id.to_string(), next_run));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeMailer {
        sent: Mutex<Vec<OutgoingMail>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl Mailer for FakeMailer {
        async fn send(&self, mail: OutgoingMail) -> Result<()> {
            if self.fail_for.as_deref() == Some(mail.subject.as_str()) {
                return Err(anyhow!("relay refused"));
            }
            self.sent.lock().unwrap().push(mail);
            Ok(())
        }
    }

    fn now() -> i64 {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    #[actix_web::test]
    async fn failures_do_not_stop_remaining_jobs() {
        let store = FakeStore {
            jobs: vec![job("j1", "r1"), job("j2", "missing"), job("j3", "r3")],
            broken_reports: vec!["missing".into()],
            ..Default::default()
        };
        let mailer = FakeMailer::default();

        let summary = run_scheduled_jobs(&store, &mailer, now()).await.unwrap();

        assert_eq!(summary, JobRunSummary { attempted: 3, succeeded: 2, failed: 1 });
        let advanced = store.advanced.lock().unwrap();
        let ids: Vec<_> = advanced.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["j1", "j3"]);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].attachments[0].filename, "report-r1.csv");
    }

    #[actix_web::test]
    async fn next_run_lands_after_now() {
        let store = FakeStore {
            jobs: vec![job("j1", "r1")],
            ..Default::default()
        };
        run_scheduled_jobs(&store, &FakeMailer::default(), now()).await.unwrap();

        let advanced = store.advanced.lock().unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 11)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(advanced[0].1, expected);
    }

    #[actix_web::test]
    async fn mail_failure_keeps_next_run() {
        let store = FakeStore {
            jobs: vec![job("j1", "r1")],
            ..Default::default()
        };
        let mailer = FakeMailer {
            fail_for: Some("Daily".into()),
            ..Default::default()
        };

        let summary = run_scheduled_jobs(&store, &mailer, now()).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(store.advanced.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn nothing_due_is_a_quiet_run() {
        let summary = run_scheduled_jobs(&FakeStore::default(), &FakeMailer::default(), now())
            .await
            .unwrap();
        assert_eq!(summary, JobRunSummary::default());
    }
}
