use crate::{
    api::{Page, PageQuery},
    auth::auth::AuthUser,
    db::{new_id, now_millis},
    error::AppError,
    model::loan::{Loan, LoanActivity, LoanStatus},
    utils::db_utils::{Filters, SqlUpdate, SqlValue, bind_as, bind_scalar, execute_update},
};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLoan {
    pub emp_name: String,
    #[schema(example = 50000.0)]
    pub amount_req: f64,
    pub staff_note: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveLoan {
    pub amount_app: f64,
    pub installment: f64,
    #[schema(example = "2026-12-31", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub staff_note: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelLoan {
    pub cancel_reason: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EditLoan {
    pub amount_app: Option<f64>,
    pub installment: Option<f64>,
    #[schema(format = "date", value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    pub staff_note: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<LoanStatus>,
    pub employee_id: Option<String>,
    /// Case-insensitive match on the employee name
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoanDetail {
    #[serde(flatten)]
    pub loan: Loan,
    pub activity: Vec<LoanActivity>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn log_activity(tx: &mut Transaction<'_, MySql>, loan_id: &str, message: String) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO loan_activity (loan_id, message, created_at) VALUES (?, ?, ?)")
        .bind(loan_id)
        .bind(message)
        .bind(now_millis())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn lock_loan(tx: &mut Transaction<'_, MySql>, id: &str) -> Result<Loan, AppError> {
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = ? FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::not_found("Loan record not found"))
}

/// Builds the UPDATE for the supplied approval fields, `None` when nothing was sent.
fn edit_update(id: &str, edit: EditLoan, now: i64) -> Option<SqlUpdate> {
    let mut sets = Vec::new();
    let mut values = Vec::new();
    if let Some(v) = edit.amount_app {
        sets.push("amount_app = ?");
        values.push(SqlValue::F64(v));
    }
    if let Some(v) = edit.installment {
        sets.push("installment = ?");
        values.push(SqlValue::F64(v));
    }
    if let Some(v) = edit.date {
        sets.push("payback_date = ?");
        values.push(SqlValue::Date(v));
    }
    if let Some(v) = edit.staff_note {
        sets.push("staff_note = ?");
        values.push(SqlValue::String(v));
    }
    if sets.is_empty() {
        return None;
    }

    values.push(SqlValue::I64(now));
    values.push(SqlValue::String(id.to_string()));
    Some(SqlUpdate {
        sql: format!("UPDATE loans SET {}, updated_at = ? WHERE id = ?", sets.join(", ")),
        values,
    })
}

/// Request a loan for an employee
#[utoipa::path(
    post,
    path = "/api/loan/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = Object, example = json!({"message": "Loan created successfully", "loan_id": "..."})),
        (status = 400, description = "Missing name or non-positive amount"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Loan",
    security(("bearer_auth" = []))
)]
pub async fn create_loan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<CreateLoan>,
) -> Result<HttpResponse, AppError> {
    let employee_id = path.into_inner();
    let p = payload.into_inner();

    if p.emp_name.trim().is_empty() || p.amount_req <= 0.0 {
        return Err(AppError::bad_request("Employee name and requested amount are required"));
    }

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM employees WHERE id = ? AND is_deleted = FALSE)",
    )
    .bind(&employee_id)
    .fetch_one(pool.get_ref())
    .await?;
    if !exists {
        return Err(AppError::not_found("Employee not found"));
    }

    let id = new_id();
    let req_date = today();

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO loans (id, employee_id, emp_name, req_date, status, amount_req, staff_note, note, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&employee_id)
    .bind(p.emp_name.trim())
    .bind(req_date)
    .bind(LoanStatus::Pending)
    .bind(p.amount_req)
    .bind(&p.staff_note)
    .bind(&p.note)
    .bind(now_millis())
    .execute(&mut *tx)
    .await?;
    log_activity(&mut tx, &id, format!("Loan requested on {req_date}")).await?;
    tx.commit().await?;

    info!(loan_id = %id, employee_id = %employee_id, by = %auth.username, "Loan requested");
    Ok(HttpResponse::Created().json(json!({
        "message": "Loan created successfully",
        "loan_id": id,
    })))
}

/// Approve a loan
#[utoipa::path(
    put,
    path = "/api/loan/{id}/approve",
    params(("id", Path, description = "Loan ID")),
    request_body = ApproveLoan,
    responses(
        (status = 200, description = "Loan approved"),
        (status = 400, description = "Invalid amount or installment"),
        (status = 404, description = "Loan record not found")
    ),
    tag = "Loan",
    security(("bearer_auth" = []))
)]
pub async fn approve_loan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<ApproveLoan>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    let p = payload.into_inner();

    if p.amount_app <= 0.0 || p.installment <= 0.0 {
        return Err(AppError::bad_request("Invalid approved amount or installment value"));
    }

    let mut tx = pool.begin().await?;
    let loan = lock_loan(&mut tx, &id).await?;
    if loan.status != LoanStatus::Pending {
        return Err(AppError::bad_request(format!("Loan is already {}", loan.status.as_ref())));
    }

    sqlx::query(
        r#"
        UPDATE loans
        SET status = ?, amount_app = ?, balance = ?, installment = ?, payback_date = ?, remaining = ?,
            staff_note = ?, approved_by = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(LoanStatus::Approved)
    .bind(p.amount_app)
    .bind(p.amount_app)
    .bind(p.installment)
    .bind(p.date)
    .bind(p.amount_app)
    .bind(&p.staff_note)
    .bind(&auth.username)
    .bind(now_millis())
    .bind(&id)
    .execute(&mut *tx)
    .await?;
    log_activity(&mut tx, &id, format!("Loan approved on {}", today())).await?;
    tx.commit().await?;

    info!(loan_id = %id, amount = p.amount_app, by = %auth.username, "Loan approved");
    Ok(HttpResponse::Ok().json(json!({ "message": "Loan approved successfully" })))
}

/// Cancel a loan
#[utoipa::path(
    put,
    path = "/api/loan/{id}/cancel",
    params(("id", Path, description = "Loan ID")),
    request_body = CancelLoan,
    responses(
        (status = 200, description = "Loan cancelled"),
        (status = 400, description = "Missing cancel reason"),
        (status = 404, description = "Loan record not found")
    ),
    tag = "Loan",
    security(("bearer_auth" = []))
)]
pub async fn cancel_loan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<CancelLoan>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    let reason = payload.cancel_reason.trim();
    if reason.is_empty() {
        return Err(AppError::bad_request("Cancel reason is required"));
    }

    let mut tx = pool.begin().await?;
    lock_loan(&mut tx, &id).await?;
    sqlx::query("UPDATE loans SET status = ?, cancel_reason = ?, updated_at = ? WHERE id = ?")
        .bind(LoanStatus::Declined)
        .bind(reason)
        .bind(now_millis())
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    log_activity(&mut tx, &id, format!("Loan cancelled on {}", today())).await?;
    tx.commit().await?;

    info!(loan_id = %id, by = %auth.username, "Loan cancelled");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Loan cancelled successfully",
        "reason": reason,
    })))
}

/// Edit approval details of a loan
#[utoipa::path(
    patch,
    path = "/api/loan/{id}",
    params(("id", Path, description = "Loan ID")),
    request_body = EditLoan,
    responses(
        (status = 200, description = "Loan updated"),
        (status = 400, description = "No valid fields to update"),
        (status = 404, description = "Loan not found")
    ),
    tag = "Loan",
    security(("bearer_auth" = []))
)]
pub async fn edit_loan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<EditLoan>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    let p = payload.into_inner();

    let update = edit_update(&id, p, now_millis())
        .ok_or_else(|| AppError::bad_request("No valid fields to update"))?;
    let affected = execute_update(pool.get_ref(), update).await?;
    if affected == 0 {
        return Err(AppError::not_found("Loan not found"));
    }

    info!(loan_id = %id, by = %auth.username, "Loan edited");
    Ok(HttpResponse::Ok().json(json!({ "message": "Loan info updated successfully" })))
}

/// List loans
#[utoipa::path(
    get,
    path = "/api/loan",
    params(LoanQuery),
    responses((status = 200, description = "Paginated loans, newest first", body = LoanListResponse)),
    tag = "Loan",
    security(("bearer_auth" = []))
)]
pub async fn list_loans(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LoanQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, per_page, offset) = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .bounds();

    let mut f = Filters::new("1 = 1");
    f.push_opt("status = ?", query.status, |s| SqlValue::String(s.as_ref().to_string()));
    f.push_opt("employee_id = ?", query.employee_id.clone(), SqlValue::String);
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        f.push(
            "LOWER(emp_name) LIKE ?",
            SqlValue::String(format!("%{}%", search.trim().to_lowercase())),
        );
    }

    let total = bind_scalar(
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM loans{}", f.sql)),
        &f.args,
    )
    .fetch_one(pool.get_ref())
    .await?;

    let data_sql = format!(
        "SELECT * FROM loans{} ORDER BY created_at DESC LIMIT {per_page} OFFSET {offset}",
        f.sql
    );
    let loans = bind_as(sqlx::query_as::<_, Loan>(&data_sql), &f.args)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page::new(loans, page, per_page, total)))
}

/// Get a loan with its activity log
#[utoipa::path(
    get,
    path = "/api/loan/{id}",
    params(("id", Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan with activity", body = LoanDetail),
        (status = 404, description = "Loan not found")
    ),
    tag = "Loan",
    security(("bearer_auth" = []))
)]
pub async fn get_loan(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Loan not found"))?;

    let activity = sqlx::query_as::<_, LoanActivity>(
        "SELECT message, created_at FROM loan_activity WHERE loan_id = ? ORDER BY id",
    )
    .bind(&id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(LoanDetail { loan, activity }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_sets_only_supplied_fields() {
        let edit = EditLoan {
            installment: Some(12.0),
            staff_note: Some("revised".into()),
            ..Default::default()
        };
        let update = edit_update("l-1", edit, 99).unwrap();

        assert_eq!(
            update.sql,
            "UPDATE loans SET installment = ?, staff_note = ?, updated_at = ? WHERE id = ?"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::F64(12.0),
                SqlValue::String("revised".into()),
                SqlValue::I64(99),
                SqlValue::String("l-1".into()),
            ]
        );
    }

    #[test]
    fn empty_edit_yields_nothing() {
        assert!(edit_update("l-1", EditLoan::default(), 0).is_none());
    }

    #[test]
    fn approval_payload_parses_iso_date() {
        let p: ApproveLoan = serde_json::from_str(
            r#"{"amount_app": 1000, "installment": 10, "date": "2027-01-31", "staff_note": "ok"}"#,
        )
        .unwrap();
        assert_eq!(p.date, NaiveDate::from_ymd_opt(2027, 1, 31).unwrap());
        assert_eq!(p.amount_app, 1000.0);
    }
}
