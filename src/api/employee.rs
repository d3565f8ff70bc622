use crate::{
    api::{Page, PageQuery},
    auth::auth::AuthUser,
    db::{new_id, now_millis},
    error::AppError,
    model::employee::{Employee, EmployeeStatus, Gender},
    model::sequence::EMPLOYEE_SEQUENCE,
    service::sequence::next_code,
    utils::db_utils::{Filters, SqlValue, bind_as, bind_scalar, build_update_sql, execute_update, reject_nulls},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

/// Editable columns that may not be cleared.
const REQUIRED: &[&str] = &[
    "first_name",
    "gender",
    "primary_email",
    "phone_num",
    "joining_date",
    "department",
    "designation",
    "location",
    "reporting_manager",
    "work_week",
    "holiday_group",
    "ctc_annual",
    "payslip_component",
    "role",
    "leave_type",
];

/// Columns a PATCH may touch. Code, id and soft-delete flag are managed here.
const EDITABLE: &[&str] = &[
    "title",
    "first_name",
    "last_name",
    "gender",
    "primary_email",
    "phone_code",
    "phone_num",
    "pan_num",
    "joining_date",
    "department",
    "designation",
    "location",
    "reporting_manager",
    "work_week",
    "holiday_group",
    "ctc_annual",
    "payslip_component",
    "role",
    "leave_type",
    "loss_of_pay",
    "tax_paid",
    "net_pay",
    "leave_adjustment",
    "leave_balance",
];

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "Mr")]
    pub title: Option<String>,
    #[schema(example = "John")]
    pub first_name: String,
    /// Defaults to the first name when blank
    #[schema(example = "Doe")]
    pub last_name: Option<String>,
    #[schema(example = "john@company.com", format = "email")]
    pub email: String,
    pub gender: Gender,
    #[schema(example = "+91")]
    pub phone_code: Option<String>,
    #[schema(example = "9876543210")]
    pub phone: String,
    pub pan_num: Option<String>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub joining_date: NaiveDate,
    pub department: String,
    pub designation: String,
    pub location: String,
    pub reporting_manager: String,
    pub working_pattern: String,
    pub holiday_group: String,
    #[schema(example = 1200000.0)]
    pub ctc: f64,
    /// Salary structure group name
    #[schema(example = "Standard")]
    pub payslip_component: String,
    pub role: String,
    pub leave_type: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<EmployeeStatus>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub location: Option<String>,
    /// Search by name, email or employee code
    pub search: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangeStatus {
    pub status: EmployeeStatus,
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 400, description = "Unknown salary structure or invalid input"),
        (status = 409, description = "Email already in use")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let p = payload.into_inner();

    let first_name = p.first_name.trim().to_string();
    if first_name.is_empty() {
        return Err(AppError::bad_request("First name is required"));
    }
    let last_name = p
        .last_name
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| first_name.clone());

    let structure_exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM salary_structures WHERE group_name = ? AND is_deleted = FALSE)",
    )
    .bind(&p.payslip_component)
    .fetch_one(pool.get_ref())
    .await?;
    if !structure_exists {
        return Err(AppError::bad_request(format!(
            "Salary structure {} does not exist",
            p.payslip_component
        )));
    }

    let email_taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM employees WHERE primary_email = ? AND is_deleted = FALSE)",
    )
    .bind(&p.email)
    .fetch_one(pool.get_ref())
    .await?;
    if email_taken {
        return Err(AppError::Conflict("Email already in use".into()));
    }

    let id = new_id();
    let now = now_millis();

    // Sequence bump, employee row and code index commit together
    let mut tx = pool.begin().await?;
    let emp_code = next_code(&mut tx, EMPLOYEE_SEQUENCE).await?;

    sqlx::query(
        r#"
        INSERT INTO employees
            (id, emp_code, title, first_name, last_name, gender, primary_email, phone_code, phone_num,
             status, pan_num, joining_date, department, designation, location, reporting_manager,
             work_week, holiday_group, ctc_annual, payslip_component, role, leave_type, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&emp_code)
    .bind(&p.title)
    .bind(&first_name)
    .bind(&last_name)
    .bind(p.gender)
    .bind(&p.email)
    .bind(p.phone_code.as_deref().unwrap_or("+91"))
    .bind(&p.phone)
    .bind(EmployeeStatus::Active)
    .bind(&p.pan_num)
    .bind(p.joining_date)
    .bind(&p.department)
    .bind(&p.designation)
    .bind(&p.location)
    .bind(&p.reporting_manager)
    .bind(&p.working_pattern)
    .bind(&p.holiday_group)
    .bind(p.ctc)
    .bind(&p.payslip_component)
    .bind(&p.role)
    .bind(&p.leave_type)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO emp_codes (emp_code, employee_id, fname, lname) VALUES (?, ?, ?, ?)")
        .bind(&emp_code)
        .bind(&id)
        .bind(&first_name)
        .bind(&last_name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(employee_id = %id, emp_code = %emp_code, by = %auth.username, "Employee created");

    let employee = fetch_employee(pool.get_ref(), &id).await?;
    Ok(HttpResponse::Created().json(employee))
}

pub async fn fetch_employee(pool: &MySqlPool, id: &str) -> Result<Employee, AppError> {
    sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ? AND is_deleted = FALSE")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Employee not found"))
}

/// List Employees
#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, per_page, offset) = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .bounds();

    let mut f = Filters::new("is_deleted = FALSE");
    f.push_opt("status = ?", query.status, |s| SqlValue::String(s.as_ref().to_string()));
    f.push_opt("department = ?", query.department.clone(), SqlValue::String);
    f.push_opt("designation = ?", query.designation.clone(), SqlValue::String);
    f.push_opt("location = ?", query.location.clone(), SqlValue::String);
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        f.push_repeated(
            "(CONCAT_WS(' ', first_name, last_name) LIKE ? OR primary_email LIKE ? OR emp_code LIKE ?)",
            SqlValue::String(format!("%{}%", search.trim())),
            3,
        );
    }

    let count_sql = format!("SELECT COUNT(*) FROM employees{}", f.sql);
    debug!(sql = %count_sql, bindings = ?f.args, "Counting employees");
    let total = bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql), &f.args)
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT * FROM employees{} ORDER BY created_at DESC LIMIT {per_page} OFFSET {offset}",
        f.sql
    );
    let employees = bind_as(sqlx::query_as::<_, Employee>(&data_sql), &f.args)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page::new(employees, page, per_page, total)))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let employee = fetch_employee(pool.get_ref(), &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// Update Employee
#[utoipa::path(
    patch,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    request_body(content = Object, description = "Any subset of the editable employee columns"),
    responses(
        (status = 200, description = "Employee updated successfully", body = Object, example = json!({
            "message": "Employee updated successfully"
        })),
        (status = 400, description = "Unknown or read-only field, or null for a required one"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();
    let update = build_update_sql("employees", &body, EDITABLE, "id", &employee_id, now_millis())?;
    reject_nulls(&body, REQUIRED)?;

    let mut tx = pool.begin().await?;
    let emp_code = sqlx::query_scalar::<_, String>(
        "SELECT emp_code FROM employees WHERE id = ? AND is_deleted = FALSE FOR UPDATE",
    )
    .bind(&employee_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Employee not found"))?;

    execute_update(&mut *tx, update).await?;

    // Keep the code index in step with name edits
    if body.get("first_name").is_some() || body.get("last_name").is_some() {
        let (fname, lname) = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT first_name, last_name FROM employees WHERE id = ?",
        )
        .bind(&employee_id)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("UPDATE emp_codes SET fname = ?, lname = ? WHERE emp_code = ?")
            .bind(&fname)
            .bind(lname.unwrap_or_default())
            .bind(&emp_code)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(employee_id = %employee_id, by = %auth.username, "Employee updated");
    Ok(HttpResponse::Ok().json(json!({ "message": "Employee updated successfully" })))
}

/// Change Employee status
#[utoipa::path(
    patch,
    path = "/api/employees/{employee_id}/status",
    params(("employee_id", Path, description = "Employee ID")),
    request_body = ChangeStatus,
    responses(
        (status = 200, description = "Status changed"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn change_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    body: web::Json<ChangeStatus>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();

    let result = sqlx::query(
        "UPDATE employees SET status = ?, updated_at = ? WHERE id = ? AND is_deleted = FALSE",
    )
    .bind(body.status)
    .bind(now_millis())
    .bind(&employee_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Employee not found"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Status updated successfully" })))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();
    let now = now_millis();

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE employees SET is_deleted = TRUE, updated_at = ? WHERE id = ? AND is_deleted = FALSE",
    )
    .bind(now)
    .bind(&employee_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Employee not found"));
    }

    sqlx::query("UPDATE emp_codes SET is_deleted = TRUE WHERE employee_id = ?")
        .bind(&employee_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(employee_id = %employee_id, by = %auth.username, "Employee deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_columns_are_editable() {
        assert!(REQUIRED.iter().all(|c| EDITABLE.contains(c)));
    }

    #[test]
    fn clearing_a_required_column_is_a_bad_request() {
        let body = json!({"last_name": null, "department": null});
        assert!(build_update_sql("employees", &body, EDITABLE, "id", "e-1", 0).is_ok());

        let err = reject_nulls(&body, REQUIRED).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("department")));
        assert!(reject_nulls(&json!({"last_name": null, "pan_num": null}), REQUIRED).is_ok());
    }
}
