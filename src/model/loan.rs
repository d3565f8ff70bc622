use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum LoanStatus {
    Pending,
    Approved,
    Declined,
}

varchar_enum!(LoanStatus);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Loan {
    pub id: String,
    pub employee_id: String,
    pub emp_name: String,
    #[schema(value_type = String, format = "date")]
    pub req_date: NaiveDate,
    pub status: LoanStatus,
    pub amount_req: f64,
    pub amount_app: Option<f64>,
    pub balance: Option<f64>,
    /// Payback term
    pub installment: Option<f64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub payback_date: Option<NaiveDate>,
    pub remaining: Option<f64>,
    pub approved_by: Option<String>,
    pub staff_note: Option<String>,
    pub note: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct LoanActivity {
    pub message: String,
    pub created_at: i64,
}
