use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum EmployeeStatus {
    Active,
    Inactive,
}

varchar_enum!(EmployeeStatus);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum Gender {
    Male,
    Female,
    Other,
}

varchar_enum!(Gender);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": "0d6f3a2e-5d2b-4a55-9d7a-1c1f4e0b7f10",
        "emp_code": "EMP12",
        "first_name": "John",
        "last_name": "Doe",
        "primary_email": "john.doe@company.com",
        "phone_num": "+8801712345678",
        "department": "Engineering",
        "designation": "Engineer",
        "joining_date": "2024-01-01",
        "status": "Active"
    })
)]
pub struct Employee {
    pub id: String,
    pub emp_code: String,
    pub title: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub gender: Gender,
    pub primary_email: String,
    pub phone_code: Option<String>,
    pub phone_num: String,
    pub status: EmployeeStatus,
    pub pan_num: Option<String>,

    #[schema(value_type = String, format = "date")]
    pub joining_date: NaiveDate,
    pub department: String,
    pub designation: String,
    pub location: String,
    pub reporting_manager: String,
    pub work_week: String,
    pub holiday_group: String,
    pub ctc_annual: f64,
    /// Salary structure group name
    pub payslip_component: String,
    pub role: String,
    pub leave_type: String,

    pub loss_of_pay: Option<f64>,
    pub tax_paid: Option<f64>,
    pub net_pay: Option<f64>,
    pub leave_adjustment: Option<f64>,
    pub leave_balance: Option<f64>,

    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name,
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}
