use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, AsRefStr, EnumString, EnumIter,
)]
pub enum AttendanceStatus {
    #[serde(rename = "P")]
    #[strum(serialize = "P")]
    Present,
    #[serde(rename = "AB")]
    #[strum(serialize = "AB")]
    Absent,
    #[serde(rename = "W")]
    #[strum(serialize = "W")]
    WeekOff,
    #[serde(rename = "H")]
    #[strum(serialize = "H")]
    Holiday,
    #[serde(rename = "L")]
    #[strum(serialize = "L")]
    Leave,
    #[serde(rename = "HD")]
    #[strum(serialize = "HD")]
    HalfDay,
}

varchar_enum!(AttendanceStatus);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Attendance {
    pub id: String,
    pub emp_code: String,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub year: i32,
    pub status: AttendanceStatus,
    pub hours: Option<f64>,
    pub in_time: Option<String>,
    pub out_time: Option<String>,
    pub leave_type: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// Active employee as seen through the employee-code index.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmpCodeEntry {
    pub emp_code: String,
    pub fname: String,
    pub lname: String,
}
