use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Holiday {
    pub id: String,
    pub name: String,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub holiday_group: Option<String>,
    pub created_at: i64,
}
