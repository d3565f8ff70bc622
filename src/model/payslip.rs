use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CalculationType {
    Fixed,
    Formula,
}

varchar_enum!(CalculationType);

pub const EARNING: &str = "EARNING";
pub const DEDUCTION: &str = "DEDUCTION";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SalaryStructure {
    pub id: String,
    pub group_name: String,
    pub code: String,
    pub description: Option<String>,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Component {
    pub id: String,
    /// Owning structure; `None` for shared default components
    pub group_id: Option<String>,
    /// EARNING, DEDUCTION, ...
    pub component_type: String,
    pub show_on_payslip: bool,
    pub name: String,
    pub code: String,
    pub calculation_type: CalculationType,
    pub value: String,
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    pub test_amount: String,
    pub taxable: bool,
    pub leave_based: bool,
    pub ctc: bool,
    pub adjustment_balanced: bool,
    pub is_default: bool,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl Component {
    /// Numeric value of a fixed component; formulas and blanks count as 0.
    pub fn amount(&self) -> f64 {
        self.value.trim().parse().unwrap_or(0.0)
    }

    /// Structure-owned copy of a default component.
    pub fn clone_for(&self, structure_id: &str, new_id: String, now: i64) -> Self {
        Self {
            id: new_id,
            group_id: Some(structure_id.to_string()),
            is_default: false,
            created_at: now,
            updated_at: None,
            ..self.clone()
        }
    }
}
