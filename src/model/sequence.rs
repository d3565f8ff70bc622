use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const EMPLOYEE_SEQUENCE: &str = "Employee";
pub const REPORT_SEQUENCE: &str = "Report";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SequenceNumber {
    pub id: String,
    pub seq_type: String,
    pub prefix: String,
    pub next_available_number: i64,
    pub created_by: Option<String>,
    pub created_at: i64,
}

impl SequenceNumber {
    /// Code handed out for the current counter value.
    pub fn current_code(&self) -> String {
        format!("{}{}", self.prefix, self.next_available_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_prefix_followed_by_number() {
        let seq = SequenceNumber {
            id: "x".into(),
            seq_type: EMPLOYEE_SEQUENCE.into(),
            prefix: "EMP".into(),
            next_available_number: 12,
            created_by: None,
            created_at: 0,
        };
        assert_eq!(seq.current_code(), "EMP12");
    }
}
