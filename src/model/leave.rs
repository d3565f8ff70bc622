use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::AppError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, AsRefStr, EnumString, EnumIter,
)]
pub enum LeaveType {
    Casual,
    Sick,
    Earned,
    Unpaid,
    Planned,
    Privileged,
}

varchar_enum!(LeaveType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Declined,
}

varchar_enum!(ApprovalStatus);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveRequest {
    pub id: String,
    pub emp_code: String,
    pub employee_name: String,
    pub department: String,
    pub leave_type: LeaveType,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    /// Inclusive number of days
    pub duration: i32,
    pub reason: Option<String>,
    pub decline_reason: Option<String>,
    pub uploaded_document: Option<String>,
    pub my_approval_status: ApprovalStatus,
    pub final_approval_status: ApprovalStatus,
    pub applied_on: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveBalance {
    pub emp_code: String,
    pub leave_type: LeaveType,
    pub allowed_leave: f64,
    pub leave_taken: f64,
    pub unpaid_leave: f64,
    pub balance: f64,
    pub last_updated: i64,
}

impl LeaveBalance {
    /// Deducts `days` from the balance. Leaves `self` untouched when the
    /// balance would go negative.
    pub fn apply_taken(&mut self, days: f64, now: i64) -> Result<(), AppError> {
        if days > self.balance {
            return Err(AppError::bad_request(format!(
                "Insufficient {} leave balance: requested {days}, available {}",
                self.leave_type.as_ref(),
                self.balance
            )));
        }

        self.leave_taken += days;
        self.balance = self.allowed_leave - self.leave_taken;
        self.last_updated = now;
        Ok(())
    }
}

/// Inclusive day count between two dates.
pub fn leave_duration(start: NaiveDate, end: NaiveDate) -> i32 {
    (end - start).num_days() as i32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(allowed: f64, taken: f64) -> LeaveBalance {
        LeaveBalance {
            emp_code: "EMP1".into(),
            leave_type: LeaveType::Sick,
            allowed_leave: allowed,
            leave_taken: taken,
            unpaid_leave: 0.0,
            balance: allowed - taken,
            last_updated: 0,
        }
    }

    #[test]
    fn approval_moves_days_from_balance_to_taken() {
        let mut b = balance(12.0, 2.0);
        b.apply_taken(3.0, 42).unwrap();

        assert_eq!(b.leave_taken, 5.0);
        assert_eq!(b.balance, 7.0);
        assert_eq!(b.last_updated, 42);
    }

    #[test]
    fn exact_balance_can_be_used_up() {
        let mut b = balance(5.0, 0.0);
        b.apply_taken(5.0, 1).unwrap();
        assert_eq!(b.balance, 0.0);
    }

    #[test]
    fn insufficient_balance_is_rejected_without_mutation() {
        let mut b = balance(4.0, 2.0);
        let before = b.clone();

        let err = b.apply_taken(3.0, 99).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(b, before);
    }

    #[test]
    fn duration_is_inclusive() {
        let d = |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert_eq!(leave_duration(d("2024-03-01"), d("2024-03-01")), 1);
        assert_eq!(leave_duration(d("2024-02-28"), d("2024-03-01")), 3);
    }

    #[test]
    fn leave_types_round_trip_through_strings() {
        assert_eq!("Privileged".parse::<LeaveType>().unwrap(), LeaveType::Privileged);
        assert_eq!(ApprovalStatus::Declined.as_ref(), "Declined");
        assert!("annual".parse::<LeaveType>().is_err());
    }
}
