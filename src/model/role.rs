use serde::Serialize;
use strum_macros::{AsRefStr, FromRepr};

/// Account roles, stored as `users.role_id`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, AsRefStr, FromRepr)]
#[repr(u8)]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    System = 4,
    ApiUser = 5,
}

impl Role {
    /// May change employee, attendance, leave, loan, payslip and report data.
    pub fn can_manage(self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_repr() {
        assert_eq!(Role::from_repr(2), Some(Role::Hr));
        assert_eq!(Role::from_repr(0), None);
        assert_eq!(Role::from_repr(6), None);
        assert_eq!(Role::ApiUser as u8, 5);
    }

    #[test]
    fn only_hr_and_admin_manage() {
        assert!(Role::Admin.can_manage());
        assert!(Role::Hr.can_manage());
        assert!(!Role::Employee.can_manage());
        assert!(!Role::System.can_manage());
    }
}
