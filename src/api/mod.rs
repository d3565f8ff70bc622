use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::model::employee::Employee;
use crate::model::holiday::Holiday;
use crate::model::leave::LeaveRequest;
use crate::model::loan::Loan;
use crate::model::payslip::{Component, SalaryStructure};
use crate::model::report::{Report, ReportHistory};
use self::report::ScheduleView;

pub mod attendance;
pub mod employee;
pub mod holiday;
pub mod leave_request;
pub mod loan;
pub mod payslip;
pub mod report;
pub mod sequence;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Items per page
    pub per_page: Option<u32>,
}

impl PageQuery {
    /// `(page, per_page, offset)` with defaults applied.
    pub fn bounds(&self) -> (u32, u32, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        (page, per_page, u64::from(page - 1) * u64::from(per_page))
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    EmployeeListResponse = Page<Employee>,
    LeaveListResponse = Page<LeaveRequest>,
    LoanListResponse = Page<Loan>,
    HolidayListResponse = Page<Holiday>,
    StructureListResponse = Page<SalaryStructure>,
    ComponentListResponse = Page<Component>,
    ReportListResponse = Page<Report>,
    ScheduleListResponse = Page<ScheduleView>,
    HistoryListResponse = Page<ReportHistory>
)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 57)]
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, page: u32, per_page: u32, total: i64) -> Self {
        Self {
            data,
            page,
            per_page,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_apply_defaults_and_limits() {
        assert_eq!(PageQuery::default().bounds(), (1, 20, 0));
        let q = PageQuery {
            page: Some(3),
            per_page: Some(500),
        };
        assert_eq!(q.bounds(), (3, 100, 200));
        let q = PageQuery {
            page: Some(0),
            per_page: Some(0),
        };
        assert_eq!(q.bounds(), (1, 1, 0));
    }
}
