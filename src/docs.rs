use crate::api::attendance::{ClockImportRow, EditAttendance, ImportSummary, LeaveImportRow, MissingRequest};
use crate::api::employee::{ChangeStatus, CreateEmployee};
use crate::api::holiday::CreateHoliday;
use crate::api::leave_request::{BalanceInput, CreateLeave, DeclineLeave, LeaveFilter, LeaveResponse};
use crate::api::loan::{ApproveLoan, CancelLoan, CreateLoan, EditLoan, LoanDetail};
use crate::api::payslip::{CreateStructure, GroupPayslip, NewComponent, StructureComponents};
use crate::api::report::{CreateReport, ScheduleRequest, ScheduleView, UpdateSchedule};
use crate::api::sequence::CreateSequence;
use crate::api::{
    ComponentListResponse, EmployeeListResponse, HistoryListResponse, HolidayListResponse, LeaveListResponse,
    LoanListResponse, ReportListResponse, ScheduleListResponse, StructureListResponse,
};
use crate::model::attendance::{Attendance, AttendanceStatus};
use crate::model::employee::{Employee, EmployeeStatus, Gender};
use crate::model::holiday::Holiday;
use crate::model::leave::{ApprovalStatus, LeaveBalance, LeaveRequest, LeaveType};
use crate::model::loan::{Loan, LoanActivity, LoanStatus};
use crate::model::payslip::{CalculationType, Component, SalaryStructure};
use crate::model::report::{
    HistoryAction, Report, ReportFormat, ReportFrequency, ReportHistory, ReportKind, ReportTemplate, ScheduleReport,
};
use crate::model::sequence::SequenceNumber;
use crate::models::{LoginReqDto, TokenPair, UserReq};
use crate::service::attendance::{EmployeeYearSummary, MonthSummary};
use crate::service::job::JobRunSummary;
use crate::service::payslip::{ComponentAmount, ComponentGroup};
use crate::service::report::{ProjectedReport, ReportFilters};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

/// Registers the bearer scheme referenced by `security(("bearer_auth" = []))`.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll HRM API",
        version = "1.0.0",
        description = r#"
## Payroll & HR Management API

Backend for an HR/payroll product: employee records, attendance, leave,
loans, salary structures and reporting.

### Key Features
- **Employees**: create with a sequence-generated code, filter, edit, soft delete
- **Attendance**: bulk clock / leave imports, month back-fill, yearly summaries
- **Leave**: requests, approval with balance deduction
- **Loans**: request, approve, cancel, activity log
- **Payslip**: salary structures with copy-on-read default components
- **Reports**: template-driven projections, XLSX/CSV export, scheduled email delivery

### Security
Everything under the API prefix needs a **JWT bearer** access token from `/auth/login`.
Mutations are limited to **HR** and **Admin** roles.

### Response Format
- JSON bodies, `{"message": ...}` on errors
- `page` / `per_page` pagination on list endpoints, `page` / `limit` on report data
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::change_status,
        crate::api::employee::delete_employee,

        crate::api::attendance::import_clock,
        crate::api::attendance::import_leave,
        crate::api::attendance::fill_missing,
        crate::api::attendance::yearly,
        crate::api::attendance::employee_calendar,
        crate::api::attendance::employee_month,
        crate::api::attendance::edit_attendance,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::decline_leave,
        crate::api::leave_request::employee_balances,

        crate::api::holiday::create_holiday,
        crate::api::holiday::list_holidays,
        crate::api::holiday::delete_holiday,

        crate::api::sequence::create_sequence,
        crate::api::sequence::list_sequences,
        crate::api::sequence::peek_next,

        crate::api::loan::create_loan,
        crate::api::loan::approve_loan,
        crate::api::loan::cancel_loan,
        crate::api::loan::edit_loan,
        crate::api::loan::list_loans,
        crate::api::loan::get_loan,

        crate::api::payslip::add_default_component,
        crate::api::payslip::list_default_components,
        crate::api::payslip::create_structure,
        crate::api::payslip::list_structures,
        crate::api::payslip::structure_names,
        crate::api::payslip::edit_structure,
        crate::api::payslip::delete_structure,
        crate::api::payslip::structure_components,
        crate::api::payslip::add_structure_component,
        crate::api::payslip::edit_component,
        crate::api::payslip::delete_component,
        crate::api::payslip::group_components,

        crate::api::report::create_report,
        crate::api::report::list_reports,
        crate::api::report::delete_report,
        crate::api::report::get_template,
        crate::api::report::edit_template,
        crate::api::report::report_data,
        crate::api::report::export_report,
        crate::api::report::create_schedule,
        crate::api::report::list_schedules,
        crate::api::report::update_schedule,
        crate::api::report::delete_schedule,
        crate::api::report::list_history,
        crate::api::report::run_jobs
    ),
    components(
        schemas(
            UserReq,
            LoginReqDto,
            TokenPair,

            Employee,
            EmployeeStatus,
            Gender,
            CreateEmployee,
            ChangeStatus,
            EmployeeListResponse,

            Attendance,
            AttendanceStatus,
            ClockImportRow,
            LeaveImportRow,
            MissingRequest,
            EditAttendance,
            ImportSummary,
            MonthSummary,
            EmployeeYearSummary,

            LeaveRequest,
            LeaveBalance,
            LeaveType,
            ApprovalStatus,
            BalanceInput,
            CreateLeave,
            DeclineLeave,
            LeaveFilter,
            LeaveResponse,
            LeaveListResponse,

            Holiday,
            CreateHoliday,
            HolidayListResponse,

            SequenceNumber,
            CreateSequence,

            Loan,
            LoanStatus,
            LoanActivity,
            LoanDetail,
            CreateLoan,
            ApproveLoan,
            CancelLoan,
            EditLoan,
            LoanListResponse,

            SalaryStructure,
            Component,
            CalculationType,
            NewComponent,
            CreateStructure,
            StructureComponents,
            GroupPayslip,
            ComponentGroup,
            ComponentAmount,
            StructureListResponse,
            ComponentListResponse,

            Report,
            ReportKind,
            ReportTemplate,
            ReportHistory,
            HistoryAction,
            ScheduleReport,
            ScheduleView,
            ReportFrequency,
            ReportFormat,
            CreateReport,
            ScheduleRequest,
            UpdateSchedule,
            ReportFilters,
            ProjectedReport,
            JobRunSummary,
            ReportListResponse,
            ScheduleListResponse,
            HistoryListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Attendance", description = "Attendance import and calendar APIs"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Holiday", description = "Holiday calendar APIs"),
        (name = "Sequence", description = "Code sequence APIs"),
        (name = "Loan", description = "Loan and advance APIs"),
        (name = "Payslip", description = "Salary structure and component APIs"),
        (name = "Report", description = "Reports, templates, exports and schedules"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_protected_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/employees"));
        assert!(doc.paths.paths.contains_key("/api/report/export/{report_type}"));
        assert!(doc.paths.paths.contains_key("/auth/login"));

        let schemes = doc.components.unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
    }
}
