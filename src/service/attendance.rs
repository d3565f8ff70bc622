use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::Serialize;
use strum::IntoEnumIterator;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::model::attendance::{AttendanceStatus, EmpCodeEntry};

pub const FULL_DAY_HOURS: f64 = 8.0;
pub const HALF_DAY_HOURS: f64 = 4.0;

/// Parses an "HH:MM" clock string.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Decimal hours between two clock strings on the same calendar day.
/// `None` when a time is missing or out is before in.
pub fn worked_hours(in_time: Option<&str>, out_time: Option<&str>) -> Option<f64> {
    let start = parse_clock(in_time?)?;
    let end = parse_clock(out_time?)?;
    if end < start {
        return None;
    }
    Some((end - start).num_minutes() as f64 / 60.0)
}

pub fn status_for_hours(hours: Option<f64>) -> AttendanceStatus {
    match hours {
        Some(h) if h >= FULL_DAY_HOURS => AttendanceStatus::Present,
        Some(h) if h >= HALF_DAY_HOURS => AttendanceStatus::HalfDay,
        _ => AttendanceStatus::Absent,
    }
}

/// Status and hours for a clock-in/out import row.
pub fn derive_clock_status(
    in_time: Option<&str>,
    out_time: Option<&str>,
) -> (Option<f64>, AttendanceStatus) {
    let hours = worked_hours(in_time, out_time);
    (hours, status_for_hours(hours))
}

/// Status for a leave-aware import row. A leave id together with a leave type
/// marks the day as leave, otherwise hours decide.
pub fn derive_leave_status(
    hours: Option<f64>,
    leave_id: Option<&str>,
    leave_type: Option<&str>,
) -> AttendanceStatus {
    let present = |v: Option<&str>| v.is_some_and(|s| !s.trim().is_empty());
    if present(leave_id) && present(leave_type) {
        return AttendanceStatus::Leave;
    }
    status_for_hours(hours.filter(|h| *h > 0.0))
}

/// Parses `dd/mm/yy`; two-digit years land in the 2000s.
pub fn parse_import_date(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('/').map(|p| p.trim().parse::<i32>().ok());
    let day = parts.next()??;
    let month = parts.next()??;
    let year = parts.next()??;
    if parts.next().is_some() {
        return None;
    }

    let year = if year < 100 { 2000 + year } else { year };
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
}

pub fn is_week_off(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn days_in_month(year: i32, month: u32) -> Result<Vec<NaiveDate>, AppError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::bad_request(format!("Invalid month {month} for year {year}")))?;

    Ok(first
        .iter_days()
        .take_while(|d| d.month() == month)
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDay {
    pub emp_code: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

/// Rows the fill-missing job should insert: one Holiday or Week-off row per
/// employee for every non-working day that has no record yet.
pub fn plan_missing_days(
    year: i32,
    month: u32,
    employees: &[String],
    existing: &HashSet<(String, NaiveDate)>,
    holidays: &HashSet<NaiveDate>,
) -> Result<Vec<PlannedDay>, AppError> {
    let days = days_in_month(year, month)?;
    let mut planned = Vec::new();

    for emp_code in employees {
        for date in &days {
            if existing.contains(&(emp_code.clone(), *date)) {
                continue;
            }

            let status = if holidays.contains(date) {
                AttendanceStatus::Holiday
            } else if is_week_off(*date) {
                AttendanceStatus::WeekOff
            } else {
                continue;
            };

            planned.push(PlannedDay {
                emp_code: emp_code.clone(),
                date: *date,
                status,
            });
        }
    }

    Ok(planned)
}

/// Minute-level figures against office hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceMetrics {
    pub time_spent: Option<i64>,
    pub late_by: Option<i64>,
    pub early_by: Option<i64>,
    pub over_time: Option<i64>,
}

impl AttendanceMetrics {
    pub fn compute(
        in_time: Option<&str>,
        out_time: Option<&str>,
        office_start: NaiveTime,
        office_end: NaiveTime,
    ) -> Self {
        let (Some(start), Some(end)) = (in_time.and_then(parse_clock), out_time.and_then(parse_clock))
        else {
            return Self::default();
        };

        let minutes = |a: NaiveTime, b: NaiveTime| (a - b).num_minutes().max(0);

        Self {
            time_spent: Some(minutes(end, start)),
            late_by: Some(minutes(start, office_start)),
            early_by: Some(minutes(office_end, end)),
            over_time: Some(minutes(end, office_end)),
        }
    }
}

/// Per-status counters; every status is always present.
pub type StatusCounts = BTreeMap<String, u32>;

fn empty_counts() -> StatusCounts {
    AttendanceStatus::iter()
        .map(|s| (s.as_ref().to_string(), 0))
        .collect()
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MonthSummary {
    /// e.g. "Jan-2024"
    pub label: String,
    pub month: u32,
    #[schema(value_type = Object)]
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EmployeeYearSummary {
    pub emp_code: String,
    pub emp_name: String,
    pub months: Vec<MonthSummary>,
}

/// Groups a year's attendance by employee then calendar month and counts
/// statuses. Employees without rows still get twelve zeroed months.
pub fn yearly_summary(
    year: i32,
    employees: &[EmpCodeEntry],
    rows: &[(String, NaiveDate, AttendanceStatus)],
) -> Vec<EmployeeYearSummary> {
    let mut by_employee: HashMap<&str, Vec<(NaiveDate, AttendanceStatus)>> = HashMap::new();
    for (code, date, status) in rows {
        by_employee.entry(code.as_str()).or_default().push((*date, *status));
    }

    employees
        .iter()
        .map(|emp| {
            let records = by_employee.get(emp.emp_code.as_str());

            let months = (1..=12)
                .map(|month| {
                    let mut counts = empty_counts();
                    for (date, status) in records.into_iter().flatten() {
                        if date.month() == month && date.year() == year {
                            *counts.entry(status.as_ref().to_string()).or_default() += 1;
                        }
                    }
                    MonthSummary {
                        label: month_label(year, month),
                        month,
                        counts,
                    }
                })
                .collect();

            EmployeeYearSummary {
                emp_code: emp.emp_code.clone(),
                emp_name: format!("{} {}", emp.fname, emp.lname).trim().to_string(),
                months,
            }
        })
        .collect()
}

fn month_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.format("%b-%Y").to_string())
        .unwrap_or_else(|| format!("{month}-{year}"))
}

/// `month (1-12) -> day -> status` calendar for one employee.
pub fn calendar(
    rows: &[(NaiveDate, AttendanceStatus)],
) -> BTreeMap<u32, BTreeMap<u32, AttendanceStatus>> {
    let mut months: BTreeMap<u32, BTreeMap<u32, AttendanceStatus>> = BTreeMap::new();
    for (date, status) in rows {
        months.entry(date.month()).or_default().insert(date.day(), *status);
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        parse_clock(s).unwrap()
    }

    #[test]
    fn classifies_hours_by_threshold() {
        assert_eq!(derive_clock_status(Some("09:00"), Some("17:00")), (Some(8.0), AttendanceStatus::Present));
        assert_eq!(derive_clock_status(Some("09:00"), Some("13:30")), (Some(4.5), AttendanceStatus::HalfDay));
        assert_eq!(derive_clock_status(Some("09:00"), Some("12:59")).1, AttendanceStatus::Absent);
    }

    #[test]
    fn missing_or_garbage_times_are_absent_without_hours() {
        assert_eq!(derive_clock_status(None, Some("17:00")), (None, AttendanceStatus::Absent));
        assert_eq!(derive_clock_status(Some("9am"), Some("17:00")), (None, AttendanceStatus::Absent));
    }

    #[test]
    fn out_before_in_counts_as_absent() {
        let (hours, status) = derive_clock_status(Some("18:00"), Some("09:00"));
        assert_eq!(hours, None);
        assert_eq!(status, AttendanceStatus::Absent);
        assert_eq!(derive_clock_status(Some("09:00"), Some("09:00")), (Some(0.0), AttendanceStatus::Absent));
    }

    #[test]
    fn hours_are_fractional() {
        let hours = worked_hours(Some("09:15"), Some("17:45")).unwrap();
        assert!((hours - 8.5).abs() < f64::EPSILON);
    }

    #[test]
    fn leave_rows_need_both_id_and_type() {
        assert_eq!(derive_leave_status(Some(8.0), Some("L-1"), Some("Sick")), AttendanceStatus::Leave);
        assert_eq!(derive_leave_status(Some(8.0), Some("L-1"), None), AttendanceStatus::Present);
        assert_eq!(derive_leave_status(Some(5.0), None, Some("Sick")), AttendanceStatus::HalfDay);
        assert_eq!(derive_leave_status(Some(0.0), None, None), AttendanceStatus::Absent);
        assert_eq!(derive_leave_status(None, Some(" "), Some("Sick")), AttendanceStatus::Absent);
    }

    #[test]
    fn import_dates_expand_two_digit_years() {
        assert_eq!(parse_import_date("05/01/24"), Some(date("2024-01-05")));
        assert_eq!(parse_import_date("29/02/2024"), Some(date("2024-02-29")));
        assert_eq!(parse_import_date("31/02/24"), None);
        assert_eq!(parse_import_date("2024-01-05"), None);
    }

    #[test]
    fn fill_missing_marks_weekends_and_holidays_only() {
        // June 2024 starts on a Saturday
        let employees = vec!["EMP1".to_string()];
        let holidays: HashSet<_> = [date("2024-06-03"), date("2024-06-08")].into();
        let existing: HashSet<_> = [("EMP1".to_string(), date("2024-06-02"))].into();

        let plan = plan_missing_days(2024, 6, &employees, &existing, &holidays).unwrap();

        let find = |d: &str| plan.iter().find(|p| p.date == date(d)).map(|p| p.status);
        assert_eq!(find("2024-06-01"), Some(AttendanceStatus::WeekOff));
        assert_eq!(find("2024-06-02"), None);
        assert_eq!(find("2024-06-03"), Some(AttendanceStatus::Holiday));
        assert_eq!(find("2024-06-04"), None);
        // holiday on a Saturday stays a holiday
        assert_eq!(find("2024-06-08"), Some(AttendanceStatus::Holiday));

        let mut dates: Vec<_> = plan.iter().map(|p| p.date).collect();
        dates.dedup();
        assert_eq!(dates.len(), plan.len());
        // 10 weekend days, one already recorded, plus one weekday holiday
        assert_eq!(plan.len(), 10);
    }

    #[test]
    fn fill_missing_rejects_bad_month() {
        let err = plan_missing_days(2024, 13, &[], &HashSet::new(), &HashSet::new()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn metrics_are_floored_minutes_and_never_negative() {
        let m = AttendanceMetrics::compute(Some("09:20"), Some("17:30"), t("09:00"), t("18:00"));
        assert_eq!(m.time_spent, Some(490));
        assert_eq!(m.late_by, Some(20));
        assert_eq!(m.early_by, Some(30));
        assert_eq!(m.over_time, Some(0));

        let m = AttendanceMetrics::compute(Some("08:45"), Some("19:10"), t("09:00"), t("18:00"));
        assert_eq!(m.late_by, Some(0));
        assert_eq!(m.early_by, Some(0));
        assert_eq!(m.over_time, Some(70));
    }

    #[test]
    fn metrics_without_times_are_empty() {
        let m = AttendanceMetrics::compute(None, Some("17:00"), t("09:00"), t("18:00"));
        assert_eq!(m, AttendanceMetrics::default());
    }

    #[test]
    fn yearly_summary_counts_per_month() {
        let employees = vec![EmpCodeEntry {
            emp_code: "E".into(),
            fname: "Ann".into(),
            lname: "Lee".into(),
        }];

        let mut rows = Vec::new();
        for day in 1..=5 {
            rows.push(("E".to_string(), date(&format!("2024-01-0{day}")), AttendanceStatus::Present));
        }
        rows.push(("E".to_string(), date("2024-01-08"), AttendanceStatus::Absent));
        rows.push(("E".to_string(), date("2024-01-09"), AttendanceStatus::Absent));
        rows.push(("E".to_string(), date("2024-03-01"), AttendanceStatus::Leave));

        let summary = yearly_summary(2024, &employees, &rows);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].emp_name, "Ann Lee");
        assert_eq!(summary[0].months.len(), 12);

        let jan = &summary[0].months[0];
        assert_eq!(jan.label, "Jan-2024");
        assert_eq!(jan.counts["P"], 5);
        assert_eq!(jan.counts["AB"], 2);
        for other in ["W", "H", "L", "HD"] {
            assert_eq!(jan.counts[other], 0);
        }
        assert_eq!(summary[0].months[2].counts["L"], 1);
        assert_eq!(summary[0].months[11].counts.values().sum::<u32>(), 0);
    }

    #[test]
    fn calendar_groups_by_month_and_day() {
        let rows = vec![
            (date("2024-02-01"), AttendanceStatus::Present),
            (date("2024-02-03"), AttendanceStatus::WeekOff),
            (date("2024-04-10"), AttendanceStatus::Leave),
        ];
        let cal = calendar(&rows);
        assert_eq!(cal[&2][&3], AttendanceStatus::WeekOff);
        assert_eq!(cal[&4].len(), 1);
    }
}
