use chrono::{DateTime, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::AppError;
use crate::model::report::ReportFrequency;

fn advance(at: NaiveDateTime, frequency: ReportFrequency) -> Option<NaiveDateTime> {
    match frequency {
        ReportFrequency::Daily => at.checked_add_days(Days::new(1)),
        ReportFrequency::Weekly => at.checked_add_days(Days::new(7)),
        ReportFrequency::Monthly => at.checked_add_months(Months::new(1)),
    }
}

/// First run strictly after `now_ms`: the start date at `hours:minutes` UTC,
/// pushed forward one period at a time.
pub fn next_run_after(
    start_date: NaiveDate,
    hours: i32,
    minutes: i32,
    frequency: ReportFrequency,
    now_ms: i64,
) -> Result<i64, AppError> {
    let time = u32::try_from(hours)
        .ok()
        .zip(u32::try_from(minutes).ok())
        .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
        .ok_or_else(|| AppError::bad_request(format!("Invalid run time {hours}:{minutes}")))?;

    let mut run = start_date.and_time(time);
    while run.and_utc().timestamp_millis() <= now_ms {
        run = advance(run, frequency)
            .ok_or_else(|| AppError::bad_request("Next run date is out of range"))?;
    }

    Ok(run.and_utc().timestamp_millis())
}

/// "05 Mar 2024, 09:30 AM" in UTC.
pub fn format_next_run(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt: DateTime<Utc>| dt.format("%d %b %Y, %I:%M %p").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(s: &str) -> i64 {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn future_start_is_used_as_is() {
        let next = next_run_after(day("2030-01-01"), 9, 30, ReportFrequency::Daily, ms("2024-01-01 00:00")).unwrap();
        assert_eq!(next, ms("2030-01-01 09:30"));
    }

    #[test]
    fn past_start_advances_by_period() {
        let now = ms("2024-01-10 12:00");
        let daily = next_run_after(day("2024-01-01"), 9, 0, ReportFrequency::Daily, now).unwrap();
        assert_eq!(daily, ms("2024-01-11 09:00"));

        let weekly = next_run_after(day("2024-01-01"), 9, 0, ReportFrequency::Weekly, now).unwrap();
        assert_eq!(weekly, ms("2024-01-15 09:00"));

        let monthly = next_run_after(day("2023-11-30"), 9, 0, ReportFrequency::Monthly, now).unwrap();
        assert_eq!(monthly, ms("2024-01-30 09:00"));
    }

    #[test]
    fn run_exactly_now_moves_forward() {
        let now = ms("2024-01-10 09:00");
        let next = next_run_after(day("2024-01-10"), 9, 0, ReportFrequency::Daily, now).unwrap();
        assert_eq!(next, ms("2024-01-11 09:00"));
    }

    #[test]
    fn invalid_time_is_rejected() {
        assert!(next_run_after(day("2024-01-01"), 24, 0, ReportFrequency::Daily, 0).is_err());
        assert!(next_run_after(day("2024-01-01"), 9, -1, ReportFrequency::Daily, 0).is_err());
    }

    #[test]
    fn formats_for_humans() {
        assert_eq!(format_next_run(ms("2024-03-05 21:05")), "05 Mar 2024, 09:05 PM");
    }
}
