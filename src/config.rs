use anyhow::{Context, Result, anyhow};
use chrono::NaiveTime;
use dotenvy::dotenv;
use std::{env, fmt::Display, str::FromStr};

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,
    pub run_migrations: bool,

    // Office hours used for lateness / overtime
    pub office_start: NaiveTime,
    pub office_end: NaiveTime,

    /// Seconds between scheduled report runs, 0 disables the ticker
    pub report_job_interval_secs: u64,

    pub smtp: Option<SmtpConfig>,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parse_or("ACCESS_TOKEN_TTL", "900")?, // default 15 min
            refresh_token_ttl: parse_or("REFRESH_TOKEN_TTL", "604800")?, // default 7 days

            rate_login_per_min: parse_or("RATE_LOGIN_PER_MIN", "60")?,
            rate_register_per_min: parse_or("RATE_REGISTER_PER_MIN", "30")?,
            rate_refresh_per_min: parse_or("RATE_REFRESH_PER_MIN", "30")?,
            rate_protected_per_min: parse_or("RATE_PROTECTED_PER_MIN", "1000")?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            run_migrations: parse_or("RUN_MIGRATIONS", "true")?,

            office_start: parse_time("OFFICE_START", "09:00")?,
            office_end: parse_time("OFFICE_END", "18:00")?,

            report_job_interval_secs: parse_or("REPORT_JOB_INTERVAL_SECS", "0")?,

            smtp: smtp_from_env()?,
        })
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parse_or<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}"))
}

fn parse_time(key: &str, default: &str) -> Result<NaiveTime> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .with_context(|| format!("Invalid {key} value {raw:?}, expected HH:MM"))
}

/// SMTP is optional; without SMTP_HOST scheduled reports cannot be mailed.
fn smtp_from_env() -> Result<Option<SmtpConfig>> {
    let Ok(host) = env::var("SMTP_HOST") else {
        return Ok(None);
    };

    let username = env::var("SMTP_USERNAME").unwrap_or_default();
    Ok(Some(SmtpConfig {
        host,
        port: parse_or("SMTP_PORT", "587")?,
        from: env::var("MAIL_FROM").unwrap_or_else(|_| username.clone()),
        password: env::var("SMTP_PASSWORD").unwrap_or_default(),
        username,
    }))
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/test".into(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 604800,
            rate_login_per_min: 60,
            rate_register_per_min: 30,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            log_dir: "logs".into(),
            run_migrations: false,
            office_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            office_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
            report_job_interval_secs: 0,
            smtp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_reports_the_bad_key() {
        let err = parse_or::<u32>("PAYROLL_TEST_UNSET_KEY", "not-a-number").unwrap_err();
        assert!(err.to_string().contains("PAYROLL_TEST_UNSET_KEY"));
        assert_eq!(parse_or::<u64>("PAYROLL_TEST_UNSET_KEY", "42").unwrap(), 42);
    }

    #[test]
    fn office_hours_default_to_nine_to_six() {
        let start = parse_time("PAYROLL_TEST_UNSET_TIME", "09:00").unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(parse_time("PAYROLL_TEST_UNSET_TIME", "9am").is_err());
    }
}
