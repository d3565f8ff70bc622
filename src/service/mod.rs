pub mod attendance;
pub mod export;
pub mod job;
pub mod mailer;
pub mod payslip;
pub mod projection;
pub mod report;
pub mod schedule;
pub mod sequence;
