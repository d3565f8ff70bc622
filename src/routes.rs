use crate::{
    api::{attendance, employee, holiday, leave_request, loan, payslip, report, sequence},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Per-route limiter allowing `requests_per_min` with an equal burst.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let burst = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request((60_000 / u64::from(burst)).max(1))
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(handlers::protected)
            .service(
                web::scope("/employees")
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::patch().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    )
                    .service(web::resource("/{id}/status").route(web::patch().to(employee::change_status))),
            )
            .service(
                web::scope("/attendance")
                    .service(web::resource("/create").route(web::post().to(attendance::import_clock)))
                    .service(web::resource("/create/leave").route(web::post().to(attendance::import_leave)))
                    .service(web::resource("/missing").route(web::post().to(attendance::fill_missing)))
                    .service(web::resource("/getAll").route(web::get().to(attendance::yearly)))
                    .service(web::resource("/get/{code}").route(web::get().to(attendance::employee_calendar)))
                    .service(
                        web::resource("/getMonthly/{code}/{year}/{month}")
                            .route(web::get().to(attendance::employee_month)),
                    )
                    .service(web::resource("/edit/{code}").route(web::patch().to(attendance::edit_attendance))),
            )
            .service(
                web::scope("/leave-request")
                    .service(
                        web::resource("")
                            .route(web::post().to(leave_request::create_leave))
                            .route(web::get().to(leave_request::leave_list)),
                    )
                    // before /{id}
                    .service(
                        web::resource("/balances/{emp_code}")
                            .route(web::get().to(leave_request::employee_balances)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                    .service(web::resource("/{id}/approve").route(web::put().to(leave_request::approve_leave)))
                    .service(web::resource("/{id}/decline").route(web::put().to(leave_request::decline_leave))),
            )
            .service(
                web::scope("/holidays")
                    .service(
                        web::resource("")
                            .route(web::post().to(holiday::create_holiday))
                            .route(web::get().to(holiday::list_holidays)),
                    )
                    .service(web::resource("/{id}").route(web::delete().to(holiday::delete_holiday))),
            )
            .service(
                web::scope("/sequence")
                    .service(
                        web::resource("")
                            .route(web::post().to(sequence::create_sequence))
                            .route(web::get().to(sequence::list_sequences)),
                    )
                    .service(web::resource("/{seq_type}/next").route(web::get().to(sequence::peek_next))),
            )
            .service(
                web::scope("/loan")
                    .service(web::resource("").route(web::get().to(loan::list_loans)))
                    // POST takes the employee id, GET/PATCH the loan id
                    .service(
                        web::resource("/{id}")
                            .route(web::post().to(loan::create_loan))
                            .route(web::get().to(loan::get_loan))
                            .route(web::patch().to(loan::edit_loan)),
                    )
                    .service(web::resource("/{id}/approve").route(web::put().to(loan::approve_loan)))
                    .service(web::resource("/{id}/cancel").route(web::put().to(loan::cancel_loan))),
            )
            .service(
                web::scope("/payslip")
                    .service(
                        web::resource("/default")
                            .route(web::post().to(payslip::add_default_component))
                            .route(web::get().to(payslip::list_default_components)),
                    )
                    .service(
                        web::resource("/structure")
                            .route(web::post().to(payslip::create_structure))
                            .route(web::get().to(payslip::list_structures)),
                    )
                    .service(web::resource("/structure/names").route(web::get().to(payslip::structure_names)))
                    .service(
                        web::resource("/structure/{id}")
                            .route(web::patch().to(payslip::edit_structure))
                            .route(web::delete().to(payslip::delete_structure)),
                    )
                    .service(
                        web::resource("/structure/{id}/components")
                            .route(web::get().to(payslip::structure_components)),
                    )
                    .service(
                        web::resource("/structure/{id}/component")
                            .route(web::post().to(payslip::add_structure_component)),
                    )
                    .service(
                        web::resource("/component/{id}")
                            .route(web::patch().to(payslip::edit_component))
                            .route(web::delete().to(payslip::delete_component)),
                    )
                    .service(web::resource("/group/{name}").route(web::get().to(payslip::group_components))),
            )
            .service(
                web::scope("/report")
                    .service(
                        web::resource("")
                            .route(web::post().to(report::create_report))
                            .route(web::get().to(report::list_reports)),
                    )
                    .service(
                        web::resource("/template/{id}")
                            .route(web::get().to(report::get_template))
                            .route(web::patch().to(report::edit_template)),
                    )
                    .service(web::resource("/data/{report_type}").route(web::get().to(report::report_data)))
                    .service(web::resource("/export/{report_type}").route(web::get().to(report::export_report)))
                    .service(web::resource("/schedule").route(web::get().to(report::list_schedules)))
                    .service(
                        web::resource("/schedule/{id}")
                            .route(web::patch().to(report::update_schedule))
                            .route(web::delete().to(report::delete_schedule)),
                    )
                    .service(web::resource("/history").route(web::get().to(report::list_history)))
                    .service(web::resource("/jobs/run").route(web::post().to(report::run_jobs)))
                    .service(web::resource("/{id}/schedule").route(web::post().to(report::create_schedule)))
                    .service(web::resource("/{id}").route(web::delete().to(report::delete_report))),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new access_token + rotated refresh_token

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_accepts_zero_rate() {
        let _ = build_limiter(0);
        let _ = build_limiter(60_000);
        let _ = build_limiter(120_000);
    }
}
