use crate::{
    api::{Page, PageQuery},
    auth::auth::AuthUser,
    db::{new_id, now_millis},
    error::AppError,
    model::holiday::Holiday,
    utils::db_utils::{Filters, SqlValue, bind_as, bind_scalar},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateHoliday {
    #[schema(example = "Independence Day")]
    pub name: String,
    #[schema(example = "2026-08-15", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub holiday_group: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HolidayQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub holiday_group: Option<String>,
    pub year: Option<i32>,
}

fn holiday_filters(query: &HolidayQuery) -> Filters {
    let mut f = Filters::new("1 = 1");
    f.push_opt("holiday_group = ?", query.holiday_group.clone(), SqlValue::String);
    f.push_opt("YEAR(date) = ?", query.year, |y| SqlValue::I64(i64::from(y)));
    f
}

/// Add a holiday to the calendar
#[utoipa::path(
    post,
    path = "/api/holidays",
    request_body = CreateHoliday,
    responses(
        (status = 201, description = "Holiday created", body = Holiday),
        (status = 400, description = "Name is required")
    ),
    tag = "Holiday",
    security(("bearer_auth" = []))
)]
pub async fn create_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateHoliday>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let p = payload.into_inner();
    let name = p.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Holiday name is required"));
    }

    let holiday = Holiday {
        id: new_id(),
        name: name.to_string(),
        date: p.date,
        holiday_group: p.holiday_group.filter(|g| !g.trim().is_empty()),
        created_at: now_millis(),
    };

    sqlx::query("INSERT INTO holidays (id, name, date, holiday_group, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&holiday.id)
        .bind(&holiday.name)
        .bind(holiday.date)
        .bind(&holiday.holiday_group)
        .bind(holiday.created_at)
        .execute(pool.get_ref())
        .await?;

    info!(holiday_id = %holiday.id, date = %holiday.date, "Holiday added");
    Ok(HttpResponse::Created().json(holiday))
}

/// List holidays
#[utoipa::path(
    get,
    path = "/api/holidays",
    params(HolidayQuery),
    responses((status = 200, description = "Holidays ordered by date", body = HolidayListResponse)),
    tag = "Holiday",
    security(("bearer_auth" = []))
)]
pub async fn list_holidays(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HolidayQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, per_page, offset) = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .bounds();
    let f = holiday_filters(&query);

    let total = bind_scalar(
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM holidays{}", f.sql)),
        &f.args,
    )
    .fetch_one(pool.get_ref())
    .await?;

    let sql = format!(
        "SELECT * FROM holidays{} ORDER BY date LIMIT {per_page} OFFSET {offset}",
        f.sql
    );
    let holidays = bind_as(sqlx::query_as::<_, Holiday>(&sql), &f.args)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page::new(holidays, page, per_page, total)))
}

/// Remove a holiday
#[utoipa::path(
    delete,
    path = "/api/holidays/{id}",
    params(("id", Path, description = "Holiday ID")),
    responses(
        (status = 204, description = "Holiday removed"),
        (status = 404, description = "Holiday not found")
    ),
    tag = "Holiday",
    security(("bearer_auth" = []))
)]
pub async fn delete_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM holidays WHERE id = ?")
        .bind(&id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Holiday not found"));
    }

    info!(holiday_id = %id, "Holiday removed");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_group_and_year() {
        let q = HolidayQuery {
            page: None,
            per_page: None,
            holiday_group: Some("India".into()),
            year: Some(2026),
        };
        let f = holiday_filters(&q);
        assert_eq!(f.sql, " WHERE 1 = 1 AND holiday_group = ? AND YEAR(date) = ?");
        assert_eq!(f.args, vec![SqlValue::String("India".into()), SqlValue::I64(2026)]);
    }

    #[test]
    fn no_filters_leaves_base_clause() {
        let q = HolidayQuery {
            page: Some(2),
            per_page: None,
            holiday_group: None,
            year: None,
        };
        assert_eq!(holiday_filters(&q).sql, " WHERE 1 = 1");
    }
}
