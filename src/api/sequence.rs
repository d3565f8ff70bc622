use crate::{
    auth::auth::AuthUser,
    db::{new_id, now_millis},
    error::AppError,
    model::sequence::SequenceNumber,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSequence {
    #[schema(example = "Employee")]
    pub seq_type: String,
    #[schema(example = "EMP")]
    pub prefix: String,
    #[schema(example = 1)]
    pub next_available_number: Option<i64>,
}

impl CreateSequence {
    fn validate(&self) -> Result<(), AppError> {
        if self.seq_type.trim().is_empty() {
            return Err(AppError::bad_request("Sequence type is required"));
        }
        if self.next_available_number.is_some_and(|n| n < 0) {
            return Err(AppError::bad_request("Next available number cannot be negative"));
        }
        Ok(())
    }
}

/// Configure a sequence
#[utoipa::path(
    post,
    path = "/api/sequence",
    request_body = CreateSequence,
    responses(
        (status = 201, description = "Sequence created", body = SequenceNumber),
        (status = 400, description = "Invalid sequence"),
        (status = 409, description = "Sequence type already exists")
    ),
    tag = "Sequence",
    security(("bearer_auth" = []))
)]
pub async fn create_sequence(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSequence>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let p = payload.into_inner();
    p.validate()?;

    let seq = SequenceNumber {
        id: new_id(),
        seq_type: p.seq_type.trim().to_string(),
        prefix: p.prefix.trim().to_string(),
        next_available_number: p.next_available_number.unwrap_or(1),
        created_by: Some(auth.username.clone()),
        created_at: now_millis(),
    };

    let inserted = sqlx::query(
        r#"
        INSERT INTO sequence_numbers (id, seq_type, prefix, next_available_number, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&seq.id)
    .bind(&seq.seq_type)
    .bind(&seq.prefix)
    .bind(seq.next_available_number)
    .bind(&seq.created_by)
    .bind(seq.created_at)
    .execute(pool.get_ref())
    .await;

    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23000") => {
            return Err(AppError::Conflict(format!("Sequence {} already exists", seq.seq_type)));
        }
        Err(e) => return Err(e.into()),
    }

    info!(seq_type = %seq.seq_type, prefix = %seq.prefix, "Sequence configured");
    Ok(HttpResponse::Created().json(seq))
}

/// List sequences
#[utoipa::path(
    get,
    path = "/api/sequence",
    responses((status = 200, description = "All sequences", body = [SequenceNumber])),
    tag = "Sequence",
    security(("bearer_auth" = []))
)]
pub async fn list_sequences(_auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, AppError> {
    let sequences = sqlx::query_as::<_, SequenceNumber>("SELECT * FROM sequence_numbers ORDER BY seq_type")
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(sequences))
}

/// Preview the next code without consuming it
#[utoipa::path(
    get,
    path = "/api/sequence/{seq_type}/next",
    params(("seq_type", Path, description = "Sequence type, e.g. Employee")),
    responses(
        (status = 200, description = "Next code", body = Object, example = json!({"seq_type": "Employee", "code": "EMP12"})),
        (status = 404, description = "Sequence not configured")
    ),
    tag = "Sequence",
    security(("bearer_auth" = []))
)]
pub async fn peek_next(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let seq_type = path.into_inner();

    let seq = sqlx::query_as::<_, SequenceNumber>("SELECT * FROM sequence_numbers WHERE seq_type = ?")
        .bind(&seq_type)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found(format!("Sequence {seq_type} is not configured")))?;

    Ok(HttpResponse::Ok().json(json!({
        "seq_type": seq.seq_type,
        "code": seq.current_code(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_type_and_negative_start() {
        let blank = CreateSequence {
            seq_type: "  ".into(),
            prefix: "EMP".into(),
            next_available_number: None,
        };
        assert!(blank.validate().is_err());

        let negative = CreateSequence {
            seq_type: "Employee".into(),
            prefix: "EMP".into(),
            next_available_number: Some(-1),
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn accepts_empty_prefix() {
        let seq = CreateSequence {
            seq_type: "Report".into(),
            prefix: String::new(),
            next_available_number: Some(0),
        };
        assert!(seq.validate().is_ok());
    }
}
