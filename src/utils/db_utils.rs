use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::mysql::MySqlArguments;
use sqlx::query::{QueryAs, QueryScalar};
use sqlx::{Executor, MySql};

use crate::error::AppError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// ===============================
/// Dynamic WHERE clause
/// ===============================
#[derive(Debug)]
pub struct Filters {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

impl Filters {
    /// Starts from a fixed condition, e.g. `is_deleted = FALSE`.
    pub fn new(base: &str) -> Self {
        Self {
            sql: format!(" WHERE {base}"),
            args: Vec::new(),
        }
    }

    pub fn push(&mut self, clause: &str, value: SqlValue) {
        self.sql.push_str(" AND ");
        self.sql.push_str(clause);
        self.args.push(value);
    }

    pub fn push_opt<T>(&mut self, clause: &str, value: Option<T>, wrap: impl FnOnce(T) -> SqlValue) {
        if let Some(v) = value {
            self.push(clause, wrap(v));
        }
    }

    /// Same value bound to several placeholders of one clause.
    pub fn push_repeated(&mut self, clause: &str, value: SqlValue, times: usize) {
        self.sql.push_str(" AND ");
        self.sql.push_str(clause);
        for _ in 0..times {
            self.args.push(value.clone());
        }
    }
}

pub fn bind_as<'q, O>(
    mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    args: &[SqlValue],
) -> QueryAs<'q, MySql, O, MySqlArguments> {
    for arg in args {
        query = match arg.clone() {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

pub fn bind_scalar<'q, O>(
    mut query: QueryScalar<'q, MySql, O, MySqlArguments>,
    args: &[SqlValue],
) -> QueryScalar<'q, MySql, O, MySqlArguments> {
    for arg in args {
        query = match arg.clone() {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only keys listed in `allowed` may be set; `updated_at` is always stamped.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&str],
    id_column: &str,
    id_value: &str,
    now: i64,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(AppError::bad_request("No fields provided for update"));
    }

    if let Some(bad) = obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(AppError::bad_request(format!("Field {bad} cannot be updated")));
    }

    // Build SET clause
    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .chain(std::iter::once("updated_at = ?".to_string()))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE {} = ?", table, set_clause, id_column);

    let mut values = Vec::with_capacity(obj.len() + 2);

    // Convert JSON values → SqlValue
    for value in obj.values() {
        match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    values.push(SqlValue::Date(d));
                } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                    values.push(SqlValue::DateTime(dt));
                } else {
                    values.push(SqlValue::String(s.clone()));
                }
            }
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    values.push(SqlValue::I64(i));
                } else if let Some(f) = n.as_f64() {
                    values.push(SqlValue::F64(f));
                }
            }
            Value::Bool(b) => values.push(SqlValue::Bool(*b)),
            Value::Null => values.push(SqlValue::Null),
            _ => return Err(AppError::bad_request("Unsupported JSON value type")),
        }
    }

    values.push(SqlValue::I64(now));
    // WHERE id = ?
    values.push(SqlValue::String(id_value.to_string()));

    Ok(SqlUpdate { sql, values })
}

/// Rejects explicit `null` for any key in `required`.
pub fn reject_nulls(payload: &Value, required: &[&str]) -> Result<(), AppError> {
    let Some(obj) = payload.as_object() else {
        return Ok(());
    };
    match required.iter().find(|k| obj.get(**k).is_some_and(Value::is_null)) {
        Some(key) => Err(AppError::bad_request(format!("Field {key} cannot be null"))),
        None => Ok(()),
    }
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'c, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALLOWED: &[&str] = &["first_name", "ctc_annual", "joining_date", "pan_num"];

    #[test]
    fn builds_set_clause_in_payload_order() {
        let payload = json!({"first_name": "Ann", "ctc_annual": 1200.5, "joining_date": "2024-02-01", "pan_num": null});
        let update = build_update_sql("employees", &payload, ALLOWED, "id", "e-1", 77).unwrap();

        assert_eq!(
            update.sql,
            "UPDATE employees SET first_name = ?, ctc_annual = ?, joining_date = ?, pan_num = ?, updated_at = ? WHERE id = ?"
        );
        assert_eq!(update.values[0], SqlValue::String("Ann".into()));
        assert_eq!(update.values[1], SqlValue::F64(1200.5));
        assert_eq!(
            update.values[2],
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        );
        assert_eq!(update.values[3], SqlValue::Null);
        assert_eq!(update.values[4], SqlValue::I64(77));
        assert_eq!(update.values[5], SqlValue::String("e-1".into()));
    }

    #[test]
    fn rejects_columns_outside_the_whitelist() {
        let payload = json!({"first_name": "Ann", "is_deleted": true});
        let err = build_update_sql("employees", &payload, ALLOWED, "id", "e-1", 0).unwrap_err();
        assert!(err.to_string().contains("is_deleted"));
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql("employees", &json!({}), ALLOWED, "id", "e", 0).is_err());
        assert!(build_update_sql("employees", &json!([1]), ALLOWED, "id", "e", 0).is_err());
        assert!(build_update_sql("employees", &json!({"first_name": {"a": 1}}), ALLOWED, "id", "e", 0).is_err());
    }

    #[test]
    fn explicit_null_is_refused_for_required_columns() {
        let required = &["first_name", "ctc_annual"];
        let err = reject_nulls(&json!({"first_name": null, "pan_num": null}), required).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("first_name")));

        assert!(reject_nulls(&json!({"pan_num": null, "ctc_annual": 10}), required).is_ok());
    }

    #[test]
    fn filters_accumulate_clauses_and_args() {
        let mut f = Filters::new("is_deleted = FALSE");
        f.push_opt("status = ?", Some("Active".to_string()), SqlValue::String);
        f.push_opt("ctc_annual >= ?", None::<f64>, SqlValue::F64);
        f.push_repeated("(a LIKE ? OR b LIKE ?)", SqlValue::String("%x%".into()), 2);

        assert_eq!(f.sql, " WHERE is_deleted = FALSE AND status = ? AND (a LIKE ? OR b LIKE ?)");
        assert_eq!(f.args.len(), 3);
    }
}
