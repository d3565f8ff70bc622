use sqlx::{MySql, Transaction};
use tracing::debug;

use crate::error::AppError;
use crate::model::sequence::SequenceNumber;

/// Hands out the next code of a sequence and bumps its counter. The row is
/// locked for the rest of `tx`, so concurrent callers never share a code.
pub async fn next_code(
    tx: &mut Transaction<'_, MySql>,
    seq_type: &str,
) -> Result<String, AppError> {
    let seq = sqlx::query_as::<_, SequenceNumber>(
        "SELECT * FROM sequence_numbers WHERE seq_type = ? FOR UPDATE",
    )
    .bind(seq_type)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::bad_request(format!("Sequence {seq_type} is not configured")))?;

    sqlx::query(
        "UPDATE sequence_numbers SET next_available_number = next_available_number + 1 WHERE id = ?",
    )
    .bind(&seq.id)
    .execute(&mut **tx)
    .await?;

    let code = seq.current_code();
    debug!(seq_type, code = %code, "Allocated sequence code");
    Ok(code)
}
