use sqlx::{MySql, MySqlPool, QueryBuilder, Transaction};

/// Rows per multi-row INSERT statement / transaction.
pub const BATCH_LIMIT: usize = 500;

pub async fn init_db(database_url: &str, run_migrations: bool) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPool::connect(database_url).await?;

    if run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    Ok(pool)
}

/// Milliseconds since the epoch, the timestamp format stored in every table.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Insert `rows` into `table` with one multi-row statement per chunk of
/// [`BATCH_LIMIT`], each chunk committed on its own transaction.
pub async fn insert_in_batches<T, F>(
    pool: &MySqlPool,
    head: &str,
    rows: &[T],
    mut bind: F,
) -> Result<u64, sqlx::Error>
where
    F: FnMut(sqlx::query_builder::Separated<'_, '_, MySql, &'static str>, &T),
{
    let mut inserted = 0;

    for chunk in rows.chunks(BATCH_LIMIT) {
        let mut tx: Transaction<'_, MySql> = pool.begin().await?;
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(head);
        builder.push_values(chunk, |b, row| bind(b, row));

        let result = builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        inserted += result.rows_affected();
        tracing::debug!(rows = chunk.len(), "Committed insert batch");
    }

    Ok(inserted)
}
