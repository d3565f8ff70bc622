use anyhow::Result;
use futures::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;
use tracing::info;

use crate::model::report::ReportTemplate;

/// Report templates keyed by template type (`employeeSnapshot`, `leave`, ...).
pub static TEMPLATE_CACHE: Lazy<Cache<String, ReportTemplate>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(64)
        .time_to_live(Duration::from_secs(3600))
        .build()
});

/// Cached template for a type, loading it on a miss.
pub async fn get_by_type(pool: &MySqlPool, template_type: &str) -> Result<Option<ReportTemplate>, sqlx::Error> {
    if let Some(hit) = TEMPLATE_CACHE.get(template_type).await {
        return Ok(Some(hit));
    }

    let template = sqlx::query_as::<_, ReportTemplate>(
        "SELECT id, template_type, flags FROM report_templates WHERE template_type = ?",
    )
    .bind(template_type)
    .fetch_optional(pool)
    .await?;

    if let Some(t) = &template {
        TEMPLATE_CACHE.insert(t.template_type.clone(), t.clone()).await;
    }
    Ok(template)
}

/// Drops a type after its flags changed.
pub async fn invalidate(template_type: &str) {
    TEMPLATE_CACHE.invalidate(template_type).await;
}

/// Loads every template into the cache.
pub async fn warmup_template_cache(pool: &MySqlPool) -> Result<()> {
    let mut stream = sqlx::query_as::<_, ReportTemplate>(
        "SELECT id, template_type, flags FROM report_templates",
    )
    .fetch(pool);

    let mut loaded = 0usize;
    while let Some(row) = stream.next().await {
        let template = row?;
        TEMPLATE_CACHE.insert(template.template_type.clone(), template).await;
        loaded += 1;
    }

    info!(loaded, "Report template cache warmed up");
    Ok(())
}
