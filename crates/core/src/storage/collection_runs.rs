use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

pub async fn record_collection_run(
    pool: &sqlx::PgPool,
    collection_date: NaiveDate,
    user_id: &str,
    status: RunStatus,
    error: Option<&str>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let generated_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO collection_runs (id, collection_date, user_id, generated_at, status, error) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .persistent(false)
    .bind(id)
    .bind(collection_date)
    .bind(user_id)
    .bind(generated_at)
    .bind(status.as_str())
    .bind(error)
    .execute(pool)
    .await
    .context("insert collection_runs failed")?;

    Ok(id)
}
