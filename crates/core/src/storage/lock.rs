use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Advisory locks are scoped to the Postgres session: acquire and release on the same
// connection. Guards against two collector runs writing the same collection date at once.
const LOCK_NAMESPACE: i64 = 0x5441_5354_4543; // "TASTEC"

fn lock_key_for_date(collection_date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ i64::from(collection_date.num_days_from_ce())
}

pub async fn try_acquire_collection_lock(
    conn: &mut sqlx::PgConnection,
    collection_date: NaiveDate,
) -> anyhow::Result<bool> {
    let key = lock_key_for_date(collection_date);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_collection_lock(
    conn: &mut sqlx::PgConnection,
    collection_date: NaiveDate,
) -> anyhow::Result<()> {
    let key = lock_key_for_date(collection_date);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}
