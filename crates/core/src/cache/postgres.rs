use crate::cache::EphemeralCache;
use anyhow::Context;
use chrono::Utc;
use std::time::Duration;

/// Cache rows shared by every API instance and the worker.
#[derive(Debug, Clone)]
pub struct PgCache {
    pool: sqlx::PgPool,
}

impl PgCache {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EphemeralCache for PgCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM ephemeral_cache WHERE key = $1 AND expires_at > now()",
        )
        .persistent(false)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select ephemeral_cache failed (key={key})"))?;
        Ok(row.map(|(v,)| v))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let ttl = chrono::Duration::from_std(ttl).context("cache ttl out of range")?;
        let expires_at = Utc::now() + ttl;
        sqlx::query(
            "INSERT INTO ephemeral_cache (key, value, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        )
        .persistent(false)
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert ephemeral_cache failed (key={key})"))?;
        Ok(())
    }

    async fn purge_expired(&self) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM ephemeral_cache WHERE expires_at <= now()")
            .persistent(false)
            .execute(&self.pool)
            .await
            .context("purge ephemeral_cache failed")?;
        Ok(res.rows_affected())
    }
}
