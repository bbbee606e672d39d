use crate::domain::top_items::SnapshotEntry;
use crate::pipeline::changes::ensure_unique;
use crate::storage::{SnapshotKey, SnapshotStore};
use anyhow::Context;

#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: sqlx::PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

type SnapshotRow = (String, i32, Option<i64>, Option<f64>, Option<String>);

#[async_trait::async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn get_snapshot(
        &self,
        key: SnapshotKey<'_>,
        limit: u32,
    ) -> anyhow::Result<Vec<SnapshotEntry>> {
        let behavior = key.item_type.behavior();
        // Column and direction come from the closed behaviour table, never from input.
        let sql = format!(
            "SELECT item_id, position, count, percentage, track_id \
             FROM top_item_snapshots \
             WHERE user_id = $1 AND item_type = $2 AND time_range = $3 AND collected_date = $4 \
             ORDER BY {} {} NULLS LAST, position ASC \
             LIMIT $5",
            behavior.metric.column(),
            behavior.order.sql()
        );

        let rows = sqlx::query_as::<_, SnapshotRow>(&sql)
            .persistent(false)
            .bind(key.user_id)
            .bind(key.item_type.as_str())
            .bind(key.time_range.as_str())
            .bind(key.collected_date)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .with_context(|| {
                format!(
                    "select top_item_snapshots failed (user_id={}, item_type={}, time_range={}, collected_date={})",
                    key.user_id, key.item_type, key.time_range, key.collected_date
                )
            })?;

        tracing::debug!(
            user_id = key.user_id,
            item_type = %key.item_type,
            time_range = %key.time_range,
            collected_date = %key.collected_date,
            rows = rows.len(),
            "loaded snapshot"
        );

        Ok(rows
            .into_iter()
            .map(|(item_id, position, count, percentage, track_id)| SnapshotEntry {
                item_id,
                position,
                count,
                percentage,
                track_id,
            })
            .collect())
    }

    async fn put_snapshot(
        &self,
        key: SnapshotKey<'_>,
        entries: &[SnapshotEntry],
    ) -> anyhow::Result<bool> {
        anyhow::ensure!(!entries.is_empty(), "snapshot entries must be non-empty");
        ensure_unique(entries, "stored")?;

        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM top_item_snapshots \
             WHERE user_id = $1 AND item_type = $2 AND time_range = $3 AND collected_date = $4)",
        )
        .persistent(false)
        .bind(key.user_id)
        .bind(key.item_type.as_str())
        .bind(key.time_range.as_str())
        .bind(key.collected_date)
        .fetch_one(&mut *tx)
        .await
        .context("check existing snapshot failed")?;
        if exists.0 {
            tx.rollback().await.context("rollback transaction failed")?;
            return Ok(false);
        }

        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO top_item_snapshots \
             (user_id, item_type, time_range, collected_date, item_id, position, count, percentage, track_id) ",
        );
        qb.push_values(entries, |mut b, entry| {
            b.push_bind(key.user_id)
                .push_bind(key.item_type.as_str())
                .push_bind(key.time_range.as_str())
                .push_bind(key.collected_date)
                .push_bind(entry.item_id.as_str())
                .push_bind(entry.position)
                .push_bind(entry.count)
                .push_bind(entry.percentage)
                .push_bind(entry.track_id.as_deref());
        });
        qb.push(" ON CONFLICT DO NOTHING");

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("insert top_item_snapshots failed")?;

        tx.commit().await.context("commit transaction failed")?;

        tracing::debug!(
            user_id = key.user_id,
            item_type = %key.item_type,
            time_range = %key.time_range,
            collected_date = %key.collected_date,
            rows = res.rows_affected(),
            "stored snapshot"
        );
        Ok(true)
    }
}
