use crate::domain::catalog::User;
use crate::domain::top_items::{ItemType, SnapshotEntry, TimeRange};
use anyhow::Context;
use chrono::NaiveDate;

pub mod collection_runs;
pub mod lock;
pub mod snapshots;
pub mod users;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Identifies one dated snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotKey<'a> {
    pub user_id: &'a str,
    pub item_type: ItemType,
    pub time_range: TimeRange,
    pub collected_date: NaiveDate,
}

#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Entries ordered by the item type's metric; empty when nothing was collected that day.
    async fn get_snapshot(
        &self,
        key: SnapshotKey<'_>,
        limit: u32,
    ) -> anyhow::Result<Vec<SnapshotEntry>>;

    /// Writes a snapshot once; returns `false` if one already exists for the key.
    async fn put_snapshot(
        &self,
        key: SnapshotKey<'_>,
        entries: &[SnapshotEntry],
    ) -> anyhow::Result<bool>;
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>>;

    async fn update_refresh_token(&self, user_id: &str, refresh_token: &str)
        -> anyhow::Result<()>;

    async fn list_user_ids(&self) -> anyhow::Result<Vec<String>>;
}
