use crate::domain::top_items::{ItemType, TimeRange};
use anyhow::bail;
use chrono::NaiveDate;
use std::str::FromStr;
use std::time::Duration;

pub mod memory;
pub mod postgres;

/// Short-lived key/value store for access tokens and assembled responses.
#[async_trait::async_trait]
pub trait EphemeralCache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;

    /// Drops expired entries; returns how many were removed.
    async fn purge_expired(&self) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Postgres,
}

impl FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => bail!("unknown CACHE_BACKEND: {other}"),
        }
    }
}

pub fn access_token_key(user_id: &str) -> String {
    format!("access_token-{user_id}")
}

pub fn top_items_key(
    user_id: &str,
    item_type: ItemType,
    time_range: TimeRange,
    collection_date: NaiveDate,
    limit: u32,
) -> String {
    format!("top_items-{user_id}-{item_type}-{time_range}-{collection_date}-{limit}")
}
