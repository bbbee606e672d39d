use crate::domain::catalog::{ItemMetadata, TokenPair};
use crate::domain::top_items::{ItemType, TimeRange};

pub mod http;

/// Boundary to the upstream music data service. Implementations carry their own
/// timeouts and never retry; callers decide on retries.
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Batched metadata lookup. The result may come back in any order.
    async fn get_items_by_ids(
        &self,
        access_token: &str,
        item_type: ItemType,
        ids: &[String],
    ) -> anyhow::Result<Vec<ItemMetadata>>;

    async fn get_item_by_id(
        &self,
        access_token: &str,
        item_type: ItemType,
        id: &str,
    ) -> anyhow::Result<ItemMetadata>;

    /// The service's own current ranking, used when nothing was collected yet.
    async fn get_default_top_items(
        &self,
        access_token: &str,
        item_type: ItemType,
        time_range: TimeRange,
        limit: u32,
    ) -> anyhow::Result<Vec<ItemMetadata>>;

    async fn refresh_access_token(&self, refresh_token: &str) -> anyhow::Result<TokenPair>;
}
