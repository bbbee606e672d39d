use crate::cache::{self, EphemeralCache};
use crate::catalog::CatalogClient;
use crate::domain::top_items::{ItemType, TimeRange, TopItem};
use crate::pipeline::changes::{compute_changes, MissingPreviousPolicy};
use crate::pipeline::enrich::{assemble_from_snapshot, enrich};
use crate::storage::{SnapshotKey, SnapshotStore};
use crate::time::collection::CollectionSchedule;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Terminal state of one top-items request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No snapshot for the current window; the upstream's own ranking was returned.
    Default,
    /// Latest snapshot only; no change classification.
    LatestOnly,
    /// Latest compared against the previous window.
    Reconciled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopItemsResponse {
    pub state: PipelineState,
    pub collection_date: NaiveDate,
    pub items: Vec<TopItem>,
}

#[derive(Debug, Clone, Copy)]
pub struct TopItemsRequest<'a> {
    pub user_id: &'a str,
    pub access_token: &'a str,
    pub item_type: ItemType,
    pub time_range: TimeRange,
    pub limit: u32,
}

pub struct TopItemsService {
    store: Arc<dyn SnapshotStore>,
    catalog: Arc<dyn CatalogClient>,
    cache: Arc<dyn EphemeralCache>,
    schedule: CollectionSchedule,
}

impl TopItemsService {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        catalog: Arc<dyn CatalogClient>,
        cache: Arc<dyn EphemeralCache>,
        schedule: CollectionSchedule,
    ) -> Self {
        Self {
            store,
            catalog,
            cache,
            schedule,
        }
    }

    pub async fn get_top_items(
        &self,
        req: TopItemsRequest<'_>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TopItemsResponse> {
        let window = self.schedule.window_at(now);
        let cache_key = cache::top_items_key(
            req.user_id,
            req.item_type,
            req.time_range,
            window.latest,
            req.limit,
        );

        if let Some(hit) = self.cached_response(&cache_key).await {
            tracing::debug!(
                user_id = req.user_id,
                item_type = %req.item_type,
                time_range = %req.time_range,
                "top items served from cache"
            );
            return Ok(hit);
        }

        let latest_key = SnapshotKey {
            user_id: req.user_id,
            item_type: req.item_type,
            time_range: req.time_range,
            collected_date: window.latest,
        };
        let previous_key = SnapshotKey {
            collected_date: window.previous,
            ..latest_key
        };
        let (latest, previous) = tokio::try_join!(
            self.store.get_snapshot(latest_key, req.limit),
            self.store.get_snapshot(previous_key, req.limit),
        )?;

        if latest.is_empty() {
            let items = self
                .catalog
                .get_default_top_items(req.access_token, req.item_type, req.time_range, req.limit)
                .await?;
            tracing::info!(
                user_id = req.user_id,
                item_type = %req.item_type,
                time_range = %req.time_range,
                collection_date = %window.latest,
                items = items.len(),
                "no snapshot for window; returning upstream ranking"
            );
            // Not cached: the collector may still write this window's snapshot today.
            return Ok(TopItemsResponse {
                state: PipelineState::Default,
                collection_date: window.latest,
                items: items
                    .into_iter()
                    .zip(1..)
                    .map(|(metadata, position)| TopItem::new(metadata, position, None))
                    .collect(),
            });
        }

        let state = if previous.is_empty() {
            PipelineState::LatestOnly
        } else {
            PipelineState::Reconciled
        };

        let behavior = req.item_type.behavior();
        let ranked = compute_changes(
            &latest,
            &previous,
            behavior,
            MissingPreviousPolicy::OmitChanges,
        )?;

        let items = if behavior.enrich {
            let catalog = Arc::clone(&self.catalog);
            let item_type = req.item_type;
            let access_token = req.access_token;
            enrich(ranked, |ids| async move {
                catalog
                    .get_items_by_ids(access_token, item_type, &ids)
                    .await
            })
            .await?
        } else {
            assemble_from_snapshot(req.item_type, ranked)?
        };

        tracing::info!(
            user_id = req.user_id,
            item_type = %req.item_type,
            time_range = %req.time_range,
            collection_date = %window.latest,
            state = ?state,
            items = items.len(),
            "assembled top items"
        );

        let response = TopItemsResponse {
            state,
            collection_date: window.latest,
            items,
        };
        self.store_response(&cache_key, &response, now).await;
        Ok(response)
    }

    async fn cached_response(&self, key: &str) -> Option<TopItemsResponse> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed; computing response");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(resp) => Some(resp),
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    async fn store_response(&self, key: &str, response: &TopItemsResponse, now: DateTime<Utc>) {
        // Best-effort: a cache failure never fails the request.
        let result: anyhow::Result<()> = async {
            let ttl = self.schedule.ttl_until_next_cutover(now)?;
            let raw = serde_json::to_string(response)?;
            self.cache.set(key, &raw, ttl).await
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(key, error = %err, "failed to cache top items");
        }
    }
}
