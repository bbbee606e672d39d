use crate::catalog::CatalogClient;
use crate::domain::top_items::{snapshot_from_metadata, ItemType, TimeRange};
use crate::pipeline::changes::ensure_unique;
use crate::pipeline::tokens::AccessTokenProvider;
use crate::storage::{SnapshotKey, SnapshotStore};
use chrono::NaiveDate;
use std::sync::Arc;

/// Collects the upstream's current top lists into dated snapshots.
pub struct SnapshotCollector {
    store: Arc<dyn SnapshotStore>,
    catalog: Arc<dyn CatalogClient>,
    tokens: Arc<AccessTokenProvider>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub written: usize,
    /// Snapshots that already existed for the date and were left untouched.
    pub skipped: usize,
    pub entries: usize,
}

impl SnapshotCollector {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        catalog: Arc<dyn CatalogClient>,
        tokens: Arc<AccessTokenProvider>,
    ) -> Self {
        Self {
            store,
            catalog,
            tokens,
        }
    }

    /// Snapshots every item type and time range for one user.
    pub async fn collect_user(
        &self,
        user_id: &str,
        collection_date: NaiveDate,
        limit: u32,
        dry_run: bool,
    ) -> anyhow::Result<CollectionReport> {
        let access_token = self.tokens.access_token_for(user_id).await?;
        let mut report = CollectionReport::default();

        for item_type in ItemType::ALL {
            for time_range in TimeRange::ALL {
                let items = self
                    .catalog
                    .get_default_top_items(&access_token, item_type, time_range, limit)
                    .await?;
                let entries = snapshot_from_metadata(&items);
                if entries.is_empty() {
                    tracing::debug!(user_id, %item_type, %time_range, "upstream list empty");
                    continue;
                }
                ensure_unique(&entries, "collected")?;

                if dry_run {
                    tracing::info!(
                        user_id,
                        %item_type,
                        %time_range,
                        %collection_date,
                        entries = entries.len(),
                        dry_run = true,
                        "collected snapshot"
                    );
                    report.entries += entries.len();
                    continue;
                }

                let key = SnapshotKey {
                    user_id,
                    item_type,
                    time_range,
                    collected_date: collection_date,
                };
                if self.store.put_snapshot(key, &entries).await? {
                    report.written += 1;
                    report.entries += entries.len();
                } else {
                    tracing::debug!(user_id, %item_type, %time_range, "snapshot already present");
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            user_id,
            %collection_date,
            written = report.written,
            skipped = report.skipped,
            entries = report.entries,
            "user collection finished"
        );
        Ok(report)
    }
}
