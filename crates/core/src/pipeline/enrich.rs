use crate::domain::catalog::{Emotion, Genre, ItemMetadata};
use crate::domain::top_items::{ItemType, RankedEntry, TopItem};
use crate::error::TopItemsError;
use std::collections::{HashMap, HashSet};
use std::future::Future;

/// Joins ranked entries with metadata from a single batched fetch.
///
/// The output follows `ranked` order regardless of the order metadata comes back in. A
/// requested id missing from the fetch result fails the whole call.
pub async fn enrich<F, Fut>(ranked: Vec<RankedEntry>, fetch_metadata: F) -> anyhow::Result<Vec<TopItem>>
where
    F: FnOnce(Vec<String>) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<ItemMetadata>>>,
{
    let ids: Vec<String> = {
        let mut seen = HashSet::with_capacity(ranked.len());
        ranked
            .iter()
            .map(|r| r.entry.item_id.as_str())
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect()
    };
    let requested = ids.len();

    let fetched = fetch_metadata(ids).await?;
    let by_id: HashMap<String, ItemMetadata> = fetched
        .into_iter()
        .map(|m| (m.id().to_string(), m))
        .collect();

    let mut out = Vec::with_capacity(ranked.len());
    for r in ranked {
        let metadata = by_id.get(&r.entry.item_id).cloned().ok_or_else(|| {
            TopItemsError::consistency(format!(
                "metadata fetch returned no record for {} ({} requested, {} returned)",
                r.entry.item_id,
                requested,
                by_id.len()
            ))
        })?;
        out.push(TopItem::new(metadata, r.entry.position, r.change));
    }
    Ok(out)
}

/// Builds items whose display fields live in the snapshot itself (genres, emotions).
pub fn assemble_from_snapshot(
    item_type: ItemType,
    ranked: Vec<RankedEntry>,
) -> Result<Vec<TopItem>, TopItemsError> {
    ranked
        .into_iter()
        .map(|r| {
            let entry = r.entry;
            let metadata = match item_type {
                ItemType::Genre => ItemMetadata::Genre(Genre {
                    count: entry.count.ok_or_else(|| {
                        TopItemsError::consistency(format!("genre {} has no count", entry.item_id))
                    })?,
                    name: entry.item_id,
                }),
                ItemType::Emotion => ItemMetadata::Emotion(Emotion {
                    percentage: entry.percentage.ok_or_else(|| {
                        TopItemsError::consistency(format!(
                            "emotion {} has no percentage",
                            entry.item_id
                        ))
                    })?,
                    track_id: entry.track_id.unwrap_or_default(),
                    name: entry.item_id,
                }),
                ItemType::Artist | ItemType::Track => {
                    return Err(TopItemsError::consistency(format!(
                        "{item_type} entries need catalog metadata"
                    )))
                }
            };
            Ok(TopItem::new(metadata, entry.position, r.change))
        })
        .collect()
}
