use crate::domain::top_items::{ItemType, TimeRange, TopItem};
use crate::error::TopItemsError;
use crate::pipeline::orchestrator::{TopItemsRequest, TopItemsService};
use crate::storage::UserStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Comparisons always use the widest list the top-items endpoint allows.
pub const COMPARE_LIMIT: u32 = 50;

/// Flags every item whose id appears in both lists.
pub fn mark_common(user_items: &mut [TopItem], other_items: &mut [TopItem]) {
    let user_ids: HashSet<String> = user_items.iter().map(|i| i.id().to_string()).collect();
    let common: HashSet<String> = other_items
        .iter()
        .map(|i| i.id().to_string())
        .filter(|id| user_ids.contains(id))
        .collect();

    for item in user_items.iter_mut().chain(other_items.iter_mut()) {
        if common.contains(item.id()) {
            item.common = true;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPair {
    pub user: BTreeMap<TimeRange, Vec<TopItem>>,
    pub other_user: BTreeMap<TimeRange, Vec<TopItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasteComparison {
    pub artists: UserPair,
    pub tracks: UserPair,
}

pub struct ComparisonService {
    top_items: Arc<TopItemsService>,
    users: Arc<dyn UserStore>,
}

impl ComparisonService {
    pub fn new(top_items: Arc<TopItemsService>, users: Arc<dyn UserStore>) -> Self {
        Self { top_items, users }
    }

    /// Both users' lists are read with the requester's access token.
    pub async fn compare(
        &self,
        user_id: &str,
        other_user_id: &str,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TasteComparison> {
        if self.users.get_user(other_user_id).await?.is_none() {
            return Err(TopItemsError::not_found(format!("user {other_user_id}")).into());
        }

        let (artists, tracks) = tokio::try_join!(
            self.compare_type(user_id, other_user_id, access_token, ItemType::Artist, now),
            self.compare_type(user_id, other_user_id, access_token, ItemType::Track, now),
        )?;

        tracing::info!(user_id, other_user_id, "built taste comparison");
        Ok(TasteComparison { artists, tracks })
    }

    async fn compare_type(
        &self,
        user_id: &str,
        other_user_id: &str,
        access_token: &str,
        item_type: ItemType,
        now: DateTime<Utc>,
    ) -> anyhow::Result<UserPair> {
        let [short, medium, long] = TimeRange::ALL;
        let (s, m, l) = tokio::try_join!(
            self.compare_range(user_id, other_user_id, access_token, item_type, short, now),
            self.compare_range(user_id, other_user_id, access_token, item_type, medium, now),
            self.compare_range(user_id, other_user_id, access_token, item_type, long, now),
        )?;

        let mut pair = UserPair::default();
        for (time_range, (user_items, other_items)) in [(short, s), (medium, m), (long, l)] {
            pair.user.insert(time_range, user_items);
            pair.other_user.insert(time_range, other_items);
        }
        Ok(pair)
    }

    async fn compare_range(
        &self,
        user_id: &str,
        other_user_id: &str,
        access_token: &str,
        item_type: ItemType,
        time_range: TimeRange,
        now: DateTime<Utc>,
    ) -> anyhow::Result<(Vec<TopItem>, Vec<TopItem>)> {
        let mine = TopItemsRequest {
            user_id,
            access_token,
            item_type,
            time_range,
            limit: COMPARE_LIMIT,
        };
        let theirs = TopItemsRequest {
            user_id: other_user_id,
            ..mine
        };
        let (user, other) = tokio::try_join!(
            self.top_items.get_top_items(mine, now),
            self.top_items.get_top_items(theirs, now),
        )?;

        let (mut user_items, mut other_items) = (user.items, other.items);
        mark_common(&mut user_items, &mut other_items);
        Ok((user_items, other_items))
    }
}
