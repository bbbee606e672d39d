//! In-memory fakes of the storage and catalog traits for pipeline tests.

use crate::catalog::CatalogClient;
use crate::domain::catalog::{Artist, ItemMetadata, TokenPair, Track, TrackArtist, User};
use crate::domain::top_items::{ItemType, SnapshotEntry, TimeRange};
use crate::error::TopItemsError;
use crate::storage::{SnapshotKey, SnapshotStore, UserStore};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn artist_meta(id: &str) -> ItemMetadata {
    ItemMetadata::Artist(Artist {
        id: id.to_string(),
        name: format!("artist {id}"),
        images: Vec::new(),
        spotify_url: format!("https://open.example/artist/{id}"),
        genres: Vec::new(),
        followers: 10,
        popularity: 50,
    })
}

pub fn track_meta(id: &str) -> ItemMetadata {
    ItemMetadata::Track(Track {
        id: id.to_string(),
        name: format!("track {id}"),
        images: Vec::new(),
        spotify_url: format!("https://open.example/track/{id}"),
        artist: TrackArtist {
            id: "a0".to_string(),
            name: "artist a0".to_string(),
        },
        release_date: "2020-01-01".to_string(),
        album_name: "album".to_string(),
        explicit: false,
        duration_ms: 180_000,
        popularity: 40,
    })
}

type StoreKey = (String, ItemType, TimeRange, NaiveDate);

#[derive(Default)]
pub struct FakeStore {
    snapshots: Mutex<HashMap<StoreKey, Vec<SnapshotEntry>>>,
    reads: AtomicUsize,
}

impl FakeStore {
    pub fn insert(
        &self,
        user_id: &str,
        item_type: ItemType,
        time_range: TimeRange,
        date: NaiveDate,
        entries: Vec<SnapshotEntry>,
    ) {
        self.snapshots
            .lock()
            .unwrap()
            .insert((user_id.to_string(), item_type, time_range, date), entries);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

fn store_key(key: SnapshotKey<'_>) -> StoreKey {
    (
        key.user_id.to_string(),
        key.item_type,
        key.time_range,
        key.collected_date,
    )
}

#[async_trait::async_trait]
impl SnapshotStore for FakeStore {
    async fn get_snapshot(
        &self,
        key: SnapshotKey<'_>,
        limit: u32,
    ) -> anyhow::Result<Vec<SnapshotEntry>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let guard = self.snapshots.lock().unwrap();
        Ok(guard
            .get(&store_key(key))
            .map(|entries| entries.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn put_snapshot(
        &self,
        key: SnapshotKey<'_>,
        entries: &[SnapshotEntry],
    ) -> anyhow::Result<bool> {
        let mut guard = self.snapshots.lock().unwrap();
        let k = store_key(key);
        if guard.contains_key(&k) {
            return Ok(false);
        }
        guard.insert(k, entries.to_vec());
        Ok(true)
    }
}

/// Serves synthetic metadata for any id, in reverse request order.
#[derive(Default)]
pub struct FakeCatalog {
    defaults: Mutex<HashMap<ItemType, Vec<ItemMetadata>>>,
    hidden: Mutex<HashSet<String>>,
    rotated_refresh_token: Mutex<Option<String>>,
    refresh_status: Mutex<Option<u16>>,
    batch_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn set_default(&self, item_type: ItemType, items: Vec<ItemMetadata>) {
        self.defaults.lock().unwrap().insert(item_type, items);
    }

    /// Omits `id` from batched lookups.
    pub fn hide(&self, id: &str) {
        self.hidden.lock().unwrap().insert(id.to_string());
    }

    pub fn rotate_refresh_token(&self, token: &str) {
        *self.rotated_refresh_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn fail_refresh(&self, status: u16) {
        *self.refresh_status.lock().unwrap() = Some(status);
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

fn synthetic(item_type: ItemType, id: &str) -> anyhow::Result<ItemMetadata> {
    match item_type {
        ItemType::Artist => Ok(artist_meta(id)),
        ItemType::Track => Ok(track_meta(id)),
        other => Err(TopItemsError::upstream(Some(404), format!("no lookup for {other}")).into()),
    }
}

#[async_trait::async_trait]
impl CatalogClient for FakeCatalog {
    async fn get_items_by_ids(
        &self,
        _access_token: &str,
        item_type: ItemType,
        ids: &[String],
    ) -> anyhow::Result<Vec<ItemMetadata>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let hidden = self.hidden.lock().unwrap().clone();
        ids.iter()
            .rev()
            .filter(|id| !hidden.contains(*id))
            .map(|id| synthetic(item_type, id))
            .collect()
    }

    async fn get_item_by_id(
        &self,
        _access_token: &str,
        item_type: ItemType,
        id: &str,
    ) -> anyhow::Result<ItemMetadata> {
        synthetic(item_type, id)
    }

    async fn get_default_top_items(
        &self,
        _access_token: &str,
        item_type: ItemType,
        _time_range: TimeRange,
        limit: u32,
    ) -> anyhow::Result<Vec<ItemMetadata>> {
        let guard = self.defaults.lock().unwrap();
        Ok(guard
            .get(&item_type)
            .map(|items| items.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> anyhow::Result<TokenPair> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.refresh_status.lock().unwrap() {
            return Err(TopItemsError::upstream(Some(status), "refresh rejected").into());
        }
        Ok(TokenPair {
            access_token: format!("access-{refresh_token}"),
            refresh_token: self.rotated_refresh_token.lock().unwrap().clone(),
        })
    }
}

#[derive(Default)]
pub struct FakeUsers {
    users: Mutex<HashMap<String, String>>,
}

impl FakeUsers {
    pub fn with_user(self, user_id: &str, refresh_token: &str) -> Self {
        self.users
            .lock()
            .unwrap()
            .insert(user_id.to_string(), refresh_token.to_string());
        self
    }

    pub fn refresh_token(&self, user_id: &str) -> Option<String> {
        self.users.lock().unwrap().get(user_id).cloned()
    }
}

#[async_trait::async_trait]
impl UserStore for FakeUsers {
    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        Ok(self.refresh_token(user_id).map(|refresh_token| User {
            id: user_id.to_string(),
            refresh_token,
        }))
    }

    async fn update_refresh_token(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> anyhow::Result<()> {
        self.users
            .lock()
            .unwrap()
            .insert(user_id.to_string(), refresh_token.to_string());
        Ok(())
    }

    async fn list_user_ids(&self) -> anyhow::Result<Vec<String>> {
        let mut ids: Vec<String> = self.users.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
