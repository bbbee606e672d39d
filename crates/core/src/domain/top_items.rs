use crate::domain::catalog::ItemMetadata;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Artist,
    Track,
    Genre,
    Emotion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "short_term")]
    Short,
    #[serde(rename = "medium_term")]
    Medium,
    #[serde(rename = "long_term")]
    Long,
}

/// Numeric field a snapshot is ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    Position,
    Count,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Per-type behaviour table consulted by storage, the change engine and the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemTypeBehavior {
    pub metric: MetricField,
    pub order: SortOrder,
    pub enrich: bool,
}

impl ItemType {
    pub const ALL: [ItemType; 4] = [Self::Artist, Self::Track, Self::Genre, Self::Emotion];

    pub const fn behavior(self) -> ItemTypeBehavior {
        match self {
            Self::Artist | Self::Track => ItemTypeBehavior {
                metric: MetricField::Position,
                order: SortOrder::Ascending,
                enrich: true,
            },
            Self::Genre => ItemTypeBehavior {
                metric: MetricField::Count,
                order: SortOrder::Descending,
                enrich: false,
            },
            Self::Emotion => ItemTypeBehavior {
                metric: MetricField::Percentage,
                order: SortOrder::Descending,
                enrich: false,
            },
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Track => "track",
            Self::Genre => "genre",
            Self::Emotion => "emotion",
        }
    }

    /// Path segment used by the HTTP surfaces ("artists", "tracks", ...).
    pub fn plural(self) -> String {
        format!("{}s", self.as_str())
    }

    pub fn from_plural(s: &str) -> anyhow::Result<Self> {
        match s.strip_suffix('s') {
            Some(singular) => singular.parse(),
            None => bail!("invalid item type path segment: {s}"),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist" => Ok(Self::Artist),
            "track" => Ok(Self::Track),
            "genre" => Ok(Self::Genre),
            "emotion" => Ok(Self::Emotion),
            other => bail!("unknown item type: {other}"),
        }
    }
}

impl TimeRange {
    pub const ALL: [TimeRange; 3] = [Self::Short, Self::Medium, Self::Long];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short_term",
            Self::Medium => "medium_term",
            Self::Long => "long_term",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "short_term" => Ok(Self::Short),
            "medium_term" => Ok(Self::Medium),
            "long_term" => Ok(Self::Long),
            other => bail!("unknown time range: {other}"),
        }
    }
}

impl MetricField {
    /// Snapshot column holding the metric.
    pub const fn column(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Count => "count",
            Self::Percentage => "percentage",
        }
    }

    pub fn value(self, entry: &SnapshotEntry) -> Option<f64> {
        match self {
            Self::Position => Some(f64::from(entry.position)),
            Self::Count => entry.count.map(|c| c as f64),
            Self::Percentage => entry.percentage,
        }
    }
}

impl SortOrder {
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One stored row of a dated snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub item_id: String,
    pub position: i32,
    pub count: Option<i64>,
    pub percentage: Option<f64>,
    pub track_id: Option<String>,
}

impl SnapshotEntry {
    pub fn ranked(item_id: impl Into<String>, position: i32) -> Self {
        Self {
            item_id: item_id.into(),
            position,
            count: None,
            percentage: None,
            track_id: None,
        }
    }

    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_percentage(mut self, percentage: f64, track_id: Option<String>) -> Self {
        self.percentage = Some(percentage);
        self.track_id = track_id;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionChange {
    Up,
    Down,
    New,
}

/// A snapshot entry carrying its change classification (`None` renders as `null`).
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub entry: SnapshotEntry,
    pub change: Option<PositionChange>,
}

/// Wire shape of one ranked item: metadata fields flattened next to the rank fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopItem {
    #[serde(flatten)]
    pub metadata: ItemMetadata,
    pub position: i32,
    pub position_change: Option<PositionChange>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub common: bool,
}

impl TopItem {
    pub fn new(metadata: ItemMetadata, position: i32, position_change: Option<PositionChange>) -> Self {
        Self {
            metadata,
            position,
            position_change,
            common: false,
        }
    }

    pub fn id(&self) -> &str {
        self.metadata.id()
    }
}

/// Builds a snapshot from an upstream top list, assigning dense positions in list order.
pub fn snapshot_from_metadata(items: &[ItemMetadata]) -> Vec<SnapshotEntry> {
    items
        .iter()
        .zip(1..)
        .map(|(item, position)| {
            let entry = SnapshotEntry::ranked(item.id(), position);
            match item {
                ItemMetadata::Genre(g) => entry.with_count(g.count),
                ItemMetadata::Emotion(e) => {
                    entry.with_percentage(e.percentage, Some(e.track_id.clone()))
                }
                ItemMetadata::Artist(_) | ItemMetadata::Track(_) => entry,
            }
        })
        .collect()
}
