use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub height: i32,
    pub width: i32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub images: Vec<Image>,
    pub spotify_url: String,
    pub genres: Vec<String>,
    pub followers: i64,
    pub popularity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub images: Vec<Image>,
    pub spotify_url: String,
    pub artist: TrackArtist,
    pub release_date: String,
    pub album_name: String,
    pub explicit: bool,
    pub duration_ms: i64,
    pub popularity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    pub name: String,
    pub percentage: f64,
    pub track_id: String,
}

/// Display payload of a ranked item.
///
/// Untagged: variants are tried most-specific first so cached JSON decodes back into the
/// same variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemMetadata {
    Track(Track),
    Artist(Artist),
    Emotion(Emotion),
    Genre(Genre),
}

impl ItemMetadata {
    /// Stable identifier; genres and emotions are keyed by name.
    pub fn id(&self) -> &str {
        match self {
            Self::Artist(a) => &a.id,
            Self::Track(t) => &t.id,
            Self::Genre(g) => &g.name,
            Self::Emotion(e) => &e.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub refresh_token: String,
}
