pub mod cache;
pub mod catalog;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    use crate::cache::CacheBackend;
    use crate::time::collection::CollectionSchedule;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub catalog_base_url: Option<String>,
        pub catalog_timeout_secs: Option<u64>,
        pub collection_timezone: Option<String>,
        pub cache_backend: Option<String>,
        pub port: Option<u16>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                catalog_base_url: std::env::var("CATALOG_BASE_URL").ok(),
                catalog_timeout_secs: std::env::var("CATALOG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok()),
                collection_timezone: std::env::var("COLLECTION_TIMEZONE")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                cache_backend: std::env::var("CACHE_BACKEND").ok(),
                port: std::env::var("PORT").ok().and_then(|s| s.parse::<u16>().ok()),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_catalog_base_url(&self) -> anyhow::Result<&str> {
            self.catalog_base_url
                .as_deref()
                .context("CATALOG_BASE_URL is required")
        }

        pub fn collection_schedule(&self) -> anyhow::Result<CollectionSchedule> {
            match self.collection_timezone.as_deref() {
                Some(name) => CollectionSchedule::in_timezone(name),
                None => Ok(CollectionSchedule::default()),
            }
        }

        pub fn cache_backend(&self) -> anyhow::Result<CacheBackend> {
            match self.cache_backend.as_deref() {
                Some(s) => s.parse(),
                None => Ok(CacheBackend::Memory),
            }
        }
    }

}
