use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musictaste_core::cache::{memory::InMemoryCache, postgres::PgCache, CacheBackend, EphemeralCache};
use musictaste_core::catalog::{http::HttpCatalogClient, CatalogClient};
use musictaste_core::config::Settings;
use musictaste_core::pipeline::{AccessTokenProvider, SnapshotCollector};
use musictaste_core::storage::collection_runs::{record_collection_run, RunStatus};
use musictaste_core::storage::{self, lock, snapshots::PgSnapshotStore, users::PgUserStore, UserStore};

#[derive(Debug, Parser)]
#[command(name = "musictaste_worker")]
struct Args {
    /// Collection date (YYYY-MM-DD). Defaults to the current collection window.
    #[arg(long)]
    collection_date: Option<String>,

    /// Collect a single user instead of every registered one.
    #[arg(long)]
    user_id: Option<String>,

    /// Items requested per list.
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..=50))]
    limit: u32,

    /// Fetch from upstream but write nothing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let schedule = settings.collection_schedule()?;
    let collection_date = match args.collection_date.as_deref() {
        Some(s) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --collection-date: {s}"))?,
        None => schedule.window_at(chrono::Utc::now()).latest,
    };

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    storage::migrate(&pool).await?;

    let mut lock_conn = pool.acquire().await.context("acquire lock connection failed")?;
    let acquired = lock::try_acquire_collection_lock(&mut *lock_conn, collection_date).await?;
    if !acquired {
        tracing::warn!(%collection_date, "collection lock not acquired; another run in progress");
        return Ok(());
    }

    let catalog: Arc<dyn CatalogClient> = Arc::new(HttpCatalogClient::from_settings(&settings)?);
    let cache: Arc<dyn EphemeralCache> = match settings.cache_backend()? {
        CacheBackend::Memory => Arc::new(InMemoryCache::new()),
        CacheBackend::Postgres => Arc::new(PgCache::new(pool.clone())),
    };
    let users = Arc::new(PgUserStore::new(pool.clone()));
    let tokens = Arc::new(AccessTokenProvider::new(users.clone(), catalog.clone(), cache.clone()));
    let collector = SnapshotCollector::new(Arc::new(PgSnapshotStore::new(pool.clone())), catalog, tokens);

    let user_ids = match args.user_id {
        Some(id) => vec![id],
        None => users.list_user_ids().await?,
    };

    let result = collect_all(
        &pool,
        &collector,
        &user_ids,
        collection_date,
        args.limit,
        args.dry_run,
    )
    .await;

    match cache.purge_expired().await {
        Ok(purged) => tracing::info!(purged, "purged expired cache entries"),
        Err(err) => tracing::warn!(error = %err, "cache purge failed"),
    }

    let _ = lock::release_collection_lock(&mut *lock_conn, collection_date).await;
    result
}

async fn collect_all(
    pool: &sqlx::PgPool,
    collector: &SnapshotCollector,
    user_ids: &[String],
    collection_date: chrono::NaiveDate,
    limit: u32,
    dry_run: bool,
) -> anyhow::Result<()> {
    let mut failed = 0usize;

    for user_id in user_ids {
        match collector
            .collect_user(user_id, collection_date, limit, dry_run)
            .await
        {
            Ok(report) => {
                if !dry_run {
                    let run_id = record_collection_run(
                        pool,
                        collection_date,
                        user_id,
                        RunStatus::Success,
                        None,
                    )
                    .await?;
                    tracing::info!(%run_id, user_id, written = report.written, "recorded collection run");
                }
            }
            Err(err) => {
                failed += 1;
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(user_id, %collection_date, error = %err, "user collection failed");
                if !dry_run {
                    record_collection_run(
                        pool,
                        collection_date,
                        user_id,
                        RunStatus::Error,
                        Some(&format!("{:#}", err)),
                    )
                    .await?;
                }
            }
        }
    }

    tracing::info!(
        %collection_date,
        users = user_ids.len(),
        failed,
        dry_run,
        "collection run finished"
    );
    anyhow::ensure!(
        failed == 0,
        "{failed} of {} users failed collection",
        user_ids.len()
    );
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_collector_flags() {
        let args = Args::try_parse_from([
            "musictaste_worker",
            "--collection-date",
            "2026-01-05",
            "--user-id",
            "u1",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.collection_date.as_deref(), Some("2026-01-05"));
        assert_eq!(args.user_id.as_deref(), Some("u1"));
        assert_eq!(args.limit, 50);
        assert!(args.dry_run);
    }

    #[test]
    fn rejects_limit_out_of_range() {
        assert!(Args::try_parse_from(["musictaste_worker", "--limit", "0"]).is_err());
        assert!(Args::try_parse_from(["musictaste_worker", "--limit", "51"]).is_err());
    }
}
