use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musictaste_core::cache::{memory::InMemoryCache, postgres::PgCache, CacheBackend, EphemeralCache};
use musictaste_core::catalog::{http::HttpCatalogClient, CatalogClient};
use musictaste_core::config::Settings;
use musictaste_core::domain::catalog::ItemMetadata;
use musictaste_core::domain::top_items::{ItemType, TimeRange, TopItem};
use musictaste_core::error::TopItemsError;
use musictaste_core::pipeline::{
    AccessTokenProvider, ComparisonService, TasteComparison, TopItemsRequest, TopItemsService,
};
use musictaste_core::storage::{snapshots::PgSnapshotStore, users::PgUserStore};

const USER_COOKIE: &str = "user_id";
const MIN_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 50;
const DEFAULT_PORT: u16 = 3000;
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

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

    let catalog: Arc<dyn CatalogClient> = Arc::new(HttpCatalogClient::from_settings(&settings)?);
    let schedule = settings.collection_schedule()?;
    let cache_backend = settings.cache_backend()?;

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match musictaste_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let services = pool.map(|pool| {
        let cache: Arc<dyn EphemeralCache> = match cache_backend {
            CacheBackend::Memory => Arc::new(InMemoryCache::new()),
            CacheBackend::Postgres => Arc::new(PgCache::new(pool.clone())),
        };
        let users = Arc::new(PgUserStore::new(pool.clone()));
        let top_items = Arc::new(TopItemsService::new(
            Arc::new(PgSnapshotStore::new(pool)),
            catalog.clone(),
            cache.clone(),
            schedule,
        ));
        Services {
            tokens: Arc::new(AccessTokenProvider::new(users.clone(), catalog.clone(), cache.clone())),
            cache,
            comparison: Arc::new(ComparisonService::new(top_items.clone(), users)),
            top_items,
            catalog: catalog.clone(),
        }
    });
    tracing::info!(?cache_backend, degraded = services.is_none(), "services ready");
    if let Some(services) = &services {
        tokio::spawn(purge_cache_periodically(services.cache.clone()));
    }

    let state = AppState { services };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/me/top/:item_type", get(get_top_items))
        .route("/compare/:other_user_id", get(get_comparison))
        .route("/artists/:id", get(get_artist))
        .route("/tracks/:id", get(get_track))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port = settings.port.unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    services: Option<Services>,
}

#[derive(Clone)]
struct Services {
    top_items: Arc<TopItemsService>,
    comparison: Arc<ComparisonService>,
    tokens: Arc<AccessTokenProvider>,
    catalog: Arc<dyn CatalogClient>,
    cache: Arc<dyn EphemeralCache>,
}

impl AppState {
    fn services(&self) -> Result<&Services, StatusCode> {
        self.services
            .as_ref()
            .ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[derive(Debug, Deserialize)]
struct TopItemsQuery {
    time_range: String,
    limit: Option<u32>,
}

async fn get_top_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_type): Path<String>,
    Query(query): Query<TopItemsQuery>,
) -> Result<Json<Vec<TopItem>>, StatusCode> {
    let services = state.services()?;
    let user_id = caller_id(&headers)?;

    let item_type = ItemType::from_plural(&item_type).map_err(|_| StatusCode::NOT_FOUND)?;
    let time_range: TimeRange = query
        .time_range
        .parse()
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let limit = validate_limit(query.limit)?;

    let access_token = services
        .tokens
        .access_token_for(&user_id)
        .await
        .map_err(into_status)?;

    let response = services
        .top_items
        .get_top_items(
            TopItemsRequest {
                user_id: &user_id,
                access_token: &access_token,
                item_type,
                time_range,
                limit,
            },
            Utc::now(),
        )
        .await
        .map_err(into_status)?;

    Ok(Json(response.items))
}

async fn get_comparison(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(other_user_id): Path<String>,
) -> Result<Json<TasteComparison>, StatusCode> {
    let services = state.services()?;
    let user_id = caller_id(&headers)?;

    let access_token = services
        .tokens
        .access_token_for(&user_id)
        .await
        .map_err(into_status)?;

    let comparison = services
        .comparison
        .compare(&user_id, &other_user_id, &access_token, Utc::now())
        .await
        .map_err(into_status)?;

    Ok(Json(comparison))
}

async fn get_artist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ItemMetadata>, StatusCode> {
    get_catalog_item(&state, &headers, ItemType::Artist, &id).await
}

async fn get_track(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ItemMetadata>, StatusCode> {
    get_catalog_item(&state, &headers, ItemType::Track, &id).await
}

async fn get_catalog_item(
    state: &AppState,
    headers: &HeaderMap,
    item_type: ItemType,
    id: &str,
) -> Result<Json<ItemMetadata>, StatusCode> {
    let services = state.services()?;
    let user_id = caller_id(headers)?;

    let access_token = services
        .tokens
        .access_token_for(&user_id)
        .await
        .map_err(into_status)?;

    let item = services
        .catalog
        .get_item_by_id(&access_token, item_type, id)
        .await
        .map_err(into_status)?;

    Ok(Json(item))
}

/// Reads the caller's id from the `user_id` cookie.
fn caller_id(headers: &HeaderMap) -> Result<String, StatusCode> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == USER_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)
}

fn validate_limit(limit: Option<u32>) -> Result<u32, StatusCode> {
    match limit {
        None => Ok(MAX_LIMIT),
        Some(n) if (MIN_LIMIT..=MAX_LIMIT).contains(&n) => Ok(n),
        Some(_) => Err(StatusCode::BAD_REQUEST),
    }
}

fn status_for(err: &anyhow::Error) -> StatusCode {
    match err.downcast_ref::<TopItemsError>() {
        Some(TopItemsError::NotFound(_)) => StatusCode::NOT_FOUND,
        Some(e @ TopItemsError::UpstreamRequest { .. }) if e.is_auth_failure() => {
            StatusCode::UNAUTHORIZED
        }
        Some(TopItemsError::UpstreamRequest { .. }) => StatusCode::BAD_GATEWAY,
        Some(TopItemsError::DataConsistency(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn into_status(err: anyhow::Error) -> StatusCode {
    let status = status_for(&err);
    if status.is_server_error() {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, %status, "request failed");
    } else {
        tracing::info!(error = %err, %status, "request rejected");
    }
    status
}

async fn purge_cache_periodically(cache: Arc<dyn EphemeralCache>) {
    let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match cache.purge_expired().await {
            Ok(purged) => tracing::debug!(purged, "purged expired cache entries"),
            Err(err) => tracing::warn!(error = %err, "cache purge failed"),
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
