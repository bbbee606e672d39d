use crate::catalog::CatalogClient;
use crate::config::Settings;
use crate::domain::catalog::{Artist, Emotion, Genre, ItemMetadata, TokenPair, Track};
use crate::domain::top_items::{ItemType, TimeRange};
use crate::error::TopItemsError;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_catalog_base_url()?.to_string();
        let timeout_secs = settings
            .catalog_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(base_url, Duration::from_secs(timeout_secs))
    }

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build catalog http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<T> {
        let url = self.url(path);
        let res = self
            .http
            .post(&url)
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(|e| TopItemsError::upstream(None, format!("POST {path}: {e}")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| TopItemsError::upstream(Some(status.as_u16()), format!("read body of {path}: {e}")))?;

        if !status.is_success() {
            tracing::warn!(path, http_status = %status, "catalog request rejected");
            return Err(TopItemsError::upstream(Some(status.as_u16()), text).into());
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("failed to parse catalog response for {path}: {text}"))
    }
}

#[async_trait::async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn get_items_by_ids(
        &self,
        access_token: &str,
        item_type: ItemType,
        ids: &[String],
    ) -> Result<Vec<ItemMetadata>> {
        anyhow::ensure!(
            item_type.behavior().enrich,
            "batched lookup is not available for {item_type}"
        );
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let body = batch_request_body(access_token, item_type, ids);
        let path = format!("/data/{}", item_type.plural());
        let raw: Vec<Value> = self.post_json(&path, &[], &body).await?;
        parse_items(item_type, raw)
    }

    async fn get_item_by_id(
        &self,
        access_token: &str,
        item_type: ItemType,
        id: &str,
    ) -> Result<ItemMetadata> {
        anyhow::ensure!(
            item_type.behavior().enrich,
            "single item lookup is not available for {item_type}"
        );
        let path = format!("/data/{}/{id}", item_type.plural());
        let raw: Value = self
            .post_json(&path, &[], &json!({ "access_token": access_token }))
            .await?;
        parse_item(item_type, raw)
    }

    async fn get_default_top_items(
        &self,
        access_token: &str,
        item_type: ItemType,
        time_range: TimeRange,
        limit: u32,
    ) -> Result<Vec<ItemMetadata>> {
        let path = format!("/data/me/top/{}", item_type.plural());
        let query = [
            ("time_range", time_range.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        let raw: Vec<Value> = self
            .post_json(&path, &query, &json!({ "access_token": access_token }))
            .await?;
        parse_items(item_type, raw)
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenPair> {
        let mut tokens: TokenPair = self
            .post_json(
                "/auth/tokens/refresh",
                &[],
                &json!({ "refresh_token": refresh_token }),
            )
            .await?;
        if tokens.refresh_token.as_deref().map_or(true, str::is_empty) {
            tokens.refresh_token = None;
        }
        Ok(tokens)
    }
}

fn batch_request_body(access_token: &str, item_type: ItemType, ids: &[String]) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(
        "access_token".to_string(),
        json!({ "access_token": access_token }),
    );
    body.insert(
        format!("requested_{}", item_type.plural()),
        json!({ "ids": ids }),
    );
    Value::Object(body)
}

fn parse_items(item_type: ItemType, raw: Vec<Value>) -> Result<Vec<ItemMetadata>> {
    raw.into_iter().map(|v| parse_item(item_type, v)).collect()
}

// The wire shape is known from the request, so decode into the concrete type instead of
// relying on untagged matching.
fn parse_item(item_type: ItemType, raw: Value) -> Result<ItemMetadata> {
    let item = match item_type {
        ItemType::Artist => ItemMetadata::Artist(serde_json::from_value::<Artist>(raw)?),
        ItemType::Track => ItemMetadata::Track(serde_json::from_value::<Track>(raw)?),
        ItemType::Genre => ItemMetadata::Genre(serde_json::from_value::<Genre>(raw)?),
        ItemType::Emotion => ItemMetadata::Emotion(serde_json::from_value::<Emotion>(raw)?),
    };
    Ok(item)
}
