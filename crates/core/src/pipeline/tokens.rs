use crate::cache::{self, EphemeralCache};
use crate::catalog::CatalogClient;
use crate::error::TopItemsError;
use crate::storage::UserStore;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Upstream access tokens live for an hour; keep a margin.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(58 * 60);

/// Hands out upstream access tokens, refreshing through the catalog on cache miss.
pub struct AccessTokenProvider {
    users: Arc<dyn UserStore>,
    catalog: Arc<dyn CatalogClient>,
    cache: Arc<dyn EphemeralCache>,
}

impl AccessTokenProvider {
    pub fn new(
        users: Arc<dyn UserStore>,
        catalog: Arc<dyn CatalogClient>,
        cache: Arc<dyn EphemeralCache>,
    ) -> Self {
        Self {
            users,
            catalog,
            cache,
        }
    }

    pub async fn access_token_for(&self, user_id: &str) -> anyhow::Result<String> {
        let key = cache::access_token_key(user_id);
        match self.cache.get(&key).await {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {}
            Err(err) => tracing::warn!(user_id, error = %err, "access token cache read failed"),
        }

        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| TopItemsError::not_found(format!("user {user_id}")))?;

        let tokens = self
            .catalog
            .refresh_access_token(&user.refresh_token)
            .await
            .with_context(|| format!("token refresh failed (user_id={user_id})"))?;

        if let Some(rotated) = tokens
            .refresh_token
            .as_deref()
            .filter(|t| *t != user.refresh_token)
        {
            self.users.update_refresh_token(user_id, rotated).await?;
            tracing::info!(user_id, "stored rotated refresh token");
        }

        // Best-effort: a cache failure only costs an extra refresh next time.
        if let Err(err) = self
            .cache
            .set(&key, &tokens.access_token, ACCESS_TOKEN_TTL)
            .await
        {
            tracing::warn!(user_id, error = %err, "failed to cache access token");
        }
        Ok(tokens.access_token)
    }
}
