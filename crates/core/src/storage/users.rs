use crate::domain::catalog::User;
use crate::storage::UserStore;
use anyhow::Context;

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: sqlx::PgPool,
}

impl PgUserStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserStore for PgUserStore {
    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT id, refresh_token FROM app_users WHERE id = $1",
        )
        .persistent(false)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select app_users failed (user_id={user_id})"))?;

        Ok(row.map(|(id, refresh_token)| User { id, refresh_token }))
    }

    async fn update_refresh_token(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE app_users SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .persistent(false)
            .bind(user_id)
            .bind(refresh_token)
            .execute(&self.pool)
            .await
            .with_context(|| format!("update app_users refresh_token failed (user_id={user_id})"))?;
        Ok(())
    }

    async fn list_user_ids(&self) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT id FROM app_users ORDER BY id ASC")
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .context("select app_users ids failed")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
