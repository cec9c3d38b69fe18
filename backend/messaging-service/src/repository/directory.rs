use std::collections::HashMap;

use async_trait::async_trait;
use db_pool::acquire_with_metrics;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{ConversationDirectory, ProfileLookup};
use crate::error::{AppError, AppResult};
use crate::models::{DisplayInfo, Members};

/// Reads relationship membership from the match store
#[derive(Clone)]
pub struct PgConversationDirectory {
    pool: PgPool,
    service: String,
}

impl PgConversationDirectory {
    pub fn new(pool: PgPool, service: impl Into<String>) -> Self {
        Self {
            pool,
            service: service.into(),
        }
    }
}

#[async_trait]
impl ConversationDirectory for PgConversationDirectory {
    async fn resolve_members(&self, relationship_id: Uuid) -> AppResult<Members> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        let row = sqlx::query("SELECT user1_id, user2_id FROM match_results WHERE id = $1")
            .bind(relationship_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("relationship {relationship_id}")))?;

        let user1: Option<Uuid> = row.try_get("user1_id")?;
        let user2: Option<Uuid> = row.try_get("user2_id")?;
        match (user1, user2) {
            (Some(a), Some(b)) => Members::try_new(a, b).ok_or_else(|| {
                AppError::InvalidState(format!(
                    "relationship {relationship_id} pairs a user with themselves"
                ))
            }),
            _ => {
                tracing::warn!(%relationship_id, "relationship has incomplete membership");
                Err(AppError::NotFound(format!(
                    "members of relationship {relationship_id}"
                )))
            }
        }
    }
}

/// Reads nickname and avatar from the user store
#[derive(Clone)]
pub struct PgProfileLookup {
    pool: PgPool,
    service: String,
}

impl PgProfileLookup {
    pub fn new(pool: PgPool, service: impl Into<String>) -> Self {
        Self {
            pool,
            service: service.into(),
        }
    }
}

#[async_trait]
impl ProfileLookup for PgProfileLookup {
    async fn display_infos(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, DisplayInfo>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        let rows = sqlx::query("SELECT id, nick_name, avatar_url FROM users WHERE id = ANY($1)")
            .bind(user_ids)
            .fetch_all(&mut *conn)
            .await?;

        let mut infos = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            let name: Option<String> = row.try_get("nick_name")?;
            let avatar: Option<String> = row.try_get("avatar_url")?;
            let placeholder = DisplayInfo::placeholder();
            infos.insert(
                id,
                DisplayInfo {
                    name: name.unwrap_or(placeholder.name),
                    avatar: avatar.unwrap_or(placeholder.avatar),
                },
            );
        }
        Ok(infos)
    }
}
