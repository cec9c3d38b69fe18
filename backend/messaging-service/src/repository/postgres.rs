use async_trait::async_trait;
use db_pool::{acquire_with_metrics, begin_with_metrics};
use sqlx::PgPool;
use uuid::Uuid;

use super::{messages, summaries, ChatStore, MessageStore, SummaryCache};
use crate::error::{AppError, AppResult};
use crate::models::{ConversationSummary, DeleteMode, DeleteOutcome, Members, Message, NewMessage};

/// Message log and summary cache backed by PostgreSQL.
///
/// Single-step operations run on a pooled connection. The `commit_*`
/// operations each run in one transaction.
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
    service: String,
}

impl PgChatStore {
    pub fn new(pool: PgPool, service: impl Into<String>) -> Self {
        Self {
            pool,
            service: service.into(),
        }
    }
}

#[async_trait]
impl MessageStore for PgChatStore {
    async fn append(&self, message: NewMessage) -> AppResult<Message> {
        let mut tx = begin_with_metrics(&self.pool, &self.service).await?;
        let stored = messages::insert(&mut tx, &message).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn find_live(
        &self,
        relationship_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Option<Message>> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(messages::find_live(&mut conn, relationship_id, message_id).await?)
    }

    async fn page(
        &self,
        relationship_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(i64, Vec<Message>)> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(messages::page(&mut conn, relationship_id, offset, limit).await?)
    }

    async fn mark_read(
        &self,
        relationship_id: Uuid,
        message_ids: &[Uuid],
        reader_id: Uuid,
    ) -> AppResult<u64> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(messages::mark_read(&mut conn, relationship_id, message_ids, reader_id).await?)
    }

    async fn mark_all_read(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<u64> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(messages::mark_all_read(&mut conn, relationship_id, reader_id).await?)
    }

    async fn delete(
        &self,
        message_ids: &[Uuid],
        deleter_id: Uuid,
        mode: DeleteMode,
    ) -> AppResult<DeleteOutcome> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(messages::delete(&mut conn, message_ids, deleter_id, mode).await?)
    }
}

#[async_trait]
impl SummaryCache for PgChatStore {
    async fn upsert_after_send(&self, members: Members, message: &Message) -> AppResult<()> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(summaries::upsert_after_send(&mut conn, members, message).await?)
    }

    async fn reset_unread(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<()> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(summaries::reset_unread(&mut conn, relationship_id, reader_id).await?)
    }

    async fn recount_unread(&self, relationship_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(summaries::recount_unread(&mut conn, relationship_id, user_id).await?)
    }

    async fn refresh(&self, relationship_id: Uuid) -> AppResult<()> {
        let mut tx = begin_with_metrics(&self.pool, &self.service).await?;
        summaries::lock(&mut tx, relationship_id).await?;
        summaries::refresh(&mut tx, relationship_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, relationship_id: Uuid) -> AppResult<Option<ConversationSummary>> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(summaries::find(&mut conn, relationship_id).await?)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(i64, Vec<ConversationSummary>)> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(summaries::list_for_user(&mut conn, user_id, offset, limit).await?)
    }

    async fn block(
        &self,
        relationship_id: Uuid,
        members: Members,
        blocker: Uuid,
    ) -> AppResult<ConversationSummary> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(summaries::block(&mut conn, relationship_id, members, blocker).await?)
    }

    async fn unblock(
        &self,
        relationship_id: Uuid,
        blocker: Uuid,
    ) -> AppResult<Option<ConversationSummary>> {
        let mut conn = acquire_with_metrics(&self.pool, &self.service).await?;
        Ok(summaries::unblock(&mut conn, relationship_id, blocker).await?)
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn commit_send(&self, members: Members, message: NewMessage) -> AppResult<Message> {
        let mut tx = begin_with_metrics(&self.pool, &self.service).await?;
        // Summary row before message rows. Holding it also keeps the block
        // state and the reply target stable until commit.
        if summaries::lock_for_send(&mut tx, message.relationship_id, members)
            .await?
            .is_some()
        {
            return Err(AppError::Forbidden);
        }
        let stored = messages::insert(&mut tx, &message).await?;
        summaries::upsert_after_send(&mut tx, members, &stored).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn commit_read(
        &self,
        relationship_id: Uuid,
        message_ids: &[Uuid],
        reader_id: Uuid,
    ) -> AppResult<u64> {
        let mut tx = begin_with_metrics(&self.pool, &self.service).await?;
        // Lock first: the recount below must see every send committed before it
        summaries::lock(&mut tx, relationship_id).await?;
        let updated = messages::mark_read(&mut tx, relationship_id, message_ids, reader_id).await?;
        if updated > 0 {
            summaries::recount_unread(&mut tx, relationship_id, reader_id).await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn commit_read_all(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<u64> {
        let mut tx = begin_with_metrics(&self.pool, &self.service).await?;
        summaries::lock(&mut tx, relationship_id).await?;
        let updated = messages::mark_all_read(&mut tx, relationship_id, reader_id).await?;
        summaries::reset_unread(&mut tx, relationship_id, reader_id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn commit_delete(
        &self,
        message_ids: &[Uuid],
        deleter_id: Uuid,
        mode: DeleteMode,
    ) -> AppResult<DeleteOutcome> {
        let mut tx = begin_with_metrics(&self.pool, &self.service).await?;
        // Summary rows before message rows, same order as commit_read
        let relationships = messages::owned_relationships(&mut tx, message_ids, deleter_id).await?;
        for relationship_id in &relationships {
            summaries::lock(&mut tx, *relationship_id).await?;
        }
        let outcome = messages::delete(&mut tx, message_ids, deleter_id, mode).await?;
        for relationship_id in &outcome.relationships {
            summaries::refresh(&mut tx, *relationship_id).await?;
        }
        tx.commit().await?;
        Ok(outcome)
    }
}
