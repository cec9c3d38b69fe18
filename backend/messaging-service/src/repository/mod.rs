//! Storage seams for the messaging service.
//!
//! Every store is an `async_trait` object so the service can run against
//! PostgreSQL in production and the in-memory implementations in tests.

pub mod directory;
pub mod memory;
pub mod messages;
pub mod postgres;
pub mod summaries;

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ConversationSummary, DeleteMode, DeleteOutcome, DisplayInfo, Members, Message, NewMessage,
};

pub use directory::{PgConversationDirectory, PgProfileLookup};
pub use memory::{InMemoryChatStore, InMemoryDirectory, InMemoryProfiles};
pub use postgres::PgChatStore;

/// Resolves who belongs to a relationship. Read-only.
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    /// Fails with `NotFound` when the relationship does not exist.
    async fn resolve_members(&self, relationship_id: Uuid) -> AppResult<Members>;

    async fn is_member(&self, relationship_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        match self.resolve_members(relationship_id).await {
            Ok(members) => Ok(members.contains(user_id)),
            Err(AppError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Display names and avatars for response enrichment
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    /// Users without a profile are absent from the map.
    async fn display_infos(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, DisplayInfo>>;

    async fn display_info(&self, user_id: Uuid) -> AppResult<DisplayInfo> {
        let mut found = self.display_infos(&[user_id]).await?;
        Ok(found.remove(&user_id).unwrap_or_else(DisplayInfo::placeholder))
    }
}

/// Append-only message log. Membership is checked by the caller.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert with status `sent`.
    ///
    /// `InvalidState` when sender and receiver coincide, `InvalidReference`
    /// when `reply_to` is not a live message of the same relationship.
    async fn append(&self, message: NewMessage) -> AppResult<Message>;

    async fn find_live(&self, relationship_id: Uuid, message_id: Uuid)
        -> AppResult<Option<Message>>;

    /// Live messages, newest first, with the total live count.
    async fn page(
        &self,
        relationship_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(i64, Vec<Message>)>;

    /// Marks the listed messages addressed to `reader_id`. Others are skipped.
    async fn mark_read(
        &self,
        relationship_id: Uuid,
        message_ids: &[Uuid],
        reader_id: Uuid,
    ) -> AppResult<u64>;

    async fn mark_all_read(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<u64>;

    /// Only messages sent by `deleter_id` are touched.
    async fn delete(
        &self,
        message_ids: &[Uuid],
        deleter_id: Uuid,
        mode: DeleteMode,
    ) -> AppResult<DeleteOutcome>;
}

/// Denormalized per-relationship summary
#[async_trait]
pub trait SummaryCache: Send + Sync {
    /// Create if absent, move the last-message snapshot forward and add one
    /// to the receiver's counter.
    async fn upsert_after_send(&self, members: Members, message: &Message) -> AppResult<()>;

    /// Set the reader's counter to zero. The other counter is untouched.
    async fn reset_unread(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<()>;

    /// Set the user's counter to their live unread count.
    async fn recount_unread(&self, relationship_id: Uuid, user_id: Uuid) -> AppResult<()>;

    /// Recompute both counters and the last-message snapshot from the log.
    async fn refresh(&self, relationship_id: Uuid) -> AppResult<()>;

    async fn find(&self, relationship_id: Uuid) -> AppResult<Option<ConversationSummary>>;

    async fn get(&self, relationship_id: Uuid) -> AppResult<ConversationSummary> {
        self.find(relationship_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("conversation {relationship_id}")))
    }

    /// Active summaries the user takes part in, most recently updated first.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(i64, Vec<ConversationSummary>)>;

    /// Creates the summary if absent. When the conversation is already
    /// blocked the existing blocker is kept and the stored summary returned.
    async fn block(
        &self,
        relationship_id: Uuid,
        members: Members,
        blocker: Uuid,
    ) -> AppResult<ConversationSummary>;

    /// Clears a block placed by `blocker`. `None` when no such block exists.
    async fn unblock(
        &self,
        relationship_id: Uuid,
        blocker: Uuid,
    ) -> AppResult<Option<ConversationSummary>>;
}

/// Multi-step mutations that must land as one unit.
#[async_trait]
pub trait ChatStore: MessageStore + SummaryCache {
    /// `append` + `upsert_after_send`. Fails with `Forbidden` when the
    /// conversation is blocked at the time of the write.
    async fn commit_send(&self, members: Members, message: NewMessage) -> AppResult<Message>;

    /// `mark_read` + `recount_unread` for the reader.
    async fn commit_read(
        &self,
        relationship_id: Uuid,
        message_ids: &[Uuid],
        reader_id: Uuid,
    ) -> AppResult<u64>;

    /// `mark_all_read` + `reset_unread` for the reader.
    async fn commit_read_all(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<u64>;

    /// `delete` + `refresh` of every touched relationship.
    async fn commit_delete(
        &self,
        message_ids: &[Uuid],
        deleter_id: Uuid,
        mode: DeleteMode,
    ) -> AppResult<DeleteOutcome>;
}
