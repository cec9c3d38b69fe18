//! # Messaging Service
//!
//! Orchestrates direct conversations between the two participants of a
//! relationship: membership checks against the directory, atomic writes
//! through the [`ChatStore`], and display enrichment from [`ProfileLookup`].
//!
//! Membership is checked once per call here. The stores never check it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ChatSettings;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    ConversationSummary, DeleteMode, DisplayInfo, LastMessage, MediaRef, Members, Message,
    MessageKind, MessageStatus, NewMessage, SystemMeta,
};
use crate::repository::{ChatStore, ConversationDirectory, ProfileLookup};

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub relationship_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
    #[serde(default)]
    pub media: Option<MediaRef>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub system: Option<SystemMeta>,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

impl SendMessageRequest {
    pub fn text(relationship_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            relationship_id,
            content: Some(content.into()),
            kind: MessageKind::Text,
            media: None,
            reply_to: None,
            system: None,
        }
    }
}

/// 1-based page selector; absent fields take the configured defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub message_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub has_more: bool,
}

impl Pagination {
    fn new(page: u32, limit: u32, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            has_more: i64::from(page) * i64::from(limit) < total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub content: Option<String>,
    pub kind: MessageKind,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_avatar: String,
    pub receiver_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemMeta>,
}

impl HistoryEntry {
    fn new(message: Message, sender: DisplayInfo) -> Self {
        Self {
            id: message.id,
            is_read: message.is_read(),
            content: message.content,
            kind: message.kind,
            sender_id: message.sender_id,
            sender_name: sender.name,
            sender_avatar: sender.avatar,
            receiver_id: message.receiver_id,
            created_at: message.created_at,
            read_at: message.read_at,
            status: message.status,
            media: message.media,
            reply_to: message.reply_to,
            system: message.system,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub pagination: Pagination,
    /// Oldest first
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadSummary {
    pub unread_count: i32,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationEntry {
    pub relationship_id: Uuid,
    pub counterpart_id: Uuid,
    pub counterpart_name: String,
    pub counterpart_avatar: String,
    pub last_message: Option<LastMessage>,
    pub unread_count: i32,
    pub updated_at: DateTime<Utc>,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationPage {
    pub pagination: Pagination,
    pub conversations: Vec<ConversationEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockState {
    pub relationship_id: Uuid,
    pub is_blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Uuid>,
}

impl From<&ConversationSummary> for BlockState {
    fn from(summary: &ConversationSummary) -> Self {
        Self {
            relationship_id: summary.relationship_id,
            is_blocked: summary.is_blocked(),
            blocked_by: summary.blocked_by,
        }
    }
}

pub struct MessagingService {
    directory: Arc<dyn ConversationDirectory>,
    store: Arc<dyn ChatStore>,
    profiles: Arc<dyn ProfileLookup>,
    settings: ChatSettings,
}

impl MessagingService {
    pub fn new(
        directory: Arc<dyn ConversationDirectory>,
        store: Arc<dyn ChatStore>,
        profiles: Arc<dyn ProfileLookup>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            directory,
            store,
            profiles,
            settings,
        }
    }

    async fn require_member(&self, relationship_id: Uuid, user_id: Uuid) -> AppResult<Members> {
        let members = self.directory.resolve_members(relationship_id).await?;
        if !members.contains(user_id) {
            warn!(%relationship_id, %user_id, "caller is not a participant");
            return Err(AppError::Forbidden);
        }
        Ok(members)
    }

    /// (page, limit, offset)
    fn resolve_paging(&self, request: PageRequest) -> AppResult<(u32, u32, i64)> {
        let page = request.page.unwrap_or(1);
        let limit = request.limit.unwrap_or(self.settings.default_page_size);
        if page < 1 {
            return Err(AppError::InvalidState("page must be at least 1".to_string()));
        }
        if limit < 1 || limit > self.settings.max_page_size {
            return Err(AppError::InvalidState(format!(
                "limit must be between 1 and {}",
                self.settings.max_page_size
            )));
        }
        let offset = i64::from(page - 1) * i64::from(limit);
        Ok((page, limit, offset))
    }

    fn validate_payload(&self, request: &SendMessageRequest) -> AppResult<()> {
        let content = request.content.as_deref().unwrap_or("");
        if content.contains('\0') {
            return Err(AppError::InvalidState(
                "content must not contain NUL characters".to_string(),
            ));
        }
        if content.chars().count() > self.settings.max_content_length {
            return Err(AppError::InvalidState(format!(
                "content exceeds {} characters",
                self.settings.max_content_length
            )));
        }

        match request.kind {
            MessageKind::Text if content.trim().is_empty() => Err(AppError::InvalidState(
                "text messages need content".to_string(),
            )),
            kind if kind.requires_media()
                && request.media.as_ref().map_or(true, |m| m.url.trim().is_empty()) =>
            {
                Err(AppError::InvalidState(format!("{kind} messages need a media url")))
            }
            MessageKind::System if request.system.is_none() => Err(AppError::InvalidState(
                "system messages need system metadata".to_string(),
            )),
            _ => Ok(()),
        }
    }

    #[instrument(
        skip(self, request),
        fields(relationship_id = %request.relationship_id, kind = %request.kind)
    )]
    pub async fn send(
        &self,
        sender_id: Uuid,
        request: SendMessageRequest,
    ) -> AppResult<SendReceipt> {
        self.validate_payload(&request)?;

        let members = self.require_member(request.relationship_id, sender_id).await?;
        let receiver_id = members.counterpart_of(sender_id).ok_or(AppError::Forbidden)?;

        // The store checks the block under the same lock as the write
        let result = self
            .store
            .commit_send(
                members,
                NewMessage {
                    relationship_id: request.relationship_id,
                    sender_id,
                    receiver_id,
                    content: request.content,
                    kind: request.kind,
                    media: request.media,
                    reply_to: request.reply_to,
                    system: request.system,
                },
            )
            .await;
        let stored = match result {
            Err(AppError::Forbidden) => {
                warn!(%sender_id, "send rejected, conversation is blocked");
                return Err(AppError::Forbidden);
            }
            other => other?,
        };

        metrics::record_message_sent(stored.kind);
        info!(message_id = %stored.id, %sender_id, %receiver_id, "message sent");

        Ok(SendReceipt {
            message_id: stored.id,
            created_at: stored.created_at,
            status: stored.status,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_history(
        &self,
        relationship_id: Uuid,
        requester_id: Uuid,
        paging: PageRequest,
    ) -> AppResult<HistoryPage> {
        let (page, limit, offset) = self.resolve_paging(paging)?;
        self.require_member(relationship_id, requester_id).await?;

        let (total, mut messages) = self
            .store
            .page(relationship_id, offset, i64::from(limit))
            .await?;
        // Fetched newest first so paging starts at the recent end
        messages.reverse();

        let senders: Vec<Uuid> = messages
            .iter()
            .map(|m| m.sender_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let profiles = self.profiles.display_infos(&senders).await?;

        let messages = messages
            .into_iter()
            .map(|m| {
                let sender = profiles
                    .get(&m.sender_id)
                    .cloned()
                    .unwrap_or_else(DisplayInfo::placeholder);
                HistoryEntry::new(m, sender)
            })
            .collect();

        debug!(total, page, limit, "history page served");
        Ok(HistoryPage {
            pagination: Pagination::new(page, limit, total),
            messages,
        })
    }

    /// Returns whether any message changed state.
    #[instrument(skip(self, message_ids), fields(count = message_ids.len()))]
    pub async fn mark_read(
        &self,
        relationship_id: Uuid,
        message_ids: &[Uuid],
        reader_id: Uuid,
    ) -> AppResult<bool> {
        self.require_member(relationship_id, reader_id).await?;
        if message_ids.is_empty() {
            return Ok(false);
        }

        let updated = self
            .store
            .commit_read(relationship_id, message_ids, reader_id)
            .await?;
        metrics::record_messages_read("selected", updated);
        debug!(updated, "messages marked read");
        Ok(updated > 0)
    }

    /// Marks every unread message addressed to the reader. Returns the count.
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<u64> {
        self.require_member(relationship_id, reader_id).await?;
        let updated = self.store.commit_read_all(relationship_id, reader_id).await?;
        metrics::record_messages_read("all", updated);
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get_unread_count(
        &self,
        relationship_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<UnreadSummary> {
        self.require_member(relationship_id, user_id).await?;

        Ok(match self.store.find(relationship_id).await? {
            Some(summary) => UnreadSummary {
                unread_count: summary.unread_for(user_id).unwrap_or(0),
                last_message: summary.last_message,
            },
            None => UnreadSummary {
                unread_count: 0,
                last_message: None,
            },
        })
    }

    #[instrument(skip(self))]
    pub async fn list_conversations(
        &self,
        user_id: Uuid,
        paging: PageRequest,
    ) -> AppResult<ConversationPage> {
        let (page, limit, offset) = self.resolve_paging(paging)?;
        let (total, summaries) = self
            .store
            .list_for_user(user_id, offset, i64::from(limit))
            .await?;

        let counterparts: Vec<Uuid> = summaries
            .iter()
            .filter_map(|s| s.members.counterpart_of(user_id))
            .collect();
        let profiles = self.profiles.display_infos(&counterparts).await?;

        let mut conversations = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(counterpart_id) = summary.members.counterpart_of(user_id) else {
                continue;
            };
            let display = profiles
                .get(&counterpart_id)
                .cloned()
                .unwrap_or_else(DisplayInfo::placeholder);
            conversations.push(ConversationEntry {
                relationship_id: summary.relationship_id,
                counterpart_id,
                counterpart_name: display.name,
                counterpart_avatar: display.avatar,
                unread_count: summary.unread_for(user_id).unwrap_or(0),
                is_blocked: summary.is_blocked(),
                updated_at: summary.updated_at,
                last_message: summary.last_message,
            });
        }

        Ok(ConversationPage {
            pagination: Pagination::new(page, limit, total),
            conversations,
        })
    }

    /// Only the requester's own messages are deleted. Returns the count.
    #[instrument(skip(self, message_ids), fields(count = message_ids.len()))]
    pub async fn delete_messages(
        &self,
        message_ids: &[Uuid],
        requester_id: Uuid,
        mode: DeleteMode,
    ) -> AppResult<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let outcome = self
            .store
            .commit_delete(message_ids, requester_id, mode)
            .await?;

        metrics::record_messages_deleted(mode, outcome.affected);
        info!(
            deleted = outcome.affected,
            conversations = outcome.relationships.len(),
            "messages deleted"
        );
        Ok(outcome.affected)
    }

    /// Blocks sending in both directions. A block placed by the other
    /// participant is left in place.
    #[instrument(skip(self))]
    pub async fn block_conversation(
        &self,
        relationship_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<BlockState> {
        let members = self.require_member(relationship_id, user_id).await?;
        let summary = self.store.block(relationship_id, members, user_id).await?;
        if summary.blocked_by == Some(user_id) {
            info!("conversation blocked");
        }
        Ok(BlockState::from(&summary))
    }

    /// Only the participant who placed the block may lift it.
    #[instrument(skip(self))]
    pub async fn unblock_conversation(
        &self,
        relationship_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<BlockState> {
        self.require_member(relationship_id, user_id).await?;
        if let Some(summary) = self.store.unblock(relationship_id, user_id).await? {
            info!("conversation unblocked");
            return Ok(BlockState::from(&summary));
        }
        match self.store.find(relationship_id).await? {
            Some(summary) if summary.is_blocked() => Err(AppError::Forbidden),
            _ => Ok(BlockState {
                relationship_id,
                is_blocked: false,
                blocked_by: None,
            }),
        }
    }
}
