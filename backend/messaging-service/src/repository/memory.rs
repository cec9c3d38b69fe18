//! Process-local stores.
//!
//! Everything lives behind a single `tokio::sync::Mutex`, so each trait call
//! and each `commit_*` composite is atomic with respect to the others.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{ChatStore, ConversationDirectory, MessageStore, ProfileLookup, SummaryCache};
use crate::error::{AppError, AppResult};
use crate::models::{
    ConversationSummary, DeleteMode, DeleteOutcome, Disposition, DisplayInfo, LastMessage,
    Members, Message, MessageStatus, NewMessage,
};

#[derive(Default)]
pub struct InMemoryDirectory {
    relationships: RwLock<HashMap<Uuid, Members>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relationships(relationships: impl IntoIterator<Item = (Uuid, Members)>) -> Self {
        Self {
            relationships: RwLock::new(relationships.into_iter().collect()),
        }
    }

    pub async fn insert(&self, relationship_id: Uuid, members: Members) {
        self.relationships
            .write()
            .await
            .insert(relationship_id, members);
    }
}

#[async_trait]
impl ConversationDirectory for InMemoryDirectory {
    async fn resolve_members(&self, relationship_id: Uuid) -> AppResult<Members> {
        self.relationships
            .read()
            .await
            .get(&relationship_id)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("relationship {relationship_id}")))
    }
}

#[derive(Default)]
pub struct InMemoryProfiles {
    profiles: RwLock<HashMap<Uuid, DisplayInfo>>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: Uuid, name: &str, avatar: &str) {
        self.profiles.write().await.insert(
            user_id,
            DisplayInfo {
                name: name.to_string(),
                avatar: avatar.to_string(),
            },
        );
    }
}

#[async_trait]
impl ProfileLookup for InMemoryProfiles {
    async fn display_infos(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, DisplayInfo>> {
        let profiles = self.profiles.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| profiles.get(id).map(|info| (*id, info.clone())))
            .collect())
    }
}

#[derive(Default)]
struct ChatState {
    messages: Vec<Message>,
    summaries: HashMap<Uuid, ConversationSummary>,
    next_seq: i64,
}

impl ChatState {
    fn live_unread(&self, relationship_id: Uuid, user_id: Uuid) -> i32 {
        self.messages
            .iter()
            .filter(|m| m.relationship_id == relationship_id && m.is_unread_for(user_id))
            .count() as i32
    }

    fn newest_live(&self, relationship_id: Uuid) -> Option<&Message> {
        self.messages
            .iter()
            .filter(|m| m.relationship_id == relationship_id && m.is_live())
            .max_by_key(|m| m.order_key())
    }

    fn find_live(&self, relationship_id: Uuid, message_id: Uuid) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.id == message_id && m.relationship_id == relationship_id && m.is_live())
    }

    fn insert(&mut self, new: NewMessage) -> AppResult<Message> {
        if new.sender_id == new.receiver_id {
            return Err(AppError::InvalidState(
                "sender and receiver must differ".to_string(),
            ));
        }
        if let Some(reply_to) = new.reply_to {
            if self.find_live(new.relationship_id, reply_to).is_none() {
                return Err(AppError::InvalidReference(format!(
                    "reply target {reply_to} is not a live message of this conversation"
                )));
            }
        }

        self.next_seq += 1;
        let message = Message {
            id: Uuid::new_v4(),
            seq: self.next_seq,
            relationship_id: new.relationship_id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content,
            kind: new.kind,
            media: new.media,
            status: MessageStatus::Sent,
            read_at: None,
            reply_to: new.reply_to,
            system: new.system,
            disposition: Disposition::Active,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.messages.push(message.clone());
        Ok(message)
    }

    fn page(&self, relationship_id: Uuid, offset: i64, limit: i64) -> (i64, Vec<Message>) {
        let mut live: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.relationship_id == relationship_id && m.is_live())
            .collect();
        live.sort_by_key(|m| std::cmp::Reverse(m.order_key()));

        let total = live.len() as i64;
        let page = live
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        (total, page)
    }

    fn mark_where(
        &mut self,
        relationship_id: Uuid,
        reader_id: Uuid,
        selected: impl Fn(&Message) -> bool,
    ) -> u64 {
        let now = Utc::now();
        let mut updated = 0;
        for message in self.messages.iter_mut() {
            if message.relationship_id == relationship_id
                && message.is_unread_for(reader_id)
                && selected(message)
            {
                message.mark_read(now);
                updated += 1;
            }
        }
        updated
    }

    fn delete(
        &mut self,
        message_ids: &[Uuid],
        deleter_id: Uuid,
        mode: DeleteMode,
    ) -> DeleteOutcome {
        let now = Utc::now();
        let mut touched = Vec::new();
        match mode {
            DeleteMode::Soft => {
                for message in self.messages.iter_mut().filter(|m| {
                    message_ids.contains(&m.id) && m.sender_id == deleter_id && m.is_live()
                }) {
                    message.soft_delete(now, deleter_id);
                    touched.push(message.relationship_id);
                }
            }
            DeleteMode::Hard => {
                let mut removed = Vec::new();
                self.messages.retain(|m| {
                    let doomed = message_ids.contains(&m.id) && m.sender_id == deleter_id;
                    if doomed {
                        touched.push(m.relationship_id);
                        removed.push(m.id);
                    }
                    !doomed
                });
                // Mirrors ON DELETE SET NULL on reply_to_id
                for message in self.messages.iter_mut() {
                    if message.reply_to.is_some_and(|r| removed.contains(&r)) {
                        message.reply_to = None;
                    }
                }
            }
        }

        let affected = touched.len() as u64;
        touched.sort();
        touched.dedup();
        DeleteOutcome {
            affected,
            relationships: touched,
        }
    }

    fn upsert_after_send(&mut self, members: Members, message: &Message) {
        let summary = self
            .summaries
            .entry(message.relationship_id)
            .or_insert_with(|| {
                ConversationSummary::empty(message.relationship_id, members, message.created_at)
            });

        if let Some(position) = summary.members.position_of(message.receiver_id) {
            *summary.unread_slot_mut(position) += 1;
        }
        let is_newer = summary
            .last_message
            .as_ref()
            .map_or(true, |last| last.created_at <= message.created_at);
        if is_newer {
            summary.last_message = Some(LastMessage::from(message));
        }
        summary.is_active = true;
        summary.updated_at = Utc::now();
    }

    fn set_unread(&mut self, relationship_id: Uuid, user_id: Uuid, value: i32) {
        if let Some(summary) = self.summaries.get_mut(&relationship_id) {
            if let Some(position) = summary.members.position_of(user_id) {
                *summary.unread_slot_mut(position) = value;
            }
        }
    }

    fn recount_unread(&mut self, relationship_id: Uuid, user_id: Uuid) {
        let remaining = self.live_unread(relationship_id, user_id);
        self.set_unread(relationship_id, user_id, remaining);
    }

    fn refresh(&mut self, relationship_id: Uuid) {
        let Some(members) = self.summaries.get(&relationship_id).map(|s| s.members) else {
            return;
        };
        let unread_a = self.live_unread(relationship_id, members.participant_a);
        let unread_b = self.live_unread(relationship_id, members.participant_b);
        let last_message = self.newest_live(relationship_id).map(LastMessage::from);

        if let Some(summary) = self.summaries.get_mut(&relationship_id) {
            summary.unread_a = unread_a;
            summary.unread_b = unread_b;
            summary.last_message = last_message;
            summary.updated_at = Utc::now();
        }
    }
}

/// In-memory message log and summary cache
#[derive(Default)]
pub struct InMemoryChatStore {
    state: Mutex<ChatState>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored message including soft-deleted ones, in insertion order.
    pub async fn all_messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }
}

#[async_trait]
impl MessageStore for InMemoryChatStore {
    async fn append(&self, message: NewMessage) -> AppResult<Message> {
        self.state.lock().await.insert(message)
    }

    async fn find_live(
        &self,
        relationship_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Option<Message>> {
        Ok(self
            .state
            .lock()
            .await
            .find_live(relationship_id, message_id)
            .cloned())
    }

    async fn page(
        &self,
        relationship_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(i64, Vec<Message>)> {
        Ok(self.state.lock().await.page(relationship_id, offset, limit))
    }

    async fn mark_read(
        &self,
        relationship_id: Uuid,
        message_ids: &[Uuid],
        reader_id: Uuid,
    ) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        Ok(state.mark_where(relationship_id, reader_id, |m| message_ids.contains(&m.id)))
    }

    async fn mark_all_read(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        Ok(state.mark_where(relationship_id, reader_id, |_| true))
    }

    async fn delete(
        &self,
        message_ids: &[Uuid],
        deleter_id: Uuid,
        mode: DeleteMode,
    ) -> AppResult<DeleteOutcome> {
        Ok(self.state.lock().await.delete(message_ids, deleter_id, mode))
    }
}

#[async_trait]
impl SummaryCache for InMemoryChatStore {
    async fn upsert_after_send(&self, members: Members, message: &Message) -> AppResult<()> {
        self.state.lock().await.upsert_after_send(members, message);
        Ok(())
    }

    async fn reset_unread(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<()> {
        self.state.lock().await.set_unread(relationship_id, reader_id, 0);
        Ok(())
    }

    async fn recount_unread(&self, relationship_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.state.lock().await.recount_unread(relationship_id, user_id);
        Ok(())
    }

    async fn refresh(&self, relationship_id: Uuid) -> AppResult<()> {
        self.state.lock().await.refresh(relationship_id);
        Ok(())
    }

    async fn find(&self, relationship_id: Uuid) -> AppResult<Option<ConversationSummary>> {
        Ok(self.state.lock().await.summaries.get(&relationship_id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(i64, Vec<ConversationSummary>)> {
        let state = self.state.lock().await;
        let mut mine: Vec<&ConversationSummary> = state
            .summaries
            .values()
            .filter(|s| s.is_active && s.members.contains(user_id))
            .collect();
        mine.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.relationship_id.cmp(&a.relationship_id))
        });

        let total = mine.len() as i64;
        let page = mine
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((total, page))
    }

    async fn block(
        &self,
        relationship_id: Uuid,
        members: Members,
        blocker: Uuid,
    ) -> AppResult<ConversationSummary> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let summary = state
            .summaries
            .entry(relationship_id)
            .or_insert_with(|| ConversationSummary::empty(relationship_id, members, now));
        if summary.blocked_by.is_none() {
            summary.blocked_by = Some(blocker);
            summary.updated_at = now;
        }
        Ok(summary.clone())
    }

    async fn unblock(
        &self,
        relationship_id: Uuid,
        blocker: Uuid,
    ) -> AppResult<Option<ConversationSummary>> {
        let mut state = self.state.lock().await;
        match state.summaries.get_mut(&relationship_id) {
            Some(summary) if summary.blocked_by == Some(blocker) => {
                summary.blocked_by = None;
                summary.updated_at = Utc::now();
                Ok(Some(summary.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn commit_send(&self, members: Members, message: NewMessage) -> AppResult<Message> {
        let mut state = self.state.lock().await;
        if state
            .summaries
            .get(&message.relationship_id)
            .is_some_and(|s| s.is_blocked())
        {
            return Err(AppError::Forbidden);
        }
        let stored = state.insert(message)?;
        state.upsert_after_send(members, &stored);
        Ok(stored)
    }

    async fn commit_read(
        &self,
        relationship_id: Uuid,
        message_ids: &[Uuid],
        reader_id: Uuid,
    ) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let updated =
            state.mark_where(relationship_id, reader_id, |m| message_ids.contains(&m.id));
        if updated > 0 {
            state.recount_unread(relationship_id, reader_id);
        }
        Ok(updated)
    }

    async fn commit_read_all(&self, relationship_id: Uuid, reader_id: Uuid) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let updated = state.mark_where(relationship_id, reader_id, |_| true);
        state.set_unread(relationship_id, reader_id, 0);
        Ok(updated)
    }

    async fn commit_delete(
        &self,
        message_ids: &[Uuid],
        deleter_id: Uuid,
        mode: DeleteMode,
    ) -> AppResult<DeleteOutcome> {
        let mut state = self.state.lock().await;
        let outcome = state.delete(message_ids, deleter_id, mode);
        for relationship_id in &outcome.relationships {
            state.refresh(*relationship_id);
        }
        Ok(outcome)
    }
}
