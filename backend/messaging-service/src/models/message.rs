//! Message records and their lifecycle vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// What a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    File,
    System,
}

impl MessageKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "voice" => Some(Self::Voice),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::File => "file",
            Self::System => "system",
        }
    }

    /// Kinds whose payload lives behind a media reference
    pub fn requires_media(&self) -> bool {
        matches!(self, Self::Image | Self::Voice | Self::Video | Self::File)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db(s).ok_or_else(|| format!("Invalid message kind: {}", s))
    }
}

/// Delivery lifecycle status.
///
/// `Failed` is accepted from a delivery layer but never produced by this
/// service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db())
    }
}

/// Pointer to externally stored media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// Duration in seconds, for voice and video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMeta {
    pub system_type: String,
    #[serde(default)]
    pub payload: JsonValue,
}

/// Whether a message is visible or retained only for audit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Active,
    SoftDeleted { at: DateTime<Utc>, by: Uuid },
}

impl Disposition {
    /// Rebuild from the nullable `deleted_at`/`deleted_by` column pair.
    pub fn from_columns(at: Option<DateTime<Utc>>, by: Option<Uuid>) -> Self {
        match (at, by) {
            (Some(at), Some(by)) => Self::SoftDeleted { at, by },
            _ => Self::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    #[default]
    Soft,
    Hard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    /// Store-assigned sequence, breaks ties on equal `created_at`
    pub seq: i64,
    pub relationship_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
    pub kind: MessageKind,
    pub media: Option<MediaRef>,
    pub status: MessageStatus,
    pub read_at: Option<DateTime<Utc>>,
    pub reply_to: Option<Uuid>,
    pub system: Option<SystemMeta>,
    pub disposition: Disposition,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    pub fn is_live(&self) -> bool {
        self.disposition.is_active()
    }

    /// Live, unread and addressed to `user`
    pub fn is_unread_for(&self, user: Uuid) -> bool {
        self.is_live() && !self.is_read() && self.receiver_id == user
    }

    /// Ordering key for history: later `created_at` wins, then higher `seq`.
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.seq)
    }

    pub fn mark_read(&mut self, at: DateTime<Utc>) {
        self.read_at = Some(at);
        self.status = MessageStatus::Read;
        self.updated_at = Some(at);
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>, by: Uuid) {
        self.disposition = Disposition::SoftDeleted { at, by };
        self.updated_at = Some(at);
    }
}

/// Input for appending a message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub relationship_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
    pub kind: MessageKind,
    pub media: Option<MediaRef>,
    pub reply_to: Option<Uuid>,
    pub system: Option<SystemMeta>,
}

/// Result of a bulk delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub affected: u64,
    /// Relationships whose summaries need refreshing
    pub relationships: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_db_round_trip_and_media_requirement() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::Voice,
            MessageKind::Video,
            MessageKind::File,
            MessageKind::System,
        ] {
            assert_eq!(MessageKind::from_db(kind.to_db()), Some(kind));
        }
        assert!(MessageKind::from_db("sticker").is_none());
        assert!(!MessageKind::Text.requires_media());
        assert!(!MessageKind::System.requires_media());
        assert!(MessageKind::Voice.requires_media());
    }

    #[test]
    fn test_kind_serde_is_lowercase() {
        let json = serde_json::to_string(&MessageKind::Image).unwrap();
        assert_eq!(json, "\"image\"");
        let kind: MessageKind = "video".parse().unwrap();
        assert_eq!(kind, MessageKind::Video);
    }

    #[test]
    fn test_disposition_columns() {
        assert_eq!(Disposition::from_columns(None, None), Disposition::Active);

        let by = Uuid::new_v4();
        let at = Utc::now();
        let disposition = Disposition::from_columns(Some(at), Some(by));
        assert_eq!(disposition, Disposition::SoftDeleted { at, by });
        assert!(!disposition.is_active());
    }

    #[test]
    fn test_read_and_delete_are_independent() {
        let receiver = Uuid::new_v4();
        let sender = Uuid::new_v4();
        let now = Utc::now();
        let mut message = Message {
            id: Uuid::new_v4(),
            seq: 1,
            relationship_id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            content: Some("hi".into()),
            kind: MessageKind::Text,
            media: None,
            status: MessageStatus::Sent,
            read_at: None,
            reply_to: None,
            system: None,
            disposition: Disposition::Active,
            created_at: now,
            updated_at: None,
        };

        assert!(message.is_unread_for(receiver));
        assert!(!message.is_unread_for(sender));

        message.mark_read(now);
        assert!(message.is_read());
        assert_eq!(message.status, MessageStatus::Read);

        message.soft_delete(now, sender);
        assert!(!message.is_live());
        assert!(message.is_read());
    }
}
