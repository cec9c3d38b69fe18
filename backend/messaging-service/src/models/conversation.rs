//! Relationship membership and the per-relationship conversation summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::message::{Message, MessageKind};

/// Which side of a relationship a user sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    A,
    B,
}

/// The two participants of a relationship, in directory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Members {
    pub participant_a: Uuid,
    pub participant_b: Uuid,
}

impl Members {
    /// `None` when both sides are the same identity.
    pub fn try_new(participant_a: Uuid, participant_b: Uuid) -> Option<Self> {
        (participant_a != participant_b).then_some(Self {
            participant_a,
            participant_b,
        })
    }

    pub fn contains(&self, user: Uuid) -> bool {
        self.position_of(user).is_some()
    }

    pub fn position_of(&self, user: Uuid) -> Option<Position> {
        if user == self.participant_a {
            Some(Position::A)
        } else if user == self.participant_b {
            Some(Position::B)
        } else {
            None
        }
    }

    /// The other participant. `None` for non-members.
    pub fn counterpart_of(&self, user: Uuid) -> Option<Uuid> {
        match self.position_of(user)? {
            Position::A => Some(self.participant_b),
            Position::B => Some(self.participant_a),
        }
    }
}

/// Snapshot of the newest live message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastMessage {
    pub id: Uuid,
    pub content: Option<String>,
    pub kind: MessageKind,
    pub sender_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            content: message.content.clone(),
            kind: message.kind,
            sender_id: message.sender_id,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub relationship_id: Uuid,
    pub members: Members,
    pub last_message: Option<LastMessage>,
    pub unread_a: i32,
    pub unread_b: i32,
    pub is_active: bool,
    /// Set while the conversation is blocked
    pub blocked_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    /// Fresh summary with no messages.
    pub fn empty(relationship_id: Uuid, members: Members, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            relationship_id,
            members,
            last_message: None,
            unread_a: 0,
            unread_b: 0,
            is_active: true,
            blocked_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn unread_for(&self, user: Uuid) -> Option<i32> {
        match self.members.position_of(user)? {
            Position::A => Some(self.unread_a),
            Position::B => Some(self.unread_b),
        }
    }

    pub fn unread_slot_mut(&mut self, position: Position) -> &mut i32 {
        match position {
            Position::A => &mut self.unread_a,
            Position::B => &mut self.unread_b,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_by.is_some()
    }
}

/// Name and avatar shown next to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayInfo {
    pub name: String,
    pub avatar: String,
}

impl DisplayInfo {
    /// Used when the profile store has no record for a user
    pub fn placeholder() -> Self {
        Self {
            name: "Unknown".to_string(),
            avatar: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_reject_identical_participants() {
        let user = Uuid::new_v4();
        assert!(Members::try_new(user, user).is_none());
    }

    #[test]
    fn test_counterpart_and_position() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let members = Members::try_new(a, b).unwrap();

        assert_eq!(members.counterpart_of(a), Some(b));
        assert_eq!(members.counterpart_of(b), Some(a));
        assert_eq!(members.counterpart_of(outsider), None);
        assert_eq!(members.position_of(b), Some(Position::B));
        assert!(!members.contains(outsider));
    }

    #[test]
    fn test_unread_for_follows_position() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let members = Members::try_new(a, b).unwrap();
        let mut summary = ConversationSummary::empty(Uuid::new_v4(), members, Utc::now());
        *summary.unread_slot_mut(Position::B) += 3;

        assert_eq!(summary.unread_for(a), Some(0));
        assert_eq!(summary.unread_for(b), Some(3));
        assert_eq!(summary.unread_for(Uuid::new_v4()), None);
    }
}
