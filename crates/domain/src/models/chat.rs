//! Chat domain models: the conversation container, its typed meta blob and
//! the membership join rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::message::Message;
use super::user::UserRole;

/// Chat container type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Personal,
    Match,
    Ticket,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Personal => "personal",
            ChatType::Match => "match",
            ChatType::Ticket => "ticket",
        }
    }
}

impl FromStr for ChatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "personal" => Ok(ChatType::Personal),
            "match" => Ok(ChatType::Match),
            "ticket" => Ok(ChatType::Ticket),
            _ => Err(format!("Invalid chat type: {}", s)),
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured chat meta carrying ticket back-references.
///
/// Stored as JSONB. Updates go through [`ChatMeta::merge`], which never
/// clears a key the patch does not mention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatMeta {
    /// Set on TICKET chats: the ticket this chat was created for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_ticket_id: Option<i64>,

    /// Set on source chats: the ticket that was spawned from this chat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_ticket_id: Option<i64>,
}

impl ChatMeta {
    /// Merges a partial meta into this one. Keys absent from `patch` keep
    /// their current value.
    pub fn merge(&self, patch: &ChatMeta) -> ChatMeta {
        ChatMeta {
            assigned_ticket_id: patch.assigned_ticket_id.or(self.assigned_ticket_id),
            related_ticket_id: patch.related_ticket_id.or(self.related_ticket_id),
        }
    }
}

/// A conversation container.
///
/// `version` increases strictly on every state-affecting write (membership
/// change, close/reopen, meta update) and is the optimistic-concurrency /
/// cache-invalidation signal for consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Chat {
    pub id: i64,
    pub chat_type: ChatType,
    pub match_id: Option<Uuid>,
    pub is_closed: bool,
    pub meta: ChatMeta,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's membership in a chat. At most one row per (chat_id, user_id).
///
/// `user_role` is a snapshot of the role at join time. The
/// `first/last_available_message_id` bounds window visibility for members
/// with restricted history, e.g. rotated scouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatMembership {
    pub chat_id: i64,
    pub user_id: Uuid,
    pub user_role: UserRole,
    pub is_primary_member: bool,
    pub has_read_permission: bool,
    pub has_write_permission: bool,
    pub last_read_message_id: Option<i64>,
    pub last_received_message_id: Option<i64>,
    pub first_available_message_id: Option<i64>,
    pub last_available_message_id: Option<i64>,
    pub is_archive_member: bool,
    pub joined_at: DateTime<Utc>,
}

/// Request payload for creating a chat.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateChatRequest {
    pub chat_type: ChatType,
    pub match_id: Option<Uuid>,
    #[serde(default)]
    pub meta: ChatMeta,
}

/// Request payload for joining a user to a chat.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct JoinChatRequest {
    pub user_id: Uuid,
    #[serde(default = "default_true")]
    pub is_primary_member: bool,
    #[serde(default = "default_true")]
    pub has_read_permission: bool,
    #[serde(default = "default_true")]
    pub has_write_permission: bool,
}

fn default_true() -> bool {
    true
}

/// Query parameters for the chat listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListChatsQuery {
    /// TICKET chats are excluded from listings unless explicitly requested.
    #[serde(default)]
    pub show_chats_for_tickets: bool,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// One row of the chat listing, enriched with the unread count and the
/// most recent message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatSummary {
    pub chat: Chat,
    pub unread_count: i64,
    pub last_message: Option<Message>,
}

/// A chat member annotated with the live presence flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MemberView {
    pub user_id: Uuid,
    pub user_role: UserRole,
    pub is_primary_member: bool,
    pub has_read_permission: bool,
    pub has_write_permission: bool,
    pub is_online: bool,
}

/// Single-chat detail view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatDetail {
    pub chat: Chat,
    pub members: Vec<MemberView>,
    pub unread_count: i64,
    pub last_message: Option<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_type_roundtrip() {
        for ct in [ChatType::Personal, ChatType::Match, ChatType::Ticket] {
            assert_eq!(ct.as_str().parse::<ChatType>().unwrap(), ct);
        }
    }

    #[test]
    fn test_meta_merge_keeps_unspecified_keys() {
        let current = ChatMeta {
            assigned_ticket_id: Some(4),
            related_ticket_id: None,
        };
        let patch = ChatMeta {
            assigned_ticket_id: None,
            related_ticket_id: Some(9),
        };

        let merged = current.merge(&patch);
        assert_eq!(merged.assigned_ticket_id, Some(4));
        assert_eq!(merged.related_ticket_id, Some(9));
    }

    #[test]
    fn test_meta_merge_overwrites_specified_keys() {
        let current = ChatMeta {
            assigned_ticket_id: Some(4),
            related_ticket_id: Some(5),
        };
        let patch = ChatMeta {
            assigned_ticket_id: Some(6),
            related_ticket_id: None,
        };

        let merged = current.merge(&patch);
        assert_eq!(merged.assigned_ticket_id, Some(6));
        assert_eq!(merged.related_ticket_id, Some(5));
    }

    #[test]
    fn test_meta_empty_patch_is_identity() {
        let current = ChatMeta {
            assigned_ticket_id: Some(1),
            related_ticket_id: Some(2),
        };
        assert_eq!(current.merge(&ChatMeta::default()), current);
    }

    #[test]
    fn test_meta_serializes_without_empty_keys() {
        let json = serde_json::to_value(ChatMeta::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
