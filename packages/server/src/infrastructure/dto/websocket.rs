//! WebSocket envelope DTOs.
//!
//! Every frame on the wire is a JSON text message of the shape
//! `{"type": "...", "payload": {...}}`. Field names follow the client
//! protocol (`userID`, `groupID`, ... — not Rust naming).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Inbound envelope (client → core).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEnvelope {
    RegisterUserWs {
        #[serde(rename = "userID")]
        user_id: String,
        username: String,
    },
    JoinChat {
        #[serde(rename = "groupID")]
        group_id: String,
        #[serde(rename = "userID")]
        user_id: String,
    },
    SendMessage {
        #[serde(rename = "groupID")]
        group_id: String,
        #[serde(rename = "senderID")]
        sender_id: String,
        #[serde(rename = "encryptedContent")]
        encrypted_content: String,
        #[serde(rename = "replyToMessageID", default, skip_serializing_if = "Option::is_none")]
        reply_to_message_id: Option<String>,
    },
    AddReaction {
        #[serde(rename = "groupID")]
        group_id: String,
        #[serde(rename = "messageID")]
        message_id: String,
        #[serde(rename = "userID")]
        user_id: String,
        emoji: String,
    },
    RemoveReaction {
        #[serde(rename = "groupID")]
        group_id: String,
        #[serde(rename = "messageID")]
        message_id: String,
        #[serde(rename = "userID")]
        user_id: String,
        emoji: String,
    },
    Typing {
        #[serde(rename = "groupID")]
        group_id: String,
        #[serde(rename = "userID")]
        user_id: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

/// Outbound envelope (core → client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    NewMessage {
        #[serde(rename = "groupID")]
        group_id: String,
        message: MessageDto,
    },
    MessageUpdated {
        #[serde(rename = "groupID")]
        group_id: String,
        message: MessageDto,
    },
    UserTyping {
        #[serde(rename = "groupID")]
        group_id: String,
        #[serde(rename = "userID")]
        user_id: String,
        username: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    GroupTypingStatus {
        #[serde(rename = "groupID")]
        group_id: String,
        #[serde(rename = "activeTypers")]
        active_typers: Vec<ActiveTyperDto>,
    },
    ChatCreated {
        #[serde(rename = "groupChat")]
        group_chat: GroupChatDto,
    },
    LeaderboardUpdate {
        leaderboard: Vec<LeaderboardEntryDto>,
    },
}

/// A relayed message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: String,
    #[serde(rename = "senderID")]
    pub sender_id: String,
    #[serde(rename = "senderUsername")]
    pub sender_username: String,
    #[serde(rename = "senderAvatar")]
    pub sender_avatar: String,
    #[serde(rename = "encryptedContent")]
    pub encrypted_content: String,
    pub timestamp: i64,
    #[serde(rename = "replyToMessageID", default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
    /// Key: emoji, value: userIDs
    pub reactions: BTreeMap<String, BTreeSet<String>>,
}

/// One entry of `group_typing_status.activeTypers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTyperDto {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub username: String,
    #[serde(rename = "isTyping")]
    pub is_typing: bool,
}

/// A chat group on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupChatDto {
    #[serde(rename = "groupID")]
    pub group_id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub group_type: String,
    #[serde(rename = "createdByUserID")]
    pub created_by_user_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "memberCount")]
    pub member_count: u32,
    /// Key: userID
    pub members: BTreeMap<String, GroupMemberDto>,
}

/// Membership record inside a chat group on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMemberDto {
    #[serde(rename = "joinedAt")]
    pub joined_at: i64,
    pub role: String,
}

/// One row of `leaderboard_update.leaderboard`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntryDto {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub username: String,
    pub points: i64,
}
