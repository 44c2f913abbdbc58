//! Domain entities of the relay.
//!
//! Messages and profiles are owned by the backing store; the structs here are
//! the in-process representation handed across the collaborator interfaces.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::value_object::{EncryptedContent, GroupId, MessageId, Timestamp, UserId};

/// タイピングインジケータの表示継続時間（最後のキー入力からのミリ秒）
pub const TYPING_TIMEOUT_MS: i64 = 7000;

/// A user profile as stored in the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub avatar: String,
    pub points: i64,
    pub created_at: Timestamp,
}

/// Membership record inside a chat group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub joined_at: Timestamp,
    pub role: String,
}

/// A chat group as stored in the group directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatGroup {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub group_type: String,
    pub created_by: UserId,
    pub created_at: Timestamp,
    pub member_count: u32,
    /// Key: userID
    pub members: BTreeMap<String, GroupMember>,
}

/// A relayed chat message.
///
/// 送信者の username / avatar は送信時点でデノーマライズされる。本文は
/// 不透明な暗号化文字列のままリレーされ、バックエンドは復号しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_username: String,
    pub sender_avatar: String,
    pub encrypted_content: EncryptedContent,
    pub timestamp: Timestamp,
    pub reply_to_message_id: Option<MessageId>,
    /// Key: emoji, value: userIDs who reacted with it
    pub reactions: BTreeMap<String, BTreeSet<String>>,
}

impl ChatMessage {
    /// Add a reaction.
    ///
    /// Returns `true` if the reaction was newly inserted, `false` if the user
    /// had already reacted with this emoji (idempotent).
    pub fn add_reaction(&mut self, emoji: &str, user_id: &UserId) -> bool {
        self.reactions
            .entry(emoji.to_string())
            .or_default()
            .insert(user_id.as_str().to_string())
    }

    /// Remove a reaction.
    ///
    /// Returns `true` if a reaction was actually removed. An emoji whose
    /// reactor set becomes empty is pruned from the map.
    pub fn remove_reaction(&mut self, emoji: &str, user_id: &UserId) -> bool {
        let Some(users) = self.reactions.get_mut(emoji) else {
            return false;
        };
        let removed = users.remove(user_id.as_str());
        if users.is_empty() {
            self.reactions.remove(emoji);
        }
        removed
    }
}

/// Persisted typing-indicator entry for one (group, user) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEntry {
    pub username: String,
    pub last_typed_at: Timestamp,
}

impl TypingEntry {
    /// タイピング状態がまだ有効か（最後の入力から `window_ms` 未満か）を判定
    ///
    /// ローカルタイマーの発火と永続ストアの反映にはズレがあり得るため、
    /// 配信時点の `now` で毎回評価し直す。
    pub fn is_active(&self, now: Timestamp, window_ms: i64) -> bool {
        now.value() - self.last_typed_at.value() < window_ms
    }
}

/// One row of the gamification leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub username: String,
    pub points: i64,
}
