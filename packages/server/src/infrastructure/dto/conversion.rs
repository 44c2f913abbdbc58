//! Conversion logic between DTOs and domain entities.

use kakehashi_shared::time::timestamp_to_jst_rfc3339;

use crate::domain::entity;
use crate::infrastructure::dto::{http, websocket as dto};

// ========================================
// Domain Entity → DTO
// ========================================

impl From<entity::ChatMessage> for dto::MessageDto {
    fn from(model: entity::ChatMessage) -> Self {
        Self {
            id: model.id.into_string(),
            sender_id: model.sender_id.into_string(),
            sender_username: model.sender_username,
            sender_avatar: model.sender_avatar,
            encrypted_content: model.encrypted_content.into_string(),
            timestamp: model.timestamp.value(),
            reply_to_message_id: model.reply_to_message_id.map(|id| id.into_string()),
            reactions: model.reactions,
        }
    }
}

impl From<entity::GroupMember> for dto::GroupMemberDto {
    fn from(model: entity::GroupMember) -> Self {
        Self {
            joined_at: model.joined_at.value(),
            role: model.role,
        }
    }
}

impl From<entity::ChatGroup> for dto::GroupChatDto {
    fn from(model: entity::ChatGroup) -> Self {
        Self {
            group_id: model.id.into_string(),
            name: model.name,
            description: model.description,
            group_type: model.group_type,
            created_by_user_id: model.created_by.into_string(),
            created_at: model.created_at.value(),
            member_count: model.member_count,
            members: model
                .members
                .into_iter()
                .map(|(user_id, member)| (user_id, member.into()))
                .collect(),
        }
    }
}

impl From<entity::LeaderboardEntry> for dto::LeaderboardEntryDto {
    fn from(model: entity::LeaderboardEntry) -> Self {
        Self {
            user_id: model.user_id.into_string(),
            username: model.username,
            points: model.points,
        }
    }
}

impl From<entity::UserProfile> for http::UserSetupDto {
    fn from(model: entity::UserProfile) -> Self {
        Self {
            user_id: model.id.into_string(),
            username: model.username,
            avatar: model.avatar,
        }
    }
}

impl From<entity::UserProfile> for http::UserProfileDto {
    fn from(model: entity::UserProfile) -> Self {
        Self {
            user_id: model.id.into_string(),
            username: model.username,
            avatar: model.avatar,
            points: model.points,
            created_at: timestamp_to_jst_rfc3339(model.created_at.value()),
        }
    }
}

/// Build an `activeTypers` entry from a persisted typing record.
pub fn active_typer_from_entry(user_id: &str, entry: &entity::TypingEntry) -> dto::ActiveTyperDto {
    dto::ActiveTyperDto {
        user_id: user_id.to_string(),
        username: entry.username.clone(),
        is_typing: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::domain::{
        EncryptedContent, GroupId, MessageId, Timestamp, TypingEntry, UserId, UserProfile,
    };

    #[test]
    fn test_domain_chat_message_to_dto() {
        // テスト項目: ドメインの ChatMessage が DTO に変換される
        // given (前提条件):
        let message = entity::ChatMessage {
            id: MessageId::new("m1".to_string()).unwrap(),
            sender_id: UserId::new("u1".to_string()).unwrap(),
            sender_username: "alice".to_string(),
            sender_avatar: "https://example.com/a.png".to_string(),
            encrypted_content: EncryptedContent::new("opaque".to_string()).unwrap(),
            timestamp: Timestamp::new(1000),
            reply_to_message_id: Some(MessageId::new("m0".to_string()).unwrap()),
            reactions: BTreeMap::new(),
        };

        // when (操作):
        let dto: dto::MessageDto = message.into();

        // then (期待する結果):
        assert_eq!(dto.id, "m1");
        assert_eq!(dto.sender_id, "u1");
        assert_eq!(dto.sender_username, "alice");
        assert_eq!(dto.encrypted_content, "opaque");
        assert_eq!(dto.timestamp, 1000);
        assert_eq!(dto.reply_to_message_id, Some("m0".to_string()));
    }

    #[test]
    fn test_domain_chat_group_to_dto() {
        // テスト項目: ドメインの ChatGroup が DTO に変換される
        // given (前提条件):
        let mut members = BTreeMap::new();
        members.insert(
            "u1".to_string(),
            entity::GroupMember {
                joined_at: Timestamp::new(500),
                role: "admin".to_string(),
            },
        );
        let chat_group = entity::ChatGroup {
            id: GroupId::new("g1".to_string()).unwrap(),
            name: "rust-jp".to_string(),
            description: String::new(),
            group_type: "public".to_string(),
            created_by: UserId::new("u1".to_string()).unwrap(),
            created_at: Timestamp::new(500),
            member_count: 1,
            members,
        };

        // when (操作):
        let dto: dto::GroupChatDto = chat_group.into();

        // then (期待する結果):
        assert_eq!(dto.group_id, "g1");
        assert_eq!(dto.group_type, "public");
        assert_eq!(dto.members.get("u1").unwrap().role, "admin");
    }

    #[test]
    fn test_user_profile_to_http_dtos() {
        // テスト項目: UserProfile が setup 用と profile 用の DTO に変換される
        // given (前提条件):
        let profile = UserProfile {
            id: UserId::new("u1".to_string()).unwrap(),
            username: "alice".to_string(),
            avatar: "https://example.com/a.png".to_string(),
            points: 7,
            created_at: Timestamp::new(1672498800000),
        };

        // when (操作):
        let setup: http::UserSetupDto = profile.clone().into();
        let full: http::UserProfileDto = profile.into();

        // then (期待する結果):
        assert_eq!(setup.user_id, "u1");
        assert_eq!(full.points, 7);
        assert!(full.created_at.contains("+09:00"));
    }

    #[test]
    fn test_active_typer_from_entry() {
        // テスト項目: TypingEntry から activeTypers の要素が組み立てられる
        // given (前提条件):
        let entry = TypingEntry {
            username: "alice".to_string(),
            last_typed_at: Timestamp::new(1000),
        };

        // when (操作):
        let typer = active_typer_from_entry("u1", &entry);

        // then (期待する結果):
        assert_eq!(typer.user_id, "u1");
        assert_eq!(typer.username, "alice");
        assert!(typer.is_typing);
    }
}
