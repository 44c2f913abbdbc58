//! Value objects of the relay domain.
//!
//! すべての ID はワイヤ上では不透明な文字列として扱われます。ドメイン層に
//! 入る時点で newtype に変換し、空文字列や異常な長さをここで弾きます。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// 文字列 ID の最大長（ワイヤから来る値の防波堤）
const MAX_ID_LEN: usize = 128;

/// 暗号化済みペイロードの最大長（バックエンドは中身を復号しない）
const MAX_ENCRYPTED_CONTENT_LEN: usize = 16 * 1024;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw string.
            pub fn new(value: String) -> Result<Self, DomainError> {
                if value.is_empty() {
                    return Err(DomainError::EmptyField($field));
                }
                if value.len() > MAX_ID_LEN {
                    return Err(DomainError::TooLong($field, MAX_ID_LEN));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a user (directory-issued, opaque).
    UserId,
    "userID"
);
string_id!(
    /// Identifier of a chat group.
    GroupId,
    "groupID"
);
string_id!(
    /// Identifier of a relayed message.
    MessageId,
    "messageID"
);
string_id!(
    /// Identifier of a live transport connection (one per socket, never reused).
    ConnectionId,
    "connectionID"
);

/// UserId を発行するファクトリ
pub struct UserIdFactory;

impl UserIdFactory {
    /// Generate a fresh random user id (UUID v4).
    pub fn generate() -> UserId {
        UserId(Uuid::new_v4().to_string())
    }
}

/// GroupId を発行するファクトリ
pub struct GroupIdFactory;

impl GroupIdFactory {
    /// Generate a fresh random group id (UUID v4).
    pub fn generate() -> GroupId {
        GroupId(Uuid::new_v4().to_string())
    }
}

/// MessageId を発行するファクトリ
pub struct MessageIdFactory;

impl MessageIdFactory {
    /// Generate a fresh random message id (UUID v4).
    pub fn generate() -> MessageId {
        MessageId(Uuid::new_v4().to_string())
    }
}

/// ConnectionId を発行するファクトリ
pub struct ConnectionIdFactory;

impl ConnectionIdFactory {
    /// Generate a fresh random connection id (UUID v4).
    pub fn generate() -> ConnectionId {
        ConnectionId(Uuid::new_v4().to_string())
    }
}

/// Opaque encrypted message payload.
///
/// The backend relays this string verbatim; encryption and decryption are
/// strictly a client concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedContent(String);

impl EncryptedContent {
    pub fn new(value: String) -> Result<Self, DomainError> {
        if value.is_empty() {
            return Err(DomainError::EmptyField("encryptedContent"));
        }
        if value.len() > MAX_ENCRYPTED_CONTENT_LEN {
            return Err(DomainError::TooLong(
                "encryptedContent",
                MAX_ENCRYPTED_CONTENT_LEN,
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Unix timestamp in JST milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}
