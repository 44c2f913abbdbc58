//! Domain-level error definitions.

use thiserror::Error;

/// Validation failure of a domain value object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{0} exceeds the maximum length of {1} characters")]
    TooLong(&'static str, usize),
}

/// Failure reported by a backing-store collaborator.
///
/// 具体的なストア実装（InMemory, 将来の RDB など）が返すエラーを
/// ドメイン層の語彙に揃えるための型。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("backing store unavailable: {0}")]
    Unavailable(String),
}
