//! UseCase 層のエラー定義
//!
//! ここでの Display 文字列はそのまま `error` イベントの `message` として
//! 発信元のクライアントへ返される。

use thiserror::Error;

use crate::domain::{DomainError, StoreError};
use crate::infrastructure::hub::HubError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error(transparent)]
    Hub(#[from] HubError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendMessageError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("sender not found: {0}")]
    SenderNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactionError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypingError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
