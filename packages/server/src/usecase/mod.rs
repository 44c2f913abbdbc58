//! UseCase 層
//!
//! 受信エンベロープ 1 種類につき 1 ユースケース。ドメイン層の
//! コラボレータ trait とハブにだけ依存し、トランスポートには依存しない。

pub mod error;

mod disconnect;
mod join_group;
mod reaction;
mod register_user;
mod send_message;
mod typing;

pub use disconnect::DisconnectUseCase;
pub use error::{JoinError, ReactionError, RegisterError, SendMessageError, TypingError};
pub use join_group::JoinGroupUseCase;
pub use reaction::ReactionUseCase;
pub use register_user::RegisterUserUseCase;
pub use send_message::SendMessageUseCase;
pub use typing::TypingUseCase;
