//! Server state shared across handlers.

use std::sync::Arc;

use crate::domain::{GroupDirectory, MessageStore, UserDirectory};
use crate::infrastructure::hub::ConnectionHub;
use crate::usecase::{
    DisconnectUseCase, JoinGroupUseCase, ReactionUseCase, RegisterUserUseCase, SendMessageUseCase,
    TypingUseCase,
};

/// Shared application state
pub struct AppState {
    /// 接続ハブ（エラー応答の push 用）
    pub hub: Arc<ConnectionHub>,
    /// RegisterUserUseCase（ユーザ登録のユースケース）
    pub register_user_usecase: Arc<RegisterUserUseCase>,
    /// JoinGroupUseCase（グループ参加のユースケース）
    pub join_group_usecase: Arc<JoinGroupUseCase>,
    /// DisconnectUseCase（接続クローズのユースケース）
    pub disconnect_usecase: Arc<DisconnectUseCase>,
    /// SendMessageUseCase（メッセージ送信のユースケース）
    pub send_message_usecase: Arc<SendMessageUseCase>,
    /// ReactionUseCase（リアクションのユースケース）
    pub reaction_usecase: Arc<ReactionUseCase>,
    /// TypingUseCase（タイピングインジケータのユースケース）
    pub typing_usecase: Arc<TypingUseCase>,
    /// UserDirectory（HTTP CRUD 用）
    pub users: Arc<dyn UserDirectory>,
    /// GroupDirectory（HTTP CRUD 用）
    pub groups: Arc<dyn GroupDirectory>,
    /// MessageStore（HTTP CRUD 用）
    pub messages: Arc<dyn MessageStore>,
}
