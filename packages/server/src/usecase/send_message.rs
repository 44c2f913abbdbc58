//! UseCase: メッセージ送信処理（send_message）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - メッセージの組み立て（デノーマライズ）と永続化、ポイント付与、
//!   タイピング状態の強制 Idle
//!
//! ### なぜこのテストが必要か
//! - 送信 +1 / 返信 +2 のポイント付与はここでしか行われない。
//!   自己返信にボーナスが付かないこと、台帳障害がクライアントに
//!   漏れないこと（ベストエフォート）を保証する
//! - ハンドラは直接ブロードキャストしない。ストア追加だけが配信の
//!   引き金であることを確認する
//!
//! ### どのような状況を想定しているか
//! - 正常系：通常送信、返信ボーナスつき送信
//! - エッジケース：自己返信、存在しない返信先
//! - 異常系：存在しない送信者、空フィールド、台帳障害

use std::collections::BTreeMap;
use std::sync::Arc;

use kakehashi_shared::time::Clock;

use crate::domain::{
    gamification, ChatMessage, EncryptedContent, GamificationLedger, GroupId, MessageId,
    MessageIdFactory, MessageStore, Timestamp, UserDirectory, UserId,
};

use super::error::SendMessageError;
use super::typing::TypingUseCase;

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    /// ユーザディレクトリ（送信者プロフィールの解決）
    users: Arc<dyn UserDirectory>,
    /// メッセージストア（追加・返信先の解決）
    messages: Arc<dyn MessageStore>,
    /// ポイント台帳
    ledger: Arc<dyn GamificationLedger>,
    /// タイピング状態機械（送信成功で Idle へ落とす）
    typing: Arc<TypingUseCase>,
    /// 時刻源
    clock: Arc<dyn Clock>,
}

impl SendMessageUseCase {
    /// 新しい SendMessageUseCase を作成
    pub fn new(
        users: Arc<dyn UserDirectory>,
        messages: Arc<dyn MessageStore>,
        ledger: Arc<dyn GamificationLedger>,
        typing: Arc<TypingUseCase>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            messages,
            ledger,
            typing,
            clock,
        }
    }

    /// メッセージ送信を実行
    ///
    /// 配信はストア経由（change feed → fan-out）で行われるため、ここでは
    /// ブロードキャストしない。
    ///
    /// # Returns
    ///
    /// * `Ok(MessageId)` - 永続化されたメッセージの ID
    /// * `Err(SendMessageError)` - 送信失敗（状態は変更されない）
    pub async fn execute(
        &self,
        group_id: String,
        sender_id: String,
        encrypted_content: String,
        reply_to_message_id: Option<String>,
    ) -> Result<MessageId, SendMessageError> {
        // 1. バリデーション
        let group_id = GroupId::new(group_id)?;
        let sender_id = UserId::new(sender_id)?;
        let encrypted_content = EncryptedContent::new(encrypted_content)?;
        let reply_to_message_id = reply_to_message_id.map(MessageId::new).transpose()?;

        // 2. 送信者プロフィールの解決（username / avatar のデノーマライズ）
        let Some(sender) = self.users.get_user_by_id(&sender_id).await? else {
            return Err(SendMessageError::SenderNotFound(
                sender_id.as_str().to_string(),
            ));
        };

        // 3. メッセージを組み立てて永続化
        let message_id = MessageIdFactory::generate();
        let message = ChatMessage {
            id: message_id.clone(),
            sender_id: sender_id.clone(),
            sender_username: sender.username,
            sender_avatar: sender.avatar,
            encrypted_content,
            timestamp: Timestamp::new(self.clock.now_jst_millis()),
            reply_to_message_id: reply_to_message_id.clone(),
            reactions: BTreeMap::new(),
        };
        self.messages.append(&group_id, message).await?;
        tracing::info!(
            "Message '{}' sent to group '{}' by '{}'",
            message_id,
            group_id,
            sender_id
        );

        // 4. 送信者に +1（ベストエフォート）
        self.grant_points(&sender_id, gamification::MESSAGE_SENT)
            .await;

        // 5. 返信なら元メッセージの作者に +2（自己返信にはボーナスなし）
        if let Some(reply_to) = reply_to_message_id {
            if let Some(original) = self.messages.get_message_by_id(&group_id, &reply_to).await? {
                if original.sender_id != sender_id {
                    self.grant_points(&original.sender_id, gamification::REPLY_RECEIVED)
                        .await;
                }
            }
        }

        // 6. 送信成功でタイピング状態を Idle へ
        self.typing.force_idle(&group_id, &sender_id).await;

        Ok(message_id)
    }

    /// ポイント加算（失敗はログに残して握りつぶす）
    async fn grant_points(&self, user_id: &UserId, amount: i64) -> bool {
        match self.ledger.increment_points(user_id, amount).await {
            Ok(total) => {
                tracing::debug!(
                    "User '{}' gained {} point(s), total {}",
                    user_id,
                    amount,
                    total
                );
                true
            }
            Err(e) => {
                tracing::warn!("Failed to grant {} point(s) to '{}': {}", amount, user_id, e);
                false
            }
        }
    }
}
