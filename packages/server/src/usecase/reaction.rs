//! UseCase: リアクション処理（add_reaction / remove_reaction）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ReactionUseCase::add() / remove() メソッド
//! - リアクションの冪等な付け外しと作者への +3 ポイント
//!
//! ### なぜこのテストが必要か
//! - 同じリアクションの再追加でポイントが二重に付かないこと
//!   （ストアの「新規追加」フラグに依存している）を保証する
//! - 自分のメッセージへのリアクションにポイントが付かないことを保証する
//!
//! ### どのような状況を想定しているか
//! - 正常系：他人のメッセージへのリアクション追加・削除
//! - エッジケース：再追加、存在しないリアクションの削除、自己リアクション
//! - 異常系：存在しないメッセージ、空フィールド

use std::sync::Arc;

use crate::domain::{
    gamification, DomainError, GamificationLedger, GroupId, MessageId, MessageStore, UserId,
};

use super::error::ReactionError;

/// リアクションのユースケース
pub struct ReactionUseCase {
    /// メッセージストア（リアクションの付け外し・作者の解決）
    messages: Arc<dyn MessageStore>,
    /// ポイント台帳
    ledger: Arc<dyn GamificationLedger>,
}

impl ReactionUseCase {
    /// 新しい ReactionUseCase を作成
    pub fn new(messages: Arc<dyn MessageStore>, ledger: Arc<dyn GamificationLedger>) -> Self {
        Self { messages, ledger }
    }

    /// リアクション追加を実行
    ///
    /// 新規に追加された場合のみ、作者（リアクションした本人以外）に +3。
    /// ブロードキャストはストア経由（item-changed → fan-out）。
    pub async fn add(
        &self,
        group_id: String,
        message_id: String,
        user_id: String,
        emoji: String,
    ) -> Result<(), ReactionError> {
        // 1. バリデーション
        let (group_id, message_id, user_id, emoji) =
            validate(group_id, message_id, user_id, emoji)?;

        // 2. (group, message, emoji, user) のフラグを立てる（冪等）
        let newly_added = self
            .messages
            .set_reaction(&group_id, &message_id, &user_id, &emoji)
            .await?;
        tracing::info!(
            "User '{}' reacted with {} to message '{}' in group '{}'",
            user_id,
            emoji,
            message_id,
            group_id
        );

        // 3. 新規追加のときだけ作者に +3（自己リアクションは対象外）
        if newly_added {
            if let Some(message) = self
                .messages
                .get_message_by_id(&group_id, &message_id)
                .await?
            {
                if message.sender_id != user_id {
                    self.grant_points(&message.sender_id, gamification::REACTION_RECEIVED)
                        .await;
                }
            }
        }
        Ok(())
    }

    /// リアクション削除を実行（冪等、ポイントの返還はしない）
    pub async fn remove(
        &self,
        group_id: String,
        message_id: String,
        user_id: String,
        emoji: String,
    ) -> Result<(), ReactionError> {
        let (group_id, message_id, user_id, emoji) =
            validate(group_id, message_id, user_id, emoji)?;

        self.messages
            .remove_reaction(&group_id, &message_id, &user_id, &emoji)
            .await?;
        tracing::info!(
            "User '{}' removed reaction {} from message '{}' in group '{}'",
            user_id,
            emoji,
            message_id,
            group_id
        );
        Ok(())
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

fn validate(
    group_id: String,
    message_id: String,
    user_id: String,
    emoji: String,
) -> Result<(GroupId, MessageId, UserId, String), ReactionError> {
    let group_id = GroupId::new(group_id)?;
    let message_id = MessageId::new(message_id)?;
    let user_id = UserId::new(user_id)?;
    if emoji.is_empty() {
        return Err(DomainError::EmptyField("emoji").into());
    }
    Ok((group_id, message_id, user_id, emoji))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use kakehashi_shared::time::FixedClock;
    use tokio::sync::Mutex;

    use crate::domain::{
        ChatMessage, EncryptedContent, StoreError, Timestamp,
    };
    use crate::infrastructure::store::InMemoryStore;

    /// 加算呼び出しを記録する台帳モック
    struct RecordingLedger {
        grants: Mutex<Vec<(String, i64)>>,
    }

    impl RecordingLedger {
        fn new() -> Self {
            Self {
                grants: Mutex::new(Vec::new()),
            }
        }

        async fn recorded(&self) -> Vec<(String, i64)> {
            self.grants.lock().await.clone()
        }
    }

    #[async_trait]
    impl GamificationLedger for RecordingLedger {
        async fn increment_points(&self, user_id: &UserId, amount: i64) -> Result<i64, StoreError> {
            let mut grants = self.grants.lock().await;
            grants.push((user_id.as_str().to_string(), amount));
            Ok(amount)
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        ledger: Arc<RecordingLedger>,
        usecase: ReactionUseCase,
    }

    fn create_fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new(Arc::new(FixedClock::new(
            1_700_000_000_000,
        ))));
        let ledger = Arc::new(RecordingLedger::new());
        let usecase = ReactionUseCase::new(store.clone(), ledger.clone());
        Fixture {
            store,
            ledger,
            usecase,
        }
    }

    fn group(raw: &str) -> GroupId {
        GroupId::new(raw.to_string()).unwrap()
    }

    async fn seed_message(store: &InMemoryStore, id: &str, sender: &str) {
        let message = ChatMessage {
            id: MessageId::new(id.to_string()).unwrap(),
            sender_id: UserId::new(sender.to_string()).unwrap(),
            sender_username: sender.to_string(),
            sender_avatar: "https://example.com/a.png".to_string(),
            encrypted_content: EncryptedContent::new("opaque".to_string()).unwrap(),
            timestamp: Timestamp::new(1000),
            reply_to_message_id: None,
            reactions: BTreeMap::new(),
        };
        store.append(&group("g1"), message).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_reaction_grants_author_exactly_once() {
        // テスト項目: 他人のメッセージへのリアクションで作者に +3 が 1 回だけ付く
        // given (前提条件): alice のメッセージが存在する
        let fixture = create_fixture();
        seed_message(&fixture.store, "m1", "alice").await;

        // when (操作): bob が同じリアクションを 2 回送る
        fixture
            .usecase
            .add(
                "g1".to_string(),
                "m1".to_string(),
                "bob".to_string(),
                "👍".to_string(),
            )
            .await
            .unwrap();
        fixture
            .usecase
            .add(
                "g1".to_string(),
                "m1".to_string(),
                "bob".to_string(),
                "👍".to_string(),
            )
            .await
            .unwrap();

        // then (期待する結果): +3 は 1 回だけ
        assert_eq!(
            fixture.ledger.recorded().await,
            vec![("alice".to_string(), gamification::REACTION_RECEIVED)]
        );
    }

    #[tokio::test]
    async fn test_self_reaction_grants_no_points() {
        // テスト項目: 自分のメッセージへのリアクションにはポイントが付かない
        // given (前提条件):
        let fixture = create_fixture();
        seed_message(&fixture.store, "m1", "alice").await;

        // when (操作): alice が自分のメッセージにリアクション
        fixture
            .usecase
            .add(
                "g1".to_string(),
                "m1".to_string(),
                "alice".to_string(),
                "👍".to_string(),
            )
            .await
            .unwrap();

        // then (期待する結果):
        assert!(fixture.ledger.recorded().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_reaction_is_idempotent_and_keeps_points() {
        // テスト項目: リアクション削除は冪等で、ポイントの返還もない
        // given (前提条件):
        let fixture = create_fixture();
        seed_message(&fixture.store, "m1", "alice").await;
        fixture
            .usecase
            .add(
                "g1".to_string(),
                "m1".to_string(),
                "bob".to_string(),
                "👍".to_string(),
            )
            .await
            .unwrap();

        // when (操作): 2 回削除する
        fixture
            .usecase
            .remove(
                "g1".to_string(),
                "m1".to_string(),
                "bob".to_string(),
                "👍".to_string(),
            )
            .await
            .unwrap();
        fixture
            .usecase
            .remove(
                "g1".to_string(),
                "m1".to_string(),
                "bob".to_string(),
                "👍".to_string(),
            )
            .await
            .unwrap();

        // then (期待する結果): リアクションは消え、+3 の記録はそのまま
        let message = fixture
            .store
            .get_message_by_id(&group("g1"), &MessageId::new("m1".to_string()).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(message.reactions.is_empty());
        assert_eq!(
            fixture.ledger.recorded().await,
            vec![("alice".to_string(), gamification::REACTION_RECEIVED)]
        );
    }

    #[tokio::test]
    async fn test_reaction_to_missing_message_is_rejected() {
        // テスト項目: 存在しないメッセージへのリアクションがエラーになる
        // given (前提条件):
        let fixture = create_fixture();

        // when (操作):
        let result = fixture
            .usecase
            .add(
                "g1".to_string(),
                "missing".to_string(),
                "bob".to_string(),
                "👍".to_string(),
            )
            .await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ReactionError::Store(StoreError::MessageNotFound(
                "missing".to_string()
            )))
        );
        assert!(fixture.ledger.recorded().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_emoji_is_rejected() {
        // テスト項目: 空の emoji がバリデーションエラーになる
        // given (前提条件):
        let fixture = create_fixture();
        seed_message(&fixture.store, "m1", "alice").await;

        // when (操作):
        let result = fixture
            .usecase
            .add(
                "g1".to_string(),
                "m1".to_string(),
                "bob".to_string(),
                String::new(),
            )
            .await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ReactionError::Validation(DomainError::EmptyField("emoji")))
        );
    }
}
