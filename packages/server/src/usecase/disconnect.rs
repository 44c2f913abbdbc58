//! UseCase: 接続クローズ処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - DisconnectUseCase::execute() メソッド
//! - 接続破棄に伴うカスケード削除（グループ離脱、フィード detach、
//!   タイマー失効、永続タイピングエントリの削除）
//!
//! ### なぜこのテストが必要か
//! - 切断時の掃除漏れは、空グループへのゴースト配信・タイマーリーク・
//!   幽霊タイピング表示として現れる
//! - 追い出された古い接続のクローズが、同じ userID の新しい登録を
//!   壊さないことを保証する
//!
//! ### どのような状況を想定しているか
//! - 正常系：最後の購読者の切断（フィード detach あり）
//! - 正常系：他に購読者が残る切断（detach なし）
//! - エッジケース：追い出し済み接続のクローズ

use std::sync::Arc;

use crate::domain::{ConnectionId, TypingStore};
use crate::infrastructure::bridge::ChangeFeedBridge;
use crate::infrastructure::hub::ConnectionHub;

/// 接続クローズのユースケース
pub struct DisconnectUseCase {
    /// 接続ハブ
    hub: Arc<ConnectionHub>,
    /// 変更フィードブリッジ（detach の窓口）
    bridge: Arc<ChangeFeedBridge>,
    /// タイピング状態ストア（永続エントリの削除）
    typing_store: Arc<dyn TypingStore>,
}

impl DisconnectUseCase {
    /// 新しい DisconnectUseCase を作成
    pub fn new(
        hub: Arc<ConnectionHub>,
        bridge: Arc<ChangeFeedBridge>,
        typing_store: Arc<dyn TypingStore>,
    ) -> Self {
        Self {
            hub,
            bridge,
            typing_store,
        }
    }

    /// 接続クローズを実行
    ///
    /// ユーザは消えるので user_typing の false ブロードキャストはしない。
    pub async fn execute(&self, connection_id: &ConnectionId) {
        // 1. ハブから接続を外す（束縛を所有していればカスケード情報が返る）
        let Some(cleanup) = self.hub.remove_connection(connection_id).await else {
            tracing::debug!("Connection '{}' was already removed", connection_id);
            return;
        };
        let Some(user_id) = cleanup.user_id else {
            tracing::info!("Connection '{}' closed without user binding", connection_id);
            return;
        };

        // 2. 保留タイマーの失効と永続エントリの削除
        for (group_id, timer) in cleanup.typing_timers {
            timer.abort.abort();
            if let Err(e) = self.typing_store.remove(&group_id, &user_id).await {
                tracing::warn!(
                    "Failed to clear typing entry for '{}' in '{}': {}",
                    user_id,
                    group_id,
                    e
                );
            }
        }

        // 3. 空になったグループのフィードを detach
        for group_id in &cleanup.emptied_groups {
            self.bridge.detach_group(group_id).await;
        }

        tracing::info!(
            "User '{}' ({}) disconnected, left {} group(s)",
            cleanup.username.as_deref().unwrap_or("unknown"),
            user_id,
            cleanup.left_groups.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kakehashi_shared::time::FixedClock;

    use crate::domain::{
        ConnectionIdFactory, GroupId, Timestamp, TypingEntry, UserId, TYPING_TIMEOUT_MS,
    };
    use crate::infrastructure::hub::{OutboundFrame, TypingTimer};
    use crate::infrastructure::store::InMemoryStore;
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<InMemoryStore>,
        hub: Arc<ConnectionHub>,
        bridge: Arc<ChangeFeedBridge>,
        usecase: DisconnectUseCase,
    }

    fn create_fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(1_700_000_000_000));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let hub = Arc::new(ConnectionHub::new());
        let bridge = Arc::new(ChangeFeedBridge::new(
            store.clone(),
            hub.clone(),
            clock,
            TYPING_TIMEOUT_MS,
        ));
        let usecase = DisconnectUseCase::new(hub.clone(), bridge.clone(), store.clone());
        Fixture {
            store,
            hub,
            bridge,
            usecase,
        }
    }

    fn group(raw: &str) -> GroupId {
        GroupId::new(raw.to_string()).unwrap()
    }

    fn user(raw: &str) -> UserId {
        UserId::new(raw.to_string()).unwrap()
    }

    async fn connect_registered(
        hub: &ConnectionHub,
        user_id: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<OutboundFrame>) {
        let connection_id = ConnectionIdFactory::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.add_connection(connection_id.clone(), tx).await;
        hub.register_user(&connection_id, user(user_id), user_id.to_string())
            .await
            .unwrap();
        (connection_id, rx)
    }

    #[tokio::test]
    async fn test_disconnect_of_last_subscriber_detaches_feed() {
        // テスト項目: 最後の購読者の切断で購読解除とフィード detach が行われる
        // given (前提条件):
        let fixture = create_fixture();
        let (alice_connection, _rx) = connect_registered(&fixture.hub, "alice").await;
        fixture
            .hub
            .join_group(group("g1"), user("alice"))
            .await
            .unwrap();
        fixture.bridge.attach_group(group("g1")).await;

        // when (操作):
        fixture.usecase.execute(&alice_connection).await;

        // then (期待する結果): 購読もフィードも残っていない
        assert_eq!(fixture.hub.group_subscriber_count(&group("g1")).await, 0);
        assert_eq!(fixture.bridge.attached_group_count().await, 0);
        assert_eq!(fixture.store.feed_subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_feed_for_remaining_subscribers() {
        // テスト項目: 他の購読者が残っている場合はフィードを detach しない
        // given (前提条件):
        let fixture = create_fixture();
        let (alice_connection, _alice_rx) = connect_registered(&fixture.hub, "alice").await;
        let (_bob_connection, _bob_rx) = connect_registered(&fixture.hub, "bob").await;
        fixture
            .hub
            .join_group(group("g1"), user("alice"))
            .await
            .unwrap();
        fixture
            .hub
            .join_group(group("g1"), user("bob"))
            .await
            .unwrap();
        fixture.bridge.attach_group(group("g1")).await;

        // when (操作):
        fixture.usecase.execute(&alice_connection).await;

        // then (期待する結果):
        assert_eq!(fixture.hub.group_subscriber_count(&group("g1")).await, 1);
        assert_eq!(fixture.bridge.attached_group_count().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_aborts_timers_and_clears_typing_entries() {
        // テスト項目: 切断でタイマーが失効し、永続タイピングエントリが消える
        // given (前提条件):
        let fixture = create_fixture();
        let (alice_connection, _rx) = connect_registered(&fixture.hub, "alice").await;
        fixture
            .hub
            .join_group(group("g1"), user("alice"))
            .await
            .unwrap();

        fixture
            .store
            .set(
                &group("g1"),
                &user("alice"),
                TypingEntry {
                    username: "alice".to_string(),
                    last_typed_at: Timestamp::new(1_700_000_000_000),
                },
            )
            .await
            .unwrap();
        let timer_task = tokio::spawn(std::future::pending::<()>());
        fixture
            .hub
            .arm_typing_timer(
                (group("g1"), user("alice")),
                TypingTimer {
                    generation: 1,
                    abort: timer_task.abort_handle(),
                },
            )
            .await;

        // when (操作):
        fixture.usecase.execute(&alice_connection).await;

        // then (期待する結果): タイマーは中断され、エントリも消えている
        assert!(timer_task.await.unwrap_err().is_cancelled());
        let snapshot = fixture.store.snapshot(&group("g1")).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_of_evicted_connection_is_harmless() {
        // テスト項目: 追い出し済み接続のクローズが新しい登録の状態を壊さない
        // given (前提条件):
        let fixture = create_fixture();
        let (old_connection, _old_rx) = connect_registered(&fixture.hub, "alice").await;
        fixture
            .hub
            .join_group(group("g1"), user("alice"))
            .await
            .unwrap();
        fixture.bridge.attach_group(group("g1")).await;
        let (_new_connection, _new_rx) = connect_registered(&fixture.hub, "alice").await;

        // when (操作): 追い出された古い接続のクローズ処理
        fixture.usecase.execute(&old_connection).await;

        // then (期待する結果): 購読もフィードもそのまま
        assert_eq!(fixture.hub.group_subscriber_count(&group("g1")).await, 1);
        assert_eq!(fixture.bridge.attached_group_count().await, 1);
        assert!(fixture.hub.is_user_registered(&user("alice")).await);
    }
}
