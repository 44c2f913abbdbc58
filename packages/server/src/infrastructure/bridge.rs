//! 変更フィードブリッジ
//!
//! ## 責務
//!
//! - ローカル購読者が 1 人以上いるグループごとに、ストアの変更フィード
//!   （item-added / item-changed / state-changed）を購読する
//! - 届いた通知を配信イベントに変換してハブのファンアウトへ渡す
//! - グローバルフィード（グループ新規作成、リーダーボード変動）を全接続へ中継する
//!
//! ## 設計ノート
//!
//! 購読は参照カウント相当で管理する: グループの購読者数が 0→1 になったとき
//! だけ attach し、1→0 で detach する。join のたびに購読し直すと同じ通知が
//! 人数分ファンアウトされてしまう。
//!
//! state-changed は永続スナップショットをそのまま流さない。ローカルタイマー
//! の発火とストアへの反映はずれることがあるため、配信時点の時刻で有効な
//! エントリだけを選び直して `group_typing_status` を組み立てる。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use kakehashi_shared::time::Clock;

use crate::domain::{
    ChangeFeed, FeedClass, FeedEvent, FeedScope, GroupId, SubscriptionId, Timestamp,
};
use crate::infrastructure::dto::conversion::active_typer_from_entry;
use crate::infrastructure::dto::websocket::ServerEvent;
use crate::infrastructure::hub::ConnectionHub;

struct GroupAttachment {
    subscription_ids: Vec<SubscriptionId>,
    forwarder: JoinHandle<()>,
}

struct GlobalAttachment {
    #[allow(dead_code)]
    subscription_ids: Vec<SubscriptionId>,
    forwarder: JoinHandle<()>,
}

/// ストアの変更通知とソケット配信の橋渡し
pub struct ChangeFeedBridge {
    feed: Arc<dyn ChangeFeed>,
    hub: Arc<ConnectionHub>,
    clock: Arc<dyn Clock>,
    typing_window_ms: i64,
    /// Key: groupID — attach 済みのグループ
    attachments: Mutex<HashMap<GroupId, GroupAttachment>>,
    global: Mutex<Option<GlobalAttachment>>,
}

impl ChangeFeedBridge {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        hub: Arc<ConnectionHub>,
        clock: Arc<dyn Clock>,
        typing_window_ms: i64,
    ) -> Self {
        Self {
            feed,
            hub,
            clock,
            typing_window_ms,
            attachments: Mutex::new(HashMap::new()),
            global: Mutex::new(None),
        }
    }

    /// グループのフィードを購読する（購読者数 0→1 のときに一度だけ呼ぶ）
    ///
    /// 既に attach 済みなら何もしない（冪等）。
    pub async fn attach_group(&self, group_id: GroupId) {
        let mut attachments = self.attachments.lock().await;
        if attachments.contains_key(&group_id) {
            tracing::debug!("Feed already attached for group '{}'", group_id);
            return;
        }

        let added = self
            .feed
            .subscribe(FeedScope::Group(group_id.clone()), FeedClass::MessageAdded)
            .await;
        let changed = self
            .feed
            .subscribe(FeedScope::Group(group_id.clone()), FeedClass::MessageChanged)
            .await;
        let typing = self
            .feed
            .subscribe(FeedScope::Group(group_id.clone()), FeedClass::TypingChanged)
            .await;

        let subscription_ids = vec![added.id, changed.id, typing.id];
        let forwarder = tokio::spawn(run_group_forwarder(
            self.hub.clone(),
            self.clock.clone(),
            self.typing_window_ms,
            added.receiver,
            changed.receiver,
            typing.receiver,
        ));
        attachments.insert(
            group_id.clone(),
            GroupAttachment {
                subscription_ids,
                forwarder,
            },
        );
        tracing::info!("Attached change feed for group '{}'", group_id);
    }

    /// グループのフィード購読を解除する（購読者数 1→0 のときに呼ぶ）
    pub async fn detach_group(&self, group_id: &GroupId) {
        let attachment = {
            let mut attachments = self.attachments.lock().await;
            attachments.remove(group_id)
        };
        let Some(attachment) = attachment else {
            return;
        };
        for subscription_id in attachment.subscription_ids {
            self.feed.unsubscribe(subscription_id).await;
        }
        attachment.forwarder.abort();
        tracing::info!("Detached change feed for group '{}'", group_id);
    }

    /// グローバルフィード（chat_created / leaderboard_update）を購読する
    ///
    /// サーバ起動時に一度だけ呼ばれ、プロセスの寿命まで生き続ける。
    pub async fn attach_global(&self) {
        let mut global = self.global.lock().await;
        if global.is_some() {
            return;
        }

        let created = self
            .feed
            .subscribe(FeedScope::Global, FeedClass::GroupCreated)
            .await;
        let leaderboard = self
            .feed
            .subscribe(FeedScope::Global, FeedClass::LeaderboardChanged)
            .await;

        let subscription_ids = vec![created.id, leaderboard.id];
        let forwarder = tokio::spawn(run_global_forwarder(
            self.hub.clone(),
            created.receiver,
            leaderboard.receiver,
        ));
        *global = Some(GlobalAttachment {
            subscription_ids,
            forwarder,
        });
        tracing::info!("Attached global change feeds");
    }

    /// attach 済みグループ数（診断・テスト用）
    pub async fn attached_group_count(&self) -> usize {
        let attachments = self.attachments.lock().await;
        attachments.len()
    }
}

impl Drop for ChangeFeedBridge {
    fn drop(&mut self) {
        // Forwarder tasks hold no bridge references; stop them with the bridge.
        if let Ok(attachments) = self.attachments.try_lock() {
            for attachment in attachments.values() {
                attachment.forwarder.abort();
            }
        }
        if let Ok(global) = self.global.try_lock() {
            if let Some(attachment) = global.as_ref() {
                attachment.forwarder.abort();
            }
        }
    }
}

/// 1 グループ分の転送ループ（3 クラスの購読チャンネルをマージする）
async fn run_group_forwarder(
    hub: Arc<ConnectionHub>,
    clock: Arc<dyn Clock>,
    typing_window_ms: i64,
    mut added_rx: mpsc::UnboundedReceiver<FeedEvent>,
    mut changed_rx: mpsc::UnboundedReceiver<FeedEvent>,
    mut typing_rx: mpsc::UnboundedReceiver<FeedEvent>,
) {
    loop {
        let event = tokio::select! {
            Some(event) = added_rx.recv() => event,
            Some(event) = changed_rx.recv() => event,
            Some(event) = typing_rx.recv() => event,
            else => break,
        };
        forward_group_event(&hub, clock.as_ref(), typing_window_ms, event).await;
    }
}

async fn forward_group_event(
    hub: &ConnectionHub,
    clock: &dyn Clock,
    typing_window_ms: i64,
    event: FeedEvent,
) {
    match event {
        FeedEvent::MessageAdded { group_id, message } => {
            let event = ServerEvent::NewMessage {
                group_id: group_id.as_str().to_string(),
                message: message.into(),
            };
            let json = serde_json::to_string(&event).unwrap();
            hub.broadcast_to_group(&group_id, &json, None).await;
        }
        FeedEvent::MessageChanged { group_id, message } => {
            let event = ServerEvent::MessageUpdated {
                group_id: group_id.as_str().to_string(),
                message: message.into(),
            };
            let json = serde_json::to_string(&event).unwrap();
            hub.broadcast_to_group(&group_id, &json, None).await;
        }
        FeedEvent::TypingChanged { group_id, entries } => {
            // 配信時点の時刻で有効なエントリだけを選び直す
            let now = Timestamp::new(clock.now_jst_millis());
            let active_typers = entries
                .iter()
                .filter(|(_, entry)| entry.is_active(now, typing_window_ms))
                .map(|(user_id, entry)| active_typer_from_entry(user_id, entry))
                .collect();
            let event = ServerEvent::GroupTypingStatus {
                group_id: group_id.as_str().to_string(),
                active_typers,
            };
            let json = serde_json::to_string(&event).unwrap();
            hub.broadcast_to_group(&group_id, &json, None).await;
        }
        // グローバルクラスはグループ購読には流れてこない
        other => {
            tracing::warn!("Unexpected event on group feed: {:?}", other.class());
        }
    }
}

/// グローバルフィードの転送ループ
async fn run_global_forwarder(
    hub: Arc<ConnectionHub>,
    mut created_rx: mpsc::UnboundedReceiver<FeedEvent>,
    mut leaderboard_rx: mpsc::UnboundedReceiver<FeedEvent>,
) {
    loop {
        let event = tokio::select! {
            Some(event) = created_rx.recv() => event,
            Some(event) = leaderboard_rx.recv() => event,
            else => break,
        };
        match event {
            FeedEvent::GroupCreated { group } => {
                let event = ServerEvent::ChatCreated {
                    group_chat: group.into(),
                };
                let json = serde_json::to_string(&event).unwrap();
                hub.broadcast_to_all(&json).await;
            }
            FeedEvent::LeaderboardChanged { leaderboard } => {
                let event = ServerEvent::LeaderboardUpdate {
                    leaderboard: leaderboard.into_iter().map(Into::into).collect(),
                };
                let json = serde_json::to_string(&event).unwrap();
                hub.broadcast_to_all(&json).await;
            }
            other => {
                tracing::warn!("Unexpected event on global feed: {:?}", other.class());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use mockall::mock;

    use crate::domain::{
        ChatMessage, EncryptedContent, GamificationLedger, GroupDirectory, MessageId,
        MessageStore, TypingEntry, TypingStore, UserDirectory, UserId, TYPING_TIMEOUT_MS,
    };
    use crate::infrastructure::hub::OutboundFrame;
    use crate::infrastructure::store::InMemoryStore;

    mock! {
        pub TestClock {}

        impl Clock for TestClock {
            fn now_jst_millis(&self) -> i64;
        }
    }

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - ストア変更 → フィード → ハブ配信 という store-mediated な配送経路
    // - attach の冪等性（join ごとの重複購読が起きないこと）
    // - detach 後に配送が止まること
    // - state-changed 配信時の期限切れエントリの除外
    //
    // 【なぜこのテストが必要か】
    // - new_message / message_updated はハンドラから直接配信されず、必ず
    //   この経路を通る。ここが壊れると配信そのものが止まる
    // - 期限切れフィルタはローカルタイマーとストアのずれに対する防御で、
    //   group_typing_status の正しさはこのフィルタだけが保証する
    //
    // 【どのようなシナリオをテストするか】
    // 1. attach 済みグループへの append が両購読者に届く
    // 2. 二重 attach しても購読が増えない
    // 3. detach で配送が止まり購読も解放される
    // 4. 古い typing エントリが activeTypers から除外される
    // 5. グローバルフィード（chat_created / leaderboard_update）
    // ========================================

    const NOW: i64 = 1_700_000_000_000;

    fn group(raw: &str) -> GroupId {
        GroupId::new(raw.to_string()).unwrap()
    }

    fn user(raw: &str) -> UserId {
        UserId::new(raw.to_string()).unwrap()
    }

    fn test_message(id: &str, sender: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(id.to_string()).unwrap(),
            sender_id: user(sender),
            sender_username: sender.to_string(),
            sender_avatar: "https://example.com/a.png".to_string(),
            encrypted_content: EncryptedContent::new("opaque".to_string()).unwrap(),
            timestamp: Timestamp::new(NOW),
            reply_to_message_id: None,
            reactions: BTreeMap::new(),
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        hub: Arc<ConnectionHub>,
        bridge: ChangeFeedBridge,
    }

    fn create_fixture() -> Fixture {
        // 配信時刻の評価を固定する（期限切れフィルタの検証のため）
        let mut clock = MockTestClock::new();
        clock.expect_now_jst_millis().return_const(NOW);
        let clock: Arc<dyn Clock> = Arc::new(clock);

        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let hub = Arc::new(ConnectionHub::new());
        let bridge = ChangeFeedBridge::new(store.clone(), hub.clone(), clock, TYPING_TIMEOUT_MS);
        Fixture { store, hub, bridge }
    }

    async fn connect_registered(
        hub: &ConnectionHub,
        user_id: &str,
    ) -> tokio::sync::mpsc::UnboundedReceiver<OutboundFrame> {
        let connection_id = crate::domain::ConnectionIdFactory::generate();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        hub.add_connection(connection_id.clone(), tx).await;
        hub.register_user(&connection_id, user(user_id), user_id.to_string())
            .await
            .unwrap();
        rx
    }

    async fn recv_event(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<OutboundFrame>,
    ) -> ServerEvent {
        match rx.recv().await {
            Some(OutboundFrame::Event(json)) => serde_json::from_str(&json).unwrap(),
            other => panic!("expected event frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_message_added_is_fanned_out_to_all_subscribers() {
        // テスト項目: append されたメッセージが送信者も含む全購読者に届く
        // given (前提条件):
        let fixture = create_fixture();
        let mut alice_rx = connect_registered(&fixture.hub, "alice").await;
        let mut bob_rx = connect_registered(&fixture.hub, "bob").await;
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

        // when (操作): alice のメッセージがストアへ追加される
        fixture
            .store
            .append(&group("g1"), test_message("m1", "alice"))
            .await
            .unwrap();

        // then (期待する結果): 送信者を除外せず両方に new_message が届く
        for rx in [&mut alice_rx, &mut bob_rx] {
            let event = recv_event(rx).await;
            match event {
                ServerEvent::NewMessage { group_id, message } => {
                    assert_eq!(group_id, "g1");
                    assert_eq!(message.id, "m1");
                    assert_eq!(message.encrypted_content, "opaque");
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_attach_group_is_idempotent() {
        // テスト項目: 同じグループへの二重 attach が購読を増やさない
        // given (前提条件):
        let fixture = create_fixture();

        // when (操作):
        fixture.bridge.attach_group(group("g1")).await;
        fixture.bridge.attach_group(group("g1")).await;

        // then (期待する結果): 購読は 3 クラス分のみ
        assert_eq!(fixture.store.feed_subscriber_count().await, 3);
        assert_eq!(fixture.bridge.attached_group_count().await, 1);
    }

    #[tokio::test]
    async fn test_detach_group_stops_delivery_and_releases_subscriptions() {
        // テスト項目: detach 後はストア変更が誰にも配送されない
        // given (前提条件):
        let fixture = create_fixture();
        let mut alice_rx = connect_registered(&fixture.hub, "alice").await;
        fixture
            .hub
            .join_group(group("g1"), user("alice"))
            .await
            .unwrap();
        fixture.bridge.attach_group(group("g1")).await;

        // when (操作):
        fixture.bridge.detach_group(&group("g1")).await;
        fixture
            .store
            .append(&group("g1"), test_message("m1", "alice"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(fixture.store.feed_subscriber_count().await, 0);
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_group_typing_status_drops_expired_entries() {
        // テスト項目: 配信時点で期限切れの typing エントリが activeTypers に載らない
        // given (前提条件):
        let fixture = create_fixture();
        let mut alice_rx = connect_registered(&fixture.hub, "alice").await;
        fixture
            .hub
            .join_group(group("g1"), user("alice"))
            .await
            .unwrap();
        fixture.bridge.attach_group(group("g1")).await;

        // when (操作): ちょうど期限切れのエントリと有効なエントリを書き込む
        fixture
            .store
            .set(
                &group("g1"),
                &user("stale"),
                TypingEntry {
                    username: "stale".to_string(),
                    last_typed_at: Timestamp::new(NOW - TYPING_TIMEOUT_MS),
                },
            )
            .await
            .unwrap();
        fixture
            .store
            .set(
                &group("g1"),
                &user("fresh"),
                TypingEntry {
                    username: "fresh".to_string(),
                    last_typed_at: Timestamp::new(NOW - 1000),
                },
            )
            .await
            .unwrap();

        // then (期待する結果): 2 通目の group_typing_status に fresh だけが載る
        let _first = recv_event(&mut alice_rx).await;
        let second = recv_event(&mut alice_rx).await;
        match second {
            ServerEvent::GroupTypingStatus {
                group_id,
                active_typers,
            } => {
                assert_eq!(group_id, "g1");
                assert_eq!(active_typers.len(), 1);
                assert_eq!(active_typers[0].user_id, "fresh");
                assert!(active_typers[0].is_typing);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_global_feed_relays_chat_created_and_leaderboard() {
        // テスト項目: グローバルフィードが chat_created / leaderboard_update を全員に中継する
        // given (前提条件):
        let fixture = create_fixture();
        let mut alice_rx = connect_registered(&fixture.hub, "alice").await;
        fixture.bridge.attach_global().await;

        let creator = fixture
            .store
            .create_user("creator".to_string(), None)
            .await
            .unwrap();

        // create_user がリーダーボード変動として流れてくる
        let warmup = recv_event(&mut alice_rx).await;
        assert!(matches!(warmup, ServerEvent::LeaderboardUpdate { .. }));

        // when (操作):
        let chat_group = fixture
            .store
            .create_chat_group(
                "rust-jp".to_string(),
                String::new(),
                "public".to_string(),
                creator.id.clone(),
            )
            .await
            .unwrap();
        fixture.store.increment_points(&creator.id, 3).await.unwrap();

        // then (期待する結果):
        let created_event = recv_event(&mut alice_rx).await;
        match created_event {
            ServerEvent::ChatCreated { group_chat } => {
                assert_eq!(group_chat.group_id, chat_group.id.as_str());
                assert_eq!(group_chat.name, "rust-jp");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        let leaderboard_event = recv_event(&mut alice_rx).await;
        match leaderboard_event {
            ServerEvent::LeaderboardUpdate { leaderboard } => {
                assert_eq!(leaderboard[0].username, "creator");
                assert_eq!(leaderboard[0].points, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
