//! 接続ハブ（レジストリ + グループ購読インデックス + タイピングタイマー）
//!
//! ## 責務
//!
//! - 生きている WebSocket 接続のレジストリ（userID ↔ ConnectionId の双方向引き）
//! - グループごとの購読者集合の管理
//! - タイピングインジケータの保留タイマーの保持
//! - グループ / 全体へのベストエフォートなファンアウト
//!
//! ## 設計ノート
//!
//! 3 つのマップは 1 つの `Mutex` の内側に閉じ込め、操作単位でロックを取る。
//! コラボレータ呼び出し（await する I/O）をロック中に行わないこと。
//!
//! 接続ごとの状態は透過なトランスポートオブジェクトに生やさず、
//! `ConnectionId` をキーとした明示的なレコードで持つ。ユーザの再登録
//! （last-registration-wins）は古い接続に `Shutdown` フレームを送って
//! クローズし、ユーザ束縛だけを新しい接続へ移す。ユーザ単位の状態
//! （グループ購読、タイピング）はユーザが登録され続けている限り生き残る。

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::AbortHandle;

use crate::domain::{ConnectionId, GroupId, UserId};

/// Frame pushed through a connection's outbound channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Serialized event to deliver as a WS text message
    Event(String),
    /// Instruct the pusher loop to close the socket (eviction)
    Shutdown,
}

/// Outbound channel handle of one connection.
pub type ConnectionSender = mpsc::UnboundedSender<OutboundFrame>;

/// (group, user) — the key of one typing indicator.
pub type TypingKey = (GroupId, UserId);

/// 保留中のタイピング期限タイマー
///
/// `generation` はタイマーの再スタート（last event wins）で毎回増える。
/// 発火側は自分の世代がまだ現役かを確認してから Idle 遷移を行う。
#[derive(Debug)]
pub struct TypingTimer {
    pub generation: u64,
    pub abort: AbortHandle,
}

/// One live transport connection.
struct ConnectionEntry {
    sender: ConnectionSender,
    user_id: Option<UserId>,
    username: Option<String>,
}

struct HubInner {
    /// Key: ConnectionId
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// Key: userID — exactly one live connection per user
    user_index: HashMap<UserId, ConnectionId>,
    /// Key: groupID — userIDs currently subscribed
    group_subscribers: HashMap<GroupId, HashSet<UserId>>,
    /// Key: (groupID, userID) — at most one pending timer per key
    typing_timers: HashMap<TypingKey, TypingTimer>,
}

/// 接続ハブ本体
pub struct ConnectionHub {
    inner: Mutex<HubInner>,
}

/// Result of `join_group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// このユーザが新規に購読者集合へ加わったか（再 join なら false）
    pub newly_joined: bool,
    /// このグループの購読者数が 0→1 に遷移したか（フィードの attach 契機）
    pub first_subscriber: bool,
}

/// Everything torn down by `remove_connection` that the caller must finish
/// cleaning up (abort timers, clear persisted typing entries, detach feeds).
pub struct DisconnectCleanup {
    /// 接続がユーザ束縛を所有していた場合のみ Some
    pub user_id: Option<UserId>,
    /// 登録時に記録された表示名（ログ用）
    pub username: Option<String>,
    /// ユーザが抜けたグループ
    pub left_groups: Vec<GroupId>,
    /// 購読者が 0 になり削除されたグループ（フィードの detach 契機）
    pub emptied_groups: Vec<GroupId>,
    /// 失効させるべき保留タイマー（グループごと）
    pub typing_timers: Vec<(GroupId, TypingTimer)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("connection is no longer open")]
    UnknownConnection,

    #[error("user '{0}' has no registered connection")]
    UserNotRegistered(String),
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                connections: HashMap::new(),
                user_index: HashMap::new(),
                group_subscribers: HashMap::new(),
                typing_timers: HashMap::new(),
            }),
        }
    }

    /// トランスポート接続の確立を記録する（ユーザ束縛はまだない）
    pub async fn add_connection(&self, connection_id: ConnectionId, sender: ConnectionSender) {
        let mut inner = self.inner.lock().await;
        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                sender,
                user_id: None,
                username: None,
            },
        );
    }

    /// ユーザを接続に束縛する（last-registration-wins）
    ///
    /// 同じ userID が既に別の接続に束縛されていた場合、その接続へ
    /// `Shutdown` を送ってクローズし、束縛をこの接続に移す。
    /// 追い出した接続の ID を返す。
    pub async fn register_user(
        &self,
        connection_id: &ConnectionId,
        user_id: UserId,
        username: String,
    ) -> Result<Option<ConnectionId>, HubError> {
        let mut inner = self.inner.lock().await;
        if !inner.connections.contains_key(connection_id) {
            return Err(HubError::UnknownConnection);
        }

        let evicted = match inner.user_index.get(&user_id).cloned() {
            Some(previous) if previous != *connection_id => {
                if let Some(old) = inner.connections.remove(&previous) {
                    // The pusher loop turns this into a WS close frame, so
                    // eviction is observable to the old peer.
                    let _ = old.sender.send(OutboundFrame::Shutdown);
                }
                Some(previous)
            }
            _ => None,
        };

        // Re-binding this connection to a different user releases its old binding.
        let old_user = inner
            .connections
            .get_mut(connection_id)
            .and_then(|entry| entry.user_id.take());
        if let Some(old_user) = old_user {
            if old_user != user_id && inner.user_index.get(&old_user) == Some(connection_id) {
                inner.user_index.remove(&old_user);
            }
        }

        if let Some(entry) = inner.connections.get_mut(connection_id) {
            entry.user_id = Some(user_id.clone());
            entry.username = Some(username);
        }
        inner.user_index.insert(user_id, connection_id.clone());

        Ok(evicted)
    }

    /// ユーザの現在の接続を引く
    pub async fn resolve_user(&self, user_id: &UserId) -> Option<ConnectionId> {
        let inner = self.inner.lock().await;
        inner.user_index.get(user_id).cloned()
    }

    pub async fn is_user_registered(&self, user_id: &UserId) -> bool {
        let inner = self.inner.lock().await;
        inner.user_index.contains_key(user_id)
    }

    /// 接続の破棄とユーザ単位のカスケード削除
    ///
    /// この接続がユーザ束縛を所有していた場合のみ、グループ購読からの離脱と
    /// タイマーのドレインを行う（追い出し済みの接続は束縛を持たないので、
    /// 新しい登録を壊さない）。
    pub async fn remove_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<DisconnectCleanup> {
        let mut inner = self.inner.lock().await;
        let entry = inner.connections.remove(connection_id)?;

        let no_cascade = DisconnectCleanup {
            user_id: None,
            username: None,
            left_groups: Vec::new(),
            emptied_groups: Vec::new(),
            typing_timers: Vec::new(),
        };

        let Some(user_id) = entry.user_id else {
            return Some(no_cascade);
        };
        if inner.user_index.get(&user_id) != Some(connection_id) {
            // The user re-registered on a newer connection; that registration
            // owns all user-keyed state now.
            return Some(no_cascade);
        }
        inner.user_index.remove(&user_id);

        let mut left_groups = Vec::new();
        let mut emptied_groups = Vec::new();
        inner.group_subscribers.retain(|group_id, subscribers| {
            if subscribers.remove(&user_id) {
                left_groups.push(group_id.clone());
                if subscribers.is_empty() {
                    emptied_groups.push(group_id.clone());
                    return false;
                }
            }
            true
        });

        let timer_keys: Vec<TypingKey> = inner
            .typing_timers
            .keys()
            .filter(|(_, timer_user)| timer_user == &user_id)
            .cloned()
            .collect();
        let mut typing_timers = Vec::new();
        for key in timer_keys {
            if let Some(timer) = inner.typing_timers.remove(&key) {
                typing_timers.push((key.0, timer));
            }
        }

        Some(DisconnectCleanup {
            user_id: Some(user_id),
            username: entry.username,
            left_groups,
            emptied_groups,
            typing_timers,
        })
    }

    /// グループの購読者集合にユーザを加える
    ///
    /// 登録済みユーザのみ購読できる。0→1 遷移は `first_subscriber` で通知
    /// され、呼び出し側はそのときに限りフィードを attach する（join ごとの
    /// 重複 attach はしない）。
    pub async fn join_group(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<JoinOutcome, HubError> {
        let mut inner = self.inner.lock().await;
        if !inner.user_index.contains_key(&user_id) {
            return Err(HubError::UserNotRegistered(user_id.as_str().to_string()));
        }
        let subscribers = inner.group_subscribers.entry(group_id).or_default();
        let was_empty = subscribers.is_empty();
        let newly_joined = subscribers.insert(user_id);
        Ok(JoinOutcome {
            newly_joined,
            first_subscriber: was_empty && newly_joined,
        })
    }

    pub async fn group_subscriber_count(&self, group_id: &GroupId) -> usize {
        let inner = self.inner.lock().await;
        inner
            .group_subscribers
            .get(group_id)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// 保留タイマーを登録する（同じキーの既存タイマーは中断して置き換え）
    pub async fn arm_typing_timer(&self, key: TypingKey, timer: TypingTimer) {
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.typing_timers.insert(key, timer) {
            previous.abort.abort();
        }
    }

    /// 保留タイマーを中断して破棄する（存在しなければ false）
    pub async fn cancel_typing_timer(&self, key: &TypingKey) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.typing_timers.remove(key) {
            Some(timer) => {
                timer.abort.abort();
                true
            }
            None => false,
        }
    }

    /// 発火したタイマー自身によるエントリ回収
    ///
    /// 発火と更新（restart）は競合し得るため、世代が一致する場合のみ
    /// エントリを外して true を返す。一致しなければ新しいタイマーが
    /// 現役なので何もしない。
    pub async fn clear_typing_timer_if(&self, key: &TypingKey, generation: u64) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.typing_timers.get(key) {
            Some(timer) if timer.generation == generation => {
                inner.typing_timers.remove(key);
                true
            }
            _ => false,
        }
    }

    /// グループの購読者へイベントを配る（ベストエフォート）
    ///
    /// 接続が生きていない購読者は黙ってスキップする。キューも再送もない。
    pub async fn broadcast_to_group(
        &self,
        group_id: &GroupId,
        payload: &str,
        exclude: Option<&UserId>,
    ) {
        let inner = self.inner.lock().await;
        let Some(subscribers) = inner.group_subscribers.get(group_id) else {
            return;
        };
        for user_id in subscribers {
            if exclude.is_some_and(|excluded| excluded == user_id) {
                continue;
            }
            let Some(connection_id) = inner.user_index.get(user_id) else {
                tracing::debug!("No live connection for subscriber '{}', skipping", user_id);
                continue;
            };
            let Some(entry) = inner.connections.get(connection_id) else {
                continue;
            };
            if entry
                .sender
                .send(OutboundFrame::Event(payload.to_string()))
                .is_err()
            {
                tracing::warn!("Failed to push event to user '{}', skipping", user_id);
            }
        }
    }

    /// 登録済みの全接続へイベントを配る（グローバルイベント用）
    pub async fn broadcast_to_all(&self, payload: &str) {
        let inner = self.inner.lock().await;
        for (user_id, connection_id) in inner.user_index.iter() {
            let Some(entry) = inner.connections.get(connection_id) else {
                continue;
            };
            if entry
                .sender
                .send(OutboundFrame::Event(payload.to_string()))
                .is_err()
            {
                tracing::warn!("Failed to push event to user '{}', skipping", user_id);
            }
        }
    }

    /// 特定の接続へイベントを返す（エラー応答など、発信元限定の送信）
    pub async fn push_to_connection(&self, connection_id: &ConnectionId, payload: &str) -> bool {
        let inner = self.inner.lock().await;
        match inner.connections.get(connection_id) {
            Some(entry) => entry
                .sender
                .send(OutboundFrame::Event(payload.to_string()))
                .is_ok(),
            None => false,
        }
    }

    /// 登録済みユーザ数（ログ・テスト用）
    pub async fn connected_user_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.user_index.len()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}
