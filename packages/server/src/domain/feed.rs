//! Change feed trait 定義
//!
//! バッキングストアの push 通知（レコード変更フィード）の抽象。購読は
//! 必ず明示的なキャンセルハンドルを返し、購読者数が 0 になったグループの
//! フィードは必ず解除される。

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    entity::{ChatGroup, ChatMessage, LeaderboardEntry, TypingEntry},
    value_object::GroupId,
};

/// 購読の対象範囲
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    /// 特定グループのパス（messages / typing_indicators）
    Group(GroupId),
    /// グローバルなパス（group_chats / users）
    Global,
}

/// 通知クラス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedClass {
    /// 新規メッセージ（item-added）
    MessageAdded,
    /// 既存メッセージの変更（item-changed、リアクション）
    MessageChanged,
    /// タイピング状態マップの変更（state-changed）
    TypingChanged,
    /// グループチャットの新規作成（グローバル）
    GroupCreated,
    /// リーダーボードの変動（グローバル）
    LeaderboardChanged,
}

/// ストアの変更 1 件を表す通知イベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    MessageAdded {
        group_id: GroupId,
        message: ChatMessage,
    },
    MessageChanged {
        group_id: GroupId,
        message: ChatMessage,
    },
    TypingChanged {
        group_id: GroupId,
        /// Key: userID — 変更後のグループ全体のスナップショット
        entries: BTreeMap<String, TypingEntry>,
    },
    GroupCreated {
        group: ChatGroup,
    },
    LeaderboardChanged {
        leaderboard: Vec<LeaderboardEntry>,
    },
}

impl FeedEvent {
    /// このイベントが属する通知クラス
    pub fn class(&self) -> FeedClass {
        match self {
            FeedEvent::MessageAdded { .. } => FeedClass::MessageAdded,
            FeedEvent::MessageChanged { .. } => FeedClass::MessageChanged,
            FeedEvent::TypingChanged { .. } => FeedClass::TypingChanged,
            FeedEvent::GroupCreated { .. } => FeedClass::GroupCreated,
            FeedEvent::LeaderboardChanged { .. } => FeedClass::LeaderboardChanged,
        }
    }

    /// イベントの対象範囲
    pub fn scope(&self) -> FeedScope {
        match self {
            FeedEvent::MessageAdded { group_id, .. }
            | FeedEvent::MessageChanged { group_id, .. }
            | FeedEvent::TypingChanged { group_id, .. } => FeedScope::Group(group_id.clone()),
            FeedEvent::GroupCreated { .. } | FeedEvent::LeaderboardChanged { .. } => {
                FeedScope::Global
            }
        }
    }
}

/// 購読のキャンセルハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// `ChangeFeed::subscribe` の戻り値（キャンセルハンドル + 受信チャンネル）
pub struct FeedSubscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<FeedEvent>,
}

/// 変更フィードの購読インターフェース
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// `scope` 上の `class` に一致する通知の購読を開始する
    async fn subscribe(&self, scope: FeedScope, class: FeedClass) -> FeedSubscription;

    /// 購読を解除する（以後そのチャンネルには何も流れない）
    async fn unsubscribe(&self, id: SubscriptionId);
}
