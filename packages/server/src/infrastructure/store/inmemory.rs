//! InMemory バッキングストア実装
//!
//! ドメイン層が定義するコラボレータ trait 群の具体的な実装。HashMap を
//! インメモリ DB として使用し、すべての変更を変更フィードとして購読者に
//! push します。
//!
//! ## 設計ノート
//!
//! 変更フィードの発火はストアの変更と同一ロック内で行われるため、
//! 1 つの変更につき購読者ごとに最大 1 通知が順序どおりに流れます。
//! 切断済みの購読チャンネルは発火時に刈り取られます。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use kakehashi_shared::time::Clock;

use crate::domain::{
    ChangeFeed, ChatGroup, ChatMessage, FeedClass, FeedEvent, FeedScope, FeedSubscription,
    GamificationLedger, GroupDirectory, GroupId, GroupIdFactory, GroupMember, LeaderboardEntry,
    MessageId, MessageStore, StoreError, SubscriptionId, Timestamp, TypingEntry, TypingStore,
    UserDirectory, UserId, UserIdFactory, UserProfile,
};

/// avatar 未指定のユーザに割り当てるデフォルトプール
pub const DEFAULT_AVATARS: [&str; 5] = [
    "https://api.multiavatar.com/anonymous1.png",
    "https://api.multiavatar.com/anonymous2.png",
    "https://api.multiavatar.com/anonymous3.png",
    "https://api.multiavatar.com/anonymous4.png",
    "https://api.multiavatar.com/anonymous5.png",
];

/// リーダーボードに載せる人数
pub const LEADERBOARD_LIMIT: usize = 10;

struct FeedSubscriber {
    scope: FeedScope,
    class: FeedClass,
    sender: mpsc::UnboundedSender<FeedEvent>,
}

struct StoreInner {
    /// Key: userID
    users: HashMap<String, UserProfile>,
    /// Key: groupID
    groups: HashMap<String, ChatGroup>,
    /// Key: groupID → messageID → message
    messages: HashMap<String, HashMap<String, ChatMessage>>,
    /// Key: groupID → userID → entry
    typing: HashMap<String, BTreeMap<String, TypingEntry>>,
    /// Key: SubscriptionId
    feeds: HashMap<u64, FeedSubscriber>,
    next_subscription_id: u64,
}

/// インメモリのバッキングストア
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                users: HashMap::new(),
                groups: HashMap::new(),
                messages: HashMap::new(),
                typing: HashMap::new(),
                feeds: HashMap::new(),
                next_subscription_id: 0,
            }),
            clock,
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_jst_millis())
    }

    /// 現在のフィード購読数（診断・テスト用）
    pub async fn feed_subscriber_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.feeds.len()
    }
}

/// 変更 1 件を一致する購読者へ配り、閉じたチャンネルを刈り取る
fn emit(inner: &mut StoreInner, event: FeedEvent) {
    let scope = event.scope();
    let class = event.class();
    inner.feeds.retain(|_, subscriber| {
        if subscriber.scope == scope && subscriber.class == class {
            subscriber.sender.send(event.clone()).is_ok()
        } else {
            true
        }
    });
}

/// ポイント降順のリーダーボードを組み立てる
fn build_leaderboard(inner: &StoreInner, limit: usize) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = inner
        .users
        .values()
        .map(|user| LeaderboardEntry {
            user_id: user.id.clone(),
            username: user.username.clone(),
            points: user.points,
        })
        .collect();
    entries.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.username.cmp(&b.username)));
    entries.truncate(limit);
    entries
}

fn emit_leaderboard(inner: &mut StoreInner) {
    let leaderboard = build_leaderboard(inner, LEADERBOARD_LIMIT);
    emit(inner, FeedEvent::LeaderboardChanged { leaderboard });
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn create_user(
        &self,
        username: String,
        avatar: Option<String>,
    ) -> Result<UserProfile, StoreError> {
        let created_at = self.now();
        let mut inner = self.inner.lock().await;

        if inner.users.values().any(|user| user.username == username) {
            return Err(StoreError::UsernameTaken(username));
        }

        let user_id = UserIdFactory::generate();
        let avatar = avatar.unwrap_or_else(|| {
            let index = user_id.as_str().as_bytes()[0] as usize % DEFAULT_AVATARS.len();
            DEFAULT_AVATARS[index].to_string()
        });
        let profile = UserProfile {
            id: user_id.clone(),
            username,
            avatar,
            points: 0,
            created_at,
        };
        inner
            .users
            .insert(user_id.as_str().to_string(), profile.clone());

        // 新規ユーザもリーダーボードのクエリ結果を変え得る
        emit_leaderboard(&mut inner);

        Ok(profile)
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(user_id.as_str()).cloned())
    }

    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(build_leaderboard(&inner, limit))
    }
}

#[async_trait]
impl GroupDirectory for InMemoryStore {
    async fn create_chat_group(
        &self,
        name: String,
        description: String,
        group_type: String,
        created_by: UserId,
    ) -> Result<ChatGroup, StoreError> {
        let created_at = self.now();
        let mut inner = self.inner.lock().await;

        let group_id = GroupIdFactory::generate();
        let mut members = BTreeMap::new();
        members.insert(
            created_by.as_str().to_string(),
            GroupMember {
                joined_at: created_at,
                role: "admin".to_string(),
            },
        );
        let group = ChatGroup {
            id: group_id.clone(),
            name,
            description,
            group_type,
            created_by,
            created_at,
            member_count: 1,
            members,
        };
        inner
            .groups
            .insert(group_id.as_str().to_string(), group.clone());

        emit(
            &mut inner,
            FeedEvent::GroupCreated {
                group: group.clone(),
            },
        );

        Ok(group)
    }

    async fn get_all_chat_groups(&self) -> Result<Vec<ChatGroup>, StoreError> {
        let inner = self.inner.lock().await;
        let mut groups: Vec<ChatGroup> = inner.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(groups)
    }

    async fn get_chat_group(&self, group_id: &GroupId) -> Result<Option<ChatGroup>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.groups.get(group_id.as_str()).cloned())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn append(&self, group_id: &GroupId, message: ChatMessage) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .messages
            .entry(group_id.as_str().to_string())
            .or_default()
            .insert(message.id.as_str().to_string(), message.clone());

        emit(
            &mut inner,
            FeedEvent::MessageAdded {
                group_id: group_id.clone(),
                message,
            },
        );

        Ok(())
    }

    async fn get_message_by_id(
        &self,
        group_id: &GroupId,
        message_id: &MessageId,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .get(group_id.as_str())
            .and_then(|messages| messages.get(message_id.as_str()))
            .cloned())
    }

    async fn get_messages(
        &self,
        group_id: &GroupId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.lock().await;
        let mut messages: Vec<ChatMessage> = inner
            .messages
            .get(group_id.as_str())
            .map(|messages| messages.values().cloned().collect())
            .unwrap_or_default();
        messages.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        // 直近 limit 件を昇順のまま返す
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }

    async fn set_reaction(
        &self,
        group_id: &GroupId,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(message) = inner
            .messages
            .get_mut(group_id.as_str())
            .and_then(|messages| messages.get_mut(message_id.as_str()))
        else {
            return Err(StoreError::MessageNotFound(message_id.as_str().to_string()));
        };

        let newly_added = message.add_reaction(emoji, user_id);
        if newly_added {
            let updated = message.clone();
            emit(
                &mut inner,
                FeedEvent::MessageChanged {
                    group_id: group_id.clone(),
                    message: updated,
                },
            );
        }
        Ok(newly_added)
    }

    async fn remove_reaction(
        &self,
        group_id: &GroupId,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(message) = inner
            .messages
            .get_mut(group_id.as_str())
            .and_then(|messages| messages.get_mut(message_id.as_str()))
        else {
            return Err(StoreError::MessageNotFound(message_id.as_str().to_string()));
        };

        let removed = message.remove_reaction(emoji, user_id);
        if removed {
            let updated = message.clone();
            emit(
                &mut inner,
                FeedEvent::MessageChanged {
                    group_id: group_id.clone(),
                    message: updated,
                },
            );
        }
        Ok(removed)
    }
}

#[async_trait]
impl TypingStore for InMemoryStore {
    async fn set(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        entry: TypingEntry,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .typing
            .entry(group_id.as_str().to_string())
            .or_default()
            .insert(user_id.as_str().to_string(), entry);

        let entries = inner
            .typing
            .get(group_id.as_str())
            .cloned()
            .unwrap_or_default();
        emit(
            &mut inner,
            FeedEvent::TypingChanged {
                group_id: group_id.clone(),
                entries,
            },
        );
        Ok(())
    }

    async fn remove(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Option<TypingEntry>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(entries) = inner.typing.get_mut(group_id.as_str()) else {
            return Ok(None);
        };
        let removed = entries.remove(user_id.as_str());
        if entries.is_empty() {
            inner.typing.remove(group_id.as_str());
        }

        // 変化があったときだけ state-changed を流す
        if removed.is_some() {
            let entries = inner
                .typing
                .get(group_id.as_str())
                .cloned()
                .unwrap_or_default();
            emit(
                &mut inner,
                FeedEvent::TypingChanged {
                    group_id: group_id.clone(),
                    entries,
                },
            );
        }
        Ok(removed)
    }

    async fn snapshot(
        &self,
        group_id: &GroupId,
    ) -> Result<BTreeMap<String, TypingEntry>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .typing
            .get(group_id.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl GamificationLedger for InMemoryStore {
    async fn increment_points(&self, user_id: &UserId, amount: i64) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(user) = inner.users.get_mut(user_id.as_str()) else {
            return Err(StoreError::UserNotFound(user_id.as_str().to_string()));
        };
        user.points += amount;
        let total = user.points;

        emit_leaderboard(&mut inner);

        Ok(total)
    }
}

#[async_trait]
impl ChangeFeed for InMemoryStore {
    async fn subscribe(&self, scope: FeedScope, class: FeedClass) -> FeedSubscription {
        let mut inner = self.inner.lock().await;
        inner.next_subscription_id += 1;
        let id = SubscriptionId(inner.next_subscription_id);
        let (sender, receiver) = mpsc::unbounded_channel();
        inner.feeds.insert(
            id.0,
            FeedSubscriber {
                scope,
                class,
                sender,
            },
        );
        FeedSubscription { id, receiver }
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock().await;
        inner.feeds.remove(&id.0);
    }
}
