//! Collaborator trait 定義
//!
//! リレーコアが必要とする外部コラボレータ（ユーザディレクトリ、グループ
//! ディレクトリ、メッセージストア、タイピング状態ストア、ポイント台帳）の
//! インターフェースを定義します。具体的な実装は Infrastructure 層が提供
//! します（依存性の逆転）。
//!
//! ## 依存性の逆転（DIP）
//!
//! - ドメイン層が必要とするインターフェースをドメイン層自身が定義
//! - Infrastructure 層がドメイン層のインターフェースに依存
//! - ドメイン層は Infrastructure 層に依存しない

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{
    entity::{ChatGroup, ChatMessage, LeaderboardEntry, TypingEntry, UserProfile},
    error::StoreError,
    value_object::{GroupId, MessageId, UserId},
};

/// ユーザディレクトリ
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// ユーザを新規作成（username は一意、avatar 未指定時はデフォルトから選択）
    async fn create_user(
        &self,
        username: String,
        avatar: Option<String>,
    ) -> Result<UserProfile, StoreError>;

    /// ユーザをID で取得（存在しなければ None）
    async fn get_user_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError>;

    /// ポイント上位 `limit` 名のリーダーボードを取得（降順）
    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError>;
}

/// グループディレクトリ
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// グループチャットを新規作成（作成者は admin として登録される）
    async fn create_chat_group(
        &self,
        name: String,
        description: String,
        group_type: String,
        created_by: UserId,
    ) -> Result<ChatGroup, StoreError>;

    /// 全グループチャットを取得
    async fn get_all_chat_groups(&self) -> Result<Vec<ChatGroup>, StoreError>;

    /// グループチャットを ID で取得（存在しなければ None）
    async fn get_chat_group(&self, group_id: &GroupId) -> Result<Option<ChatGroup>, StoreError>;
}

/// メッセージストア
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// メッセージを末尾に追加（変更フィードに item-added が流れる）
    async fn append(&self, group_id: &GroupId, message: ChatMessage) -> Result<(), StoreError>;

    /// メッセージを ID で取得（存在しなければ None）
    async fn get_message_by_id(
        &self,
        group_id: &GroupId,
        message_id: &MessageId,
    ) -> Result<Option<ChatMessage>, StoreError>;

    /// グループの直近 `limit` 件をタイムスタンプ昇順で取得
    async fn get_messages(
        &self,
        group_id: &GroupId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// (group, message, emoji, user) のリアクションを立てる
    ///
    /// 新規に追加された場合のみ `true` を返す（冪等）。
    async fn set_reaction(
        &self,
        group_id: &GroupId,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<bool, StoreError>;

    /// (group, message, emoji, user) のリアクションを外す
    ///
    /// 実際に削除された場合のみ `true` を返す（冪等）。
    async fn remove_reaction(
        &self,
        group_id: &GroupId,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<bool, StoreError>;
}

/// タイピング状態ストア
#[async_trait]
pub trait TypingStore: Send + Sync {
    /// (group, user) のタイピングエントリを書き込む（上書き）
    async fn set(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        entry: TypingEntry,
    ) -> Result<(), StoreError>;

    /// (group, user) のタイピングエントリを削除し、あれば返す
    async fn remove(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Option<TypingEntry>, StoreError>;

    /// グループの現在のタイピングエントリ一覧（Key: userID）
    async fn snapshot(
        &self,
        group_id: &GroupId,
    ) -> Result<BTreeMap<String, TypingEntry>, StoreError>;
}

/// ゲーミフィケーションポイント台帳
#[async_trait]
pub trait GamificationLedger: Send + Sync {
    /// ユーザのポイントをアトミックに加算し、加算後の値を返す
    async fn increment_points(&self, user_id: &UserId, amount: i64) -> Result<i64, StoreError>;
}
