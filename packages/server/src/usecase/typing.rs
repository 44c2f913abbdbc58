//! UseCase: タイピングインジケータの状態機械
//!
//! (group, user) ごとの状態は Idle / Typing の 2 つ。
//!
//! - Idle → Typing: `typing{isTyping:true}`。エントリを永続化し、期限
//!   タイマー（T ms）を開始して、送信者以外へ `user_typing{true}` を配る
//! - Typing → Typing: 再度の `isTyping:true`。前のタイマーを中断して
//!   張り直す（last event wins）
//! - Typing → Idle: タイマー発火 / 明示の `isTyping:false` / そのグループで
//!   メッセージ送信成功。タイマーを止め、エントリを消し、
//!   `user_typing{false}` を配る
//! - 切断: ユーザの全タイマーを失効させ、ブロードキャストなしで Idle に
//!   落とす（DisconnectUseCase 側で行う）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - TypingUseCase::handle() と期限タイマーの発火
//!
//! ### なぜこのテストが必要か
//! - タイマーの張り直し（last event wins）が壊れると、2 回目の入力の
//!   7 秒前に false が飛ぶ・false が二重に飛ぶなどの表示バグになる
//! - 発火とキャンセルの競合は世代チェックだけが守っている
//!
//! ### どのような状況を想定しているか
//! - 正常系：開始 → 無更新で T 経過 → 自動で false
//! - 正常系：T 内の更新でタイマーが張り直される
//! - 正常系：明示の false、冪等な二重 false
//! - 異常系：存在しないユーザ

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use kakehashi_shared::time::Clock;

use crate::domain::{GroupId, Timestamp, TypingEntry, TypingStore, UserDirectory, UserId};
use crate::infrastructure::dto::websocket::ServerEvent;
use crate::infrastructure::hub::{ConnectionHub, TypingTimer};

use super::error::TypingError;

/// タイピングインジケータのユースケース
pub struct TypingUseCase {
    /// 接続ハブ（タイマー置き場 + ブロードキャスト）
    hub: Arc<ConnectionHub>,
    /// ユーザディレクトリ（username の解決）
    users: Arc<dyn UserDirectory>,
    /// タイピング状態ストア
    typing_store: Arc<dyn TypingStore>,
    /// 時刻源
    clock: Arc<dyn Clock>,
    /// 期限 T（ミリ秒）
    timeout_ms: i64,
    /// タイマー世代カウンタ
    generation: AtomicU64,
}

impl TypingUseCase {
    /// 新しい TypingUseCase を作成
    pub fn new(
        hub: Arc<ConnectionHub>,
        users: Arc<dyn UserDirectory>,
        typing_store: Arc<dyn TypingStore>,
        clock: Arc<dyn Clock>,
        timeout_ms: i64,
    ) -> Self {
        Self {
            hub,
            users,
            typing_store,
            clock,
            timeout_ms,
            generation: AtomicU64::new(0),
        }
    }

    /// `typing` エンベロープを処理する
    ///
    /// タイマータスクが自分自身への参照を持つため、受け手は `Arc<Self>`。
    pub async fn handle(
        self: Arc<Self>,
        group_id: String,
        user_id: String,
        is_typing: bool,
    ) -> Result<(), TypingError> {
        // 1. バリデーションとユーザ解決
        let group_id = GroupId::new(group_id)?;
        let user_id = UserId::new(user_id)?;
        let Some(profile) = self.users.get_user_by_id(&user_id).await? else {
            return Err(TypingError::UserNotFound(user_id.as_str().to_string()));
        };

        if is_typing {
            self.start_typing(group_id, user_id, profile.username).await
        } else {
            self.stop_typing(&group_id, &user_id).await
        }
    }

    /// Idle → Typing（または Typing の更新）
    async fn start_typing(
        self: Arc<Self>,
        group_id: GroupId,
        user_id: UserId,
        username: String,
    ) -> Result<(), TypingError> {
        // 2. エントリの永続化（更新なら timestamp の上書き）
        let now = Timestamp::new(self.clock.now_jst_millis());
        self.typing_store
            .set(
                &group_id,
                &user_id,
                TypingEntry {
                    username: username.clone(),
                    last_typed_at: now,
                },
            )
            .await?;

        // 3. 期限タイマーの張り直し（前のタイマーは中断される）
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let timer_usecase = Arc::clone(&self);
        let timer_group = group_id.clone();
        let timer_user = user_id.clone();
        let timeout = Duration::from_millis(self.timeout_ms as u64);
        let timer_task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_usecase
                .expire(timer_group, timer_user, generation)
                .await;
        });
        self.hub
            .arm_typing_timer(
                (group_id.clone(), user_id.clone()),
                TypingTimer {
                    generation,
                    abort: timer_task.abort_handle(),
                },
            )
            .await;

        // 4. 送信者以外へ配る
        let event = ServerEvent::UserTyping {
            group_id: group_id.as_str().to_string(),
            user_id: user_id.as_str().to_string(),
            username,
            is_typing: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        self.hub
            .broadcast_to_group(&group_id, &json, Some(&user_id))
            .await;
        Ok(())
    }

    /// Typing → Idle（明示の false）
    async fn stop_typing(&self, group_id: &GroupId, user_id: &UserId) -> Result<(), TypingError> {
        self.hub
            .cancel_typing_timer(&(group_id.clone(), user_id.clone()))
            .await;
        self.clear_typing_status(group_id, user_id).await
    }

    /// メッセージ送信成功による Idle への強制遷移（失敗は握りつぶす）
    pub async fn force_idle(&self, group_id: &GroupId, user_id: &UserId) {
        if let Err(e) = self.stop_typing(group_id, user_id).await {
            tracing::warn!(
                "Failed to clear typing status for '{}' in '{}': {}",
                user_id,
                group_id,
                e
            );
        }
    }

    /// 期限タイマーの発火
    async fn expire(&self, group_id: GroupId, user_id: UserId, generation: u64) {
        // 発火までの間に張り直されていないか（自分がまだ現役か）を確認する
        if !self
            .hub
            .clear_typing_timer_if(&(group_id.clone(), user_id.clone()), generation)
            .await
        {
            return;
        }
        if let Err(e) = self.clear_typing_status(&group_id, &user_id).await {
            tracing::warn!(
                "Failed to clear typing status for '{}' in '{}': {}",
                user_id,
                group_id,
                e
            );
        }
    }

    /// エントリを消し、消えた場合のみ `user_typing{false}` を配る
    async fn clear_typing_status(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<(), TypingError> {
        let removed = self.typing_store.remove(group_id, user_id).await?;
        let Some(entry) = removed else {
            // 既に Idle（冪等）
            return Ok(());
        };

        let event = ServerEvent::UserTyping {
            group_id: group_id.as_str().to_string(),
            user_id: user_id.as_str().to_string(),
            username: entry.username,
            is_typing: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        self.hub.broadcast_to_group(group_id, &json, None).await;
        Ok(())
    }
}
