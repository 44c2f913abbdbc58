//! UseCase: グループ参加処理（join_chat）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - JoinGroupUseCase::execute() メソッド
//! - 購読者集合への追加と変更フィードの attach（0→1 のときだけ）
//!
//! ### なぜこのテストが必要か
//! - join のたびにフィードを購読し直すと同じイベントが人数分重複配信される。
//!   attach が購読者数 0→1 のときに一度だけ起きることを保証する
//! - 存在しないグループ・未登録ユーザの join がエラー応答になることを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：最初の参加者の join（attach あり）
//! - 正常系：2 人目以降・再 join（attach なし）
//! - 異常系：存在しないグループ、未登録ユーザ

use std::sync::Arc;

use crate::domain::{GroupDirectory, GroupId, UserId};
use crate::infrastructure::bridge::ChangeFeedBridge;
use crate::infrastructure::hub::{ConnectionHub, JoinOutcome};

use super::error::JoinError;

/// グループ参加のユースケース
pub struct JoinGroupUseCase {
    /// 接続ハブ（購読者集合の持ち主）
    hub: Arc<ConnectionHub>,
    /// グループディレクトリ（存在チェック）
    groups: Arc<dyn GroupDirectory>,
    /// 変更フィードブリッジ（attach の窓口）
    bridge: Arc<ChangeFeedBridge>,
}

impl JoinGroupUseCase {
    /// 新しい JoinGroupUseCase を作成
    pub fn new(
        hub: Arc<ConnectionHub>,
        groups: Arc<dyn GroupDirectory>,
        bridge: Arc<ChangeFeedBridge>,
    ) -> Self {
        Self { hub, groups, bridge }
    }

    /// グループ参加を実行
    ///
    /// # Returns
    ///
    /// * `Ok(JoinOutcome)` - 参加成功（0→1 遷移なら attach 済み）
    /// * `Err(JoinError)` - 参加失敗
    pub async fn execute(&self, group_id: String, user_id: String) -> Result<JoinOutcome, JoinError> {
        // 1. バリデーション
        let group_id = GroupId::new(group_id)?;
        let user_id = UserId::new(user_id)?;

        // 2. グループの存在チェック
        if self.groups.get_chat_group(&group_id).await?.is_none() {
            return Err(JoinError::GroupNotFound(group_id.as_str().to_string()));
        }

        // 3. 購読者集合へ追加（登録済みユーザのみ）
        let outcome = self
            .hub
            .join_group(group_id.clone(), user_id.clone())
            .await?;

        // 4. 最初の購読者のときだけフィードを attach
        if outcome.first_subscriber {
            self.bridge.attach_group(group_id.clone()).await;
        }

        tracing::info!("User '{}' joined group '{}'", user_id, group_id);
        Ok(outcome)
    }
}
