//! UseCase: ユーザ登録処理（register_user_ws）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RegisterUserUseCase::execute() メソッド
//! - WebSocket 接続への userID 束縛（last-registration-wins）
//!
//! ### なぜこのテストが必要か
//! - ビジネスロジックの検証：同じ userID の再登録で古い接続が閉じられる
//! - 以後の配送が新しい接続にのみ向くことを保証
//! - 入力バリデーション（空の userID / username の拒否）
//!
//! ### どのような状況を想定しているか
//! - 正常系：新規 userID の登録
//! - 正常系：再登録による古い接続の追い出し
//! - 異常系：空フィールドでの登録試行

use std::sync::Arc;

use crate::domain::{ConnectionId, DomainError, UserId};
use crate::infrastructure::hub::ConnectionHub;

use super::error::RegisterError;

/// ユーザ登録のユースケース
pub struct RegisterUserUseCase {
    /// 接続ハブ（レジストリ操作の窓口）
    hub: Arc<ConnectionHub>,
}

impl RegisterUserUseCase {
    /// 新しい RegisterUserUseCase を作成
    pub fn new(hub: Arc<ConnectionHub>) -> Self {
        Self { hub }
    }

    /// ユーザ登録を実行
    ///
    /// # Arguments
    ///
    /// * `connection_id` - 登録先のトランスポート接続
    /// * `user_id` - 束縛する userID（ワイヤ上の生文字列）
    /// * `username` - 表示名
    ///
    /// # Returns
    ///
    /// * `Ok(())` - 登録成功（古い接続があれば追い出し済み）
    /// * `Err(RegisterError)` - 登録失敗
    pub async fn execute(
        &self,
        connection_id: &ConnectionId,
        user_id: String,
        username: String,
    ) -> Result<(), RegisterError> {
        // 1. バリデーション
        let user_id = UserId::new(user_id)?;
        if username.is_empty() {
            return Err(DomainError::EmptyField("username").into());
        }

        // 2. ハブに束縛（同じ userID の古い接続は閉じられる）
        let evicted = self
            .hub
            .register_user(connection_id, user_id.clone(), username.clone())
            .await?;
        if let Some(previous) = evicted {
            tracing::info!(
                "User '{}' already connected, closed old connection '{}'",
                user_id,
                previous
            );
        }

        tracing::info!("User '{}' ({}) registered via WebSocket", username, user_id);
        Ok(())
    }
}
