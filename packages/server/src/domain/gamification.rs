//! Gamification point amounts.
//!
//! ポイントはすべて外部台帳（GamificationLedger）へのアトミックな加算で
//! 付与される。加算失敗はベストエフォート（クライアントには見せない）。

/// メッセージを 1 件送信した本人に付与
pub const MESSAGE_SENT: i64 = 1;

/// 自分のメッセージに（他人から）返信が付いた作者に付与
pub const REPLY_RECEIVED: i64 = 2;

/// 自分のメッセージに（他人から）リアクションが付いた作者に付与
pub const REACTION_RECEIVED: i64 = 3;
