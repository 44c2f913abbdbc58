//! HTTP API endpoint handlers.
//!
//! The plain CRUD surface: no hub state is touched here. Group creation and
//! point changes still reach connected clients, but only indirectly — the
//! store emits feed events and the global bridge broadcasts them.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    domain::{GroupId, StoreError, UserId},
    infrastructure::dto::{
        http::{
            ApiResponse, CreateGroupRequest, CreateUserRequest, MessagesQuery, UserProfileDto,
            UserSetupDto,
        },
        websocket::{GroupChatDto, LeaderboardEntryDto, MessageDto},
    },
    ui::state::AppState,
};

/// リーダーボード API のデフォルト件数
const LEADERBOARD_LIMIT: usize = 10;

/// メッセージ取得 API のデフォルト件数
const DEFAULT_MESSAGE_LIMIT: usize = 50;

/// Root path for connectivity checks
pub async fn welcome() -> &'static str {
    "Welcome to the kakehashi relay backend! WebSocket is also running."
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Create a user profile
pub async fn setup_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateUserRequest>,
) -> (StatusCode, Json<ApiResponse<UserSetupDto>>) {
    if request.username.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure("Username is required.")),
        );
    }

    match state.users.create_user(request.username, request.avatar).await {
        Ok(profile) => (
            StatusCode::CREATED,
            Json(ApiResponse::success_with_message(
                "User created successfully.",
                profile.into(),
            )),
        ),
        Err(StoreError::UsernameTaken(_)) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::failure("Username already taken.")),
        ),
        Err(e) => {
            tracing::error!("Failed to create user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure("Something went wrong!")),
            )
        }
    }
}

/// Get a user profile by ID
pub async fn get_user_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<ApiResponse<UserProfileDto>>) {
    let Ok(user_id) = UserId::new(user_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure("userID is required.")),
        );
    };

    match state.users.get_user_by_id(&user_id).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(ApiResponse::success(profile.into()))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::failure("User not found.")),
        ),
        Err(e) => {
            tracing::error!("Failed to fetch user '{}': {}", user_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure("Something went wrong!")),
            )
        }
    }
}

/// Get the gamification leaderboard (top 10, descending by points)
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<Vec<LeaderboardEntryDto>>>) {
    match state.users.get_leaderboard(LEADERBOARD_LIMIT).await {
        Ok(leaderboard) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                leaderboard.into_iter().map(Into::into).collect(),
            )),
        ),
        Err(e) => {
            tracing::error!("Failed to fetch leaderboard: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure("Something went wrong!")),
            )
        }
    }
}

/// Create a group chat
pub async fn create_chat_group(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateGroupRequest>,
) -> (StatusCode, Json<ApiResponse<GroupChatDto>>) {
    if request.name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure("Group name and creator ID are required.")),
        );
    }
    let Ok(created_by) = UserId::new(request.created_by_user_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure("Group name and creator ID are required.")),
        );
    };

    match state
        .groups
        .create_chat_group(
            request.name,
            request.description.unwrap_or_default(),
            request.group_type.unwrap_or_else(|| "public".to_string()),
            created_by,
        )
        .await
    {
        Ok(chat_group) => (
            StatusCode::CREATED,
            Json(ApiResponse::success_with_message(
                "Group chat created successfully.",
                chat_group.into(),
            )),
        ),
        Err(e) => {
            tracing::error!("Failed to create group chat: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure("Something went wrong!")),
            )
        }
    }
}

/// List all group chats
pub async fn get_all_chat_groups(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<Vec<GroupChatDto>>>) {
    match state.groups.get_all_chat_groups().await {
        Ok(groups) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                groups.into_iter().map(Into::into).collect(),
            )),
        ),
        Err(e) => {
            tracing::error!("Failed to list group chats: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure("Something went wrong!")),
            )
        }
    }
}

/// Get group chat details by ID
pub async fn get_chat_group_details(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> (StatusCode, Json<ApiResponse<GroupChatDto>>) {
    let Ok(group_id) = GroupId::new(group_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure("groupID is required.")),
        );
    };

    match state.groups.get_chat_group(&group_id).await {
        Ok(Some(chat_group)) => (StatusCode::OK, Json(ApiResponse::success(chat_group.into()))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::failure("Group chat not found.")),
        ),
        Err(e) => {
            tracing::error!("Failed to fetch group chat '{}': {}", group_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure("Something went wrong!")),
            )
        }
    }
}

/// Get recent messages of a group (opaque payloads, ascending by timestamp)
pub async fn get_group_messages(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> (StatusCode, Json<ApiResponse<Vec<MessageDto>>>) {
    let Ok(group_id) = GroupId::new(group_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure("groupID is required.")),
        );
    };
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);

    match state.messages.get_messages(&group_id, limit).await {
        Ok(messages) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                messages.into_iter().map(Into::into).collect(),
            )),
        ),
        Err(e) => {
            tracing::error!("Failed to fetch messages for '{}': {}", group_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure("Something went wrong!")),
            )
        }
    }
}
