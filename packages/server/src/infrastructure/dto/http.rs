//! HTTP API request/response DTOs.
//!
//! Responses follow the `{success, message?, data?}` shape of the API.
//! Timestamps are rendered as RFC 3339 strings (JST) on this surface.

use serde::{Deserialize, Serialize};

/// Uniform HTTP response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// `POST /api/users/setup` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// `POST /api/users/setup` response data (no points, they start at zero).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSetupDto {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub username: String,
    pub avatar: String,
}

/// `GET /api/users/{userID}` response data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfileDto {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub username: String,
    pub avatar: String,
    pub points: i64,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// `POST /api/chats` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
    #[serde(rename = "createdByUserID")]
    pub created_by_user_id: String,
}

/// Query parameters of `GET /api/chats/{groupID}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
}
