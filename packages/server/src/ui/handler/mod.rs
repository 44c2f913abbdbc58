//! Request handlers, organized by protocol.

pub mod http;
pub mod websocket;

pub use http::{
    create_chat_group, get_all_chat_groups, get_chat_group_details, get_group_messages,
    get_leaderboard, get_user_profile, health_check, setup_user, welcome,
};
pub use websocket::websocket_handler;
