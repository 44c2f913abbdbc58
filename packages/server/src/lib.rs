//! kakehashi relay backend library.
//!
//! Relays opaque encrypted chat payloads between live WebSocket connections,
//! tracking presence, group subscriptions, typing indicators and gamification
//! points. Message bodies are never decrypted on the server.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
