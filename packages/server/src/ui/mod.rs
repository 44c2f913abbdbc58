//! UI layer: the axum server and its WebSocket / HTTP handlers.

pub mod handler;
mod server;
mod signal;
pub mod state;

pub use server::Server;
