//! Relay server for end-to-end encrypted group chat.
//!
//! Relays opaque encrypted payloads between WebSocket clients and serves the
//! plain CRUD HTTP API (users, groups, messages, leaderboard).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 3000
//! ```

use std::sync::Arc;

use clap::Parser;

use kakehashi_server::{
    domain::TYPING_TIMEOUT_MS,
    infrastructure::{bridge::ChangeFeedBridge, hub::ConnectionHub, store::InMemoryStore},
    ui::{Server, state::AppState},
    usecase::{
        DisconnectUseCase, JoinGroupUseCase, ReactionUseCase, RegisterUserUseCase,
        SendMessageUseCase, TypingUseCase,
    },
};
use kakehashi_shared::{logger::setup_logger, time::SystemClock};

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Encrypted chat relay server with presence and typing indicators", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Typing indicator expiry in milliseconds
    #[arg(long, default_value_t = TYPING_TIMEOUT_MS)]
    typing_timeout_ms: i64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_PKG_NAME"), "debug");

    let args = Args::parse();

    // Initialize dependencies in order:
    // 1. Clock + backing store
    // 2. Connection hub
    // 3. Change feed bridge (global feeds attached once)
    // 4. UseCases
    // 5. AppState + Server

    // 1. Clock and backing store (in-memory database with change feeds)
    let clock = Arc::new(SystemClock);
    let store = Arc::new(InMemoryStore::new(clock.clone()));

    // 2. Connection hub (registry + subscriptions + typing timers)
    let hub = Arc::new(ConnectionHub::new());

    // 3. Change feed bridge
    let bridge = Arc::new(ChangeFeedBridge::new(
        store.clone(),
        hub.clone(),
        clock.clone(),
        args.typing_timeout_ms,
    ));
    bridge.attach_global().await;

    // 4. UseCases
    let register_user_usecase = Arc::new(RegisterUserUseCase::new(hub.clone()));
    let join_group_usecase = Arc::new(JoinGroupUseCase::new(
        hub.clone(),
        store.clone(),
        bridge.clone(),
    ));
    let disconnect_usecase = Arc::new(DisconnectUseCase::new(
        hub.clone(),
        bridge.clone(),
        store.clone(),
    ));
    let typing_usecase = Arc::new(TypingUseCase::new(
        hub.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        args.typing_timeout_ms,
    ));
    let send_message_usecase = Arc::new(SendMessageUseCase::new(
        store.clone(),
        store.clone(),
        store.clone(),
        typing_usecase.clone(),
        clock.clone(),
    ));
    let reaction_usecase = Arc::new(ReactionUseCase::new(store.clone(), store.clone()));

    // 5. Create and run the server
    let app_state = Arc::new(AppState {
        hub,
        register_user_usecase,
        join_group_usecase,
        disconnect_usecase,
        send_message_usecase,
        reaction_usecase,
        typing_usecase,
        users: store.clone(),
        groups: store.clone(),
        messages: store,
    });
    let server = Server::new(app_state);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
