// crash_sync - client-side sync engine for a multiplayer crash game
//
// Leaf-first: pure helpers (martingale, retry, history, state_machine), the
// snapshot sources (poller, demo) and their supervisor (connection), the
// action client (betting), and the single event loop that owns them (engine).

pub mod api;
pub mod autoplay;
pub mod betting;
pub mod connection;
pub mod demo;
pub mod engine;
pub mod error;
pub mod events;
pub mod game_api;
pub mod history;
pub mod identity;
pub mod martingale;
pub mod models;
pub mod poller;
pub mod reconcile;
pub mod retry;
pub mod settings;
pub mod state_machine;
pub mod timers;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use connection::{ConnectionMode, ConnectionState};
pub use engine::{Engine, EngineConfig, EngineHandle, EngineView};
pub use error::{ApiError, EngineError, ErrorClass};
pub use events::{EngineEvent, NotificationKind};
pub use game_api::{GameApi, HttpGameApi};
