//! HTTP API module.
//!
//! Server, shared state, request/response types and the log broadcaster.

pub mod server;
pub mod state;
pub mod types;
pub mod logs;

pub use server::{router, start_server};
pub use state::AppState;
pub use types::*;
pub use logs::*;
