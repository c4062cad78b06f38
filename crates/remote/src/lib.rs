//! kwdsl-remote: run keywords in another process.
//!
//! - [`server`] -- axum HTTP JSON server exposing a keyword registry
//! - [`RemoteClient`] -- blocking ureq client for the same protocol
//! - [`RemoteKeywordManager`] -- connects `@remote "url" as alias` imports
//!   and registers each remote keyword as `alias|name`

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{RemoteClient, RemoteKeywordManager};
pub use error::RemoteError;
pub use protocol::{RunKeywordResponse, Status, API_KEY_ENV, DEFAULT_PORT};
pub use server::{router, serve, start_server, ServerState};
