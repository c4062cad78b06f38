//! Remote keyword server: the local keyword registry over HTTP JSON.
//!
//! Endpoints:
//! - GET  /health                              - server status
//! - POST /rpc/get_keyword_names               - catalog
//! - POST /rpc/get_keyword_arguments           - display parameter names
//! - POST /rpc/get_keyword_documentation       - doc string
//! - POST /rpc/run_keyword                     - execute, PASS/FAIL envelope
//! - POST /rpc/authenticate                    - check an API key
//! - POST /rpc/sync_variables_from_client      - push shared variables
//! - POST /rpc/get_variables_for_client        - pull shared variables
//! - POST /rpc/set_shared_variable
//! - POST /rpc/get_shared_variable
//! - POST /rpc/list_shared_variables
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use self::state::ServerState;

use self::handlers::{
    handle_authenticate, handle_get_shared_variable, handle_get_variables, handle_health,
    handle_keyword_arguments, handle_keyword_documentation, handle_keyword_names,
    handle_list_shared_variables, handle_not_found, handle_run_keyword,
    handle_set_shared_variable, handle_sync_variables,
};
use crate::error::RemoteError;
use crate::protocol::methods;

/// Maximum request body size: 10 MB.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn rpc(method: &str) -> String {
    format!("/rpc/{}", method)
}

/// The complete application, ready to be served.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route(&rpc(methods::GET_KEYWORD_NAMES), post(handle_keyword_names))
        .route(&rpc(methods::GET_KEYWORD_ARGUMENTS), post(handle_keyword_arguments))
        .route(
            &rpc(methods::GET_KEYWORD_DOCUMENTATION),
            post(handle_keyword_documentation),
        )
        .route(&rpc(methods::RUN_KEYWORD), post(handle_run_keyword))
        .route(&rpc(methods::AUTHENTICATE), post(handle_authenticate))
        .route(
            &rpc(methods::SYNC_VARIABLES_FROM_CLIENT),
            post(handle_sync_variables),
        )
        .route(&rpc(methods::GET_VARIABLES_FOR_CLIENT), post(handle_get_variables))
        .route(&rpc(methods::SET_SHARED_VARIABLE), post(handle_set_shared_variable))
        .route(&rpc(methods::GET_SHARED_VARIABLE), post(handle_get_shared_variable))
        .route(
            &rpc(methods::LIST_SHARED_VARIABLES),
            post(handle_list_shared_variables),
        )
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Serve on an already-bound listener until Ctrl+C.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<(), RemoteError> {
    let addr = listener.local_addr()?;
    if state.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("no API key configured; the server accepts every caller");
    }
    tracing::info!(
        keywords = state.registry.names().len(),
        "remote keyword server listening on http://{}",
        addr
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Bind `host:port` and [`serve`].
pub async fn start_server(
    host: &str,
    port: u16,
    state: Arc<ServerState>,
) -> Result<(), RemoteError> {
    let listener = TcpListener::bind((host, port)).await?;
    serve(listener, state).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
