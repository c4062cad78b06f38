//! Protocol method handlers.

use std::collections::BTreeMap;
use std::error::Error as _;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use kwdsl_eval::{ConfigVars, Envelope, ExecError, Executor, KeywordRegistry, Value};
use kwdsl_storage::GlobalStore;
use serde_json::json;

use super::json_error;
use super::state::ServerState;
use crate::protocol::{
    AuthRequest, Empty, GetVariableRequest, NameRequest, RunKeywordRequest, RunKeywordResponse,
    SetVariableRequest, SyncVariablesRequest, VariableResponse,
};

const AUTH_FAILED: &str = "authentication failed: invalid API key";

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let response = json!({
        "status": "ok",
        "keywords": state.registry.names().len(),
        "auth": state.api_key.is_some(),
    });
    (StatusCode::OK, Json(response))
}

// ──────────────────────────────────────────────
// Catalog
// ──────────────────────────────────────────────

pub(crate) async fn handle_keyword_names(
    State(state): State<Arc<ServerState>>,
    Json(_): Json<Empty>,
) -> Json<Vec<String>> {
    Json(state.registry.names())
}

pub(crate) async fn handle_keyword_arguments(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<NameRequest>,
) -> Json<Vec<String>> {
    let names = state
        .registry
        .get(&req.name)
        .map(|k| k.spec.params.iter().map(|p| p.name.clone()).collect())
        .unwrap_or_default();
    Json(names)
}

pub(crate) async fn handle_keyword_documentation(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<NameRequest>,
) -> Json<String> {
    Json(
        state
            .registry
            .get(&req.name)
            .map(|k| k.spec.doc.clone())
            .unwrap_or_default(),
    )
}

pub(crate) async fn handle_authenticate(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<AuthRequest>,
) -> Json<bool> {
    Json(state.authorized(req.api_key.as_deref()))
}

// ──────────────────────────────────────────────
// Keyword execution
// ──────────────────────────────────────────────

/// POST /rpc/run_keyword
///
/// Runs on a blocking worker with a fresh executor; keyword failures and
/// authentication failures come back as FAIL with status 200.
pub(crate) async fn handle_run_keyword(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<RunKeywordRequest>,
) -> Json<RunKeywordResponse> {
    if !state.authorized(req.api_key.as_deref()) {
        tracing::warn!(keyword = %req.name, "run_keyword rejected: bad API key");
        return Json(RunKeywordResponse::fail(AUTH_FAILED, Vec::new()));
    }

    let shared = state.shared.read().await.clone();
    let registry = state.registry.clone();
    let globals = state.globals.clone();
    let name = req.name.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        run_keyword_blocking(registry, globals, shared, &req.name, req.args)
    })
    .await;

    match outcome {
        Ok(response) => Json(response),
        Err(e) => {
            tracing::error!(keyword = %name, error = %e, "keyword worker panicked");
            Json(RunKeywordResponse::fail(
                format!("keyword '{}' aborted: {}", name, e),
                Vec::new(),
            ))
        }
    }
}

fn run_keyword_blocking(
    registry: Arc<KeywordRegistry>,
    globals: Arc<dyn GlobalStore>,
    shared: BTreeMap<String, serde_json::Value>,
    name: &str,
    args: BTreeMap<String, serde_json::Value>,
) -> RunKeywordResponse {
    let config = ConfigVars::from_map(
        shared
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect(),
    );
    let mut executor = Executor::new(registry, globals).with_config(config);
    let raw_args = args.into_iter().map(|(k, v)| (k, Value::from(v))).collect();

    match executor.invoke_keyword(name, raw_args, 0) {
        Ok(raw) => {
            let envelope = if Envelope::detect(&raw) {
                Envelope::from_value(raw)
            } else {
                let mut wrapped = Envelope::wrap(raw);
                wrapped.captures = executor.context().variables().clone();
                wrapped
            };
            tracing::debug!(keyword = name, "remote keyword passed");
            RunKeywordResponse::pass(envelope.into_value().to_json())
        }
        Err(e) => {
            tracing::warn!(keyword = name, error = %e, "remote keyword failed");
            RunKeywordResponse::fail(e.to_string(), traceback(&e))
        }
    }
}

/// The root error in debug form, then each source in the chain.
fn traceback(e: &ExecError) -> Vec<String> {
    let mut lines = vec![format!("{:?}", e.root())];
    let mut source = e.source();
    while let Some(s) = source {
        lines.push(s.to_string());
        source = s.source();
    }
    lines
}

// ──────────────────────────────────────────────
// Shared variables
// ──────────────────────────────────────────────

pub(crate) async fn handle_sync_variables(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<SyncVariablesRequest>,
) -> Json<VariableResponse> {
    if !state.authorized(req.api_key.as_deref()) {
        return Json(VariableResponse::error(AUTH_FAILED));
    }
    let count = req.variables.len();
    let mut shared = state.shared.write().await;
    for (name, value) in req.variables {
        tracing::debug!(name = %name, "variable synced from client");
        shared.insert(name, value);
    }
    Json(VariableResponse::success().with_message(format!("synced {} variables", count)))
}

pub(crate) async fn handle_get_variables(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<AuthRequest>,
) -> Json<VariableResponse> {
    if !state.authorized(req.api_key.as_deref()) {
        return Json(VariableResponse::error(AUTH_FAILED));
    }
    let shared = state.shared.read().await;
    let mut response = VariableResponse::success();
    response.variables = serde_json::to_value(&*shared).ok();
    Json(response)
}

pub(crate) async fn handle_set_shared_variable(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<SetVariableRequest>,
) -> Json<VariableResponse> {
    if !state.authorized(req.api_key.as_deref()) {
        return Json(VariableResponse::error(AUTH_FAILED));
    }
    let message = format!("variable {} set", req.name);
    state.shared.write().await.insert(req.name, req.value);
    Json(VariableResponse::success().with_message(message))
}

pub(crate) async fn handle_get_shared_variable(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<GetVariableRequest>,
) -> Json<VariableResponse> {
    if !state.authorized(req.api_key.as_deref()) {
        return Json(VariableResponse::error(AUTH_FAILED));
    }
    match state.shared.read().await.get(&req.name) {
        Some(value) => {
            let mut response = VariableResponse::success();
            response.value = Some(value.clone());
            Json(response)
        }
        None => Json(VariableResponse::error(format!(
            "variable {} does not exist",
            req.name
        ))),
    }
}

pub(crate) async fn handle_list_shared_variables(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<AuthRequest>,
) -> Json<VariableResponse> {
    if !state.authorized(req.api_key.as_deref()) {
        return Json(VariableResponse::error(AUTH_FAILED));
    }
    let shared = state.shared.read().await;
    let names: Vec<&String> = shared.keys().collect();
    let mut response = VariableResponse::success();
    response.variables = serde_json::to_value(&names).ok();
    response.count = Some(names.len());
    Json(response)
}
