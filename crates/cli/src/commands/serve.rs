use std::sync::Arc;

use kwdsl_eval::KeywordRegistry;
use kwdsl_remote::{start_server, ServerState, API_KEY_ENV};

use super::{as_dyn, open_store};
use crate::{fail, OutputFormat};

pub(crate) fn cmd_serve(
    host: &str,
    port: u16,
    api_key: Option<String>,
    output: OutputFormat,
    quiet: bool,
) {
    let api_key = api_key.or_else(|| std::env::var(API_KEY_ENV).ok());
    let store = open_store(output, quiet);
    let state = ServerState::new(Arc::new(KeywordRegistry::with_builtins()), as_dyn(&store))
        .with_api_key(api_key);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fail(&format!("failed to create tokio runtime: {}", e), output, quiet),
    };
    if let Err(e) = rt.block_on(start_server(host, port, Arc::new(state))) {
        fail(&format!("Server error: {}", e), output, quiet);
    }
}
