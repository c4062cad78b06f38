//! Server state shared across request handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use kwdsl_eval::KeywordRegistry;
use kwdsl_storage::GlobalStore;
use tokio::sync::RwLock;

pub struct ServerState {
    pub(crate) registry: Arc<KeywordRegistry>,
    pub(crate) globals: Arc<dyn GlobalStore>,
    /// Optional shared secret. None = open access.
    pub(crate) api_key: Option<String>,
    /// Variables pushed by clients; the config tier of every keyword run.
    pub(crate) shared: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl ServerState {
    pub fn new(registry: Arc<KeywordRegistry>, globals: Arc<dyn GlobalStore>) -> Self {
        ServerState {
            registry,
            globals,
            api_key: None,
            shared: RwLock::new(BTreeMap::new()),
        }
    }

    /// Require `key` on every protocol call. An empty key means open access.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn registry(&self) -> &Arc<KeywordRegistry> {
        &self.registry
    }

    pub(crate) fn authorized(&self, key: Option<&str>) -> bool {
        match &self.api_key {
            None => true,
            Some(expected) => key == Some(expected.as_str()),
        }
    }
}
