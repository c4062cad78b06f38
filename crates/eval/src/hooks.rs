//! Extension seams around execution.

use std::collections::BTreeMap;

use kwdsl_core::Metadata;

use crate::error::ExecError;
use crate::registry::KeywordRegistry;
use crate::value::Value;

/// Observer and content provider for an [`crate::Executor`]. Every method
/// has a no-op default; implement only what you need.
pub trait ExecutionHook: Send + Sync {
    /// Called before a program from [`crate::Executor::execute_from_content`] runs.
    fn before_execution(&self, _dsl_id: Option<&str>, _vars: &BTreeMap<String, Value>) {}

    fn after_execution(&self, _dsl_id: Option<&str>, _outcome: &Result<Value, ExecError>) {}

    /// Supply program or import source by id. `None` falls through to the
    /// next hook, then to the filesystem.
    fn load_content(&self, _id: &str) -> Option<String> {
        None
    }

    /// Called once when the hook is attached.
    fn register_keywords(&self, _registry: &KeywordRegistry) {}

    /// Narrow the variables pushed to a remote server on connect.
    fn filter_sync_variables(&self, vars: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        vars
    }

    /// Sees the metadata block of every executed program.
    fn on_metadata(&self, _metadata: &[Metadata]) {}
}

/// Turns `@remote "url" as alias` into registered `alias|keyword` entries.
pub trait RemoteConnector: Send + Sync {
    /// Connect, push `sync_vars`, and register every remote keyword.
    /// Returns how many keywords were registered.
    fn connect(
        &self,
        url: &str,
        alias: &str,
        sync_vars: &BTreeMap<String, Value>,
        registry: &KeywordRegistry,
    ) -> Result<usize, ExecError>;
}
