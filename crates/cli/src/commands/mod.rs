pub(crate) mod check;
pub(crate) mod globals;
pub(crate) mod keywords;
pub(crate) mod run;
pub(crate) mod serve;

use std::sync::Arc;

use kwdsl_storage::{FileStore, GlobalStore};

use crate::{fail, OutputFormat};

/// The shared file store, located by `$KWDSL_GLOBAL_DIR`.
pub(crate) fn open_store(output: OutputFormat, quiet: bool) -> Arc<FileStore> {
    match FileStore::from_env() {
        Ok(store) => Arc::new(store),
        Err(e) => fail(&format!("cannot open global store: {}", e), output, quiet),
    }
}

pub(crate) fn as_dyn(store: &Arc<FileStore>) -> Arc<dyn GlobalStore> {
    store.clone()
}
