use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::StoreError;

/// The process-wide variable store consulted last in variable lookup and
/// written directly by `g_`-prefixed assignments.
///
/// Every method is an atomic read-modify-write with respect to every other
/// holder of the same store, including holders in other processes when the
/// implementation is file backed.
///
/// Implementations must be `Send + Sync` so one store can be shared by an
/// executor, its keywords and the remote server's worker threads.
pub trait GlobalStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<Value>, StoreError>;

    fn set(&self, name: &str, value: Value) -> Result<(), StoreError>;

    fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.get(name)?.is_some())
    }

    /// Remove `name`; returns whether it was present.
    fn delete(&self, name: &str) -> Result<bool, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;

    /// Every variable, as one consistent snapshot.
    fn snapshot(&self) -> Result<BTreeMap<String, Value>, StoreError>;

    /// Replace `name` with `f(current)` while holding the lock, so
    /// concurrent updates never lose writes. Returns the stored value.
    fn update(
        &self,
        name: &str,
        f: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> Result<Value, StoreError>;
}
