use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::StoreError;
use crate::traits::GlobalStore;

/// Process-local store for tests and embedded use. Nothing is shared with
/// other processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    vars: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn locked<T>(&self, f: impl FnOnce(&mut BTreeMap<String, Value>) -> T) -> Result<T, StoreError> {
        let mut guard = self
            .vars
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(f(&mut guard))
    }
}

impl GlobalStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
        self.locked(|vars| vars.get(name).cloned())
    }

    fn set(&self, name: &str, value: Value) -> Result<(), StoreError> {
        self.locked(|vars| {
            vars.insert(name.to_owned(), value);
        })
    }

    fn delete(&self, name: &str) -> Result<bool, StoreError> {
        self.locked(|vars| vars.remove(name).is_some())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.locked(|vars| vars.clear())
    }

    fn snapshot(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        self.locked(|vars| vars.clone())
    }

    fn update(
        &self,
        name: &str,
        f: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> Result<Value, StoreError> {
        self.locked(|vars| {
            let next = f(vars.get(name).cloned());
            vars.insert(name.to_owned(), next.clone());
            next
        })
    }
}
