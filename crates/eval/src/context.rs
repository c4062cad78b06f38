//! Per-test context handed to every keyword.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};

use crate::value::Value;

/// Variables visible to the whole test plus session resources (open
/// connections, clients) that keywords stash between calls.
///
/// Cleared at the start and the end of every program run.
#[derive(Default)]
pub struct TestContext {
    variables: BTreeMap<String, Value>,
    resources: HashMap<String, Box<dyn Any + Send>>,
}

impl TestContext {
    pub fn new() -> Self {
        TestContext::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn has(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.variables.remove(name)
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// Drops every variable and resource.
    pub fn clear(&mut self) {
        self.variables.clear();
        self.resources.clear();
    }

    pub fn put_resource<T: Any + Send>(&mut self, name: impl Into<String>, resource: T) {
        self.resources.insert(name.into(), Box::new(resource));
    }

    pub fn resource<T: Any + Send>(&self, name: &str) -> Option<&T> {
        self.resources.get(name).and_then(|r| r.downcast_ref::<T>())
    }

    pub fn resource_mut<T: Any + Send>(&mut self, name: &str) -> Option<&mut T> {
        self.resources
            .get_mut(name)
            .and_then(|r| r.downcast_mut::<T>())
    }

    pub fn take_resource<T: Any + Send>(&mut self, name: &str) -> Option<T> {
        let boxed = self.resources.remove(name)?;
        match boxed.downcast::<T>() {
            Ok(r) => Some(*r),
            Err(other) => {
                self.resources.insert(name.to_owned(), other);
                None
            }
        }
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("variables", &self.variables)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_are_typed_and_cleared_with_variables() {
        let mut ctx = TestContext::new();
        ctx.set("token", Value::from("abc"));
        ctx.put_resource("conn", 42u32);

        assert_eq!(ctx.resource::<u32>("conn"), Some(&42));
        assert_eq!(ctx.resource::<String>("conn"), None);
        *ctx.resource_mut::<u32>("conn").unwrap() += 1;
        assert_eq!(ctx.take_resource::<String>("conn"), None);
        assert_eq!(ctx.take_resource::<u32>("conn"), Some(43));

        ctx.put_resource("conn", 1u8);
        ctx.clear();
        assert!(!ctx.has("token"));
        assert!(ctx.resource::<u8>("conn").is_none());
    }
}
