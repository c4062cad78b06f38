//! Built-in keywords.

mod assertion;
mod convert;
mod general;
mod globals;
mod retry;
mod system;

use crate::registry::KeywordRegistry;

/// Register every built-in keyword into `registry`.
pub fn register_builtins(registry: &KeywordRegistry) {
    system::register(registry);
    general::register(registry);
    convert::register(registry);
    assertion::register(registry);
    globals::register(registry);
    retry::register(registry);
}

/// Outcome shape shared by keywords that report success instead of failing.
pub(crate) fn outcome(success: bool, result: crate::Value) -> crate::Value {
    crate::Value::map([("success", crate::Value::Bool(success)), ("result", result)])
}
