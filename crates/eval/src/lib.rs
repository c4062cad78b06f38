//! kwdsl-eval: runtime for the kwdsl keyword test language.
//!
//! - [`Executor`] -- walks a parsed [`kwdsl_core::Program`]
//! - [`VariableReplacer`] -- four-tier lookup and `${...}` interpolation
//! - [`KeywordRegistry`] -- keyword catalog with display-name binding
//! - [`keywords::register_builtins`] -- printing, waiting, assertions,
//!   global variables and retry

pub mod config;
pub mod context;
pub mod data;
pub mod envelope;
pub mod error;
pub mod executor;
mod expr;
pub mod hooks;
pub mod keywords;
pub mod registry;
pub mod value;
pub mod variables;

pub use config::{ConfigVars, ExecutorOptions, KEEP_VARIABLES_ENV};
pub use context::TestContext;
pub use data::{load_rows, DataRow};
pub use envelope::Envelope;
pub use error::ExecError;
pub use executor::{Executor, Flow, GLOBAL_PREFIX};
pub use hooks::{ExecutionHook, RemoteConnector};
pub use keywords::register_builtins;
pub use registry::{
    Args, Invocation, Keyword, KeywordFn, KeywordRegistry, KeywordSource, KeywordSpec, ParamSpec,
};
pub use value::Value;
pub use variables::VariableReplacer;
