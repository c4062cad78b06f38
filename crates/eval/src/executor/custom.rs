//! Custom keywords defined with `function`, and `@import`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use kwdsl_core::{FunctionDef, Metadata, Program};

use super::{Executor, Flow};
use crate::error::ExecError;
use crate::registry::{Args, KeywordSource, KeywordSpec};
use crate::value::Value;

/// Nested custom keyword calls beyond this depth fail instead of
/// overflowing the stack.
const MAX_CALL_DEPTH: usize = 64;

impl Executor {
    /// Register every `function` in `program`. Defaults are evaluated once,
    /// here, in the scope of the defining program.
    pub(crate) fn register_functions(&mut self, program: &Program, file: Option<String>) {
        for def in program.functions() {
            let mut spec = KeywordSpec::new(def.name.clone())
                .category("custom")
                .source(KeywordSource::Custom { file: file.clone() });
            for p in &def.params {
                spec = match &p.default {
                    Some(expr) => {
                        let default = match self.eval_expr(expr) {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!(
                                    keyword = %def.name,
                                    param = %p.name,
                                    error = %e,
                                    "default value failed to evaluate; using null"
                                );
                                Value::Null
                            }
                        };
                        spec.param_default(&p.name, &p.name, "", default)
                    }
                    None => spec.param(&p.name, &p.name, ""),
                };
            }

            let def = Arc::new(def.clone());
            tracing::debug!(keyword = %def.name, line = def.line, "custom keyword registered");
            self.registry
                .register(spec, move |inv| inv.executor.call_function(&def, &inv.args));
        }
    }

    /// Run a custom keyword body in a fresh frame holding only its
    /// parameters. The body's `return` value is the result.
    fn call_function(&mut self, def: &FunctionDef, args: &Args) -> Result<Value, ExecError> {
        if self.frames.len() > MAX_CALL_DEPTH {
            return Err(ExecError::keyword(
                def.name.clone(),
                format!("custom keyword nesting exceeds {} levels", MAX_CALL_DEPTH),
            ));
        }

        let mut frame = BTreeMap::new();
        for p in &def.params {
            match args.values().get(&p.name) {
                Some(v) => {
                    frame.insert(p.name.clone(), v.clone());
                }
                None => {
                    return Err(ExecError::Argument {
                        keyword: def.name.clone(),
                        message: format!("missing required parameter '{}'", p.name),
                    })
                }
            }
        }

        self.frames.push(frame);
        let outcome = self.run_block(&def.body);
        self.frames.pop();

        match outcome? {
            Flow::Return(v) => Ok(v),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }

    /// Load another DSL file and register its custom keywords. Its body is
    /// not executed. A path is processed at most once per executor.
    pub(crate) fn import_file(&mut self, path: &str) -> Result<(), ExecError> {
        let path = self.replacer().replace_in_string(path).to_string();
        if !self.imported.insert(path.clone()) {
            tracing::debug!(path = %path, "already imported");
            return Ok(());
        }

        let source = match self.load_from_hooks(&path) {
            Some(s) => s,
            None => {
                let full = self.resolve_path(&path);
                std::fs::read_to_string(&full).map_err(|e| ExecError::Import {
                    path: path.clone(),
                    message: format!("{}: {}", full.display(), e),
                })?
            }
        };

        let program = kwdsl_core::parse(&source).map_err(|e| ExecError::Import {
            path: path.clone(),
            message: e.to_string(),
        })?;

        for item in &program.metadata {
            if let Metadata::Import { path: nested, .. } = item {
                self.import_file(nested)?;
            }
        }
        self.register_functions(&program, Some(path.clone()));
        tracing::info!(path = %path, keywords = program.functions().count(), "imported");
        Ok(())
    }

    /// Relative paths are taken from the program's base directory.
    pub(super) fn resolve_path(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        match &self.options.base_dir {
            Some(base) if p.is_relative() => base.join(p),
            _ => p,
        }
    }
}
