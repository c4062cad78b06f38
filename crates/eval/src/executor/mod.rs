//! Tree-walking executor.
//!
//! Statements return [`Flow`] so `break`, `continue` and `return` travel as
//! ordinary values and never mix with [`ExecError`]. The teardown block runs
//! after the body whatever the body's outcome, and its own failure is
//! logged and recorded without replacing that outcome. A program with an
//! `@data` source runs body and teardown once per data row.

mod custom;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kwdsl_core::{Metadata, Program, RemoteCall, Stmt, StmtKind, Teardown};
use kwdsl_storage::GlobalStore;

use crate::config::{ConfigVars, ExecutorOptions};
use crate::context::TestContext;
use crate::envelope::Envelope;
use crate::error::ExecError;
use crate::hooks::{ExecutionHook, RemoteConnector};
use crate::registry::{Invocation, KeywordRegistry};
use crate::value::Value;
use crate::variables::VariableReplacer;

/// Prefix routing a variable to the process-wide global store.
pub const GLOBAL_PREFIX: &str = "g_";

static NO_LOCALS: BTreeMap<String, Value> = BTreeMap::new();

/// How a statement (or block) finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub struct Executor {
    registry: Arc<KeywordRegistry>,
    globals: Arc<dyn GlobalStore>,
    config: ConfigVars,
    context: TestContext,
    /// Frame 0 is the test body; each custom keyword call pushes one.
    frames: Vec<BTreeMap<String, Value>>,
    options: ExecutorOptions,
    hooks: Vec<Arc<dyn ExecutionHook>>,
    connector: Option<Arc<dyn RemoteConnector>>,
    imported: BTreeSet<String>,
    metadata: Vec<Metadata>,
    teardown_error: Option<ExecError>,
    current_file: Option<String>,
}

impl Executor {
    pub fn new(registry: Arc<KeywordRegistry>, globals: Arc<dyn GlobalStore>) -> Self {
        Executor {
            registry,
            globals,
            config: ConfigVars::new(),
            context: TestContext::new(),
            frames: vec![BTreeMap::new()],
            options: ExecutorOptions::default(),
            hooks: Vec::new(),
            connector: None,
            imported: BTreeSet::new(),
            metadata: Vec::new(),
            teardown_error: None,
            current_file: None,
        }
    }

    pub fn with_config(mut self, config: ConfigVars) -> Self {
        self.config = config;
        self
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach a hook; its keywords are registered immediately.
    pub fn with_hook(mut self, hook: Arc<dyn ExecutionHook>) -> Self {
        hook.register_keywords(&self.registry);
        self.hooks.push(hook);
        self
    }

    pub fn with_remote_connector(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn registry(&self) -> &Arc<KeywordRegistry> {
        &self.registry
    }

    pub fn globals(&self) -> &Arc<dyn GlobalStore> {
        &self.globals
    }

    pub fn config(&self) -> &ConfigVars {
        &self.config
    }

    pub fn context(&self) -> &TestContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut TestContext {
        &mut self.context
    }

    /// Locals of the innermost frame.
    pub fn variables(&self) -> &BTreeMap<String, Value> {
        self.frames.last().unwrap_or(&NO_LOCALS)
    }

    /// Four-tier lookup without the unresolved-reference fallback.
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.replacer().lookup(name)
    }

    /// Metadata of the most recent program.
    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    /// The teardown failure of the most recent run, if any.
    pub fn teardown_error(&self) -> Option<&ExecError> {
        self.teardown_error.as_ref()
    }

    pub fn replacer(&self) -> VariableReplacer<'_> {
        VariableReplacer::new(self.variables(), &self.context, &self.config, &*self.globals)
    }

    /// Bind `name`. `g_` names go to the global store; others go to the
    /// current frame, and in the test body also to the test context.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), ExecError> {
        if name.starts_with(GLOBAL_PREFIX) {
            self.globals.set(name, value.to_json())?;
            return Ok(());
        }
        let in_body = self.frames.len() == 1;
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_owned(), value.clone());
        }
        if in_body {
            self.context.set(name, value);
        }
        Ok(())
    }

    /// Run `f` in a scratch frame holding the current locals plus
    /// `bindings`. Nothing bound inside survives the call.
    pub(crate) fn with_bindings<R>(
        &mut self,
        bindings: impl IntoIterator<Item = (String, Value)>,
        f: impl FnOnce(&mut Executor) -> R,
    ) -> R {
        let mut frame = self.variables().clone();
        frame.extend(bindings);
        self.frames.push(frame);
        let out = f(self);
        self.frames.pop();
        out
    }

    // ──────────────────────────────────────────────
    // Program entry points
    // ──────────────────────────────────────────────

    /// Run a parsed program and return the value of a top-level `return`,
    /// or null.
    pub fn execute(&mut self, program: &Program) -> Result<Value, ExecError> {
        self.run_program(program, BTreeMap::new())
    }

    /// Parse and run `content`. Empty content is loaded by `dsl_id`
    /// through the hooks. `vars` are bound before the body runs.
    pub fn execute_from_content(
        &mut self,
        content: &str,
        dsl_id: Option<&str>,
        vars: BTreeMap<String, Value>,
    ) -> Result<Value, ExecError> {
        let source = match dsl_id {
            Some(id) if content.trim().is_empty() => {
                self.load_from_hooks(id).ok_or_else(|| ExecError::Import {
                    path: id.to_owned(),
                    message: "no content supplied and no hook provided it".to_owned(),
                })?
            }
            _ => content.to_owned(),
        };
        let program = kwdsl_core::parse(&source)?;
        self.current_file = dsl_id.map(str::to_owned);

        for hook in &self.hooks {
            hook.before_execution(dsl_id, &vars);
        }
        let outcome = self.run_program(&program, vars);
        for hook in &self.hooks {
            hook.after_execution(dsl_id, &outcome);
        }
        outcome
    }

    fn run_program(
        &mut self,
        program: &Program,
        seed: BTreeMap<String, Value>,
    ) -> Result<Value, ExecError> {
        self.metadata = program.metadata.clone();

        let Some((file, format, line)) = data_source(&program.metadata) else {
            return self.run_iteration(program, seed);
        };
        let path = self.resolve_path(&self.replacer().replace_in_string(file).to_string());
        let rows = crate::data::load_rows(&path, format).map_err(|e| located(e, line, "Data"))?;
        if rows.is_empty() {
            tracing::warn!(file = %path.display(), "data source has no rows");
        }

        let mut outcome = Ok(Value::Null);
        for (index, row) in rows.into_iter().enumerate() {
            tracing::info!(row = index + 1, title = ?program.title(), "data row");
            let mut vars = seed.clone();
            vars.extend(row);
            outcome = self.run_iteration(program, vars);
            if let Err(e) = &outcome {
                tracing::warn!(row = index + 1, error = %e, "data row failed");
                break;
            }
        }
        outcome
    }

    /// One pass over the body followed by the teardown.
    fn run_iteration(
        &mut self,
        program: &Program,
        seed: BTreeMap<String, Value>,
    ) -> Result<Value, ExecError> {
        self.context.clear();
        self.frames = vec![BTreeMap::new()];
        self.teardown_error = None;

        let outcome = self.run_main(program, seed);

        if let Some(teardown) = &program.teardown {
            if let Err(e) = self.run_teardown(teardown) {
                tracing::warn!(line = teardown.line, error = %e, "teardown failed");
                self.teardown_error = Some(e);
            }
        }

        if !self.options.keep_variables {
            self.frames = vec![BTreeMap::new()];
        }
        self.context.clear();

        match &outcome {
            Ok(_) => tracing::debug!(title = ?program.title(), "program finished"),
            Err(e) => tracing::debug!(title = ?program.title(), error = %e, "program failed"),
        }
        outcome
    }

    fn run_main(
        &mut self,
        program: &Program,
        seed: BTreeMap<String, Value>,
    ) -> Result<Value, ExecError> {
        for (name, value) in seed {
            self.set_variable(&name, value)?;
        }
        self.process_metadata(&program.metadata)?;
        self.register_functions(program, self.current_file.clone());

        match self.run_block(&program.body)? {
            Flow::Return(v) => Ok(v),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }

    fn run_teardown(&mut self, teardown: &Teardown) -> Result<(), ExecError> {
        tracing::debug!(line = teardown.line, "running teardown");
        self.run_block(&teardown.body).map(|_| ())
    }

    fn process_metadata(&mut self, metadata: &[Metadata]) -> Result<(), ExecError> {
        for hook in &self.hooks {
            hook.on_metadata(metadata);
        }
        for item in metadata {
            match item {
                Metadata::Import { path, line } => {
                    self.import_file(path)
                        .map_err(|e| located(e, *line, "Import"))?;
                }
                Metadata::RemoteImport { url, alias, line } => {
                    self.connect_remote(url, alias)
                        .map_err(|e| located(e, *line, "RemoteImport"))?;
                }
                Metadata::Name { value, .. } => tracing::info!(name = %value, "test"),
                Metadata::Description { .. }
                | Metadata::Tags { .. }
                | Metadata::Author { .. }
                | Metadata::Date { .. }
                | Metadata::Data { .. } => {}
            }
        }
        Ok(())
    }

    // ──────────────────────────────────────────────
    // Statements
    // ──────────────────────────────────────────────

    pub(crate) fn run_block(&mut self, stmts: &[Stmt]) -> Result<Flow, ExecError> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, ExecError> {
        self.exec_kind(&stmt.kind)
            .map_err(|e| located(e, stmt.line, stmt.kind.node_name()))
    }

    fn exec_kind(&mut self, kind: &StmtKind) -> Result<Flow, ExecError> {
        match kind {
            StmtKind::Assign { target, value } => {
                let v = self.eval_expr(value)?;
                self.set_variable(target, v)?;
            }
            StmtKind::AssignCall { target, call } => {
                let args = self.eval_args(&call.args)?;
                let raw = self.invoke_keyword(&call.name, args, call.line)?;
                self.assign_result(target, &call.name, raw)?;
            }
            StmtKind::AssignRemoteCall { target, call } => {
                let args = self.eval_args(&call.args)?;
                let raw = self.call_remote(call, args)?;
                self.assign_result(target, &call.qualified_name(), raw)?;
            }
            StmtKind::For {
                var,
                start,
                end,
                body,
            } => {
                let lo = self.range_bound(start)?;
                let hi = self.range_bound(end)?;
                for i in lo..hi {
                    self.set_variable(var, Value::Int(i))?;
                    match self.run_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            StmtKind::If {
                cond,
                then_body,
                elifs,
                else_body,
            } => {
                if self.eval_expr(cond)?.is_truthy() {
                    return self.run_block(then_body);
                }
                for clause in elifs {
                    if self.eval_expr(&clause.cond)?.is_truthy() {
                        return self.run_block(&clause.body);
                    }
                }
                if let Some(body) = else_body {
                    return self.run_block(body);
                }
            }
            StmtKind::Call(call) => {
                let args = self.eval_args(&call.args)?;
                let raw = self.invoke_keyword(&call.name, args, call.line)?;
                self.absorb(raw)?;
            }
            StmtKind::RemoteCall(call) => {
                let args = self.eval_args(&call.args)?;
                let raw = self.call_remote(call, args)?;
                self.absorb(raw)?;
            }
            StmtKind::Return { value } => {
                let v = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(v));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            // registered before the body runs
            StmtKind::Function(_) => {}
        }
        Ok(Flow::Normal)
    }

    fn range_bound(&mut self, expr: &kwdsl_core::Expr) -> Result<i64, ExecError> {
        let v = self.eval_expr(expr)?;
        v.as_i64().ok_or_else(|| {
            ExecError::type_error(format!(
                "range bounds must be integers, got {} '{}'",
                v.type_name(),
                v
            ))
        })
    }

    fn assign_result(&mut self, target: &str, keyword: &str, raw: Value) -> Result<(), ExecError> {
        if raw.is_null() {
            return Err(ExecError::NoResult {
                keyword: keyword.to_owned(),
            });
        }
        let result = self.absorb(raw)?;
        self.set_variable(target, result)
    }

    /// Unpack an envelope: captures are bound first, then the primary
    /// result is returned. Plain values pass through.
    pub(crate) fn absorb(&mut self, raw: Value) -> Result<Value, ExecError> {
        if !Envelope::detect(&raw) {
            return Ok(raw);
        }
        let envelope = Envelope::from_value(raw);
        for (name, value) in envelope.captures {
            self.set_variable(&name, value)?;
        }
        for (name, value) in envelope.session_state {
            self.context.set(name, value);
        }
        if !envelope.metadata.is_empty() {
            tracing::debug!(metadata = ?envelope.metadata, "keyword metadata");
        }
        Ok(envelope.result)
    }

    // ──────────────────────────────────────────────
    // Keyword dispatch
    // ──────────────────────────────────────────────

    /// Look up, bind and run a keyword. Failures are logged with the bound
    /// parameters and returned unchanged.
    pub fn invoke_keyword(
        &mut self,
        name: &str,
        raw_args: Vec<(String, Value)>,
        line: u32,
    ) -> Result<Value, ExecError> {
        let keyword = self
            .registry
            .get(name)
            .ok_or_else(|| ExecError::KeywordNotFound {
                name: name.to_owned(),
            })?;
        let args = keyword.bind(raw_args)?;
        tracing::debug!(keyword = name, line, "invoking keyword");

        let mut inv = Invocation {
            executor: self,
            args,
            keyword: name.to_owned(),
            line,
        };
        let result = keyword.call(&mut inv);
        if let Err(e) = &result {
            if !e.is_located() {
                tracing::error!(
                    keyword = name,
                    line,
                    params = ?inv.args.values(),
                    error = %e,
                    "keyword failed"
                );
            }
        }
        result
    }

    pub(crate) fn call_remote(
        &mut self,
        call: &RemoteCall,
        args: Vec<(String, Value)>,
    ) -> Result<Value, ExecError> {
        let name = call.qualified_name();
        if !self.registry.contains(&name) {
            return Err(ExecError::KeywordNotFound { name });
        }
        self.invoke_keyword(&name, args, call.line)
    }

    fn connect_remote(&mut self, url: &str, alias: &str) -> Result<(), ExecError> {
        let url = self.replacer().replace_in_string(url).to_string();
        let connector = self.connector.clone().ok_or_else(|| ExecError::Transport {
            url: url.clone(),
            message: "no remote connector configured".to_owned(),
        })?;

        let mut vars: BTreeMap<String, Value> = self.config.entries().clone();
        for (name, value) in self.globals.snapshot()? {
            vars.insert(name, Value::from(value));
        }
        for hook in &self.hooks {
            vars = hook.filter_sync_variables(vars);
        }

        let count = connector.connect(&url, alias, &vars, &self.registry)?;
        tracing::info!(alias, url = %url, keywords = count, "remote keywords registered");
        Ok(())
    }

    fn load_from_hooks(&self, id: &str) -> Option<String> {
        self.hooks.iter().find_map(|h| h.load_content(id))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("frames", &self.frames)
            .field("context", &self.context)
            .field("options", &self.options)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

fn data_source(metadata: &[Metadata]) -> Option<(&str, &str, u32)> {
    metadata.iter().find_map(|m| match m {
        Metadata::Data { file, format, line } => Some((file.as_str(), format.as_str(), *line)),
        _ => None,
    })
}

/// Attach the first statement an error passes through.
fn located(e: ExecError, line: u32, node: &'static str) -> ExecError {
    if e.is_located() {
        return e;
    }
    tracing::error!(line, node, error = %e, "execution failed");
    ExecError::Located {
        line,
        node,
        source: Box::new(e),
    }
}
