//! Keyword catalog and call-time parameter binding.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::error::ExecError;
use crate::executor::Executor;
use crate::context::TestContext;
use crate::value::Value;

/// The callable behind a keyword.
pub type KeywordFn = Arc<dyn Fn(&mut Invocation<'_>) -> Result<Value, ExecError> + Send + Sync>;

// ──────────────────────────────────────────────
// Declarations
// ──────────────────────────────────────────────

/// One declared parameter: the display name authors write, the canonical
/// name the implementation reads, and an optional default.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub mapping: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeywordSource {
    Builtin,
    /// Defined with `function` in a DSL file.
    Custom { file: Option<String> },
    /// Served by a remote keyword server.
    Remote { alias: String, url: String },
}

/// Registration entry: everything about a keyword except its callable.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordSpec {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub category: String,
    pub tags: Vec<String>,
    pub doc: String,
    pub source: KeywordSource,
}

impl KeywordSpec {
    pub fn new(name: impl Into<String>) -> Self {
        KeywordSpec {
            name: name.into(),
            params: Vec::new(),
            category: "general".to_owned(),
            tags: Vec::new(),
            doc: String::new(),
            source: KeywordSource::Builtin,
        }
    }

    pub fn param(mut self, name: &str, mapping: &str, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_owned(),
            mapping: mapping.to_owned(),
            description: description.to_owned(),
            default: None,
        });
        self
    }

    pub fn param_default(
        mut self,
        name: &str,
        mapping: &str,
        description: &str,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.to_owned(),
            mapping: mapping.to_owned(),
            description: description.to_owned(),
            default: Some(default.into()),
        });
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_owned();
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| (*t).to_owned()).collect();
        self
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_owned();
        self
    }

    pub fn source(mut self, source: KeywordSource) -> Self {
        self.source = source;
        self
    }

    fn param_for(&self, name: &str) -> Option<&ParamSpec> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .or_else(|| self.params.iter().find(|p| p.mapping == name))
    }
}

pub struct Keyword {
    pub spec: KeywordSpec,
    func: KeywordFn,
}

impl Keyword {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Translate display names to canonical names and fill defaults.
    /// Canonical names are accepted as-is; anything else is rejected.
    pub fn bind(&self, raw: Vec<(String, Value)>) -> Result<Args, ExecError> {
        let mut values = BTreeMap::new();
        for (name, value) in raw {
            let Some(param) = self.spec.param_for(&name) else {
                let known: Vec<&str> = self.spec.params.iter().map(|p| p.name.as_str()).collect();
                return Err(ExecError::Argument {
                    keyword: self.spec.name.clone(),
                    message: format!(
                        "unknown parameter '{}' (expected one of: {})",
                        name,
                        known.join(", ")
                    ),
                });
            };
            values.insert(param.mapping.clone(), value);
        }
        for p in &self.spec.params {
            if let Some(default) = &p.default {
                values
                    .entry(p.mapping.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        Ok(Args {
            keyword: self.spec.name.clone(),
            values,
        })
    }

    pub fn call(&self, inv: &mut Invocation<'_>) -> Result<Value, ExecError> {
        (self.func)(inv)
    }
}

impl std::fmt::Debug for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyword").field("spec", &self.spec).finish()
    }
}

// ──────────────────────────────────────────────
// Call-time arguments
// ──────────────────────────────────────────────

/// Arguments keyed by canonical parameter name.
#[derive(Debug, Clone, Default)]
pub struct Args {
    keyword: String,
    values: BTreeMap<String, Value>,
}

impl Args {
    pub fn new(keyword: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        Args {
            keyword: keyword.into(),
            values,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn require(&self, name: &str) -> Result<&Value, ExecError> {
        self.get(name).ok_or_else(|| ExecError::Argument {
            keyword: self.keyword.clone(),
            message: format!("missing required parameter '{}'", name),
        })
    }

    /// Any value, rendered as text.
    pub fn string(&self, name: &str) -> Result<String, ExecError> {
        Ok(match self.require(name)? {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn i64(&self, name: &str) -> Result<i64, ExecError> {
        let v = self.require(name)?;
        v.as_i64().ok_or_else(|| self.mistyped(name, "an integer", v))
    }

    pub fn f64(&self, name: &str) -> Result<f64, ExecError> {
        let v = self.require(name)?;
        v.as_f64().ok_or_else(|| self.mistyped(name, "a number", v))
    }

    /// Missing counts as false; strings `"false"`/`"0"` are false too.
    pub fn flag(&self, name: &str) -> bool {
        match self.get(name) {
            None => false,
            Some(Value::Str(s)) => !matches!(s.to_ascii_lowercase().as_str(), "" | "false" | "0"),
            Some(v) => v.is_truthy(),
        }
    }

    /// A map argument; absent means empty.
    pub fn map(&self, name: &str) -> Result<BTreeMap<String, Value>, ExecError> {
        match self.get(name) {
            None => Ok(BTreeMap::new()),
            Some(Value::Map(m)) => Ok(m.clone()),
            Some(other) => Err(self.mistyped(name, "a map", other)),
        }
    }

    /// A list argument; a single scalar becomes a one-element list.
    pub fn list(&self, name: &str) -> Vec<Value> {
        match self.get(name) {
            None => Vec::new(),
            Some(Value::List(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        }
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }

    fn mistyped(&self, name: &str, expected: &str, got: &Value) -> ExecError {
        ExecError::Argument {
            keyword: self.keyword.clone(),
            message: format!(
                "parameter '{}' must be {}, got {} '{}'",
                name,
                expected,
                got.type_name(),
                got
            ),
        }
    }
}

/// Everything a keyword implementation receives: its bound arguments and
/// the executor running it, which owns the shared test context.
pub struct Invocation<'a> {
    pub executor: &'a mut Executor,
    pub args: Args,
    pub keyword: String,
    pub line: u32,
}

impl<'a> Invocation<'a> {
    pub fn context(&mut self) -> &mut TestContext {
        self.executor.context_mut()
    }

    /// A keyword failure attributed to this keyword.
    pub fn fail(&self, message: impl Into<String>) -> ExecError {
        ExecError::keyword(self.keyword.clone(), message)
    }
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

/// Process-wide keyword catalog. Shared by reference between executors,
/// the remote server and remote connectors.
#[derive(Default)]
pub struct KeywordRegistry {
    entries: RwLock<BTreeMap<String, Arc<Keyword>>>,
}

impl KeywordRegistry {
    pub fn new() -> Self {
        KeywordRegistry::default()
    }

    /// A registry preloaded with the built-in keywords.
    pub fn with_builtins() -> Self {
        let registry = KeywordRegistry::new();
        crate::keywords::register_builtins(&registry);
        registry
    }

    /// Add or replace a keyword.
    pub fn register<F>(&self, spec: KeywordSpec, func: F)
    where
        F: Fn(&mut Invocation<'_>) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        let name = spec.name.clone();
        let keyword = Arc::new(Keyword {
            spec,
            func: Arc::new(func),
        });
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.insert(name.clone(), keyword).is_some() {
            tracing::debug!(keyword = %name, "keyword re-registered");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Keyword>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.keys().cloned().collect()
    }

    pub fn specs(&self) -> Vec<KeywordSpec> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.values().map(|k| k.spec.clone()).collect()
    }

    /// Markdown reference of every keyword, grouped by category.
    pub fn generate_docs(&self) -> String {
        let mut by_category: BTreeMap<String, Vec<KeywordSpec>> = BTreeMap::new();
        for spec in self.specs() {
            by_category
                .entry(spec.category.clone())
                .or_default()
                .push(spec);
        }

        let mut out = String::from("# Keywords\n");
        for (category, specs) in by_category {
            let _ = write!(out, "\n## {}\n", category);
            for spec in specs {
                let _ = write!(out, "\n### [{}]\n\n", spec.name);
                if !spec.doc.is_empty() {
                    let _ = writeln!(out, "{}\n", spec.doc);
                }
                if spec.params.is_empty() {
                    out.push_str("No parameters.\n");
                    continue;
                }
                out.push_str("| Parameter | Maps to | Default | Description |\n");
                out.push_str("|---|---|---|---|\n");
                for p in &spec.params {
                    let default = p
                        .default
                        .as_ref()
                        .map(|d| format!("`{}`", d))
                        .unwrap_or_else(|| "required".to_owned());
                    let _ = writeln!(
                        out,
                        "| {} | {} | {} | {} |",
                        p.name, p.mapping, default, p.description
                    );
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for KeywordRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordRegistry")
            .field("keywords", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KeywordRegistry {
        let registry = KeywordRegistry::new();
        registry.register(
            KeywordSpec::new("发送请求")
                .param("地址", "url", "target URL")
                .param_default("超时", "timeout", "seconds", 30i64)
                .category("http"),
            |inv| Ok(Value::Map(inv.args.values().clone())),
        );
        registry
    }

    #[test]
    fn binds_display_and_canonical_names_and_fills_defaults() {
        let registry = sample();
        let kw = registry.get("发送请求").unwrap();
        let args = kw
            .bind(vec![("地址".into(), Value::from("http://a"))])
            .unwrap();
        assert_eq!(args.string("url").unwrap(), "http://a");
        assert_eq!(args.i64("timeout").unwrap(), 30);

        let args = kw
            .bind(vec![
                ("url".into(), Value::from("http://b")),
                ("超时".into(), Value::Int(5)),
            ])
            .unwrap();
        assert_eq!(args.i64("timeout").unwrap(), 5);
    }

    #[test]
    fn unknown_parameters_are_rejected() {
        let registry = sample();
        let kw = registry.get("发送请求").unwrap();
        let err = kw.bind(vec![("方法".into(), Value::from("GET"))]).unwrap_err();
        assert!(matches!(err, ExecError::Argument { .. }));
        assert!(err.to_string().contains("地址"));
    }

    #[test]
    fn typed_getters_report_the_offending_value() {
        let args = Args::new(
            "k",
            BTreeMap::from([
                ("n".to_owned(), Value::from("x")),
                ("f".to_owned(), Value::from("False")),
            ]),
        );
        let err = args.i64("n").unwrap_err();
        assert!(err.to_string().contains("must be an integer"));
        assert!(!args.flag("f"));
        assert!(!args.flag("absent"));
        assert!(args.require("absent").is_err());
    }

    #[test]
    fn docs_list_every_parameter() {
        let docs = sample().generate_docs();
        assert!(docs.contains("## http"));
        assert!(docs.contains("### [发送请求]"));
        assert!(docs.contains("| 超时 | timeout | `30` | seconds |"));
        assert!(docs.contains("| 地址 | url | required | target URL |"));
    }
}
