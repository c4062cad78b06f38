//! Four-tier variable lookup and `${...}` interpolation.
//!
//! Lookup order is local scope, test context, configuration, global store.
//! An unresolved reference is not an error: it resolves to its own literal
//! text (`${name}`), so partial templates survive intact.

use std::collections::BTreeMap;
use std::ops::Range;

use kwdsl_storage::GlobalStore;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ConfigVars;
use crate::context::TestContext;
use crate::value::Value;

const IDENT: &str = r"[\p{L}_][\p{L}\p{N}_]*";

fn accessor() -> String {
    format!(r"(?:\.{}|\.\d+|\[[^\[\]]+\])", IDENT)
}

static NESTED_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\$\{{({}(?:{})+)\}}", IDENT, accessor()))
        .expect("Invalid regex pattern")
});

static SIMPLE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\$\{{({})\}}", IDENT)).expect("Invalid regex pattern"));

static WHOLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\$\{{({}(?:{})*)\}}$", IDENT, accessor()))
        .expect("Invalid regex pattern")
});

/// One step of a reference path after the root name.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// `.name`
    Field(String),
    /// `[3]`, `[-1]` or `.0`
    Index(i64),
    /// `["key"]`, `['key']` or `[key]`
    Key(String),
}

fn parse_path(reference: &str) -> Option<(String, Vec<Segment>)> {
    let end = reference.find(['.', '[']).unwrap_or(reference.len());
    let root = reference[..end].to_owned();
    let mut rest = &reference[end..];
    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let stop = after.find(['.', '[']).unwrap_or(after.len());
            let name = &after[..stop];
            segments.push(match name.parse::<i64>() {
                Ok(i) => Segment::Index(i),
                Err(_) => Segment::Field(name.to_owned()),
            });
            rest = &after[stop..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']')?;
            let inner = after[..close].trim();
            let unquoted = inner
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
            segments.push(match (unquoted, inner.parse::<i64>()) {
                (Some(key), _) => Segment::Key(key.to_owned()),
                (None, Ok(i)) => Segment::Index(i),
                (None, Err(_)) => Segment::Key(inner.to_owned()),
            });
            rest = &after[close + 1..];
        } else {
            return None;
        }
    }
    Some((root, segments))
}

fn step<'v>(value: &'v Value, seg: &Segment) -> Option<&'v Value> {
    match (value, seg) {
        (Value::Map(m), Segment::Field(k)) | (Value::Map(m), Segment::Key(k)) => m.get(k),
        (Value::Map(m), Segment::Index(i)) => m.get(&i.to_string()),
        (Value::List(items), Segment::Index(i)) => {
            let len = items.len() as i64;
            let idx = if *i < 0 { len + i } else { *i };
            if (0..len).contains(&idx) {
                items.get(idx as usize)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Read-only view over the four variable tiers.
pub struct VariableReplacer<'a> {
    locals: &'a BTreeMap<String, Value>,
    context: &'a TestContext,
    config: &'a ConfigVars,
    globals: &'a dyn GlobalStore,
}

impl<'a> VariableReplacer<'a> {
    pub fn new(
        locals: &'a BTreeMap<String, Value>,
        context: &'a TestContext,
        config: &'a ConfigVars,
        globals: &'a dyn GlobalStore,
    ) -> Self {
        VariableReplacer {
            locals,
            context,
            config,
            globals,
        }
    }

    /// The value bound to `name` in the first tier that has it.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.locals.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.context.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.config.get(name) {
            return Some(v.clone());
        }
        match self.globals.get(name) {
            Ok(v) => v.map(Value::from),
            Err(e) => {
                tracing::warn!(name, error = %e, "global store lookup failed");
                None
            }
        }
    }

    /// [`lookup`](Self::lookup), or the literal `${name}` when unresolved.
    pub fn get(&self, name: &str) -> Value {
        self.lookup(name)
            .unwrap_or_else(|| Value::Str(format!("${{{}}}", name)))
    }

    /// Resolve a reference path such as `resp.items[0]["id"]`.
    pub fn resolve(&self, reference: &str) -> Option<Value> {
        let (root, segments) = parse_path(reference)?;
        let mut value = self.lookup(&root)?;
        for seg in &segments {
            value = step(&value, seg)?.clone();
        }
        Some(value)
    }

    /// Interpolate every `${...}` in `s`. A string that is exactly one
    /// reference yields the referenced value with its own type; anything
    /// else yields a string.
    pub fn replace_in_string(&self, s: &str) -> Value {
        if let Some(caps) = WHOLE_REF.captures(s) {
            return self
                .resolve(&caps[1])
                .unwrap_or_else(|| Value::Str(s.to_owned()));
        }
        if !s.contains("${") {
            return Value::Str(s.to_owned());
        }

        // Both patterns match against the original text, so substituted
        // values are never scanned again.
        let mut found: Vec<(Range<usize>, &str)> = NESTED_REF
            .captures_iter(s)
            .filter_map(|c| Some((c.get(0)?.range(), c.get(1)?.as_str())))
            .collect();
        let simple: Vec<(Range<usize>, &str)> = SIMPLE_REF
            .captures_iter(s)
            .filter_map(|c| Some((c.get(0)?.range(), c.get(1)?.as_str())))
            .filter(|(r, _)| !found.iter().any(|(n, _)| r.start < n.end && n.start < r.end))
            .collect();
        found.extend(simple);
        found.sort_by_key(|(r, _)| r.start);

        let mut out = s.to_owned();
        // right to left, so earlier offsets stay valid
        for (range, reference) in found.into_iter().rev() {
            if let Some(v) = self.resolve(reference) {
                out.replace_range(range, &v.to_string());
            }
        }
        Value::Str(out)
    }

    /// Interpolate recursively through lists and maps (keys included).
    pub fn replace_in_value(&self, value: &Value) -> Value {
        match value {
            Value::Str(s) => self.replace_in_string(s),
            Value::List(items) => {
                Value::List(items.iter().map(|v| self.replace_in_value(v)).collect())
            }
            Value::Map(m) => Value::Map(
                m.iter()
                    .map(|(k, v)| {
                        let key = match self.replace_in_string(k) {
                            Value::Str(s) => s,
                            other => other.to_string(),
                        };
                        (key, self.replace_in_value(v))
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwdsl_storage::MemoryStore;
    use serde_json::json;

    struct Tiers {
        locals: BTreeMap<String, Value>,
        context: TestContext,
        config: ConfigVars,
        globals: MemoryStore,
    }

    impl Tiers {
        fn new() -> Self {
            let mut locals = BTreeMap::new();
            locals.insert("name".to_owned(), Value::from("local"));
            locals.insert(
                "resp".to_owned(),
                Value::from(json!({"items": [{"id": 7}, {"id": 8}], "code": 200})),
            );
            let mut context = TestContext::new();
            context.set("name", Value::from("context"));
            context.set("token", Value::from("t-1"));
            let config =
                ConfigVars::from_json(json!({"token": "cfg", "base_url": "http://x"})).unwrap();
            let globals = MemoryStore::new();
            globals.set("g_run", json!(3)).unwrap();
            globals.set("base_url", json!("global")).unwrap();
            Tiers {
                locals,
                context,
                config,
                globals,
            }
        }

        fn replacer(&self) -> VariableReplacer<'_> {
            VariableReplacer::new(&self.locals, &self.context, &self.config, &self.globals)
        }
    }

    #[test]
    fn lookup_order_is_local_context_config_global() {
        let t = Tiers::new();
        let r = t.replacer();
        assert_eq!(r.get("name"), Value::from("local"));
        assert_eq!(r.get("token"), Value::from("t-1"));
        assert_eq!(r.get("base_url"), Value::from("http://x"));
        assert_eq!(r.get("g_run"), Value::Int(3));
    }

    #[test]
    fn unresolved_reference_round_trips_as_text() {
        let t = Tiers::new();
        let r = t.replacer();
        assert_eq!(r.get("missing"), Value::from("${missing}"));
        assert_eq!(
            r.replace_in_string("${undefined_var}"),
            Value::from("${undefined_var}")
        );
        assert_eq!(
            r.replace_in_string("a ${nope.x} b ${name}"),
            Value::from("a ${nope.x} b local")
        );
    }

    #[test]
    fn whole_reference_keeps_native_type() {
        let t = Tiers::new();
        let r = t.replacer();
        assert_eq!(r.replace_in_string("${resp.code}"), Value::Int(200));
        assert_eq!(r.replace_in_string("${resp.items[1].id}"), Value::Int(8));
        assert_eq!(r.replace_in_string("${resp.items[-1][\"id\"]}"), Value::Int(8));
        assert_eq!(r.replace_in_string("code=${resp.code}"), Value::from("code=200"));
    }

    #[test]
    fn several_references_in_one_string() {
        let t = Tiers::new();
        let r = t.replacer();
        assert_eq!(
            r.replace_in_string("${name}/${resp.items.0.id}/${name}/${g_run}"),
            Value::from("local/7/local/3")
        );
    }

    #[test]
    fn substituted_text_is_not_expanded_again() {
        let mut t = Tiers::new();
        t.locals.insert(
            "tpl".to_owned(),
            Value::from(json!({"body": "literal ${name}"})),
        );
        t.locals.insert("raw".to_owned(), Value::from("${token}"));
        let r = t.replacer();
        assert_eq!(
            r.replace_in_string("[${tpl.body}] [${name}]"),
            Value::from("[literal ${name}] [local]")
        );
        assert_eq!(
            r.replace_in_string("${raw} ${token}"),
            Value::from("${token} t-1")
        );
    }

    #[test]
    fn replace_in_value_recurses() {
        let t = Tiers::new();
        let r = t.replacer();
        let v = Value::from(json!({"${name}": ["${g_run}", {"k": "x${token}"}]}));
        assert_eq!(
            r.replace_in_value(&v),
            Value::from(json!({"local": [3, {"k": "xt-1"}]}))
        );
    }

    #[test]
    fn path_parsing() {
        assert_eq!(
            parse_path("a.b[0]['c'][d].1"),
            Some((
                "a".to_owned(),
                vec![
                    Segment::Field("b".into()),
                    Segment::Index(0),
                    Segment::Key("c".into()),
                    Segment::Key("d".into()),
                    Segment::Index(1),
                ]
            ))
        );
        assert_eq!(parse_path("a[0"), None);
    }
}
