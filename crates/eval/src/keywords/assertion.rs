//! Assertion keywords.
//!
//! Every failed check is an [`ExecError::Assertion`], including a condition
//! that cannot be evaluated at all.

use kwdsl_core::CompareOp;
use regex::Regex;
use serde_json_path::JsonPath;

use crate::error::ExecError;
use crate::executor::Executor;
use crate::expr::compare;
use crate::registry::{Invocation, KeywordRegistry, KeywordSpec};
use crate::value::{numeric_text, Value};

/// Operators understood by `数据比较`, `JSON断言` and textual conditions.
pub const OPERATORS: &[&str] = &[
    "==", "!=", ">", "<", ">=", "<=", "contains", "not_contains", "matches",
];

/// Word operators a `断言` condition may use in place of an expression.
const TEXT_OPERATORS: &[&str] = &["not_contains", "contains", "matches"];

pub(super) fn register(registry: &KeywordRegistry) {
    registry.register(
        KeywordSpec::new("断言")
            .param(
                "条件",
                "condition",
                "boolean, an expression such as \"${code} == 200\", or \"<text> contains <text>\"",
            )
            .param_default("消息", "message", "message reported on failure", "assertion failed")
            .category("assertion")
            .tags(&["assert"])
            .doc("Fail the test unless the condition holds."),
        |inv| {
            let condition = inv.args.get("condition").cloned().unwrap_or_default();
            let message = inv.args.string("message")?;
            let holds = match &condition {
                Value::Str(source) => evaluate_condition(inv.executor, source).map_err(|e| {
                    ExecError::assertion(format!(
                        "{} (cannot evaluate condition '{}': {})",
                        message, source, e
                    ))
                })?,
                other => other.is_truthy(),
            };
            if holds {
                Ok(Value::Bool(true))
            } else {
                Err(ExecError::assertion(format!("{} ({})", message, condition)))
            }
        },
    );

    registry.register(
        KeywordSpec::new("数据比较")
            .param("实际值", "actual", "actual value")
            .param("预期值", "expected", "expected value")
            .param_default("操作符", "operator", "one of ==, !=, >, <, >=, <=, contains, not_contains, matches", "==")
            .param_default("消息", "message", "message reported on failure", "data comparison failed")
            .category("assertion")
            .tags(&["assert", "compare"])
            .doc("Compare two values and fail unless the comparison holds."),
        |inv| {
            let actual = inv.args.get("actual").cloned().unwrap_or_default();
            let expected = inv.args.get("expected").cloned().unwrap_or_default();
            let operator = inv.args.string("operator")?;
            let message = inv.args.string("message")?;
            check(&actual, &expected, &operator, &message).map_err(|e| e.into_error(inv))
        },
    );

    registry.register(
        KeywordSpec::new("JSON断言")
            .param("JSON数据", "json_data", "JSON text or a structured value")
            .param("JSONPath", "jsonpath", "JSONPath expression, e.g. $.data.items[0].id")
            .param("预期值", "expected_value", "expected value")
            .param_default("操作符", "operator", "comparison operator", "==")
            .param_default("消息", "message", "message reported on failure", "JSON assertion failed")
            .category("assertion")
            .tags(&["assert", "json"])
            .doc("Extract a value with JSONPath and compare it with the expected value."),
        |inv| {
            let data = json_argument(inv)?;
            let path = inv.args.string("jsonpath")?;
            let actual = extract(&data, &path).map_err(|e| inv.fail(e))?;
            let expected = inv.args.get("expected_value").cloned().unwrap_or_default();
            let operator = inv.args.string("operator")?;
            let message = inv.args.string("message")?;
            tracing::debug!(path = %path, actual = %actual, "json value extracted");
            check(&actual, &expected, &operator, &message).map_err(|e| e.into_error(inv))
        },
    );

    registry.register(
        KeywordSpec::new("JSON提取")
            .param("JSON数据", "json_data", "JSON text or a structured value")
            .param("JSONPath", "jsonpath", "JSONPath expression")
            .param_default("变量名", "variable", "informational name of the target variable", "")
            .category("data")
            .tags(&["json", "extract"])
            .doc(
                "Extract a value with JSONPath. One match is returned as is, several as a \
                 list, none as null.",
            ),
        |inv| {
            let data = json_argument(inv)?;
            let path = inv.args.string("jsonpath")?;
            let value = extract(&data, &path).map_err(|e| inv.fail(e))?;
            tracing::debug!(
                path = %path,
                variable = %inv.args.get("variable").cloned().unwrap_or_default(),
                "json value extracted"
            );
            Ok(value)
        },
    );

    registry.register(
        KeywordSpec::new("类型断言")
            .param("值", "value", "value to check")
            .param("类型", "type", "string, number, boolean, list, object or null")
            .param_default("消息", "message", "message reported on failure", "type assertion failed")
            .category("assertion")
            .tags(&["assert", "type"])
            .doc("Fail unless the value has the expected type."),
        |inv| {
            let value = inv.args.get("value").cloned().unwrap_or_default();
            let expected = inv.args.string("type")?;
            let message = inv.args.string("message")?;
            let holds = match expected.as_str() {
                "string" => matches!(value, Value::Str(_)),
                "number" => matches!(value, Value::Int(_) | Value::Float(_)),
                "boolean" => matches!(value, Value::Bool(_)),
                "list" => matches!(value, Value::List(_)),
                "object" => matches!(value, Value::Map(_)),
                "null" => value.is_null(),
                other => {
                    return Err(ExecError::Argument {
                        keyword: inv.keyword.clone(),
                        message: format!("unsupported type '{}'", other),
                    })
                }
            };
            if holds {
                Ok(Value::Bool(true))
            } else {
                Err(ExecError::assertion(format!(
                    "{} (expected {}, got {} '{}')",
                    message,
                    expected,
                    value.type_name(),
                    value
                )))
            }
        },
    );
}

// ──────────────────────────────────────────────
// Conditions
// ──────────────────────────────────────────────

/// An expression first; failing that, `<left> contains|not_contains|matches <right>`.
fn evaluate_condition(executor: &mut Executor, source: &str) -> Result<bool, String> {
    let expr_error = match executor.eval_condition(source) {
        Ok(holds) => return Ok(holds),
        Err(e) => e,
    };
    for op in TEXT_OPERATORS {
        if let Some((left, right)) = source.split_once(&format!(" {} ", op)) {
            let left = Value::from(unquote(left.trim()));
            let right = Value::from(unquote(right.trim()));
            return compare_values(&left, &right, op);
        }
    }
    Err(expr_error.to_string())
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

enum CheckError {
    Failed(String),
    Invalid(String),
}

impl CheckError {
    fn into_error(self, inv: &Invocation<'_>) -> ExecError {
        match self {
            CheckError::Failed(message) => ExecError::assertion(message),
            CheckError::Invalid(message) => inv.fail(message),
        }
    }
}

fn check(actual: &Value, expected: &Value, operator: &str, message: &str) -> Result<Value, CheckError> {
    match compare_values(actual, expected, operator) {
        Ok(true) => Ok(Value::Bool(true)),
        Ok(false) => Err(CheckError::Failed(format!(
            "{} (actual '{}' {} expected '{}')",
            message, actual, operator, expected
        ))),
        Err(e) => Err(CheckError::Invalid(e)),
    }
}

/// Loose comparison: `"true"`/`"false"` read as booleans and numeric text
/// reads as a number when the other side is numeric.
pub(crate) fn compare_values(actual: &Value, expected: &Value, operator: &str) -> Result<bool, String> {
    match operator {
        "contains" => return Ok(contains(actual, expected).unwrap_or(false)),
        "not_contains" => return Ok(!contains(actual, expected).unwrap_or(false)),
        "matches" => {
            return match (actual, expected) {
                (Value::Str(text), Value::Str(pattern)) => Regex::new(&format!("^(?:{})", pattern))
                    .map(|re| re.is_match(text))
                    .map_err(|e| format!("invalid regular expression '{}': {}", pattern, e)),
                _ => Ok(false),
            }
        }
        _ => {}
    }

    let op = match operator {
        "==" => CompareOp::Eq,
        "!=" => CompareOp::Neq,
        ">" => CompareOp::Gt,
        "<" => CompareOp::Lt,
        ">=" => CompareOp::Gte,
        "<=" => CompareOp::Lte,
        other => {
            return Err(format!(
                "unsupported operator '{}' (expected one of: {})",
                other,
                OPERATORS.join(", ")
            ))
        }
    };

    let expected = loosen(expected.clone());
    let mut actual = loosen_bool(actual.clone());
    if matches!(expected, Value::Int(_) | Value::Float(_)) {
        if let Value::Str(s) = &actual {
            if let Some(n) = numeric_text(s.trim()) {
                actual = n;
            }
        }
    }
    compare(op, actual, expected).map_err(|e| e.to_string())
}

/// `None` when `haystack` is not something that can contain anything.
fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match haystack {
        Value::Str(text) => Some(match needle {
            Value::Str(n) => text.contains(n.as_str()),
            other => text.contains(&other.to_string()),
        }),
        Value::List(items) => Some(items.iter().any(|item| {
            item == needle || compare(CompareOp::Eq, item.clone(), needle.clone()).unwrap_or(false)
        })),
        Value::Map(m) => Some(m.contains_key(&needle.to_string())),
        _ => None,
    }
}

fn loosen_bool(v: Value) -> Value {
    match v {
        Value::Str(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
        Value::Str(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
        other => other,
    }
}

fn loosen(v: Value) -> Value {
    match loosen_bool(v) {
        Value::Str(s) => numeric_text(&s).unwrap_or(Value::Str(s)),
        other => other,
    }
}

// ──────────────────────────────────────────────
// JSON
// ──────────────────────────────────────────────

fn json_argument(inv: &Invocation<'_>) -> Result<serde_json::Value, ExecError> {
    match inv.args.require("json_data")? {
        Value::Str(text) => {
            serde_json::from_str(text).map_err(|e| inv.fail(format!("invalid JSON data: {}", e)))
        }
        other => Ok(other.to_json()),
    }
}

pub(crate) fn extract(data: &serde_json::Value, path: &str) -> Result<Value, String> {
    let compiled =
        JsonPath::parse(path).map_err(|e| format!("invalid JSONPath '{}': {}", path, e))?;
    let nodes = compiled.query(data).all();
    Ok(match nodes.as_slice() {
        [] => Value::Null,
        [one] => Value::from((*one).clone()),
        many => Value::List(many.iter().map(|v| Value::from((*v).clone())).collect()),
    })
}
