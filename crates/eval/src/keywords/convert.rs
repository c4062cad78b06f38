//! Math and conversion keywords.
//!
//! Numeric text is accepted wherever a number is expected.

use kwdsl_core::CompareOp;

use super::general::round_to;
use crate::error::ExecError;
use crate::expr::compare;
use crate::registry::{Invocation, KeywordRegistry, KeywordSpec};
use crate::value::Value;

pub(super) fn register(registry: &KeywordRegistry) {
    registry.register(
        KeywordSpec::new("求和")
            .param("数据", "data", "list of numbers")
            .param_default("起始值", "start", "value the sum starts from", 0i64)
            .category("system/general")
            .tags(&["math"])
            .doc("Sum a list of numbers."),
        |inv| {
            let items = match inv.args.require("data")? {
                Value::List(items) => items.clone(),
                other => return Err(inv.fail(format!("data must be a list of numbers, got {}", other.type_name()))),
            };
            let start = number(inv, "start")?;
            items.iter().try_fold(start, |acc, item| {
                let n = to_number(item)
                    .ok_or_else(|| inv.fail(format!("cannot add {} '{}'", item.type_name(), item)))?;
                add(acc, n).ok_or_else(|| inv.fail("integer overflow in sum"))
            })
        },
    );

    registry.register(
        KeywordSpec::new("获取长度")
            .param("对象", "obj", "string, list or map")
            .category("system/general")
            .tags(&["length"])
            .doc("Length of a string (in characters), list or map. Null has length 0."),
        |inv| {
            let len = match inv.args.get("obj") {
                None => 0,
                Some(Value::Str(s)) => s.chars().count(),
                Some(Value::List(items)) => items.len(),
                Some(Value::Map(m)) => m.len(),
                Some(other) => {
                    return Err(inv.fail(format!("{} '{}' has no length", other.type_name(), other)))
                }
            };
            Ok(Value::Int(len as i64))
        },
    );

    for (name, keep, doc) in [
        ("获取最大值", CompareOp::Gt, "Largest element of a list."),
        ("获取最小值", CompareOp::Lt, "Smallest element of a list."),
    ] {
        registry.register(
            KeywordSpec::new(name)
                .param("数据", "data", "list of comparable values")
                .param_default("默认值", "default", "returned when the list is empty", Value::Null)
                .category("system/general")
                .tags(&["math"])
                .doc(doc),
            move |inv| extreme(inv, keep),
        );
    }

    registry.register(
        KeywordSpec::new("绝对值")
            .param("数值", "number", "number")
            .category("system/general")
            .tags(&["math"])
            .doc("Absolute value."),
        |inv| match number(inv, "number")? {
            Value::Int(n) => n
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| inv.fail("integer overflow in absolute value")),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Ok(other),
        },
    );

    registry.register(
        KeywordSpec::new("四舍五入")
            .param("数值", "number", "number")
            .param_default("小数位数", "ndigits", "decimal places; 0 yields an integer", 0i64)
            .category("system/general")
            .tags(&["math"])
            .doc("Round to the given number of decimals. Halves round to even when ndigits is 0."),
        |inv| {
            let ndigits = inv.args.i64("ndigits")?;
            match number(inv, "number")? {
                Value::Float(f) if ndigits == 0 => {
                    let rounded = f.round_ties_even();
                    if rounded.is_finite() && rounded.abs() < 9.0e18 {
                        Ok(Value::Int(rounded as i64))
                    } else {
                        Err(inv.fail(format!("cannot round {} to an integer", f)))
                    }
                }
                Value::Float(f) => Ok(Value::Float(round_to(f, ndigits))),
                other => Ok(other),
            }
        },
    );

    registry.register(
        KeywordSpec::new("转换为字符串")
            .param("值", "value", "any value")
            .category("system/general")
            .tags(&["convert"])
            .doc("Render a value as text."),
        |inv| {
            let value = inv.args.get("value").cloned().unwrap_or_default();
            Ok(match value {
                Value::Str(s) => Value::Str(s),
                other => Value::Str(other.to_string()),
            })
        },
    );

    registry.register(
        KeywordSpec::new("转换为整数")
            .param("值", "value", "number or numeric text")
            .param_default("进制", "base", "radix used for text, 2 to 36", 10i64)
            .category("system/general")
            .tags(&["convert"])
            .doc("Convert to an integer. Floats are truncated."),
        |inv| {
            let value = inv.args.require("value")?.clone();
            let base = inv.args.i64("base")?;
            to_integer(&value, base).map(Value::Int).map_err(|e| inv.fail(e))
        },
    );

    registry.register(
        KeywordSpec::new("转换为浮点数")
            .param("值", "value", "number or numeric text")
            .category("system/general")
            .tags(&["convert"])
            .doc("Convert to a float."),
        |inv| {
            let value = inv.args.require("value")?;
            let f = match value {
                Value::Int(n) => Some(*n as f64),
                Value::Float(f) => Some(*f),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                Value::Str(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            f.map(Value::Float).ok_or_else(|| {
                inv.fail(format!("cannot convert {} '{}' to a float", value.type_name(), value))
            })
        },
    );

    registry.register(
        KeywordSpec::new("转换为布尔值")
            .param("值", "value", "any value")
            .category("system/general")
            .tags(&["convert"])
            .doc("Truthiness of a value: empty, zero and null are false."),
        |inv| {
            let value = inv.args.get("value").cloned().unwrap_or_default();
            Ok(Value::Bool(value.is_truthy()))
        },
    );
}

fn to_number(v: &Value) -> Option<Value> {
    match v {
        Value::Int(_) | Value::Float(_) => Some(v.clone()),
        Value::Bool(b) => Some(Value::Int(i64::from(*b))),
        Value::Str(s) => {
            let t = s.trim();
            t.parse::<i64>().ok().map(Value::Int).or_else(|| {
                t.parse::<f64>().ok().filter(|f| f.is_finite()).map(Value::Float)
            })
        }
        _ => None,
    }
}

fn number(inv: &Invocation<'_>, name: &str) -> Result<Value, ExecError> {
    let v = inv.args.require(name)?;
    to_number(v).ok_or_else(|| ExecError::Argument {
        keyword: inv.keyword.clone(),
        message: format!("parameter '{}' must be a number, got {} '{}'", name, v.type_name(), v),
    })
}

fn add(a: Value, b: Value) -> Option<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.checked_add(y).map(Value::Int),
        (x, y) => Some(Value::Float(x.as_f64()? + y.as_f64()?)),
    }
}

fn extreme(inv: &Invocation<'_>, keep: CompareOp) -> Result<Value, ExecError> {
    let default = inv.args.get("default").cloned();
    let items = match inv.args.get("data") {
        None => Vec::new(),
        Some(Value::List(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    };
    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return default.ok_or_else(|| inv.fail("data is empty and no default was given"));
    };
    for item in items {
        if compare(keep, item.clone(), best.clone())? {
            best = item;
        }
    }
    Ok(best)
}

fn to_integer(value: &Value, base: i64) -> Result<i64, String> {
    if !(2..=36).contains(&base) {
        return Err(format!("base must be between 2 and 36, got {}", base));
    }
    if base != 10 {
        let text = value.to_string();
        let text = text.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let prefix = match base {
            16 => Some(["0x", "0X"]),
            8 => Some(["0o", "0O"]),
            2 => Some(["0b", "0B"]),
            _ => None,
        };
        let digits = prefix
            .and_then(|p| p.iter().find_map(|p| digits.strip_prefix(p)))
            .unwrap_or(digits);
        let n = i64::from_str_radix(digits, base as u32)
            .map_err(|e| format!("invalid base-{} integer '{}': {}", base, text, e))?;
        return Ok(if negative { -n } else { n });
    }
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(f) if f.is_finite() && f.abs() < 9.0e18 => Ok(f.trunc() as i64),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid integer '{}': {}", s, e)),
        other => Err(format!("cannot convert {} '{}' to an integer", other.type_name(), other)),
    }
}
