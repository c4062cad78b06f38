use chrono::format::{Item, StrftimeItems};
use chrono::{Local, Utc};
use chrono_tz::Tz;
use rand::Rng;

use crate::registry::{Invocation, KeywordRegistry, KeywordSpec};
use crate::value::Value;
use crate::ExecError;

const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const LETTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Largest number of decimals `生成随机数` rounds to.
const MAX_DECIMALS: i64 = 15;

pub(super) fn register(registry: &KeywordRegistry) {
    registry.register(
        KeywordSpec::new("获取当前时间")
            .param_default("格式", "format", "strftime format, or \"timestamp\" for epoch seconds", "timestamp")
            .param_default("时区", "timezone", "IANA zone name, or \"local\"", "Asia/Shanghai")
            .category("system/general")
            .tags(&["time"])
            .doc("Current time as epoch seconds or formatted text."),
        |inv| {
            let format = inv.args.string("format")?;
            let timezone = inv.args.string("timezone")?;
            Ok(current_time(&format, &timezone))
        },
    );

    registry.register(
        KeywordSpec::new("生成随机字符串")
            .param_default("长度", "length", "number of characters", 8i64)
            .param_default("类型", "type", "letters, digits, alphanumeric or all", "alphanumeric")
            .category("system/general")
            .tags(&["random", "string"])
            .doc("Random string drawn from the chosen character set."),
        |inv| {
            let length = inv.args.i64("length")?;
            let length = usize::try_from(length)
                .map_err(|_| argument(inv, format!("length must not be negative, got {}", length)))?;
            let kind = inv.args.string("type")?.to_ascii_lowercase();
            let charset: Vec<char> = match kind.as_str() {
                "letters" => LETTERS.chars().collect(),
                "digits" => DIGITS.chars().collect(),
                "all" => LETTERS.chars().chain(DIGITS.chars()).chain(PUNCTUATION.chars()).collect(),
                _ => LETTERS.chars().chain(DIGITS.chars()).collect(),
            };
            let mut rng = rand::thread_rng();
            let text: String = (0..length)
                .map(|_| charset[rng.gen_range(0..charset.len())])
                .collect();
            tracing::debug!(length, kind = %kind, "random string generated");
            Ok(Value::Str(text))
        },
    );

    registry.register(
        KeywordSpec::new("生成随机数")
            .param_default("最小值", "min", "lower bound, inclusive", 0i64)
            .param_default("最大值", "max", "upper bound, inclusive", 100i64)
            .param_default("小数位数", "decimals", "decimal places, 0 for an integer", 0i64)
            .category("system/general")
            .tags(&["random", "number"])
            .doc("Random number within [min, max]."),
        |inv| {
            let min = inv.args.f64("min")?;
            let max = inv.args.f64("max")?;
            let decimals = inv.args.i64("decimals")?;
            if min > max {
                return Err(argument(inv, format!("min {} is greater than max {}", min, max)));
            }
            let mut rng = rand::thread_rng();
            if decimals <= 0 {
                let (lo, hi) = (min.trunc() as i64, max.trunc() as i64);
                return Ok(Value::Int(rng.gen_range(lo..=hi)));
            }
            let n = rng.gen_range(min..=max);
            Ok(Value::Float(round_to(n, decimals.min(MAX_DECIMALS))))
        },
    );

    registry.register(
        KeywordSpec::new("字符串操作")
            .param_default("操作", "operation", "concat, replace, split, upper, lower or strip", "strip")
            .param_default("字符串", "string", "input text", "")
            .param_default("参数1", "param1", "first operand of the operation", "")
            .param_default("参数2", "param2", "second operand of the operation", "")
            .category("system/general")
            .tags(&["string"])
            .doc(
                "Apply a string operation. split with a separator returns a list, or the \
                 element at the index given in param2.",
            ),
        |inv| {
            let operation = inv.args.string("operation")?.to_ascii_lowercase();
            let text = inv.args.string("string")?;
            let param1 = inv.args.string("param1")?;
            let param2 = inv.args.string("param2")?;
            Ok(string_operation(&operation, &text, &param1, &param2))
        },
    );
}

fn argument(inv: &Invocation<'_>, message: String) -> ExecError {
    ExecError::Argument {
        keyword: inv.keyword.clone(),
        message,
    }
}

fn current_time(format: &str, timezone: &str) -> Value {
    let now = Utc::now();
    if format.is_empty() || format == "timestamp" {
        return Value::Int(now.timestamp());
    }
    let format = if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        tracing::warn!(format, "invalid time format, using the default");
        DEFAULT_TIME_FORMAT
    } else {
        format
    };
    let text = match timezone {
        "" | "local" => now.with_timezone(&Local).format(format).to_string(),
        name => match name.parse::<Tz>() {
            Ok(tz) => now.with_timezone(&tz).format(format).to_string(),
            Err(_) => {
                tracing::warn!(timezone = name, "unknown timezone, using local time");
                now.with_timezone(&Local).format(format).to_string()
            }
        },
    };
    Value::Str(text)
}

pub(crate) fn round_to(n: f64, decimals: i64) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (n * scale).round() / scale
}

fn string_operation(operation: &str, text: &str, param1: &str, param2: &str) -> Value {
    match operation {
        "concat" => Value::Str(format!("{}{}", text, param1)),
        "replace" => Value::Str(text.replace(param1, param2)),
        "split" if param1.is_empty() => {
            Value::List(text.split_whitespace().map(Value::from).collect())
        }
        "split" => {
            let parts: Vec<&str> = text.split(param1).collect();
            let index = (!param2.is_empty() && param2.chars().all(|c| c.is_ascii_digit()))
                .then(|| param2.parse::<usize>().ok())
                .flatten();
            match index.and_then(|i| parts.get(i)) {
                Some(part) => Value::from(*part),
                None => Value::List(parts.into_iter().map(Value::from).collect()),
            }
        }
        "upper" => Value::Str(text.to_uppercase()),
        "lower" => Value::Str(text.to_lowercase()),
        "strip" => Value::Str(text.trim().to_owned()),
        other => {
            tracing::warn!(operation = other, "unknown string operation, using strip");
            Value::Str(text.trim().to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kwdsl_storage::MemoryStore;

    use super::*;
    use crate::Executor;

    fn executor() -> Executor {
        Executor::new(
            Arc::new(KeywordRegistry::with_builtins()),
            Arc::new(MemoryStore::new()),
        )
    }

    fn call(ex: &mut Executor, keyword: &str, args: Vec<(&str, Value)>) -> Result<Value, ExecError> {
        let args = args.into_iter().map(|(k, v)| (k.to_owned(), v)).collect();
        ex.invoke_keyword(keyword, args, 1)
    }

    #[test]
    fn current_time_formats() {
        let before = Utc::now().timestamp();
        match current_time("timestamp", "Asia/Shanghai") {
            Value::Int(ts) => assert!(ts >= before && ts - before < 5),
            other => panic!("expected a timestamp, got {:?}", other),
        }

        let year = current_time("%Y", "UTC").to_string();
        assert_eq!(year.len(), 4);
        assert!(year.chars().all(|c| c.is_ascii_digit()));

        // unknown specifier and zone both fall back
        let text = current_time("%Q", "Mars/Olympus").to_string();
        assert_eq!(text.len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn random_string_uses_requested_charset() {
        let mut ex = executor();
        let digits = call(
            &mut ex,
            "生成随机字符串",
            vec![("长度", Value::Int(12)), ("类型", "digits".into())],
        )
        .unwrap()
        .to_string();
        assert_eq!(digits.len(), 12);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));

        let default = call(&mut ex, "生成随机字符串", vec![]).unwrap().to_string();
        assert_eq!(default.len(), 8);
        assert!(default.chars().all(|c| c.is_ascii_alphanumeric()));

        assert!(call(&mut ex, "生成随机字符串", vec![("长度", Value::Int(-1))]).is_err());
    }

    #[test]
    fn random_number_stays_in_range() {
        let mut ex = executor();
        for _ in 0..50 {
            match call(
                &mut ex,
                "生成随机数",
                vec![("最小值", Value::Int(3)), ("最大值", Value::Int(5))],
            )
            .unwrap()
            {
                Value::Int(n) => assert!((3..=5).contains(&n)),
                other => panic!("expected an int, got {:?}", other),
            }
        }
        match call(
            &mut ex,
            "生成随机数",
            vec![("最小值", Value::Int(0)), ("最大值", Value::Int(1)), ("小数位数", Value::Int(2))],
        )
        .unwrap()
        {
            Value::Float(f) => {
                assert!((0.0..=1.0).contains(&f));
                assert_eq!(round_to(f, 2), f);
            }
            other => panic!("expected a float, got {:?}", other),
        }
        assert!(call(
            &mut ex,
            "生成随机数",
            vec![("最小值", Value::Int(9)), ("最大值", Value::Int(1))],
        )
        .is_err());
    }

    #[test]
    fn string_operations() {
        assert_eq!(string_operation("concat", "ab", "cd", ""), Value::from("abcd"));
        assert_eq!(string_operation("replace", "a-b-c", "-", "+"), Value::from("a+b+c"));
        assert_eq!(
            string_operation("split", "a,b,c", ",", ""),
            Value::List(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(string_operation("split", "a,b,c", ",", "1"), Value::from("b"));
        assert_eq!(
            string_operation("split", " x  y ", "", ""),
            Value::List(vec!["x".into(), "y".into()])
        );
        assert_eq!(string_operation("upper", "Ab", "", ""), Value::from("AB"));
        assert_eq!(string_operation("lower", "Ab", "", ""), Value::from("ab"));
        assert_eq!(string_operation("reverse", "  x ", "", ""), Value::from("x"));

        let mut ex = executor();
        let v = call(&mut ex, "字符串操作", vec![("字符串", "  pad  ".into())]).unwrap();
        assert_eq!(v, Value::from("pad"));
    }
}
