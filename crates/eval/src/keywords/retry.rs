//! `重试执行`: bounded retry around another keyword.
//!
//! Never fails on exhaustion. The outcome is `{success, result}` and the
//! caller decides what a failed retry means.

use std::time::Duration;

use super::outcome;
use crate::error::ExecError;
use crate::executor::Executor;
use crate::registry::{Invocation, KeywordRegistry, KeywordSpec};
use crate::value::Value;

pub(super) fn register(registry: &KeywordRegistry) {
    registry.register(
        KeywordSpec::new("重试执行")
            .param("关键字名称", "keyword_name", "keyword to run")
            .param_default(
                "关键字参数",
                "keyword_params",
                "arguments for the keyword, as a map",
                Value::Map(Default::default()),
            )
            .param_default("重试次数", "max_retries", "retries after the first attempt", 3i64)
            .param_default("重试间隔", "retry_interval", "seconds between attempts", 1i64)
            .param_default(
                "成功条件",
                "success_condition",
                "expression over `result`, e.g. \"${result.status_code} == 200\"",
                Value::Null,
            )
            .param_default(
                "打印字段",
                "print_fields",
                "paths logged after each attempt, e.g. [\"result.status_code\"]",
                Value::List(Vec::new()),
            )
            .param_default(
                "异常时退出",
                "fail_on_exception",
                "stop at the first failing attempt instead of retrying",
                false,
            )
            .category("system/retry")
            .tags(&["retry", "error handling"])
            .doc("Run a keyword until it succeeds or the retry budget runs out."),
        retry_execute,
    );
}

fn retry_execute(inv: &mut Invocation<'_>) -> Result<Value, ExecError> {
    let keyword = inv.args.string("keyword_name")?;
    let params = inv.args.map("keyword_params")?;
    let max_retries = inv.args.i64("max_retries")?.max(0);
    let interval = Duration::try_from_secs_f64(inv.args.f64("retry_interval")?).unwrap_or_default();
    let condition = inv
        .args
        .get("success_condition")
        .map(|v| v.to_string())
        .filter(|c| !c.trim().is_empty());
    let print_fields: Vec<String> = inv.args.list("print_fields").iter().map(Value::to_string).collect();
    let fail_on_exception = inv.args.flag("fail_on_exception");

    if !inv.executor.registry().contains(&keyword) {
        tracing::error!(keyword = %keyword, "retry target is not registered");
        return Ok(outcome(false, Value::Null));
    }

    let attempts = max_retries + 1;
    tracing::info!(keyword = %keyword, attempts, condition = ?condition, "retry started");

    for attempt in 1..=attempts {
        let args: Vec<(String, Value)> = params.clone().into_iter().collect();
        match inv.executor.invoke_keyword(&keyword, args, inv.line) {
            Ok(result) => {
                log_fields(inv.executor, &result, &print_fields, attempt);
                match check_condition(inv.executor, condition.as_deref(), &result) {
                    Ok(()) => {
                        tracing::info!(keyword = %keyword, attempt, "retry succeeded");
                        return Ok(outcome(true, result));
                    }
                    Err(reason) => {
                        tracing::warn!(keyword = %keyword, attempt, reason = %reason, "attempt rejected");
                    }
                }
            }
            Err(e) => {
                if matches!(e.root(), ExecError::KeywordNotFound { .. }) {
                    return Ok(outcome(false, Value::Null));
                }
                tracing::warn!(keyword = %keyword, attempt, error = %e, "attempt failed");
                if fail_on_exception {
                    return Ok(outcome(false, Value::Null));
                }
            }
        }
        if attempt < attempts {
            std::thread::sleep(interval);
        }
    }

    tracing::error!(keyword = %keyword, attempts, "all attempts failed");
    Ok(outcome(false, Value::Null))
}

/// The attempt's result as `result` and `_retry_result`, visible to the
/// condition and field paths only.
fn result_bindings(result: &Value) -> [(String, Value); 2] {
    [
        ("result".to_owned(), result.clone()),
        ("_retry_result".to_owned(), result.clone()),
    ]
}

fn check_condition(
    executor: &mut Executor,
    condition: Option<&str>,
    result: &Value,
) -> Result<(), String> {
    let Some(condition) = condition else {
        return Ok(());
    };
    match executor.with_bindings(result_bindings(result), |ex| ex.eval_condition(condition)) {
        Ok(true) => Ok(()),
        Ok(false) => Err(format!("condition not met: {}", condition)),
        Err(e) => Err(format!("condition could not be evaluated: {}", e)),
    }
}

fn log_fields(executor: &mut Executor, result: &Value, fields: &[String], attempt: i64) {
    if fields.is_empty() {
        return;
    }
    executor.with_bindings(result_bindings(result), |ex| {
        let replacer = ex.replacer();
        for field in fields {
            match replacer.resolve(field) {
                Some(v) => tracing::info!(attempt, field = %field, value = %v, "retry field"),
                None => tracing::info!(attempt, field = %field, "retry field not accessible"),
            }
        }
    });
}
