use std::time::Duration;

use crate::error::ExecError;
use crate::registry::{KeywordRegistry, KeywordSpec};
use crate::value::Value;

pub(super) fn register(registry: &KeywordRegistry) {
    registry.register(
        KeywordSpec::new("打印")
            .param("内容", "content", "text to print")
            .category("system/debug")
            .tags(&["output", "debug"])
            .doc("Print a value to standard output."),
        |inv| {
            let content = inv.args.get("content").cloned().unwrap_or_default();
            println!("{}", content);
            tracing::info!(line = inv.line, content = %content, "print");
            Ok(Value::Null)
        },
    );

    registry.register(
        KeywordSpec::new("返回结果")
            .param("结果", "result", "value to return")
            .category("system/debug")
            .tags(&["return"])
            .doc("Return its argument unchanged."),
        |inv| Ok(inv.args.get("result").cloned().unwrap_or_default()),
    );

    registry.register(
        KeywordSpec::new("等待")
            .param_default("秒数", "seconds", "seconds to wait, fractions allowed", 1i64)
            .category("system/general")
            .tags(&["wait", "delay"])
            .doc("Block for the given number of seconds."),
        |inv| {
            let seconds = inv.args.f64("seconds")?;
            let duration = Duration::try_from_secs_f64(seconds).map_err(|_| ExecError::Argument {
                keyword: inv.keyword.clone(),
                message: format!("invalid wait duration: {}", seconds),
            })?;
            tracing::debug!(seconds, "waiting");
            std::thread::sleep(duration);
            Ok(Value::Null)
        },
    );

    registry.register(
        KeywordSpec::new("日志")
            .param_default("级别", "level", "DEBUG, INFO, WARNING or ERROR", "INFO")
            .param_default("消息", "message", "message text", "")
            .category("system/debug")
            .tags(&["log"])
            .doc("Emit a log record at the given level."),
        |inv| {
            let level = inv.args.string("level")?.to_ascii_uppercase();
            let message = inv.args.get("message").cloned().unwrap_or_default();
            match level.as_str() {
                "DEBUG" => tracing::debug!(target: "kwdsl::dsl", "{}", message),
                "WARNING" | "WARN" => tracing::warn!(target: "kwdsl::dsl", "{}", message),
                "ERROR" | "CRITICAL" => tracing::error!(target: "kwdsl::dsl", "{}", message),
                _ => tracing::info!(target: "kwdsl::dsl", "{}", message),
            }
            Ok(Value::Bool(true))
        },
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kwdsl_storage::MemoryStore;

    use crate::{Executor, KeywordRegistry, Value};

    fn executor() -> Executor {
        Executor::new(
            Arc::new(KeywordRegistry::with_builtins()),
            Arc::new(MemoryStore::new()),
        )
    }

    #[test]
    fn return_result_passes_its_argument_through() {
        let mut ex = executor();
        let v = ex
            .invoke_keyword("返回结果", vec![("结果".into(), Value::Int(9))], 1)
            .unwrap();
        assert_eq!(v, Value::Int(9));
    }

    #[test]
    fn wait_rejects_negative_durations() {
        let mut ex = executor();
        assert!(ex
            .invoke_keyword("等待", vec![("秒数".into(), Value::Float(-1.0))], 1)
            .is_err());
        assert!(ex
            .invoke_keyword("等待", vec![("秒数".into(), Value::Int(0))], 1)
            .is_ok());
    }
}
