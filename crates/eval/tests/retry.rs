use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kwdsl_eval::{Executor, ExecutorOptions, KeywordRegistry, KeywordSpec, Value};
use kwdsl_storage::MemoryStore;
use serde_json::json;

/// Registers `不稳定`, which fails `failures` times and then returns the
/// attempt number. Returns the call counter.
fn flaky(registry: &KeywordRegistry, failures: usize) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    registry.register(KeywordSpec::new("不稳定"), move |inv| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(inv.fail(format!("attempt {} failed", n)))
        } else {
            Ok(Value::Int(n as i64))
        }
    });
    calls
}

fn run_retry(registry: Arc<KeywordRegistry>, call: &str) -> Value {
    let mut ex = Executor::new(registry, Arc::new(MemoryStore::new())).with_options(
        ExecutorOptions {
            keep_variables: true,
            base_dir: None,
        },
    );
    let src = format!("r = {}\n", call);
    ex.execute(&kwdsl_core::parse(&src).unwrap()).unwrap();
    ex.variables().get("r").cloned().unwrap_or_default()
}

#[test]
fn succeeds_once_the_target_stops_failing() {
    let registry = Arc::new(KeywordRegistry::with_builtins());
    let calls = flaky(&registry, 2);
    let r = run_retry(
        registry,
        "[重试执行], 关键字名称: \"不稳定\", 重试次数: 3, 重试间隔: 0",
    );
    assert_eq!(r.to_json(), json!({"success": true, "result": 3}));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn exhausted_budget_reports_failure_without_raising() {
    let registry = Arc::new(KeywordRegistry::with_builtins());
    let calls = flaky(&registry, 2);
    let r = run_retry(
        registry,
        "[重试执行], 关键字名称: \"不稳定\", 重试次数: 1, 重试间隔: 0",
    );
    assert_eq!(r.to_json(), json!({"success": false, "result": null}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn fail_on_exception_stops_at_the_first_error() {
    let registry = Arc::new(KeywordRegistry::with_builtins());
    let calls = flaky(&registry, 2);
    let r = run_retry(
        registry,
        "[重试执行], 关键字名称: \"不稳定\", 重试间隔: 0, 异常时退出: true",
    );
    assert_eq!(r.to_json(), json!({"success": false, "result": null}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn success_condition_sees_the_result() {
    let registry = Arc::new(KeywordRegistry::with_builtins());
    let calls = flaky(&registry, 0);
    let r = run_retry(
        registry,
        "[重试执行], 关键字名称: \"不稳定\", 重试间隔: 0, 成功条件: \"result >= 3\"",
    );
    assert_eq!(r.to_json(), json!({"success": true, "result": 3}));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn success_condition_can_reach_into_the_result() {
    let registry = Arc::new(KeywordRegistry::with_builtins());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    registry.register(KeywordSpec::new("查询状态"), move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Value::from(json!({"code": n * 100})))
    });
    let r = run_retry(
        registry,
        "[重试执行], 关键字名称: \"查询状态\", 重试间隔: 0, 成功条件: \"${result.code} == 200\", 打印字段: [\"result.code\"]",
    );
    assert_eq!(r.to_json(), json!({"success": true, "result": {"code": 200}}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn parameters_are_forwarded_to_the_target() {
    let registry = Arc::new(KeywordRegistry::with_builtins());
    let r = run_retry(
        registry,
        "[重试执行], 关键字名称: \"返回结果\", 关键字参数: {结果: 7}, 重试间隔: 0",
    );
    assert_eq!(r.to_json(), json!({"success": true, "result": 7}));
}

#[test]
fn unknown_target_fails_immediately() {
    let registry = Arc::new(KeywordRegistry::with_builtins());
    let r = run_retry(registry, "[重试执行], 关键字名称: \"不存在\", 重试间隔: 5");
    assert_eq!(r.to_json(), json!({"success": false, "result": null}));
}

#[test]
fn retry_leaves_the_callers_result_alone() {
    let registry = Arc::new(KeywordRegistry::with_builtins());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    registry.register(KeywordSpec::new("查询状态"), move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Value::from(json!({"code": n * 100})))
    });

    let mut ex = Executor::new(registry, Arc::new(MemoryStore::new())).with_options(
        ExecutorOptions {
            keep_variables: true,
            base_dir: None,
        },
    );
    let src = "result = \"mine\"\n\
               a = [重试执行], 关键字名称: \"查询状态\", 重试间隔: 0, 成功条件: \"${result.code} == 200\"\n\
               b = [重试执行], 关键字名称: \"查询状态\", 重试间隔: 0, 成功条件: \"${result.code} == 400\"\n";
    ex.execute(&kwdsl_core::parse(src).unwrap()).unwrap();

    let vars = ex.variables();
    assert_eq!(vars["result"], Value::from("mine"));
    assert!(!vars.contains_key("_retry_result"));
    assert_eq!(vars["a"].to_json(), json!({"success": true, "result": {"code": 200}}));
    assert_eq!(vars["b"].to_json(), json!({"success": true, "result": {"code": 400}}));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
