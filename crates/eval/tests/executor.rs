use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kwdsl_eval::{
    ExecError, ExecutionHook, Executor, ExecutorOptions, KeywordRegistry, KeywordSpec, Value,
};
use kwdsl_storage::{GlobalStore, MemoryStore};
use serde_json::json;

fn keep() -> ExecutorOptions {
    ExecutorOptions {
        keep_variables: true,
        base_dir: None,
    }
}

fn executor_with(store: Arc<MemoryStore>) -> Executor {
    Executor::new(Arc::new(KeywordRegistry::with_builtins()), store).with_options(keep())
}

fn run(src: &str) -> (Executor, Result<Value, ExecError>) {
    let mut ex = executor_with(Arc::new(MemoryStore::new()));
    let program = kwdsl_core::parse(src).expect("program parses");
    let outcome = ex.execute(&program);
    (ex, outcome)
}

fn var(ex: &Executor, name: &str) -> Value {
    ex.variables()
        .get(name)
        .cloned()
        .unwrap_or_else(|| panic!("variable {} not set; have {:?}", name, ex.variables()))
}

// ──────────────────────────────────────────────
// Expressions and assignment
// ──────────────────────────────────────────────

#[test]
fn unary_minus_binds_tighter_than_addition() {
    let (ex, outcome) = run("x = -1 + 2\ny = -(1 + 2)\n");
    outcome.unwrap();
    assert_eq!(var(&ex, "x"), Value::Int(1));
    assert_eq!(var(&ex, "y"), Value::Int(-3));
}

#[test]
fn unresolved_reference_evaluates_to_its_text() {
    let (ex, outcome) = run("a = \"${undefined_var}\"\nb = ${undefined_var}\nc = bare_word\n");
    outcome.unwrap();
    assert_eq!(var(&ex, "a"), Value::from("${undefined_var}"));
    assert_eq!(var(&ex, "b"), Value::from("${undefined_var}"));
    assert_eq!(var(&ex, "c"), Value::from("bare_word"));
}

#[test]
fn interpolation_inside_strings_and_collections() {
    let src = r#"host = "api.local"
port = 8080
url = "http://${host}:${port}/v1"
cfg = {base: url, retries: port / 4040}
first = ${cfg.base}
"#;
    let (ex, outcome) = run(src);
    outcome.unwrap();
    assert_eq!(var(&ex, "url"), Value::from("http://api.local:8080/v1"));
    assert_eq!(
        var(&ex, "cfg").to_json(),
        json!({"base": "http://api.local:8080/v1", "retries": 2.0})
    );
    assert_eq!(var(&ex, "first"), Value::from("http://api.local:8080/v1"));
}

#[test]
fn global_prefix_survives_between_executions_and_locals_do_not() {
    let store = Arc::new(MemoryStore::new());

    let mut first = executor_with(store.clone());
    first
        .execute(&kwdsl_core::parse("g_x = 5\ny = 5\n").unwrap())
        .unwrap();
    assert_eq!(store.get("g_x").unwrap(), Some(json!(5)));
    assert!(first.variables().get("g_x").is_none());

    let mut second = executor_with(store.clone());
    second
        .execute(&kwdsl_core::parse("a = g_x\nb = \"${y}\"\n").unwrap())
        .unwrap();
    assert_eq!(var(&second, "a"), Value::Int(5));
    assert_eq!(var(&second, "b"), Value::from("${y}"));
}

#[test]
fn variables_are_cleared_after_a_run_by_default() {
    let mut ex = Executor::new(
        Arc::new(KeywordRegistry::with_builtins()),
        Arc::new(MemoryStore::new()),
    );
    ex.execute(&kwdsl_core::parse("y = 5\n").unwrap()).unwrap();
    assert!(ex.variables().is_empty());
    assert!(ex.get_variable("y").is_none());
}

#[test]
fn division_by_zero_is_reported_with_its_line() {
    let (_, outcome) = run("a = 1\nb = a / 0\n");
    let err = outcome.unwrap_err();
    assert_eq!(err.line(), Some(2));
    assert!(matches!(err.root(), ExecError::DivisionByZero { .. }));
}

// ──────────────────────────────────────────────
// Control flow
// ──────────────────────────────────────────────

#[test]
fn range_is_half_open_and_break_stops_the_loop() {
    let src = r#"count = 0
last = 0
for i in range(1, 4) do
    count = count + 1
    last = i
    if i == 2 do
        break
    end
end
total = 0
for j in range(1, 4) do
    total = total + j
end
"#;
    let (ex, outcome) = run(src);
    outcome.unwrap();
    assert_eq!(var(&ex, "count"), Value::Int(2));
    assert_eq!(var(&ex, "last"), Value::Int(2));
    assert_eq!(var(&ex, "total"), Value::Int(6));
}

#[test]
fn continue_skips_and_return_leaves_the_program() {
    let src = r#"odd = 0
for i in range(0, 10) do
    if i % 2 == 0 do
        continue
    end
    odd = odd + 1
    if i == 7 do
        return odd
    end
end
odd = 100
"#;
    let (ex, outcome) = run(src);
    assert_eq!(outcome.unwrap(), Value::Int(4));
    assert_eq!(var(&ex, "odd"), Value::Int(4));
}

#[test]
fn elif_and_else_branches() {
    let src = r#"function 评级 (分数) do
    if 分数 >= 90 do
        return "A"
    elif 分数 >= 60 do
        return "B"
    else
        return "C"
    end
end
a = [评级], 分数: 95
b = [评级], 分数: "75"
c = [评级], 分数: 10
if a == "Z" do
    d = 1
end
"#;
    let (ex, outcome) = run(src);
    outcome.unwrap();
    assert_eq!(var(&ex, "a"), Value::from("A"));
    assert_eq!(var(&ex, "b"), Value::from("B"));
    assert_eq!(var(&ex, "c"), Value::from("C"));
    assert!(ex.variables().get("d").is_none());
}

// ──────────────────────────────────────────────
// Teardown
// ──────────────────────────────────────────────

#[test]
fn teardown_runs_and_the_body_failure_wins() {
    let store = Arc::new(MemoryStore::new());
    let mut ex = executor_with(store.clone());
    let src = r#"[设置全局变量], 变量名: "td", 值: "start"
[断言], 条件: false, 消息: "body failed"
[设置全局变量], 变量名: "td", 值: "unreachable"
@teardown do
    [设置全局变量], 变量名: "td", 值: "ran"
    [不存在的关键字]
end
"#;
    let err = ex.execute(&kwdsl_core::parse(src).unwrap()).unwrap_err();
    assert!(err.is_assertion(), "unexpected error: {}", err);
    assert_eq!(err.line(), Some(2));
    assert!(err.to_string().contains("body failed"));

    assert_eq!(store.get("td").unwrap(), Some(json!("ran")));
    let teardown = ex.teardown_error().expect("teardown failure recorded");
    assert!(matches!(teardown.root(), ExecError::KeywordNotFound { .. }));
}

#[test]
fn teardown_failure_does_not_fail_a_passing_body() {
    let src = "x = 1\n@teardown do\n    y = 1 / 0\nend\n";
    let (ex, outcome) = run(src);
    assert!(outcome.is_ok());
    assert!(ex.teardown_error().is_some());
}

// ──────────────────────────────────────────────
// Keywords and results
// ──────────────────────────────────────────────

#[test]
fn envelope_captures_are_bound_before_the_result() {
    let registry = Arc::new(KeywordRegistry::with_builtins());
    registry.register(KeywordSpec::new("采集"), |_| {
        Ok(Value::from(json!({"result": 5, "captures": {"a": 10, "g_seen": true}})))
    });
    let store = Arc::new(MemoryStore::new());
    let mut ex = Executor::new(registry, store.clone()).with_options(keep());

    let src = "x = [采集]\n[断言], 条件: \"${a} == 10\"\n[断言], 条件: \"${x} == 5\"\n";
    ex.execute(&kwdsl_core::parse(src).unwrap()).unwrap();
    assert_eq!(var(&ex, "x"), Value::Int(5));
    assert_eq!(var(&ex, "a"), Value::Int(10));
    assert_eq!(store.get("g_seen").unwrap(), Some(json!(true)));
}

#[test]
fn assigning_a_keyword_without_result_fails() {
    let (_, outcome) = run("x = [打印], 内容: \"hi\"\n");
    assert!(matches!(
        outcome.unwrap_err().root(),
        ExecError::NoResult { keyword } if keyword == "打印"
    ));
}

#[test]
fn unknown_keyword_and_unknown_parameter() {
    let (_, outcome) = run("[没有这个]\n");
    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("keyword not found: 没有这个"));

    let (_, outcome) = run("[打印], 颜色: \"red\"\n");
    assert!(matches!(outcome.unwrap_err().root(), ExecError::Argument { .. }));
}

#[test]
fn custom_keywords_use_their_own_frame() {
    let src = r#"function 加法 (a, b=1) do
    scratch = a
    return a + b
end
r1 = [加法], a: 2
r2 = [加法], a: 2, b: 5
"#;
    let (ex, outcome) = run(src);
    outcome.unwrap();
    assert_eq!(var(&ex, "r1"), Value::Int(3));
    assert_eq!(var(&ex, "r2"), Value::Int(7));
    assert!(ex.variables().get("scratch").is_none());
}

#[test]
fn runaway_recursion_is_an_error() {
    let src = "function 递归 (n) do\n    return [递归], n: n + 1\nend\nx = [递归], n: 0\n";
    let (_, outcome) = run(src);
    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("nesting exceeds"), "{}", err);
}

// ──────────────────────────────────────────────
// Imports and hooks
// ──────────────────────────────────────────────

#[test]
fn import_registers_functions_without_running_the_body() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("common.dsl"),
        "function 问候 (名字) do\n    return \"hi \" + 名字\nend\n[设置全局变量], 变量名: \"side\", 值: 1\n",
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut ex = Executor::new(Arc::new(KeywordRegistry::with_builtins()), store.clone())
        .with_options(keep().with_base_dir(dir.path()));
    let src = "@import: \"common.dsl\"\nmsg = [问候], 名字: \"bob\"\n";
    ex.execute(&kwdsl_core::parse(src).unwrap()).unwrap();

    assert_eq!(var(&ex, "msg"), Value::from("hi bob"));
    assert_eq!(store.get("side").unwrap(), None);
}

#[test]
fn missing_import_fails_at_its_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut ex = Executor::new(
        Arc::new(KeywordRegistry::with_builtins()),
        Arc::new(MemoryStore::new()),
    )
    .with_options(ExecutorOptions::default().with_base_dir(dir.path()));
    let src = "@name: \"t\"\n@import: \"nope.dsl\"\nx = 1\n";
    let err = ex.execute(&kwdsl_core::parse(src).unwrap()).unwrap_err();
    assert_eq!(err.line(), Some(2));
    assert!(matches!(err.root(), ExecError::Import { .. }));
}

// ──────────────────────────────────────────────
// Data-driven programs
// ──────────────────────────────────────────────

fn data_executor(dir: &std::path::Path, store: Arc<MemoryStore>) -> Executor {
    Executor::new(Arc::new(KeywordRegistry::with_builtins()), store)
        .with_options(ExecutorOptions::default().with_base_dir(dir))
}

#[test]
fn data_rows_each_run_body_and_teardown() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("rows.csv"), "用户,数量\nalice,3\nbob,4\n").unwrap();
    let store = Arc::new(MemoryStore::new());
    store.set("g_total", json!(0)).unwrap();
    store.set("g_teardowns", json!(0)).unwrap();

    let src = "@data: \"rows.csv\" using csv\n\
               g_total = g_total + 数量\n\
               [断言], 条件: 用户 != \"\"\n\
               @teardown do\n    g_teardowns = g_teardowns + 1\nend\n";
    let mut ex = data_executor(dir.path(), store.clone());
    ex.execute(&kwdsl_core::parse(src).unwrap()).unwrap();

    assert_eq!(store.get("g_total").unwrap(), Some(json!(7)));
    assert_eq!(store.get("g_teardowns").unwrap(), Some(json!(2)));
}

#[test]
fn failing_data_row_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("rows.csv"), "a\n1\n2\n3\n").unwrap();
    let store = Arc::new(MemoryStore::new());
    store.set("g_seen", json!(0)).unwrap();

    let src = "@data: \"rows.csv\"\ng_seen = g_seen + 1\n[断言], 条件: a != 2\n";
    let mut ex = data_executor(dir.path(), store.clone());
    let err = ex.execute(&kwdsl_core::parse(src).unwrap()).unwrap_err();

    assert!(err.is_assertion());
    assert_eq!(err.line(), Some(3));
    assert_eq!(store.get("g_seen").unwrap(), Some(json!(2)));
}

#[test]
fn missing_data_file_fails_at_its_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut ex = data_executor(dir.path(), Arc::new(MemoryStore::new()));
    let src = "@data: \"/nonexistent/rows.csv\" using csv\nx = 1\n";
    let err = ex.execute(&kwdsl_core::parse(src).unwrap()).unwrap_err();
    assert_eq!(err.line(), Some(1));
    assert!(matches!(err.root(), ExecError::Data { .. }));

    let src = "@data: \"rows.json\" using json\nx = 1\n";
    std::fs::write(dir.path().join("rows.json"), "[]").unwrap();
    let err = ex.execute(&kwdsl_core::parse(src).unwrap()).unwrap_err();
    assert!(err.to_string().contains("unsupported data format"));
}

#[derive(Default)]
struct RecordingHook {
    loads: AtomicUsize,
    events: Mutex<Vec<String>>,
}

impl ExecutionHook for RecordingHook {
    fn before_execution(&self, dsl_id: Option<&str>, vars: &BTreeMap<String, Value>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("before {} {}", dsl_id.unwrap_or("-"), vars.len()));
    }

    fn after_execution(&self, dsl_id: Option<&str>, outcome: &Result<Value, ExecError>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("after {} {}", dsl_id.unwrap_or("-"), outcome.is_ok()));
    }

    fn load_content(&self, id: &str) -> Option<String> {
        match id {
            "lib://common" => {
                self.loads.fetch_add(1, Ordering::SeqCst);
                Some("function 双倍 (x) do\n    return x * 2\nend\n".to_owned())
            }
            "case://main" => Some(
                "@import: \"lib://common\"\n@import: \"lib://common\"\nr = [双倍], x: seed\nreturn r\n"
                    .to_owned(),
            ),
            _ => None,
        }
    }

    fn register_keywords(&self, registry: &KeywordRegistry) {
        registry.register(KeywordSpec::new("钩子关键字"), |_| Ok(Value::from("hooked")));
    }
}

#[test]
fn hooks_supply_content_and_observe_the_run() {
    let hook = Arc::new(RecordingHook::default());
    let registry = Arc::new(KeywordRegistry::with_builtins());
    let mut ex = Executor::new(registry.clone(), Arc::new(MemoryStore::new())).with_hook(hook.clone());
    assert!(registry.contains("钩子关键字"));

    let vars = BTreeMap::from([("seed".to_owned(), Value::Int(21))]);
    let result = ex.execute_from_content("", Some("case://main"), vars).unwrap();

    assert_eq!(result, Value::Int(42));
    assert_eq!(hook.loads.load(Ordering::SeqCst), 1);
    assert_eq!(
        *hook.events.lock().unwrap(),
        vec!["before case://main 1".to_owned(), "after case://main true".to_owned()]
    );
}

#[test]
fn syntax_errors_stop_execution_before_it_starts() {
    let store = Arc::new(MemoryStore::new());
    let mut ex = executor_with(store.clone());
    let err = ex
        .execute_from_content("g_ran = 1\nx = = 2\n", None, BTreeMap::new())
        .unwrap_err();
    assert!(matches!(err, ExecError::Syntax(_)));
    assert_eq!(store.get("g_ran").unwrap(), None);
}
