//! Integration tests for `kwdsl serve`.
//!
//! Each test starts the server as a child process on a unique port, then
//! talks to it over raw HTTP or through `kwdsl run` with an `@remote` import.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tempfile::TempDir;

/// Base port is derived from the process id so parallel test binaries
/// don't collide on the same range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// Kills the server when the test ends, pass or fail.
struct Server(Child);

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn start_server(port: u16, store: &Path, api_key: Option<&str>) -> Server {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kwdsl"));
    cmd.args(["serve", "--port", &port.to_string()])
        .env("KWDSL_GLOBAL_DIR", store)
        .env_remove("KWDSL_API_KEY")
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(key) = api_key {
        cmd.args(["--api-key", key]);
    }

    let child = cmd.spawn().expect("failed to start kwdsl serve");
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server(child)
}

fn http_get(port: u16, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n\r\n",
        path, port
    );
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_owned())
        .unwrap_or_default();
    (status, body)
}

fn run_dsl(store: &Path, file: &Path, api_key: Option<&str>) -> std::process::Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kwdsl"));
    cmd.args(["run", &file.display().to_string()])
        .env("KWDSL_GLOBAL_DIR", store)
        .env_remove("KWDSL_API_KEY");
    if let Some(key) = api_key {
        cmd.env("KWDSL_API_KEY", key);
    }
    cmd.output().expect("failed to run kwdsl")
}

#[test]
fn health_reports_keyword_count() {
    let tmp = TempDir::new().unwrap();
    let port = next_port();
    let _server = start_server(port, &tmp.path().join("server"), None);

    let (status, body) = http_get(port, "/health");
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["keywords"].as_u64().unwrap() > 0);
    assert_eq!(json["auth"], false);
}

#[test]
fn unknown_route_is_404() {
    let tmp = TempDir::new().unwrap();
    let port = next_port();
    let _server = start_server(port, &tmp.path().join("server"), None);

    let (status, _) = http_get(port, "/nope");
    assert_eq!(status, 404);
}

#[test]
fn remote_keywords_run_from_a_program() {
    let tmp = TempDir::new().unwrap();
    let port = next_port();
    let _server = start_server(port, &tmp.path().join("server"), Some("k3y"));

    let file = tmp.path().join("remote.dsl");
    std::fs::write(
        &file,
        format!(
            "@remote: \"http://127.0.0.1:{}\" as svc\nx = svc|[返回结果], 结果: 42\n[断言], 条件: x == 42\n",
            port
        ),
    )
    .unwrap();

    let output = run_dsl(&tmp.path().join("client"), &file, Some("k3y"));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {}", stdout);
    assert!(stdout.contains("PASS"));

    let rejected = run_dsl(&tmp.path().join("client"), &file, Some("wrong"));
    assert_eq!(rejected.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&rejected.stdout).contains("FAIL"));
}
