#![cfg(feature = "cli")]

use std::net::TcpListener;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use rpcprims::rpc::Client;

struct ServeProcess {
    child: Child,
    addr: String,
}

impl ServeProcess {
    fn start() -> Self {
        let port = free_port();
        let child = Command::new(env!("CARGO_BIN_EXE_rpcprims"))
            .args(["--log-level", "error", "serve", "--port"])
            .arg(port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve command should start");
        let addr = format!("127.0.0.1:{port}");
        wait_for_server(&addr, Duration::from_secs(5));
        Self { child, addr }
    }

    fn call(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_rpcprims"))
            .args(["--log-level", "error", "--format", "json", "call"])
            .args(args)
            .args(["--addr", &self.addr])
            .output()
            .expect("call should run")
    }
}

impl Drop for ServeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind");
    listener.local_addr().expect("local addr").port()
}

fn wait_for_server(addr: &str, timeout: Duration) {
    let start = Instant::now();
    loop {
        if let Ok(client) = Client::connect(addr) {
            let _ = client.close();
            return;
        }
        if start.elapsed() >= timeout {
            panic!("server at {addr} did not come up");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn stdout_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json output line"))
        .collect()
}

#[test]
fn unary_call_prints_reply() {
    let server = ServeProcess::start();
    let output = server.call(&["Arith.Divide", "--json", r#"{"A":7,"B":2}"#]);

    assert!(output.status.success());
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["method"], "Arith.Divide");
    assert_eq!(lines[0]["reply"], serde_json::json!({"Quo": 3, "Rem": 1}));
}

#[test]
fn remote_error_sets_failure_exit_code() {
    let server = ServeProcess::start();
    let output = server.call(&["Arith.Divide", "--json", r#"{"A":7,"B":0}"#]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("divide by zero"), "{stderr}");
}

#[test]
fn streaming_call_prints_each_reply_and_summary() {
    let server = ServeProcess::start();
    let output = server.call(&[
        "Arith.Thrive",
        "--stream",
        "--json",
        r#"{"A":5,"Count":4,"ErrorAt":2,"BadTypeAt":-1}"#,
    ]);

    assert_eq!(output.status.code(), Some(1));
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["index"], 0);
    assert_eq!(lines[1]["reply"], serde_json::json!({"C": 5, "Index": 1}));
    assert_eq!(lines[2]["delivered"], 2);
    assert_eq!(lines[2]["error"], "triggered error in middle");
}

#[test]
fn invalid_json_is_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_rpcprims"))
        .args(["call", "Arith.Multiply", "--json", "{not json"])
        .output()
        .expect("call should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn methods_lists_arith_service() {
    let output = Command::new(env!("CARGO_BIN_EXE_rpcprims"))
        .args(["--format", "json", "methods"])
        .output()
        .expect("methods should run");

    assert!(output.status.success());
    let lines = stdout_lines(&output);
    let names: Vec<_> = lines
        .iter()
        .map(|l| l["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        names,
        [
            "Arith.Divide",
            "Arith.Increment",
            "Arith.Multiply",
            "Arith.Sleep",
            "Arith.Thrive"
        ]
    );
    assert_eq!(lines[4]["kind"], "streaming");
}
