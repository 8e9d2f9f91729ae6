#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::Arc;

use rpcprims::procedure::{HandlerResult, RequestContext};
use rpcprims::spec::{DescriptorSource, HandlerBindings, OpenApiSpecification, SpecificationConfig};
use rpcprims::transport::{serve, HttpTransport, HttpTransportConfig, ServerConfig};
use rpcprims::Registry;
use serde_json::{json, Value};
use tokio::net::TcpListener;

fn unique_temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "rpcprims-cli-{tag}-{}-{}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

fn rpcprims(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rpcprims"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("rpcprims should run")
}

fn descriptor() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": { "title": "Echo", "version": "0.3.0" },
        "servers": [{ "url": "http://127.0.0.1:9" }],
        "paths": {
            "/echo": { "post": { "operationId": "echo" } },
            "/ping": { "get": { "operationId": "ping" } },
            "/debug": { "get": { "operationId": "debug", "x-internal": true } }
        }
    })
}

#[test]
fn version_prints_crate_version() {
    let output = rpcprims(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn routes_lists_external_operations_as_json() {
    let path = unique_temp_path("routes");
    std::fs::write(&path, descriptor().to_string()).expect("descriptor should be writable");

    let output = rpcprims(&["--format", "json", "routes", path.to_str().expect("utf-8 path")]);
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success(), "{output:?}");
    let listing: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(listing["title"], "Echo");
    assert_eq!(listing["version"], "0.3.0");
    let routes: Vec<String> = listing["routes"]
        .as_array()
        .expect("routes array")
        .iter()
        .map(|route| format!("{} {}", route["method"], route["path"]))
        .collect();
    assert_eq!(routes, vec!["\"GET\" \"/ping\"", "\"POST\" \"/echo\""]);
}

#[test]
fn routes_on_missing_descriptor_exits_60() {
    let path = unique_temp_path("missing");
    let output = rpcprims(&["routes", path.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("BadSpecification"));
}

#[test]
fn call_with_bad_method_exits_64() {
    let output = rpcprims(&["call", "BREW", "/pot", "--endpoint", "127.0.0.1:9"]);
    assert_eq!(output.status.code(), Some(64));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn call_against_closed_port_exits_3() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);

    let output = tokio::task::spawn_blocking(move || {
        rpcprims(&["call", "GET", "/ping", "--endpoint", &addr, "--timeout", "2s"])
    })
    .await
    .expect("cli task");
    assert_eq!(output.status.code(), Some(3), "{output:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn call_reaches_a_served_specification() {
    async fn echo(input: Value, _ctx: RequestContext) -> HandlerResult {
        Ok(input)
    }
    async fn pong(_input: Value, _ctx: RequestContext) -> HandlerResult {
        Ok(json!({ "pong": true }))
    }

    let registry = Arc::new(Registry::new());
    registry
        .register_specification(
            "echo",
            Arc::new(OpenApiSpecification::new(SpecificationConfig::new("echo"))),
        )
        .expect("register");
    registry
        .load_specification(
            "echo",
            &DescriptorSource::inline(descriptor().to_string()),
            &HandlerBindings::new()
                .with("echo", echo)
                .with("ping", pong)
                .with("debug", pong),
        )
        .await
        .expect("load");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let transport = Arc::new(
        HttpTransport::new(HttpTransportConfig::new("inbound").endpoint(addr.clone()))
            .expect("transport"),
    );
    let dispatcher = Arc::new(registry.dispatcher("echo").expect("dispatcher"));
    tokio::spawn(async move {
        let _ = serve(listener, transport, dispatcher, ServerConfig::default()).await;
    });

    let endpoint = addr.clone();
    let output = tokio::task::spawn_blocking(move || {
        rpcprims(&[
            "--format",
            "json",
            "call",
            "POST",
            "/echo",
            "--endpoint",
            &endpoint,
            "--json",
            "{\"hello\":\"world\"}",
        ])
    })
    .await
    .expect("cli task");
    assert!(output.status.success(), "{output:?}");
    let response: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(response["status"], 200);
    assert_eq!(response["body"], json!({ "hello": "world" }));

    let output = tokio::task::spawn_blocking(move || {
        rpcprims(&["call", "GET", "/debug", "--endpoint", &addr])
    })
    .await
    .expect("cli task");
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("404"));
}
