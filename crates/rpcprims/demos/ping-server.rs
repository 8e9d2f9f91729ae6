//! Minimal HTTP server for a two-operation OpenAPI descriptor.
//!
//! Run with:
//!   cargo run --example ping-server
//!
//! In another terminal:
//!   cargo run --features cli -- call GET /ping --endpoint 127.0.0.1:8080
//!   cargo run --features cli -- call GET /widgets/7 --endpoint 127.0.0.1:8080

use std::sync::Arc;

use rpcprims::procedure::{HandlerFailure, HandlerResult, RequestContext};
use rpcprims::spec::{DescriptorSource, HandlerBindings, OpenApiSpecification, SpecificationConfig};
use rpcprims::transport::{serve, HttpTransport, HttpTransportConfig, ServerConfig};
use rpcprims::Registry;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const ADDR: &str = "127.0.0.1:8080";

async fn ping(_input: Value, _ctx: RequestContext) -> HandlerResult {
    Ok(json!({ "pong": true }))
}

async fn get_widget(input: Value, ctx: RequestContext) -> HandlerResult {
    let id = input["id"].as_i64().unwrap_or_default();
    if id > 100 {
        return Err(HandlerFailure::raise("widget_missing", format!("no widget {id}")));
    }
    Ok(json!({ "id": id, "request": ctx.request_id }))
}

fn descriptor() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": { "title": "Ping", "version": "1.0.0" },
        "servers": [{ "url": format!("http://{ADDR}") }],
        "paths": {
            "/ping": { "get": { "operationId": "ping" } },
            "/widgets/{id}": { "get": {
                "operationId": "get-widget",
                "parameters": [{ "name": "id", "in": "path", "required": true,
                                 "schema": { "type": "integer", "minimum": 1 } }],
                "responses": {
                    "200": { "description": "ok" },
                    "404": { "description": "missing", "x-error-code": "widget_missing" }
                }
            }}
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(Registry::new());
    registry.register_specification(
        "ping",
        Arc::new(OpenApiSpecification::new(SpecificationConfig::new("ping"))),
    )?;

    let bindings = HandlerBindings::new()
        .with("ping", ping)
        .with("get-widget", get_widget);
    let snapshot = registry
        .load_specification("ping", &DescriptorSource::inline(descriptor().to_string()), &bindings)
        .await?;
    eprintln!("Loaded {} routes", snapshot.routes().len());

    let transport = Arc::new(HttpTransport::new(
        HttpTransportConfig::new("inbound").endpoint(format!("http://{ADDR}")),
    )?);
    let listener = TcpListener::bind(ADDR).await?;
    eprintln!("Listening on http://{ADDR}");

    serve(
        listener,
        transport,
        Arc::new(registry.dispatcher("ping")?),
        ServerConfig::default(),
    )
    .await?;
    Ok(())
}
