use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use rpcprims_types::{parse_query, Dispatch, Method, RawRequest, Reply, Result, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::HttpTransport;
use crate::traits::{Transport, WireResponse};

/// Inbound server limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Largest request body accepted, in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

#[derive(Clone)]
struct ServerState {
    transport: Arc<HttpTransport>,
    dispatcher: Arc<dyn Dispatch>,
    config: ServerConfig,
}

/// Convert an HTTP request head plus collected body into a [`RawRequest`].
///
/// Verbs outside the supported set are a `MethodNotAllowed`.
pub fn raw_request_from_http(parts: &axum::http::request::Parts, body: Bytes) -> Result<RawRequest> {
    let method: Method = parts.method.as_str().parse().map_err(|_| {
        RpcError::method_not_allowed(format!("{} is not a supported method", parts.method))
            .with_context(json!({ "method": parts.method.as_str() }))
    })?;

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    Ok(RawRequest {
        method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(parse_query).unwrap_or_default(),
        content_type,
        headers,
        body,
    })
}

impl HttpTransport {
    /// An `axum` router that sends every request to `dispatcher`.
    pub fn router(self: Arc<Self>, dispatcher: Arc<dyn Dispatch>, config: ServerConfig) -> Router {
        let state = ServerState {
            transport: self,
            dispatcher,
            config,
        };
        Router::new().fallback(handle).with_state(state)
    }
}

/// Serve `dispatcher` on `listener` until the server stops.
pub async fn serve(
    listener: TcpListener,
    transport: Arc<HttpTransport>,
    dispatcher: Arc<dyn Dispatch>,
    config: ServerConfig,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(transport = %transport.name(), %addr, "http server listening");
    let app = transport.router(dispatcher, config);
    axum::serve(listener, app).await
}

async fn handle(State(state): State<ServerState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.config.max_body_size).await {
        Ok(body) => body,
        Err(err) => {
            warn!(path = %parts.uri.path(), error = %err, "request body rejected");
            let err = RpcError::invalid_argument(format!(
                "request body exceeds {} bytes or could not be read",
                state.config.max_body_size
            ));
            let mut wire = WireResponse::from(Reply::failure(&err, None));
            wire.status = StatusCode::PAYLOAD_TOO_LARGE.as_u16();
            return into_response(wire);
        }
    };

    let wire = match raw_request_from_http(&parts, body) {
        Ok(raw) => state.transport.route(raw, state.dispatcher.as_ref()).await,
        Err(err) => WireResponse::from(Reply::failure(&err, None)),
    };
    into_response(wire)
}

fn into_response(wire: WireResponse) -> Response {
    let status = StatusCode::from_u16(wire.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = HeaderValue::from_str(&wire.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    (status, [(CONTENT_TYPE, content_type)], Body::from(wire.body)).into_response()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rpcprims_types::ErrorKind;

    use super::*;
    use crate::http::HttpTransportConfig;
    use crate::traits::{OutboundRequest, RequestOptions};

    /// Answers `/echo` with the request it saw, everything else with a not-found error.
    struct Recorder;

    #[async_trait]
    impl Dispatch for Recorder {
        async fn dispatch(&self, request: RawRequest) -> Reply {
            if request.path != "/echo" {
                return Reply::failure(&RpcError::not_found("no route"), None);
            }
            let seen = json!({
                "method": request.method,
                "path": request.path,
                "query": request.query,
                "content_type": request.content_type,
                "trace": request.header("x-trace"),
                "body": String::from_utf8_lossy(&request.body),
            });
            Reply::success("application/json", seen.to_string())
        }
    }

    async fn start(config: ServerConfig) -> Arc<HttpTransport> {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let endpoint = format!("http://{}", listener.local_addr().expect("addr"));
        let transport = Arc::new(
            HttpTransport::new(HttpTransportConfig::new("loopback").endpoint(endpoint))
                .expect("transport"),
        );
        let server = transport.clone();
        tokio::spawn(async move {
            let _ = serve(listener, server, Arc::new(Recorder), config).await;
        });
        transport
    }

    #[tokio::test]
    async fn inbound_requests_reach_the_dispatcher() {
        let transport = start(ServerConfig::default()).await;
        let response = transport
            .request(
                OutboundRequest::new(Method::Post, "/echo?verbose=1&tag=a%20b")
                    .header("x-trace", "abc")
                    .body("text/plain", "hi"),
                &RequestOptions::default(),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        let seen = response.json().expect("json should be present");
        assert_eq!(seen["method"], "POST");
        assert_eq!(seen["path"], "/echo");
        assert_eq!(seen["query"], json!([["verbose", "1"], ["tag", "a b"]]));
        assert_eq!(seen["content_type"], "text/plain");
        assert_eq!(seen["trace"], "abc");
        assert_eq!(seen["body"], "hi");
    }

    #[tokio::test]
    async fn dispatcher_errors_become_statuses() {
        let transport = start(ServerConfig::default()).await;
        let err = transport
            .request(OutboundRequest::new(Method::Get, "/missing"), &RequestOptions::default())
            .await
            .expect_err("request should fail");
        assert_eq!(err.kind(), ErrorKind::UpstreamError);
        assert_eq!(err.context()["status"], 404);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let transport = start(ServerConfig { max_body_size: 8 }).await;
        let err = transport
            .request(
                OutboundRequest::new(Method::Post, "/echo").body("text/plain", "x".repeat(64)),
                &RequestOptions::default(),
            )
            .await
            .expect_err("request should fail");
        assert_eq!(err.context()["status"], 413);
    }

    #[test]
    fn unsupported_verbs_are_method_not_allowed() {
        let (parts, _) = axum::http::Request::builder()
            .method("TRACE")
            .uri("/echo")
            .body(())
            .expect("body should be present")
            .into_parts();
        let err = raw_request_from_http(&parts, Bytes::new())
            .expect_err("raw request from http should fail");
        assert_eq!(err.kind(), ErrorKind::MethodNotAllowed);
    }
}
