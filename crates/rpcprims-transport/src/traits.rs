use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rpcprims_types::{Dispatch, Method, RawRequest, Result, JSON_CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tls::TlsMaterial;

/// Settings common to every transport plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub name: String,
    /// Plugin kind, e.g. `"http"`.
    pub kind: String,
    pub endpoints: Vec<String>,
    /// Prefer TLS for endpoints given without a scheme.
    #[serde(default)]
    pub secure: bool,
}

impl TransportConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// An outbound call, relative to whichever endpoint the strategy picks.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path and optional query, appended to the endpoint URL.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            content_type: None,
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = Some(body.into());
        self
    }

    pub fn json(self, value: &Value) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.body(JSON_CONTENT_TYPE, body)
    }
}

/// Per-call options. Unset fields fall back to the transport's defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Name of a strategy registered on the transport.
    pub strategy: Option<String>,
    pub timeout: Option<Duration>,
    /// Basic-auth credentials as `user:password`.
    pub auth: Option<String>,
    pub tls: Option<TlsMaterial>,
}

impl RequestOptions {
    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn auth(mut self, credentials: impl Into<String>) -> Self {
        self.auth = Some(credentials.into());
        self
    }

    pub fn tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// A successful outbound exchange.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    /// Endpoint that produced this response.
    pub endpoint: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl OutboundResponse {
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// What an inbound `route` writes back: status-equivalent plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

/// Moves requests over one concrete wire format.
///
/// A transport never looks at procedure semantics. Outbound it picks an
/// endpoint and sends; inbound it turns its native request into a
/// [`RawRequest`], hands it to the dispatcher and shapes the reply.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Plugin kind, e.g. `"http"`.
    fn kind(&self) -> &str;

    /// Remote endpoints for outbound calls, in configured order.
    fn endpoints(&self) -> &[String];

    /// Send `request` to an endpoint chosen by the call's strategy.
    ///
    /// Fails with `TransportError`, `Timeout` or `UpstreamError`. Never
    /// retries after a timeout.
    async fn request(
        &self,
        request: OutboundRequest,
        options: &RequestOptions,
    ) -> Result<OutboundResponse>;

    /// Deliver an inbound request to `dispatcher` and shape its reply.
    async fn route(&self, request: RawRequest, dispatcher: &dyn Dispatch) -> WireResponse;
}
