//! HTTP reference transport.
//!
//! Outbound calls go through `reqwest`; inbound requests arrive through an
//! `axum` router whose fallback hands everything to a dispatcher.

mod server;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use rpcprims_types::{Dispatch, RawRequest, Result, RpcError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::auth::basic_auth_header;
use crate::error::TransportError;
use crate::strategy::{EndpointStrategies, EndpointStrategy, StrategyKind};
use crate::traits::{
    OutboundRequest, OutboundResponse, RequestOptions, Transport, TransportConfig, WireResponse,
};

pub use server::{raw_request_from_http, serve, ServerConfig};

pub const HTTP_KIND: &str = "http";

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    pub name: String,
    pub endpoints: Vec<String>,
    /// Use `https` for endpoints given as bare `host:port`.
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_timeout", with = "duration_ms")]
    pub default_timeout: Duration,
    /// Name of the endpoint strategy used when a call does not pick one.
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
}

impl HttpTransportConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: Vec::new(),
            secure: false,
            default_timeout: default_timeout(),
            default_strategy: default_strategy(),
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

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.default_strategy = strategy.into();
        self
    }
}

impl From<TransportConfig> for HttpTransportConfig {
    fn from(config: TransportConfig) -> Self {
        Self {
            endpoints: config.endpoints,
            secure: config.secure,
            ..Self::new(config.name)
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_strategy() -> String {
    StrategyKind::default().into()
}

mod duration_ms {
    use std::sync::Arc;
use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// HTTP transport: outbound client plus inbound routing.
#[derive(Debug)]
pub struct HttpTransport {
    config: HttpTransportConfig,
    endpoints: Vec<String>,
    client: Client,
    strategies: EndpointStrategies,
}

impl HttpTransport {
    /// Validate endpoints and build the shared client.
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(RpcError::invalid_argument("transport name is required"));
        }
        if config.endpoints.is_empty() {
            return Err(TransportError::Config(format!(
                "transport {} has no endpoints",
                config.name
            ))
            .into());
        }
        let endpoints = config
            .endpoints
            .iter()
            .map(|endpoint| normalize_endpoint(endpoint, config.secure))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let client = Client::builder()
            .build()
            .map_err(|err| TransportError::Config(format!("http client: {err}")))?;

        debug!(transport = %config.name, ?endpoints, "http transport created");
        Ok(Self {
            config,
            endpoints,
            client,
            strategies: EndpointStrategies::with_defaults(),
        })
    }

    /// Make `strategy` selectable by its name, alongside the built-ins.
    pub fn with_strategy(mut self, strategy: Arc<dyn EndpointStrategy>) -> Result<Self> {
        self.strategies.register(strategy)?;
        Ok(self)
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.names()
    }

    fn strategy(&self, name: &str) -> std::result::Result<&dyn EndpointStrategy, TransportError> {
        self.strategies.get(name).map(|strategy| strategy.as_ref()).ok_or_else(|| {
            TransportError::Config(format!(
                "transport {} has no endpoint strategy {name:?}",
                self.config.name
            ))
        })
    }

    fn client_for(&self, options: &RequestOptions) -> std::result::Result<Client, TransportError> {
        match &options.tls {
            None => Ok(self.client.clone()),
            Some(tls) => tls
                .apply(Client::builder())?
                .build()
                .map_err(|err| TransportError::Tls(format!("http client: {err}"))),
        }
    }

    async fn send_once(
        &self,
        client: &Client,
        endpoint: &str,
        request: &OutboundRequest,
        authorization: Option<&str>,
        timeout: Duration,
    ) -> std::result::Result<OutboundResponse, TransportError> {
        let url = join_url(endpoint, &request.path)?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|err| TransportError::Config(format!("method {}: {err}", request.method)))?;

        let mut builder = client.request(method, url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        if let Some(body) = &request.body {
            if let Some(content_type) = &request.content_type {
                builder = builder.header(CONTENT_TYPE, content_type.as_str());
            }
            builder = builder.body(body.clone());
        }

        let classify = |source: reqwest::Error| {
            let endpoint = endpoint.to_string();
            if source.is_timeout() {
                TransportError::Timeout {
                    endpoint,
                    after: timeout,
                }
            } else if source.is_connect() {
                TransportError::Connect { endpoint, source }
            } else {
                TransportError::Request { endpoint, source }
            }
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(classify)?;

        if status.is_client_error() || status.is_server_error() {
            return Err(TransportError::Upstream {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(OutboundResponse {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &str {
        HTTP_KIND
    }

    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn request(
        &self,
        request: OutboundRequest,
        options: &RequestOptions,
    ) -> Result<OutboundResponse> {
        let strategy = options
            .strategy
            .as_deref()
            .unwrap_or(&self.config.default_strategy);
        let selector = self.strategy(strategy)?;
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let authorization = options.auth.as_deref().map(basic_auth_header).transpose()?;
        let client = self.client_for(options)?;

        let mut last_failure = None;
        for index in selector.candidates(self.endpoints.len()) {
            let endpoint = self.endpoints.get(index).ok_or_else(|| TransportError::Strategy {
                strategy: strategy.to_string(),
                index,
                available: self.endpoints.len(),
            })?;
            debug!(
                transport = %self.config.name,
                %endpoint,
                %strategy,
                method = %request.method,
                path = %request.path,
                "outbound request"
            );
            match self
                .send_once(&client, endpoint, &request, authorization.as_deref(), timeout)
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) if err.is_connect() => {
                    warn!(
                        transport = %self.config.name,
                        %endpoint,
                        error = %err,
                        "endpoint unreachable"
                    );
                    last_failure = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(match last_failure {
            Some(err) => err.into(),
            None => RpcError::transport(format!(
                "transport {} has no endpoint to try",
                self.config.name
            )),
        })
    }

    async fn route(&self, request: RawRequest, dispatcher: &dyn Dispatch) -> WireResponse {
        WireResponse::from(dispatcher.dispatch(request).await)
    }
}

/// Parse an endpoint, adding a scheme when only `host:port` is given.
fn normalize_endpoint(raw: &str, secure: bool) -> std::result::Result<String, TransportError> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        let scheme = if secure { "https" } else { "http" };
        format!("{scheme}://{raw}")
    };
    let url = Url::parse(&candidate)
        .map_err(|err| TransportError::Config(format!("endpoint {raw:?}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TransportError::Config(format!(
            "endpoint {raw:?} must use http or https"
        )));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn join_url(endpoint: &str, path: &str) -> std::result::Result<Url, TransportError> {
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{endpoint}/{path}"))
        .map_err(|err| TransportError::Config(format!("request path {path:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use rpcprims_types::{ErrorKind, Method};
    use tokio::net::TcpListener;

    use super::*;

    async fn spawn_upstream(tag: &'static str) -> String {
        async fn hello(State(tag): State<&'static str>, headers: HeaderMap) -> String {
            let auth = headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("none")
                .to_string();
            format!("{tag}:{auth}")
        }
        async fn broken() -> (StatusCode, &'static str) {
            (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance")
        }
        let app = Router::new()
            .route("/hello", get(hello))
            .route("/broken", get(broken))
            .with_state(tag);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    async fn closed_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        format!("http://{addr}")
    }

    fn transport(endpoints: &[String]) -> HttpTransport {
        let mut config = HttpTransportConfig::new("upstream");
        config.endpoints = endpoints.to_vec();
        HttpTransport::new(config).expect("transport should build")
    }

    #[test]
    fn construction_validates_endpoints() {
        let err = HttpTransport::new(HttpTransportConfig::new("empty"))
            .expect_err("no endpoints should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let ftp = HttpTransportConfig::new("ftp").endpoint("ftp://x");
        let err = HttpTransport::new(ftp).expect_err("ftp endpoint should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let secure = HttpTransport::new(
            HttpTransportConfig::new("secure")
                .endpoint("api.example.com:8443/")
                .secure(true),
        )
        .expect("secure transport");
        assert_eq!(secure.endpoints(), &["https://api.example.com:8443".to_string()]);
        assert_eq!(secure.kind(), HTTP_KIND);
    }

    #[test]
    fn config_defaults_and_serde() {
        let config: HttpTransportConfig =
            serde_json::from_str(r#"{"name":"a","endpoints":["http://x"]}"#).expect("config");
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(config.default_strategy, "round-robin");
        assert!(!config.secure);

        let config: HttpTransportConfig = serde_json::from_str(
            r#"{"name":"a","endpoints":[],"default_timeout":250,"default_strategy":"failover"}"#,
        )
        .expect("config");
        assert_eq!(config.default_timeout, Duration::from_millis(250));
        assert_eq!(config.default_strategy, "failover");
    }

    #[tokio::test]
    async fn round_robin_alternates_endpoints() {
        let a = spawn_upstream("a").await;
        let b = spawn_upstream("b").await;
        let transport = transport(&[a, b]);

        let mut seen = Vec::new();
        for _ in 0..4 {
            let response = transport
                .request(OutboundRequest::new(Method::Get, "/hello"), &RequestOptions::default())
                .await
                .expect("upstream answers");
            seen.push(String::from_utf8(response.body.to_vec()).expect("utf-8 body"));
        }
        assert_eq!(seen, vec!["a:none", "b:none", "a:none", "b:none"]);
    }

    #[tokio::test]
    async fn basic_auth_header_is_sent() {
        let a = spawn_upstream("a").await;
        let response = transport(&[a])
            .request(
                OutboundRequest::new(Method::Get, "hello"),
                &RequestOptions::default().auth("Aladdin:open sesame"),
            )
            .await
            .expect("upstream answers");
        assert_eq!(response.body.as_ref(), b"a:Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }

    #[tokio::test]
    async fn failover_skips_unreachable_endpoints() {
        let dead = closed_endpoint().await;
        let live = spawn_upstream("live").await;
        let transport = transport(&[dead.clone(), live]);
        let options = RequestOptions::default().strategy(StrategyKind::Failover);

        let response = transport
            .request(OutboundRequest::new(Method::Get, "/hello"), &options)
            .await
            .expect("upstream answers");
        assert_eq!(response.body.as_ref(), b"live:none");

        let err = transport_only(&dead)
            .request(OutboundRequest::new(Method::Get, "/hello"), &options)
            .await
            .expect_err("request should fail");
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }

    fn transport_only(endpoint: &str) -> HttpTransport {
        transport(&[endpoint.to_string()])
    }

    #[tokio::test]
    async fn error_status_is_upstream_error_and_not_failed_over() {
        let first = spawn_upstream("first").await;
        let second = spawn_upstream("second").await;
        let transport = transport(&[first, second]);
        let options = RequestOptions::default().strategy(StrategyKind::Failover);

        let err = transport
            .request(OutboundRequest::new(Method::Get, "/broken"), &options)
            .await
            .expect_err("request should fail");
        assert_eq!(err.kind(), ErrorKind::UpstreamError);
        assert_eq!(err.context()["status"], 503);
        assert_eq!(err.context()["body"], "down for maintenance");
    }

    #[tokio::test]
    async fn slow_upstream_times_out_without_retry() {
        async fn slow(State(hits): State<Arc<AtomicUsize>>) -> &'static str {
            hits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/slow", get(slow))
            .with_state(hits.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
        let endpoint = format!("http://{}", listener.local_addr().expect("local addr"));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let transport = transport(&[endpoint.clone(), endpoint]);
        let options = RequestOptions::default()
            .strategy(StrategyKind::Failover)
            .timeout(Duration::from_millis(100));
        let err = transport
            .request(OutboundRequest::new(Method::Get, "/slow"), &options)
            .await
            .expect_err("request should fail");
        assert_eq!(err.kind(), ErrorKind::Timeout);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Always answers with one fixed index, in range or not.
    struct Pinned(usize);

    impl EndpointStrategy for Pinned {
        fn name(&self) -> &str {
            "pinned"
        }

        fn candidates(&self, _endpoint_count: usize) -> Vec<usize> {
            vec![self.0]
        }
    }

    #[tokio::test]
    async fn custom_strategy_is_selected_by_name() {
        let a = spawn_upstream("a").await;
        let b = spawn_upstream("b").await;
        let transport = transport(&[a, b])
            .with_strategy(Arc::new(Pinned(1)))
            .expect("custom strategy registers");
        assert_eq!(transport.strategy_names(), vec!["failover", "pinned", "round-robin"]);

        let options = RequestOptions::default().strategy("pinned");
        for _ in 0..3 {
            let response = transport
                .request(OutboundRequest::new(Method::Get, "/hello"), &options)
                .await
                .expect("pinned endpoint answers");
            assert_eq!(response.body.as_ref(), b"b:none");
        }
    }

    #[tokio::test]
    async fn custom_strategy_can_be_the_default() {
        let a = spawn_upstream("a").await;
        let b = spawn_upstream("b").await;
        let config = HttpTransportConfig::new("pinned-default")
            .endpoint(a)
            .endpoint(b)
            .default_strategy("pinned");
        let transport = HttpTransport::new(config)
            .and_then(|transport| transport.with_strategy(Arc::new(Pinned(0))))
            .expect("transport");

        let response = transport
            .request(OutboundRequest::new(Method::Get, "/hello"), &RequestOptions::default())
            .await
            .expect("pinned endpoint answers");
        assert_eq!(response.body.as_ref(), b"a:none");
    }

    #[tokio::test]
    async fn out_of_range_choice_is_a_transport_error() {
        let transport = transport(&["http://127.0.0.1:9".to_string()])
            .with_strategy(Arc::new(Pinned(5)))
            .expect("custom strategy registers");

        let err = transport
            .request(
                OutboundRequest::new(Method::Get, "/hello"),
                &RequestOptions::default().strategy("pinned"),
            )
            .await
            .expect_err("index 5 of 1 should fail");
        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert_eq!(err.context()["index"], 5);
        assert_eq!(err.context()["endpoints"], 1);
    }

    #[tokio::test]
    async fn unknown_strategy_name_is_invalid_argument() {
        let err = transport(&["http://127.0.0.1:9".to_string()])
            .request(
                OutboundRequest::new(Method::Get, "/hello"),
                &RequestOptions::default().strategy("random"),
            )
            .await
            .expect_err("unknown strategy should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn malformed_credentials_fail_before_sending() {
        let err = transport(&["http://127.0.0.1:9".to_string()])
            .request(
                OutboundRequest::new(Method::Get, "/hello"),
                &RequestOptions::default().auth("nocolon"),
            )
            .await
            .expect_err("request should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
