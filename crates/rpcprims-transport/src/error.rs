use std::time::Duration;

use rpcprims_types::RpcError;
use serde_json::json;

/// Longest upstream body excerpt carried in error context.
const UPSTREAM_EXCERPT_LEN: usize = 512;

/// Errors that can occur in outbound transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Transport or request configuration is unusable.
    #[error("invalid transport configuration: {0}")]
    Config(String),

    /// TLS material could not be loaded.
    #[error("invalid TLS material: {0}")]
    Tls(String),

    /// An endpoint strategy picked an endpoint that does not exist.
    #[error("strategy {strategy} chose endpoint {index} but only {available} are configured")]
    Strategy {
        strategy: String,
        index: usize,
        available: usize,
    },

    /// Failed to reach the endpoint at all.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: reqwest::Error,
    },

    /// The call did not complete within its timeout.
    #[error("request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    /// The endpoint answered with an error status.
    #[error("{endpoint} answered {status}")]
    Upstream {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Any other failure while sending or reading the exchange.
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Whether a failover strategy may move on to the next endpoint.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        let message = err.to_string();
        match err {
            TransportError::Config(_) | TransportError::Tls(_) => {
                RpcError::invalid_argument(message)
            }
            TransportError::Strategy {
                strategy,
                index,
                available,
            } => RpcError::transport(message).with_context(json!({
                "strategy": strategy,
                "index": index,
                "endpoints": available,
            })),
            TransportError::Connect { ref endpoint, .. } => {
                let context = json!({ "endpoint": endpoint });
                RpcError::transport(message).with_context(context).with_source(err)
            }
            TransportError::Request { ref endpoint, .. } => {
                let context = json!({ "endpoint": endpoint });
                RpcError::transport(message).with_context(context).with_source(err)
            }
            TransportError::Timeout { endpoint, after } => RpcError::timeout(message)
                .with_context(json!({ "endpoint": endpoint, "timeout_ms": after.as_millis() })),
            TransportError::Upstream {
                endpoint,
                status,
                body,
            } => {
                let excerpt: String = body.chars().take(UPSTREAM_EXCERPT_LEN).collect();
                RpcError::upstream(message).with_context(json!({
                    "endpoint": endpoint,
                    "status": status,
                    "body": excerpt,
                }))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
