//! Transport contract and the HTTP reference plugin.
//!
//! A [`Transport`] moves bytes in both directions:
//! - outbound `request()` picks an endpoint with an [`EndpointStrategy`]
//!   and sends a wire request
//! - inbound `route()` hands a [`rpcprims_types::RawRequest`] to a
//!   dispatcher and shapes the reply as a [`WireResponse`]
//!
//! Transports never look at procedure semantics.

pub mod auth;
pub mod error;
pub mod http;
pub mod plugins;
pub mod status;
pub mod strategy;
pub mod tls;
pub mod traits;

pub use auth::basic_auth_header;
pub use error::TransportError;
pub use http::{serve, HttpTransport, HttpTransportConfig, ServerConfig, HTTP_KIND};
pub use plugins::TransportPlugins;
pub use status::{status_for, status_for_kind};
pub use strategy::{EndpointStrategies, EndpointStrategy, Failover, RoundRobin, StrategyKind};
pub use tls::TlsMaterial;
pub use traits::{
    OutboundRequest, OutboundResponse, RequestOptions, Transport, TransportConfig, WireResponse,
};
