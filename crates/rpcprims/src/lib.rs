//! Descriptor-driven procedure registry, routing and transports.
//!
//! rpcprims turns an API descriptor (OpenAPI 3.x or Swagger 2.0) plus a set
//! of handler functions into validated procedures behind a routing table,
//! and serves them over pluggable transports.
//!
//! # Crate Structure
//!
//! - [`types`]: error taxonomy, route keys, transport-neutral messages
//! - [`schema`]: compiled JSON Schema validation
//! - [`procedure`]: procedures, handlers, media types
//! - [`spec`]: specification contract, routing tables, the OpenAPI plugin
//! - [`transport`]: transport contract, the HTTP plugin and server
//! - [`dispatch`]: registry, dispatcher, request lifecycle
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rpcprims::procedure::{HandlerResult, RequestContext};
//! use rpcprims::spec::{DescriptorSource, HandlerBindings, OpenApiSpecification, SpecificationConfig};
//! use rpcprims::types::{Method, RawRequest};
//! use rpcprims::Registry;
//! use serde_json::{json, Value};
//!
//! async fn pong(_input: Value, _ctx: RequestContext) -> HandlerResult {
//!     Ok(json!({ "pong": true }))
//! }
//!
//! # async fn run() -> rpcprims::Result<()> {
//! let registry = Arc::new(Registry::new());
//! let config = SpecificationConfig::new("api").endpoint("http://127.0.0.1:8080");
//! registry.register_specification("api", Arc::new(OpenApiSpecification::new(config)))?;
//! registry
//!     .load_specification(
//!         "api",
//!         &DescriptorSource::path("openapi.json"),
//!         &HandlerBindings::new().with("ping", pong),
//!     )
//!     .await?;
//!
//! let reply = registry
//!     .dispatcher("api")?
//!     .route(RawRequest::new(Method::Get, "/ping"))
//!     .await;
//! assert!(reply.is_success());
//! # Ok(())
//! # }
//! ```

/// Re-export base types.
pub mod types {
    pub use rpcprims_types::*;
}

/// Re-export schema validation.
pub mod schema {
    pub use rpcprims_schema::*;
}

/// Re-export procedure types.
pub mod procedure {
    pub use rpcprims_procedure::*;
}

/// Re-export specification types.
pub mod spec {
    pub use rpcprims_spec::*;
}

/// Re-export transport types.
pub mod transport {
    pub use rpcprims_transport::*;
}

/// Re-export registry and dispatcher.
pub mod dispatch {
    pub use rpcprims_dispatch::*;
}

pub use rpcprims_dispatch::{Dispatcher, Registry};
pub use rpcprims_types::{ErrorKind, Result, RpcError};
