//! Shared vocabulary for rpcprims.
//!
//! This is the lowest layer of rpcprims. It defines the closed error
//! taxonomy, normalized route keys, and the transport-neutral request and
//! reply shapes that every other crate builds on.

pub mod dispatch;
pub mod error;
pub mod message;
pub mod route;

pub use dispatch::Dispatch;
pub use error::{ErrorKind, Result, RpcError, INTERNAL_ERROR_MESSAGE};
pub use message::{parse_query, Outcome, RawRequest, Reply, JSON_CONTENT_TYPE};
pub use route::{split_path, Method, PathTemplate, RouteKey, Segment};
