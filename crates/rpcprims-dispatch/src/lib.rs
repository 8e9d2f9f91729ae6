//! Registry and dispatcher.
//!
//! A [`Registry`] is built once at assembly time and holds the registered
//! specifications and transports. Each specification serves requests from an
//! immutable [`rpcprims_spec::SpecSnapshot`]; reloads swap a whole snapshot
//! in. A [`Dispatcher`] matches inbound requests against the current snapshot
//! and drives them through the [`RequestState`] machine.

pub mod dispatcher;
pub mod lifecycle;
pub mod registry;

pub use dispatcher::{Dispatcher, REQUEST_ID_HEADER};
pub use lifecycle::{Lifecycle, RequestState};
pub use registry::Registry;
