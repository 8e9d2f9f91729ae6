//! Specifications: descriptors turned into procedures plus a routing table.
//!
//! A [`Specification`] plugin reads a descriptor from a
//! [`DescriptorSource`], hands each normalized operation to the shared
//! [`SnapshotBuilder`], and returns an immutable [`SpecSnapshot`]. Handlers
//! come from caller-supplied [`HandlerBindings`]; plugins never invent
//! them.
//!
//! The OpenAPI 3.x / Swagger 2.0 plugin in [`openapi`] is the reference
//! implementation, available through [`SpecificationPlugins::with_defaults`].

pub mod bindings;
pub mod openapi;
pub mod plugins;
pub mod snapshot;
pub mod source;
pub mod specification;
pub mod table;

pub use bindings::HandlerBindings;
pub use openapi::{operation_ids, OpenApiSpecification, OPENAPI_KIND, SWAGGER_KIND};
pub use plugins::SpecificationPlugins;
pub use snapshot::{OperationDescriptor, SnapshotBuilder, SpecSnapshot};
pub use source::{DescriptorSource, SourceLimits};
pub use specification::{SpecMetadata, Specification, SpecificationConfig};
pub use table::{RouteEntry, RouteMatch, RoutingTable};
