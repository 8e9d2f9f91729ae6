//! Procedures: named units of business logic with declared contracts.
//!
//! A [`Procedure`] owns a handler plus input/output schemas compiled at
//! construction. [`Procedure::execute`] runs the full contract:
//! decode by media type, validate input, invoke the handler, check the
//! output against its schema, and map handler failures onto the shared
//! error taxonomy.

pub mod definition;
pub mod error;
pub mod handler;
pub mod media;
pub mod procedure;

pub use definition::{DeclaredError, ProcedureConfig, ProcedureDefinition};
pub use error::{HandlerFailure, HandlerResult};
pub use handler::{Handler, RequestContext};
pub use media::{Codec, MediaType, APPLICATION_JSON, TEXT_PLAIN};
pub use procedure::{Procedure, ProcedureInput, ProcedureOutput};

