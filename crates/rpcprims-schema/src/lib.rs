//! Precompiled JSON Schema validation for procedure contracts.
//!
//! Schemas are compiled once, when a procedure is built, and the resulting
//! [`SchemaValidator`] is reused for every invocation. Failures carry the
//! JSON pointer of each violation so callers can see exactly what was wrong.

pub mod config;
pub mod error;
pub mod strict;
pub mod validator;

pub use config::ValidatorConfig;
pub use error::{Result, SchemaError, Violation};
pub use validator::SchemaValidator;
