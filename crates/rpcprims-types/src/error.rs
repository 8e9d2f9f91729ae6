use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Message written on the wire in place of internal failure detail.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Closed set of failure kinds shared by every rpcprims layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed registration or definition input.
    InvalidArgument,
    /// Name collision in the registry.
    DuplicateRegistration,
    /// A descriptor failed to load or parse.
    BadSpecification,
    /// Two descriptor entries collide on procedure name or route key.
    ProcedureConflict,
    /// A descriptor references a handler that was not bound.
    UnresolvedHandler,
    /// No route match, or unknown registry lookup.
    NotFound,
    /// The path matched a route but the verb did not.
    MethodNotAllowed,
    /// Input failed its declared schema.
    ValidationError,
    /// Content type does not match the procedure's declared input type.
    UnsupportedMediaType,
    /// Outbound connection failure.
    TransportError,
    /// Outbound call exceeded its deadline.
    Timeout,
    /// Outbound call received an error-shaped response.
    UpstreamError,
    /// Declared, caller-visible procedure failure.
    HandlerError,
    /// Everything else, including output contract violations.
    InternalError,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 14] = [
        ErrorKind::InvalidArgument,
        ErrorKind::DuplicateRegistration,
        ErrorKind::BadSpecification,
        ErrorKind::ProcedureConflict,
        ErrorKind::UnresolvedHandler,
        ErrorKind::NotFound,
        ErrorKind::MethodNotAllowed,
        ErrorKind::ValidationError,
        ErrorKind::UnsupportedMediaType,
        ErrorKind::TransportError,
        ErrorKind::Timeout,
        ErrorKind::UpstreamError,
        ErrorKind::HandlerError,
        ErrorKind::InternalError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::DuplicateRegistration => "DuplicateRegistration",
            ErrorKind::BadSpecification => "BadSpecification",
            ErrorKind::ProcedureConflict => "ProcedureConflict",
            ErrorKind::UnresolvedHandler => "UnresolvedHandler",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::MethodNotAllowed => "MethodNotAllowed",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::UnsupportedMediaType => "UnsupportedMediaType",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::UpstreamError => "UpstreamError",
            ErrorKind::HandlerError => "HandlerError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure value carried by every fallible rpcprims operation.
///
/// `context` is diagnostic payload. It is written to the wire for every kind
/// except [`ErrorKind::InternalError`], whose detail stays local.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RpcError {
    kind: ErrorKind,
    message: String,
    context: Value,
    code: Option<String>,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Value::Null,
            code: None,
            source: None,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn duplicate_registration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateRegistration, message)
    }

    pub fn bad_specification(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadSpecification, message)
    }

    pub fn procedure_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProcedureConflict, message)
    }

    pub fn unresolved_handler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnresolvedHandler, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedMediaType, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamError, message)
    }

    /// A declared procedure failure identified by `code`.
    pub fn handler(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::HandlerError, message);
        err.code = Some(code.into());
        err
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Attach a diagnostic payload.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Attach the underlying cause for local error reporting.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Declared error code, present on [`ErrorKind::HandlerError`].
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Error body suitable for writing onto a response.
    ///
    /// Internal errors collapse to a fixed message with no context or code.
    pub fn public_body(&self) -> Value {
        if self.kind == ErrorKind::InternalError {
            return json!({
                "error": {
                    "kind": self.kind,
                    "message": INTERNAL_ERROR_MESSAGE,
                }
            });
        }

        let mut error = Map::new();
        error.insert("kind".to_string(), json!(self.kind));
        error.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(code) = &self.code {
            error.insert("code".to_string(), Value::String(code.clone()));
        }
        if !self.context.is_null() {
            error.insert("context".to_string(), self.context.clone());
        }
        json!({ "error": Value::Object(error) })
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
