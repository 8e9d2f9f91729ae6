use serde_json::Value;

/// Failure raised by a procedure handler.
///
/// A `Raised` failure whose code is declared on the procedure reaches the
/// caller as a `HandlerError`. Anything else becomes an opaque
/// `InternalError` on the wire.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFailure {
    /// A named failure, expected to match one of the procedure's declared errors.
    #[error("{code}: {message}")]
    Raised {
        code: String,
        message: String,
        detail: Value,
    },

    /// An unexpected failure inside the handler.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerFailure {
    pub fn raise(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            code: code.into(),
            message: message.into(),
            detail: Value::Null,
        }
    }

    /// Attach caller-visible detail to a raised failure.
    pub fn with_detail(self, detail: Value) -> Self {
        match self {
            Self::Raised { code, message, .. } => Self::Raised {
                code,
                message,
                detail,
            },
            other => other,
        }
    }

    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }

    /// Declared code, if this failure carries one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Raised { code, .. } => Some(code),
            Self::Other(_) => None,
        }
    }
}

pub type HandlerResult = std::result::Result<Value, HandlerFailure>;
