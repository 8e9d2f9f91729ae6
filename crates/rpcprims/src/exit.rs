use std::fmt;
use std::io;

use rpcprims::{ErrorKind, RpcError};

// Exit codes follow sysexits-style semantics where one exists.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn code_for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::InvalidArgument | ErrorKind::DuplicateRegistration => USAGE,
        ErrorKind::BadSpecification
        | ErrorKind::ProcedureConflict
        | ErrorKind::UnresolvedHandler
        | ErrorKind::ValidationError
        | ErrorKind::UnsupportedMediaType => DATA_INVALID,
        ErrorKind::TransportError => TRANSPORT_ERROR,
        ErrorKind::Timeout => TIMEOUT,
        ErrorKind::InternalError => INTERNAL,
        ErrorKind::NotFound
        | ErrorKind::MethodNotAllowed
        | ErrorKind::UpstreamError
        | ErrorKind::HandlerError => FAILURE,
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    let mut message = format!("{context}: {err}");
    if !err.context().is_null() {
        message.push_str(&format!(" {}", err.context()));
    }
    CliError::new(code_for_kind(err.kind()), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_an_exit_code() {
        for kind in ErrorKind::ALL {
            assert_ne!(code_for_kind(kind), SUCCESS, "{kind}");
        }
        assert_eq!(code_for_kind(ErrorKind::Timeout), TIMEOUT);
        assert_eq!(code_for_kind(ErrorKind::TransportError), TRANSPORT_ERROR);
        assert_eq!(code_for_kind(ErrorKind::BadSpecification), DATA_INVALID);
        assert_eq!(code_for_kind(ErrorKind::InvalidArgument), USAGE);
    }

    #[test]
    fn rpc_errors_keep_their_context() {
        let err = rpc_error("call failed", RpcError::timeout("no answer after 5s"));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("call failed: "));
    }
}
