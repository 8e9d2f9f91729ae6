use rpcprims_types::{ErrorKind, Outcome, Reply};

use crate::traits::WireResponse;

/// Status for a `HandlerError` whose procedure declared none.
pub const DEFAULT_HANDLER_ERROR_STATUS: u16 = 422;

/// HTTP status for an error kind. Each caller-visible kind gets its own.
pub fn status_for_kind(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::InvalidArgument | ErrorKind::ValidationError => 400,
        ErrorKind::NotFound => 404,
        ErrorKind::MethodNotAllowed => 405,
        ErrorKind::DuplicateRegistration => 409,
        ErrorKind::UnsupportedMediaType => 415,
        ErrorKind::HandlerError => DEFAULT_HANDLER_ERROR_STATUS,
        ErrorKind::BadSpecification
        | ErrorKind::ProcedureConflict
        | ErrorKind::UnresolvedHandler
        | ErrorKind::InternalError => 500,
        ErrorKind::TransportError | ErrorKind::UpstreamError => 502,
        ErrorKind::Timeout => 504,
    }
}

pub fn status_for(outcome: &Outcome) -> u16 {
    match outcome {
        Outcome::Success => 200,
        Outcome::Failure {
            kind: ErrorKind::HandlerError,
            status_hint,
            ..
        } => status_hint.unwrap_or(DEFAULT_HANDLER_ERROR_STATUS),
        Outcome::Failure { kind, .. } => status_for_kind(*kind),
    }
}

impl From<Reply> for WireResponse {
    fn from(reply: Reply) -> Self {
        Self {
            status: status_for(&reply.outcome),
            content_type: reply.content_type,
            body: reply.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use rpcprims_types::RpcError;

    use super::*;

    #[test]
    fn every_kind_maps_to_an_error_status() {
        for kind in ErrorKind::ALL {
            let status = status_for_kind(kind);
            assert!((400..600).contains(&status), "{kind} -> {status}");
        }
    }

    #[test]
    fn declared_errors_use_their_status() {
        let err = RpcError::handler("widget_missing", "gone");
        let reply = Reply::failure(&err, Some(404));
        assert_eq!(WireResponse::from(reply).status, 404);

        let reply = Reply::failure(&err, None);
        assert_eq!(WireResponse::from(reply).status, 422);

        let reply = Reply::failure(&RpcError::internal("boom"), Some(404));
        assert_eq!(WireResponse::from(reply).status, 500);
    }

    #[test]
    fn success_is_ok() {
        let reply = Reply::success("application/json", "{}");
        let wire = WireResponse::from(reply);
        assert_eq!(wire.status, 200);
        assert_eq!(wire.body.as_ref(), b"{}");
    }
}
