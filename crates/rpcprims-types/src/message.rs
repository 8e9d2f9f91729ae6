use bytes::Bytes;
use serde_json::Value;

use crate::error::{ErrorKind, RpcError};
use crate::route::{percent_decode, Method};

/// Content type used for every error body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Transport-neutral inbound request handed to a dispatcher.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    /// Request path without the query string.
    pub path: String,
    /// Decoded query pairs, in request order.
    pub query: Vec<(String, String)>,
    pub content_type: Option<String>,
    /// Header pairs with lower-cased names.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RawRequest {
    /// Build a request from a verb and a request target (`/path?query`).
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, Vec::new()),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            content_type: None,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body.into();
        self
    }

    /// Convenience for JSON request bodies.
    pub fn with_json(self, value: &Value) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_body(JSON_CONTENT_TYPE, body)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// How a dispatched request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure {
        kind: ErrorKind,
        /// Declared error code for `HandlerError`.
        code: Option<String>,
        /// Transport status the procedure declared for this error, if any.
        status_hint: Option<u16>,
    },
}

/// Status-equivalent plus body, ready for a transport to write back.
#[derive(Debug, Clone)]
pub struct Reply {
    pub outcome: Outcome,
    pub content_type: String,
    pub body: Bytes,
}

impl Reply {
    pub fn success(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            outcome: Outcome::Success,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Error reply built from the public view of `err`.
    pub fn failure(err: &RpcError, status_hint: Option<u16>) -> Self {
        let body = serde_json::to_vec(&err.public_body()).unwrap_or_default();
        Self {
            outcome: Outcome::Failure {
                kind: err.kind(),
                code: err.code().map(str::to_string),
                status_hint,
            },
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Body parsed as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Parse an `application/x-www-form-urlencoded` style query string.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (
                percent_decode(&key.replace('+', " ")),
                percent_decode(&value.replace('+', " ")),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_splits_query_from_path() {
        let req = RawRequest::new(Method::Get, "/widgets?color=dark+blue&size=%31&flag");
        assert_eq!(req.path, "/widgets");
        assert_eq!(
            req.query,
            vec![
                ("color".to_string(), "dark blue".to_string()),
                ("size".to_string(), "1".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = RawRequest::new(Method::Get, "/").with_header("X-Request-Id", "abc");
        assert_eq!(req.header("x-request-id"), Some("abc"));
        assert_eq!(req.header("X-REQUEST-ID"), Some("abc"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn failure_reply_keeps_kind_and_code() {
        let err = RpcError::handler("widget_missing", "nope");
        let reply = Reply::failure(&err, Some(404));
        assert_eq!(reply.error_kind(), Some(ErrorKind::HandlerError));
        assert_eq!(
            reply.outcome,
            Outcome::Failure {
                kind: ErrorKind::HandlerError,
                code: Some("widget_missing".to_string()),
                status_hint: Some(404),
            }
        );
        assert_eq!(
            reply.json_body().expect("error body is json")["error"]["code"],
            "widget_missing"
        );
    }

    #[test]
    fn success_reply_exposes_body() {
        let reply = Reply::success(JSON_CONTENT_TYPE, br#"{"pong":true}"#.to_vec());
        assert!(reply.is_success());
        assert_eq!(reply.json_body(), Some(json!({ "pong": true })));
    }
}
