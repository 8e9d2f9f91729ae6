use std::fmt;

use bytes::Bytes;
use rpcprims_types::{Result, RpcError};
use serde_json::Value;

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_PLAIN: &str = "text/plain";

/// How values cross the wire for a given media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// `application/json` and any `+json` structured suffix.
    Json,
    /// `text/plain`; the value is a JSON string.
    Text,
}

/// A parsed MIME type, compared by essence (`type/subtype`) only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
    codec: Codec,
}

impl MediaType {
    /// Parse a declared media type. Unknown types are an `InvalidArgument`.
    pub fn parse(raw: &str) -> Result<Self> {
        let essence = essence_of(raw);
        let codec = if essence == APPLICATION_JSON || essence.ends_with("+json") {
            Codec::Json
        } else if essence == TEXT_PLAIN {
            Codec::Text
        } else {
            return Err(RpcError::invalid_argument(format!(
                "unsupported media type: {raw}"
            )));
        };
        Ok(Self { essence, codec })
    }

    pub fn json() -> Self {
        Self {
            essence: APPLICATION_JSON.to_string(),
            codec: Codec::Json,
        }
    }

    pub fn essence(&self) -> &str {
        &self.essence
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Whether a transport-delivered `Content-Type` header names this type.
    pub fn accepts(&self, content_type: &str) -> bool {
        essence_of(content_type) == self.essence
    }

    /// Decode a request body. Empty bodies decode to `null`.
    pub fn decode(&self, body: &[u8]) -> Result<Value> {
        if body.is_empty() {
            return Ok(Value::Null);
        }
        match self.codec {
            Codec::Json => serde_json::from_slice(body).map_err(|err| {
                RpcError::validation(format!("body is not valid JSON: {err}")).with_source(err)
            }),
            Codec::Text => std::str::from_utf8(body)
                .map(|text| Value::String(text.to_string()))
                .map_err(|err| {
                    RpcError::validation(format!("body is not valid UTF-8: {err}")).with_source(err)
                }),
        }
    }

    /// Encode a result value for the response body.
    pub fn encode(&self, value: &Value) -> Result<Bytes> {
        match self.codec {
            Codec::Json => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|err| RpcError::internal("failed to encode JSON output").with_source(err)),
            Codec::Text => match value {
                Value::String(text) => Ok(Bytes::from(text.clone())),
                other => Err(RpcError::internal(format!(
                    "text/plain output must be a string, got {}",
                    json_type_name(other)
                ))),
            },
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.essence)
    }
}

fn essence_of(raw: &str) -> String {
    raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use rpcprims_types::ErrorKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_ignores_parameters_and_case() {
        let media = MediaType::parse("Application/JSON; charset=utf-8")
            .expect("parse should succeed");
        assert_eq!(media, MediaType::json());
        assert!(media.accepts("application/json;charset=UTF-8"));
        assert!(!media.accepts("text/plain"));
    }

    #[test]
    fn structured_json_suffix_uses_json_codec() {
        let media = MediaType::parse("application/problem+json").expect("parse should succeed");
        assert_eq!(media.codec(), Codec::Json);
        assert_eq!(media.essence(), "application/problem+json");
    }

    #[test]
    fn unknown_type_is_invalid_argument() {
        let err = MediaType::parse("application/x-protobuf").expect_err("parse should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn json_decode_and_encode() {
        let media = MediaType::json();
        assert_eq!(media.decode(b"").expect("decode should succeed"), Value::Null);
        assert_eq!(media.decode(br#"{"a":1}"#).expect("decode should succeed"), json!({ "a": 1 }));
        assert_eq!(
            media.decode(b"{").expect_err("decode should fail").kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(media.encode(&json!([1])).expect("encode should succeed").as_ref(), b"[1]");
    }

    #[test]
    fn text_codec_requires_strings_on_output() {
        let media = MediaType::parse(TEXT_PLAIN).expect("parse should succeed");
        assert_eq!(media.decode(b"hi").expect("decode should succeed"), json!("hi"));
        assert_eq!(media.encode(&json!("hey")).expect("encode should succeed").as_ref(), b"hey");
        assert_eq!(
            media.encode(&json!(1)).expect_err("encode should fail").kind(),
            ErrorKind::InternalError
        );
    }
}
