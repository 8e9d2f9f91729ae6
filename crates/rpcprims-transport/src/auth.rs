use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Result, TransportError};

/// `Authorization` header value for `user:password` credentials.
pub fn basic_auth_header(credentials: &str) -> Result<String> {
    let Some((user, _password)) = credentials.split_once(':') else {
        return Err(TransportError::Config(
            "basic auth credentials must be user:password".to_string(),
        ));
    };
    if user.is_empty() {
        return Err(TransportError::Config(
            "basic auth user must not be empty".to_string(),
        ));
    }
    Ok(format!("Basic {}", STANDARD.encode(credentials)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_rfc7617_example() {
        assert_eq!(
            basic_auth_header("Aladdin:open sesame").expect("basic auth header should succeed"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    #[test]
    fn password_may_contain_colons_or_be_empty() {
        assert_eq!(basic_auth_header("u:").expect("empty password"), "Basic dTo=");
        assert!(basic_auth_header("u:a:b").is_ok());
    }

    #[test]
    fn rejects_malformed_credentials() {
        assert!(basic_auth_header("no-colon").is_err());
        assert!(basic_auth_header(":secret").is_err());
    }
}
