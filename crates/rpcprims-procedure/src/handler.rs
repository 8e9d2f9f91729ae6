use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerResult;

/// Per-invocation information handed to a handler alongside its input.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Identifier assigned by the dispatcher, unique per process.
    pub request_id: String,
    /// Name of the procedure being invoked.
    pub procedure: String,
    /// Matched route key, when the call arrived through a route.
    pub route: Option<String>,
    /// Lower-cased request headers.
    pub headers: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, procedure: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            procedure: procedure.into(),
            ..Self::default()
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Business logic behind a procedure.
///
/// Receives input that has already passed the procedure's input schema.
/// Handlers must not rely on shared mutable state for correctness: the same
/// handler runs concurrently for independent requests.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, input: Value, context: RequestContext) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, input: Value, context: RequestContext) -> HandlerResult {
        (self)(input, context).await
    }
}
