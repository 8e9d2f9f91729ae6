use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rpcprims_procedure::Handler;
use rpcprims_types::{Result, RpcError};

/// Caller-supplied mapping from descriptor operation ids to handlers.
///
/// Specifications never invent handler logic; every operation in a
/// descriptor must find its handler here.
#[derive(Clone, Default)]
pub struct HandlerBindings {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `operation_id` to `handler`. Rebinding an id is an `InvalidArgument`.
    pub fn bind<H: Handler>(&mut self, operation_id: impl Into<String>, handler: H) -> Result<()> {
        self.bind_shared(operation_id, Arc::new(handler))
    }

    pub fn bind_shared(
        &mut self,
        operation_id: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        let operation_id = operation_id.into();
        if operation_id.trim().is_empty() {
            return Err(RpcError::invalid_argument("operation id is required"));
        }
        if self.handlers.contains_key(&operation_id) {
            return Err(RpcError::invalid_argument(format!(
                "operation {operation_id} is already bound"
            )));
        }
        self.handlers.insert(operation_id, handler);
        Ok(())
    }

    /// Builder form of [`HandlerBindings::bind`]; later bindings replace earlier ones.
    pub fn with<H: Handler>(mut self, operation_id: impl Into<String>, handler: H) -> Self {
        self.handlers.insert(operation_id.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, operation_id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(operation_id).cloned()
    }

    /// Bound operation ids, sorted.
    pub fn operation_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBindings")
            .field("operation_ids", &self.operation_ids())
            .finish()
    }
}
