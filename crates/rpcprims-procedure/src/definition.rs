use std::fmt;
use std::sync::Arc;

use rpcprims_schema::ValidatorConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handler::Handler;

/// An error kind a procedure may raise and callers may branch on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredError {
    /// Stable identifier the handler raises and the caller sees.
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Status a transport should answer with, when it has a notion of one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl DeclaredError {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: String::new(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Per-procedure switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureConfig {
    /// Whether the procedure may be reached from outside the process.
    #[serde(default)]
    pub external: bool,
}

/// Everything needed to build a [`crate::Procedure`].
///
/// `input_type` and `output_type` default to `application/json`.
#[derive(Clone, Default)]
pub struct ProcedureDefinition {
    pub name: String,
    pub description: String,
    pub input_type: Option<String>,
    pub output_type: Option<String>,
    pub input: Value,
    pub output: Value,
    pub errors: Vec<DeclaredError>,
    pub config: ProcedureConfig,
    pub validation: ValidatorConfig,
    pub handler: Option<Arc<dyn Handler>>,
}

impl ProcedureDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input_type(mut self, media_type: impl Into<String>) -> Self {
        self.input_type = Some(media_type.into());
        self
    }

    pub fn output_type(mut self, media_type: impl Into<String>) -> Self {
        self.output_type = Some(media_type.into());
        self
    }

    pub fn input(mut self, schema: Value) -> Self {
        self.input = schema;
        self
    }

    pub fn output(mut self, schema: Value) -> Self {
        self.output = schema;
        self
    }

    pub fn error(mut self, error: DeclaredError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn external(mut self, external: bool) -> Self {
        self.config.external = external;
        self
    }

    pub fn validation(mut self, config: ValidatorConfig) -> Self {
        self.validation = config;
        self
    }

    pub fn handler<H: Handler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }
}

impl fmt::Debug for ProcedureDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureDefinition")
            .field("name", &self.name)
            .field("input_type", &self.input_type)
            .field("output_type", &self.output_type)
            .field("errors", &self.errors)
            .field("config", &self.config)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .finish()
    }
}
