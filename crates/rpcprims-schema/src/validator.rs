use std::fmt;

use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use crate::config::ValidatorConfig;
use crate::error::{Result, SchemaError, Violation};
use crate::strict::close_object_schemas;

/// A JSON Schema compiled once and reused for every validation.
pub struct SchemaValidator {
    compiled: Validator,
    schema: Value,
    config: ValidatorConfig,
}

impl SchemaValidator {
    /// Compile `schema` with default config.
    pub fn compile(schema: &Value) -> Result<Self> {
        Self::compile_with_config(schema, ValidatorConfig::default())
    }

    /// Compile `schema` with explicit config.
    ///
    /// A `null` schema means "no contract" and accepts every value.
    pub fn compile_with_config(schema: &Value, config: ValidatorConfig) -> Result<Self> {
        let mut effective = match schema {
            Value::Null => Value::Bool(true),
            other => other.clone(),
        };
        if config.strict_mode {
            close_object_schemas(&mut effective);
        }

        let compiled = jsonschema::validator_for(&effective)
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;
        debug!(strict = config.strict_mode, "compiled schema");

        Ok(Self {
            compiled,
            schema: effective,
            config,
        })
    }

    /// Validate an already-decoded value.
    pub fn validate(&self, value: &Value) -> Result<()> {
        let violations: Vec<Violation> = self
            .compiled
            .iter_errors(value)
            .take(self.config.max_reported_violations.max(1))
            .map(|err| Violation {
                path: err.instance_path().to_string(),
                message: err.to_string(),
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::ValidationFailed { violations })
        }
    }

    /// Decode `payload` as JSON and validate it.
    pub fn validate_bytes(&self, payload: &[u8]) -> Result<Value> {
        let value: Value = serde_json::from_slice(payload)?;
        self.validate(&value)?;
        Ok(value)
    }

    /// The schema as compiled, after strict-mode rewriting.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Declared `type` of a top-level object property, ignoring `"null"`.
    pub fn property_type(&self, property: &str) -> Option<&str> {
        match self.schema.get("properties")?.get(property)?.get("type")? {
            Value::String(kind) => Some(kind.as_str()),
            Value::Array(kinds) => kinds
                .iter()
                .filter_map(Value::as_str)
                .find(|kind| *kind != "null"),
            _ => None,
        }
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .field("config", &self.config)
            .finish()
    }
}
