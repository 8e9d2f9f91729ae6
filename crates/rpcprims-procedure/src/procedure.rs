use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use rpcprims_schema::{SchemaError, SchemaValidator};
use rpcprims_types::{Result, RpcError};
use serde_json::{json, Map, Number, Value};
use tracing::{debug, error, warn};

use crate::definition::{DeclaredError, ProcedureConfig, ProcedureDefinition};
use crate::error::HandlerFailure;
use crate::handler::{Handler, RequestContext};
use crate::media::{json_type_name, Codec, MediaType};

/// Raw input as delivered by a transport.
#[derive(Debug, Clone, Default)]
pub struct ProcedureInput {
    /// `Content-Type` of `body`, if the transport supplied one.
    pub content_type: Option<String>,
    pub body: Bytes,
    /// Parameters extracted from the matched path template.
    pub path_params: Vec<(String, String)>,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
}

impl ProcedureInput {
    pub fn json(value: &Value) -> Self {
        Self {
            content_type: Some(crate::media::APPLICATION_JSON.to_string()),
            body: Bytes::from(serde_json::to_vec(value).unwrap_or_default()),
            ..Self::default()
        }
    }
}

/// Encoded, contract-checked procedure result.
#[derive(Debug, Clone)]
pub struct ProcedureOutput {
    pub content_type: String,
    pub body: Bytes,
    pub value: Value,
}

/// A named, validated, executable unit of business logic.
///
/// Every field is fixed at construction. Input and output schemas are
/// compiled once there and reused for every call.
pub struct Procedure {
    name: String,
    description: String,
    input_type: MediaType,
    output_type: MediaType,
    input: Value,
    output: Value,
    errors: Vec<DeclaredError>,
    config: ProcedureConfig,
    input_validator: SchemaValidator,
    output_validator: SchemaValidator,
    handler: Arc<dyn Handler>,
}

impl Procedure {
    /// Validate `definition` and build a procedure from it.
    pub fn new(definition: ProcedureDefinition) -> Result<Self> {
        let ProcedureDefinition {
            name,
            description,
            input_type,
            output_type,
            input,
            output,
            errors,
            config,
            validation,
            handler,
        } = definition;

        if name.trim().is_empty() {
            return Err(RpcError::invalid_argument("procedure name is required"));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(RpcError::invalid_argument(format!(
                "procedure name must not contain whitespace: {name:?}"
            )));
        }
        let handler = handler.ok_or_else(|| {
            RpcError::invalid_argument(format!("procedure {name} has no handler"))
        })?;
        check_declared_errors(&name, &errors)?;

        let input_type = media_type_or_json(input_type.as_deref())?;
        let output_type = media_type_or_json(output_type.as_deref())?;

        let input_validator = SchemaValidator::compile_with_config(&input, validation)
            .map_err(|err| schema_definition_error(&name, "input", err))?;
        let output_validator = SchemaValidator::compile_with_config(&output, validation)
            .map_err(|err| schema_definition_error(&name, "output", err))?;

        debug!(procedure = %name, %input_type, %output_type, "procedure created");

        Ok(Self {
            name,
            description,
            input_type,
            output_type,
            input,
            output,
            errors,
            config,
            input_validator,
            output_validator,
            handler,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_type(&self) -> &MediaType {
        &self.input_type
    }

    pub fn output_type(&self) -> &MediaType {
        &self.output_type
    }

    /// Input schema as supplied.
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Output schema as supplied.
    pub fn output(&self) -> &Value {
        &self.output
    }

    pub fn errors(&self) -> &[DeclaredError] {
        &self.errors
    }

    pub fn is_external(&self) -> bool {
        self.config.external
    }

    pub fn declared_error(&self, code: &str) -> Option<&DeclaredError> {
        self.errors.iter().find(|declared| declared.code == code)
    }

    /// Run the whole contract: decode, validate, invoke, check and encode.
    pub async fn execute(
        &self,
        input: ProcedureInput,
        context: RequestContext,
    ) -> Result<ProcedureOutput> {
        let value = self.prepare(input)?;
        self.invoke(value, context).await
    }

    /// Decode raw input, merge parameters and validate against the input schema.
    ///
    /// The handler is never reached when this fails.
    pub fn prepare(&self, input: ProcedureInput) -> Result<Value> {
        if let Some(content_type) = input.content_type.as_deref() {
            let has_body = !input.body.is_empty();
            if has_body && !self.input_type.accepts(content_type) {
                return Err(RpcError::unsupported_media_type(format!(
                    "{} expects {}, got {content_type}",
                    self.name, self.input_type
                ))
                .with_context(json!({ "expected": self.input_type.essence() })));
            }
        }

        let decoded = self.input_type.decode(&input.body)?;
        let value = self.merge_params(decoded, &input.path_params, &input.query)?;

        self.input_validator
            .validate(&value)
            .map_err(|err| input_violation(&self.name, err))?;
        Ok(value)
    }

    /// Call the handler on prepared input and enforce the output contract.
    pub async fn invoke(&self, value: Value, context: RequestContext) -> Result<ProcedureOutput> {
        let result = match self.handler.call(value, context).await {
            Ok(result) => result,
            Err(failure) => return Err(self.map_failure(failure)),
        };

        if let Err(err) = self.output_validator.validate(&result) {
            error!(procedure = %self.name, error = %err, "output contract violated");
            return Err(RpcError::internal(format!(
                "{} produced output that violates its contract: {err}",
                self.name
            ))
            .with_source(err));
        }

        let body = self.output_type.encode(&result)?;
        Ok(ProcedureOutput {
            content_type: self.output_type.essence().to_string(),
            body,
            value: result,
        })
    }

    fn map_failure(&self, failure: HandlerFailure) -> RpcError {
        match failure {
            HandlerFailure::Raised {
                code,
                message,
                detail,
            } if self.declared_error(&code).is_some() => {
                debug!(procedure = %self.name, %code, "declared failure");
                RpcError::handler(code, message).with_context(detail)
            }
            HandlerFailure::Raised {
                code,
                message,
                detail,
            } => {
                error!(procedure = %self.name, %code, %message, %detail, "undeclared failure");
                RpcError::internal(format!("{} raised undeclared error {code}: {message}", self.name))
                    .with_context(json!({ "code": code, "detail": detail }))
            }
            HandlerFailure::Other(source) => {
                error!(procedure = %self.name, error = %source, "handler failed");
                RpcError::internal(format!("{} failed: {source}", self.name))
            }
        }
    }

    fn merge_params(
        &self,
        decoded: Value,
        path_params: &[(String, String)],
        query: &[(String, String)],
    ) -> Result<Value> {
        if path_params.is_empty() && query.is_empty() {
            return Ok(decoded);
        }
        if self.input_type.codec() != Codec::Json {
            return Err(RpcError::validation(format!(
                "{} takes {} input and cannot accept parameters",
                self.name, self.input_type
            )));
        }

        let mut object = match decoded {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(RpcError::validation(format!(
                    "{} cannot merge parameters into a {} body",
                    self.name,
                    json_type_name(&other)
                )))
            }
        };

        for (key, raw) in query {
            if !object.contains_key(key) {
                object.insert(key.clone(), self.coerce_param(key, raw));
            }
        }
        for (key, raw) in path_params {
            if object.contains_key(key) {
                warn!(procedure = %self.name, param = %key, "path parameter overrides body field");
            }
            object.insert(key.clone(), self.coerce_param(key, raw));
        }
        Ok(Value::Object(object))
    }

    /// Convert a string parameter to the scalar type its schema declares.
    fn coerce_param(&self, key: &str, raw: &str) -> Value {
        let coerced = match self.input_validator.property_type(key) {
            Some("integer") => raw.parse::<i64>().ok().map(Value::from),
            Some("number") => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            Some("boolean") => raw.parse::<bool>().ok().map(Value::Bool),
            _ => None,
        };
        coerced.unwrap_or_else(|| Value::String(raw.to_string()))
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("input_type", &self.input_type)
            .field("output_type", &self.output_type)
            .field("errors", &self.errors)
            .field("config", &self.config)
            .finish()
    }
}

fn media_type_or_json(raw: Option<&str>) -> Result<MediaType> {
    match raw {
        Some(raw) => MediaType::parse(raw),
        None => Ok(MediaType::json()),
    }
}

fn check_declared_errors(name: &str, errors: &[DeclaredError]) -> Result<()> {
    let mut seen = HashSet::new();
    for declared in errors {
        if declared.code.trim().is_empty() {
            return Err(RpcError::invalid_argument(format!(
                "procedure {name} declares an error with an empty code"
            )));
        }
        if !seen.insert(declared.code.as_str()) {
            return Err(RpcError::invalid_argument(format!(
                "procedure {name} declares error {} twice",
                declared.code
            )));
        }
        if let Some(status) = declared.status {
            if !(100..=599).contains(&status) {
                return Err(RpcError::invalid_argument(format!(
                    "procedure {name} error {} has invalid status {status}",
                    declared.code
                )));
            }
        }
    }
    Ok(())
}

fn schema_definition_error(name: &str, which: &str, err: SchemaError) -> RpcError {
    RpcError::invalid_argument(format!("procedure {name} has an invalid {which} schema: {err}"))
        .with_source(err)
}

fn input_violation(name: &str, err: SchemaError) -> RpcError {
    let context = match &err {
        SchemaError::ValidationFailed { violations } => json!({
            "violations": violations
                .iter()
                .map(|v| json!({ "path": v.path, "message": v.message }))
                .collect::<Vec<_>>()
        }),
        _ => Value::Null,
    };
    RpcError::validation(format!("{name} input rejected: {err}"))
        .with_context(context)
        .with_source(err)
}
