use rpcprims_procedure::{DeclaredError, MediaType, ProcedureDefinition, APPLICATION_JSON};
use rpcprims_schema::ValidatorConfig;
use rpcprims_types::{Method, PathTemplate, Result, RouteKey, RpcError};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::refs::RefResolver;
use super::Dialect;
use crate::snapshot::OperationDescriptor;

/// Keywords copied from a Swagger 2 non-body parameter into its schema.
const SWAGGER_PARAM_KEYWORDS: &[&str] = &[
    "type",
    "format",
    "items",
    "enum",
    "default",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "minLength",
    "maxLength",
    "pattern",
];

/// Operation-independent inputs shared by every operation in a document.
pub(crate) struct DocumentContext<'a> {
    pub dialect: Dialect,
    pub refs: RefResolver<'a>,
    /// Swagger 2 root `consumes`.
    pub consumes: Vec<String>,
    /// Swagger 2 root `produces`.
    pub produces: Vec<String>,
    pub validation: ValidatorConfig,
}

struct Parameter {
    name: String,
    location: String,
    required: bool,
    schema: Value,
}

/// Translate one `paths.<path>.<verb>` object into an operation descriptor.
pub(crate) fn translate(
    doc: &DocumentContext<'_>,
    method: Method,
    path: &str,
    path_parameters: &[Value],
    operation: &Value,
) -> Result<OperationDescriptor> {
    let template = PathTemplate::parse(path)?;
    let route = RouteKey::new(method, template);

    let operation_id = operation
        .get("operationId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            RpcError::bad_specification(format!("operation {route} has no operationId"))
        })?
        .to_string();

    let fail = |err: RpcError| {
        let message = format!("operation {operation_id} ({route}): {}", err.message());
        RpcError::bad_specification(message).with_source(err)
    };

    let parameters = collect_parameters(doc, path_parameters, operation).map_err(fail)?;
    for param in route.template.params() {
        if !parameters
            .iter()
            .any(|p| p.location == "path" && p.name == param)
        {
            debug!(operation = %operation_id, %param, "undeclared path parameter");
        }
    }

    let (input_type, body_schema) = request_body(doc, &parameters, operation).map_err(fail)?;
    let input = input_schema(&route, body_schema, &parameters);
    let (output_type, output) = success_response(doc, operation).map_err(fail)?;
    let errors = declared_errors(doc, operation).map_err(fail)?;

    let description = operation
        .get("summary")
        .or_else(|| operation.get("description"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let internal = operation
        .get("x-internal")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut definition = ProcedureDefinition::default()
        .description(description)
        .input(input)
        .output(output)
        .external(!internal)
        .validation(doc.validation);
    if let Some(input_type) = input_type {
        definition = definition.input_type(input_type);
    }
    if let Some(output_type) = output_type {
        definition = definition.output_type(output_type);
    }
    definition.errors = errors;

    Ok(OperationDescriptor {
        route,
        operation_id,
        definition,
    })
}

/// Path-level parameters overridden by operation-level ones of the same name and location.
fn collect_parameters(
    doc: &DocumentContext<'_>,
    path_parameters: &[Value],
    operation: &Value,
) -> Result<Vec<Parameter>> {
    let operation_parameters = operation
        .get("parameters")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut parameters: Vec<Parameter> = Vec::new();
    for raw in path_parameters.iter().chain(operation_parameters) {
        let raw = doc.refs.follow(raw)?;
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::bad_specification("parameter without a name"))?;
        let location = raw
            .get("in")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RpcError::bad_specification(format!("parameter {name} has no `in`"))
            })?;
        let required = location == "path"
            || raw.get("required").and_then(Value::as_bool).unwrap_or(false);

        let schema = match (doc.dialect, location) {
            (Dialect::Swagger2, "body") => {
                doc.refs.inline(raw.get("schema").unwrap_or(&Value::Null))?
            }
            (Dialect::Swagger2, _) => {
                let mut schema = Map::new();
                for keyword in SWAGGER_PARAM_KEYWORDS {
                    if let Some(value) = raw.get(*keyword) {
                        schema.insert((*keyword).to_string(), doc.refs.inline(value)?);
                    }
                }
                Value::Object(schema)
            }
            (Dialect::OpenApi3, _) => match raw.get("schema") {
                Some(schema) => doc.refs.inline(schema)?,
                None => json!({}),
            },
        };

        let param = Parameter {
            name: name.to_string(),
            location: location.to_string(),
            required,
            schema,
        };
        match parameters
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            Some(existing) => *existing = param,
            None => parameters.push(param),
        }
    }
    Ok(parameters)
}

fn request_body(
    doc: &DocumentContext<'_>,
    parameters: &[Parameter],
    operation: &Value,
) -> Result<(Option<String>, Option<Value>)> {
    match doc.dialect {
        Dialect::Swagger2 => {
            let body = parameters.iter().find(|p| p.location == "body");
            let consumes =
                media_list(operation.get("consumes")).unwrap_or_else(|| doc.consumes.clone());
            let input_type = body.and_then(|_| pick_media_type(&consumes));
            Ok((input_type, body.map(|p| p.schema.clone())))
        }
        Dialect::OpenApi3 => {
            let Some(body) = operation.get("requestBody") else {
                return Ok((None, None));
            };
            let body = doc.refs.follow(body)?;
            match pick_content(body.get("content"))? {
                Some((media_type, schema)) => {
                    Ok((Some(media_type), Some(doc.refs.inline(&schema)?)))
                }
                None => Ok((None, None)),
            }
        }
    }
}

/// Fold path and query parameters into the body schema as object properties.
fn input_schema(route: &RouteKey, body: Option<Value>, parameters: &[Parameter]) -> Value {
    let merged: Vec<&Parameter> = parameters
        .iter()
        .filter(|p| matches!(p.location.as_str(), "path" | "query"))
        .collect();
    if merged.is_empty() {
        return body.unwrap_or(Value::Null);
    }

    let mut schema = match body {
        None | Some(Value::Null) => json!({ "type": "object" }),
        Some(Value::Object(map)) if accepts_object(&map) => Value::Object(map),
        Some(other) => {
            debug!(%route, "body schema is not an object, parameters left unchecked");
            return other;
        }
    };

    if let Some(map) = schema.as_object_mut() {
        let properties = map
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(properties) = properties.as_object_mut() {
            for param in &merged {
                properties.insert(param.name.clone(), param.schema.clone());
            }
        }

        let required_params: Vec<Value> = merged
            .iter()
            .filter(|p| p.required)
            .map(|p| Value::String(p.name.clone()))
            .collect();
        if !required_params.is_empty() {
            let required = map
                .entry("required")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(required) = required.as_array_mut() {
                for name in required_params {
                    if !required.contains(&name) {
                        required.push(name);
                    }
                }
            }
        }
    }
    schema
}

fn accepts_object(schema: &Map<String, Value>) -> bool {
    match schema.get("type") {
        None => true,
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k == "object"),
        Some(_) => false,
    }
}

fn success_response(
    doc: &DocumentContext<'_>,
    operation: &Value,
) -> Result<(Option<String>, Value)> {
    let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
        return Ok((None, Value::Null));
    };
    let Some(response) = responses
        .iter()
        .filter(|(status, _)| is_success_status(status))
        .min_by_key(|(status, _)| *status)
        .map(|(_, response)| response)
    else {
        return Ok((None, Value::Null));
    };
    let response = doc.refs.follow(response)?;

    match doc.dialect {
        Dialect::Swagger2 => {
            let produces =
                media_list(operation.get("produces")).unwrap_or_else(|| doc.produces.clone());
            let schema = match response.get("schema") {
                Some(schema) => doc.refs.inline(schema)?,
                None => Value::Null,
            };
            Ok((pick_media_type(&produces), schema))
        }
        Dialect::OpenApi3 => match pick_content(response.get("content"))? {
            Some((media_type, schema)) => Ok((Some(media_type), doc.refs.inline(&schema)?)),
            None => Ok((None, Value::Null)),
        },
    }
}

fn declared_errors(doc: &DocumentContext<'_>, operation: &Value) -> Result<Vec<DeclaredError>> {
    let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut errors: Vec<DeclaredError> = Vec::new();
    for (status, response) in responses {
        if is_success_status(status) {
            continue;
        }
        let response = doc.refs.follow(response)?;
        let Some(code) = response.get("x-error-code").and_then(Value::as_str) else {
            continue;
        };
        if errors.iter().any(|declared| declared.code == code) {
            return Err(RpcError::bad_specification(format!(
                "x-error-code {code} is declared on more than one response"
            )));
        }
        let mut declared = DeclaredError::new(code).with_description(
            response
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        );
        if let Some(status) = error_status(status, code)? {
            declared = declared.with_status(status);
        }
        errors.push(declared);
    }
    Ok(errors)
}

/// Status a declared error answers with. `default` and `4XX`/`5XX` ranges
/// carry none; anything outside 400-599 cannot declare an error.
fn error_status(key: &str, code: &str) -> Result<Option<u16>> {
    let not_an_error = || {
        RpcError::bad_specification(format!(
            "x-error-code {code} is declared on response {key:?}, which is not a 4xx or 5xx status"
        ))
    };
    if key == "default" {
        return Ok(None);
    }
    if key.len() == 3 && key[1..].eq_ignore_ascii_case("xx") {
        return match &key[..1] {
            "4" | "5" => Ok(None),
            _ => Err(not_an_error()),
        };
    }
    match key.parse::<u16>() {
        Ok(status) if (400..=599).contains(&status) => Ok(Some(status)),
        _ => Err(not_an_error()),
    }
}

fn is_success_status(status: &str) -> bool {
    status.len() == 3 && status.starts_with('2')
}

/// First content entry with a supported media type, JSON preferred.
fn pick_content(content: Option<&Value>) -> Result<Option<(String, Value)>> {
    let Some(content) = content.and_then(Value::as_object) else {
        return Ok(None);
    };
    if content.is_empty() {
        return Ok(None);
    }

    let supported: Vec<(&String, &Value)> = content
        .iter()
        .filter(|(media_type, _)| MediaType::parse(media_type).is_ok())
        .collect();
    let chosen = supported
        .iter()
        .find(|(media_type, _)| media_type.as_str() == APPLICATION_JSON)
        .or_else(|| supported.first());

    match chosen {
        Some((media_type, entry)) => Ok(Some((
            (*media_type).clone(),
            entry.get("schema").cloned().unwrap_or(Value::Null),
        ))),
        None => Err(RpcError::bad_specification(format!(
            "no supported media type among {}",
            content.keys().cloned().collect::<Vec<_>>().join(", ")
        ))),
    }
}

fn media_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

fn pick_media_type(candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .find(|media_type| media_type.as_str() == APPLICATION_JSON)
        .or_else(|| {
            candidates
                .iter()
                .find(|media_type| MediaType::parse(media_type).is_ok())
        })
        .cloned()
}
