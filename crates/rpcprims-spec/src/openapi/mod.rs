//! OpenAPI 3.x / Swagger 2.0 reference specification plugin.
//!
//! Every operation must carry an `operationId`; it names the procedure and
//! selects the handler from the caller's [`HandlerBindings`]. Non-2xx
//! responses with an `x-error-code` declare procedure errors, and
//! `x-internal: true` keeps an operation away from inbound routing.

mod operation;
mod refs;

use async_trait::async_trait;
use rpcprims_schema::ValidatorConfig;
use rpcprims_types::{Method, Result, RpcError};
use serde_json::Value;
use tracing::{debug, info};

use crate::bindings::HandlerBindings;
use crate::snapshot::{SnapshotBuilder, SpecSnapshot};
use crate::source::{DescriptorSource, SourceLimits};
use crate::specification::{SpecMetadata, Specification, SpecificationConfig};

pub use refs::MAX_REF_DEPTH;

use operation::DocumentContext;
use refs::RefResolver;

pub const OPENAPI_KIND: &str = "openapi";
pub const SWAGGER_KIND: &str = "swagger";

/// Path item keys that hold operations, with their verbs.
const OPERATION_KEYS: [(&str, Method); 7] = [
    ("get", Method::Get),
    ("put", Method::Put),
    ("post", Method::Post),
    ("delete", Method::Delete),
    ("patch", Method::Patch),
    ("head", Method::Head),
    ("options", Method::Options),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Swagger2,
    OpenApi3,
}

impl Dialect {
    fn detect(document: &Value) -> Result<Self> {
        if let Some(version) = document.get("openapi").and_then(Value::as_str) {
            if version.starts_with("3.") {
                return Ok(Self::OpenApi3);
            }
            return Err(RpcError::bad_specification(format!(
                "unsupported openapi version {version}"
            )));
        }
        match document.get("swagger").and_then(Value::as_str) {
            Some("2.0") => Ok(Self::Swagger2),
            Some(other) => Err(RpcError::bad_specification(format!(
                "unsupported swagger version {other}"
            ))),
            None => Err(RpcError::bad_specification(
                "descriptor declares neither `openapi` nor `swagger`",
            )),
        }
    }
}

/// Descriptor-driven specification for OpenAPI 3.x and Swagger 2.0 documents.
#[derive(Debug, Clone)]
pub struct OpenApiSpecification {
    kind: String,
    config: SpecificationConfig,
    limits: SourceLimits,
    validation: ValidatorConfig,
}

impl OpenApiSpecification {
    pub fn new(config: SpecificationConfig) -> Self {
        Self {
            kind: OPENAPI_KIND.to_string(),
            config,
            limits: SourceLimits::default(),
            validation: ValidatorConfig::default(),
        }
    }

    /// Report a different plugin kind (the plugin also serves `"swagger"`).
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_limits(mut self, limits: SourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validator settings applied to every procedure this plugin builds.
    pub fn with_validation(mut self, validation: ValidatorConfig) -> Self {
        self.validation = validation;
        self
    }

    /// Build a snapshot from an already-decoded descriptor document.
    pub fn build_snapshot(
        &self,
        document: &Value,
        bindings: &HandlerBindings,
    ) -> Result<SpecSnapshot> {
        let dialect = Dialect::detect(document)?;
        let paths = document
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| RpcError::bad_specification("descriptor has no `paths` object"))?;

        let mut metadata = SpecMetadata::from_config(&self.config);
        metadata.fill_title(info_field(document, "title"));
        metadata.fill_description(info_field(document, "description"));
        metadata.fill_endpoints(descriptor_endpoints(dialect, document));
        metadata.version = info_field(document, "version").map(str::to_string);

        let refs = RefResolver::new(document);
        let doc = DocumentContext {
            dialect,
            refs,
            consumes: string_list(document.get("consumes")),
            produces: string_list(document.get("produces")),
            validation: self.validation,
        };

        let mut builder = SnapshotBuilder::new(metadata);
        for (path, item) in paths {
            let item = refs.follow(item)?;
            let Some(item) = item.as_object() else {
                return Err(RpcError::bad_specification(format!(
                    "path item {path} is not an object"
                )));
            };
            let path_parameters = item
                .get("parameters")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for (key, method) in OPERATION_KEYS {
                let Some(operation) = item.get(key) else {
                    continue;
                };
                let descriptor =
                    operation::translate(&doc, method, path, path_parameters, operation)?;
                debug!(
                    spec = %self.config.name,
                    route = %descriptor.route,
                    operation = %descriptor.operation_id,
                    "operation parsed"
                );
                builder.add_operation(descriptor, bindings)?;
            }
        }

        builder.build()
    }
}

#[async_trait]
impl Specification for OpenApiSpecification {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn config(&self) -> &SpecificationConfig {
        &self.config
    }

    async fn parse(
        &self,
        source: &DescriptorSource,
        bindings: &HandlerBindings,
    ) -> Result<SpecSnapshot> {
        let document = source.load(self.limits).await?;
        let snapshot = self.build_snapshot(&document, bindings)?;
        info!(
            spec = %self.config.name,
            kind = %self.kind,
            %source,
            procedures = snapshot.procedure_names().len(),
            "specification parsed"
        );
        Ok(snapshot)
    }
}

/// Every `operationId` the descriptor declares, sorted and deduplicated.
///
/// Lets tooling bind placeholder handlers before a full parse.
pub fn operation_ids(document: &Value) -> Vec<String> {
    let refs = RefResolver::new(document);
    let mut ids: Vec<String> = document
        .get("paths")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|paths| paths.values())
        .filter_map(|item| refs.follow(item).ok())
        .flat_map(|item| {
            OPERATION_KEYS
                .iter()
                .filter_map(move |(key, _)| item.get(*key))
        })
        .filter_map(|operation| operation.get("operationId").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn info_field<'d>(document: &'d Value, field: &str) -> Option<&'d str> {
    document
        .get("info")
        .and_then(|info| info.get(field))
        .and_then(Value::as_str)
}

fn descriptor_endpoints(dialect: Dialect, document: &Value) -> Vec<String> {
    match dialect {
        Dialect::OpenApi3 => document
            .get("servers")
            .and_then(Value::as_array)
            .map(|servers| servers.iter().filter_map(server_url).collect())
            .unwrap_or_default(),
        Dialect::Swagger2 => {
            let Some(host) = document.get("host").and_then(Value::as_str) else {
                return Vec::new();
            };
            let base_path = document
                .get("basePath")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim_end_matches('/');
            let mut schemes = string_list(document.get("schemes"));
            if schemes.is_empty() {
                schemes.push("http".to_string());
            }
            schemes
                .iter()
                .map(|scheme| format!("{scheme}://{host}{base_path}"))
                .collect()
        }
    }
}

/// `servers[].url` with `{variables}` replaced by their defaults.
fn server_url(server: &Value) -> Option<String> {
    let mut url = server.get("url").and_then(Value::as_str)?.to_string();
    if let Some(variables) = server.get("variables").and_then(Value::as_object) {
        for (name, variable) in variables {
            if let Some(default) = variable.get("default").and_then(Value::as_str) {
                url = url.replace(&format!("{{{name}}}"), default);
            }
        }
    }
    Some(url.trim_end_matches('/').to_string())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use rpcprims_procedure::{
        HandlerFailure, HandlerResult, ProcedureInput, RequestContext, APPLICATION_JSON,
        TEXT_PLAIN,
    };
    use rpcprims_types::ErrorKind;
    use serde_json::json;

    use super::*;

    async fn pong(_input: Value, _ctx: RequestContext) -> HandlerResult {
        Ok(json!({ "pong": true }))
    }

    async fn echo(input: Value, _ctx: RequestContext) -> HandlerResult {
        Ok(input)
    }

    async fn missing(_input: Value, _ctx: RequestContext) -> HandlerResult {
        Err(HandlerFailure::raise("widget_missing", "no such widget"))
    }

    fn plugin() -> OpenApiSpecification {
        OpenApiSpecification::new(SpecificationConfig::new("widgets"))
    }

    fn ping_document() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": { "title": "Ping", "version": "1.2.0" },
            "servers": [{ "url": "http://localhost:{port}/", "variables": { "port": { "default": "8080" } } }],
            "paths": {
                "/ping": {
                    "get": {
                        "operationId": "ping",
                        "responses": {
                            "200": {
                                "description": "pong",
                                "content": { "application/json": { "schema": {
                                    "type": "object",
                                    "properties": { "pong": { "type": "boolean" } },
                                    "required": ["pong"]
                                }}}
                            }
                        }
                    }
                }
            }
        })
    }

    fn ctx() -> RequestContext {
        RequestContext::new("test-1", "test")
    }

    #[tokio::test]
    async fn single_ping_operation_yields_one_route() {
        let bindings = HandlerBindings::new().with("ping", pong);
        let source = DescriptorSource::inline(ping_document().to_string());
        let snapshot = plugin().parse(&source, &bindings).await.expect("parse should succeed");

        assert_eq!(snapshot.routes().len(), 1);
        assert_eq!(snapshot.routes().entries()[0].key.to_string(), "GET /ping");
        assert_eq!(snapshot.metadata().title, "Ping");
        assert_eq!(snapshot.metadata().version.as_deref(), Some("1.2.0"));
        assert_eq!(snapshot.endpoints(), &["http://localhost:8080".to_string()]);

        let (_, procedure) = snapshot.resolve(Method::Get, "/ping")
            .expect("resolve should succeed");
        assert!(procedure.is_external());
        let output = procedure
            .execute(ProcedureInput::default(), ctx())
            .await
            .expect("execute should succeed");
        assert_eq!(output.value, json!({ "pong": true }));
    }

    #[test]
    fn parsing_is_deterministic() {
        let bindings = HandlerBindings::new().with("ping", pong);
        let keys = |snapshot: SpecSnapshot| -> Vec<String> {
            snapshot
                .routes()
                .entries()
                .iter()
                .map(|entry| entry.key.to_string())
                .collect()
        };
        let first = plugin().build_snapshot(&ping_document(), &bindings)
            .expect("build snapshot should succeed");
        let second = plugin().build_snapshot(&ping_document(), &bindings)
            .expect("build snapshot should succeed");
        assert_eq!(keys(first), keys(second));
    }

    #[test]
    fn unbound_operation_is_unresolved_handler() {
        let err = plugin()
            .build_snapshot(&ping_document(), &HandlerBindings::new())
            .expect_err("build snapshot should fail");
        assert_eq!(err.kind(), ErrorKind::UnresolvedHandler);
    }

    #[tokio::test]
    async fn missing_path_is_bad_specification() {
        let err = plugin()
            .parse(&DescriptorSource::path(""), &HandlerBindings::new())
            .await
            .expect_err("parse should fail");
        assert_eq!(err.kind(), ErrorKind::BadSpecification);
    }

    #[test]
    fn malformed_documents_are_bad_specification() {
        let bindings = HandlerBindings::new().with("ping", pong);
        for document in [
            json!({ "paths": {} }),
            json!({ "openapi": "4.0.0", "paths": {} }),
            json!({ "openapi": "3.0.0" }),
            json!({ "openapi": "3.0.0", "servers": [{ "url": "http://x" }],
                    "paths": { "/ping": { "get": { "responses": {} } } } }),
            json!({ "openapi": "3.0.0", "servers": [{ "url": "http://x" }],
                    "paths": { "/p{id}": { "get": { "operationId": "ping" } } } }),
        ] {
            let err = plugin().build_snapshot(&document, &bindings)
                .expect_err("build snapshot should fail");
            assert_eq!(err.kind(), ErrorKind::BadSpecification, "{document}");
        }
    }

    #[test]
    fn operation_ids_are_collected_without_bindings() {
        let document = json!({
            "openapi": "3.0.0",
            "paths": {
                "/b": { "get": { "operationId": "b" }, "post": { "operationId": "a" } },
                "/a": { "get": { "operationId": "b" }, "summary": "no id here" }
            }
        });
        assert_eq!(operation_ids(&document), vec!["a", "b"]);
        assert!(operation_ids(&json!({})).is_empty());
    }

    #[test]
    fn duplicate_operation_ids_conflict() {
        let bindings = HandlerBindings::new().with("ping", pong);
        let document = json!({
            "openapi": "3.0.0",
            "servers": [{ "url": "http://x" }],
            "paths": {
                "/a": { "get": { "operationId": "ping" } },
                "/b": { "get": { "operationId": "ping" } }
            }
        });
        let err = plugin().build_snapshot(&document, &bindings)
            .expect_err("build snapshot should fail");
        assert_eq!(err.kind(), ErrorKind::ProcedureConflict);
    }

    #[test]
    fn no_endpoints_anywhere_is_bad_specification() {
        let bindings = HandlerBindings::new().with("ping", pong);
        let mut document = ping_document();
        document.as_object_mut().expect("as object mut should be present").remove("servers");
        let err = plugin().build_snapshot(&document, &bindings)
            .expect_err("build snapshot should fail");
        assert_eq!(err.kind(), ErrorKind::BadSpecification);

        let configured = OpenApiSpecification::new(
            SpecificationConfig::new("widgets").endpoint("http://127.0.0.1:9000"),
        );
        assert!(configured.build_snapshot(&document, &bindings).is_ok());
    }

    #[tokio::test]
    async fn openapi_parameters_and_refs_shape_the_input_schema() {
        let document = json!({
            "openapi": "3.1.0",
            "servers": [{ "url": "http://x" }],
            "components": {
                "parameters": {
                    "WidgetId": { "name": "id", "in": "path", "required": true,
                                  "schema": { "type": "integer" } }
                },
                "schemas": {
                    "Patch": { "type": "object", "properties": { "color": { "type": "string" } } }
                }
            },
            "paths": {
                "/widgets/{id}": {
                    "parameters": [{ "$ref": "#/components/parameters/WidgetId" }],
                    "put": {
                        "operationId": "update-widget",
                        "parameters": [
                            { "name": "dry_run", "in": "query", "schema": { "type": "boolean" } },
                            { "name": "x-trace", "in": "header", "schema": { "type": "string" } }
                        ],
                        "requestBody": { "content": {
                            "application/json": { "schema": { "$ref": "#/components/schemas/Patch" } }
                        }},
                        "responses": {
                            "200": { "description": "ok" },
                            "404": { "description": "missing", "x-error-code": "widget_missing" }
                        }
                    }
                }
            }
        });
        let bindings = HandlerBindings::new().with("update-widget", echo);
        let snapshot = plugin().build_snapshot(&document, &bindings)
            .expect("build snapshot should succeed");
        let procedure = snapshot.procedure("update-widget").expect("procedure should be present");

        assert_eq!(procedure.input()["properties"]["id"]["type"], "integer");
        assert_eq!(procedure.input()["properties"]["dry_run"]["type"], "boolean");
        assert!(procedure.input()["properties"].get("x-trace").is_none());
        assert_eq!(procedure.input()["required"], json!(["id"]));
        let declared = procedure.declared_error("widget_missing")
            .expect("declared error should be present");
        assert_eq!(declared.status, Some(404));

        let input = ProcedureInput {
            path_params: vec![("id".to_string(), "12".to_string())],
            query: vec![("dry_run".to_string(), "true".to_string())],
            ..ProcedureInput::json(&json!({ "color": "red" }))
        };
        let output = procedure.execute(input, ctx()).await.expect("execute should succeed");
        assert_eq!(output.value, json!({ "id": 12, "dry_run": true, "color": "red" }));
    }

    #[tokio::test]
    async fn declared_error_code_reaches_the_caller() {
        let document = json!({
            "openapi": "3.0.0",
            "servers": [{ "url": "http://x" }],
            "paths": { "/widgets/{id}": { "get": {
                "operationId": "get-widget",
                "responses": {
                    "200": { "description": "ok" },
                    "404": { "description": "missing", "x-error-code": "widget_missing" }
                }
            }}}
        });
        let bindings = HandlerBindings::new().with("get-widget", missing);
        let snapshot = plugin().build_snapshot(&document, &bindings)
            .expect("build snapshot should succeed");
        let (matched, procedure) = snapshot.resolve(Method::Get, "/widgets/3")
            .expect("resolve should succeed");

        let input = ProcedureInput {
            path_params: matched.params,
            ..ProcedureInput::default()
        };
        let err = procedure.execute(input, ctx()).await.expect_err("execute should fail");
        assert_eq!(err.kind(), ErrorKind::HandlerError);
        assert_eq!(err.code(), Some("widget_missing"));
    }

    #[test]
    fn declared_errors_must_use_error_statuses() {
        let bindings = HandlerBindings::new().with("get-widget", missing);
        let with_response = |status: &str| {
            json!({
                "openapi": "3.0.0",
                "servers": [{ "url": "http://x" }],
                "paths": { "/widgets/{id}": { "get": {
                    "operationId": "get-widget",
                    "responses": {
                        "200": { "description": "ok" },
                        status: { "description": "declared", "x-error-code": "widget_missing" }
                    }
                }}}
            })
        };

        for status in ["304", "101", "3XX", "600", "teapot"] {
            let err = plugin()
                .build_snapshot(&with_response(status), &bindings)
                .expect_err("non-error status cannot declare an error");
            assert_eq!(err.kind(), ErrorKind::BadSpecification, "{status}");
        }

        for (status, hint) in [("409", Some(409)), ("5XX", None), ("default", None)] {
            let snapshot = plugin()
                .build_snapshot(&with_response(status), &bindings)
                .expect("error status declares an error");
            let procedure = snapshot.procedure("get-widget").expect("procedure");
            let declared = procedure
                .declared_error("widget_missing")
                .expect("declared error");
            assert_eq!(declared.status, hint, "{status}");
        }
    }

    #[test]
    fn swagger_two_documents_are_supported() {
        let document = json!({
            "swagger": "2.0",
            "info": { "title": "Widgets", "description": "Widget store" },
            "host": "api.example.com",
            "basePath": "/v1/",
            "schemes": ["https"],
            "consumes": ["application/json"],
            "produces": ["text/plain"],
            "definitions": {
                "Widget": { "type": "object", "properties": { "name": { "type": "string" } },
                            "required": ["name"] }
            },
            "paths": {
                "/widgets": {
                    "post": {
                        "operationId": "create-widget",
                        "parameters": [
                            { "name": "body", "in": "body", "schema": { "$ref": "#/definitions/Widget" } },
                            { "name": "limit", "in": "query", "type": "integer", "minimum": 1 }
                        ],
                        "responses": { "201": { "description": "created" } }
                    },
                    "get": {
                        "operationId": "list-widgets",
                        "x-internal": true,
                        "produces": ["application/json"],
                        "responses": { "200": { "description": "ok", "schema": { "type": "array" } } }
                    }
                }
            }
        });
        let bindings = HandlerBindings::new()
            .with("create-widget", echo)
            .with("list-widgets", echo);
        let plugin = OpenApiSpecification::new(SpecificationConfig::new("widgets"))
            .with_kind(SWAGGER_KIND);
        let snapshot = plugin.build_snapshot(&document, &bindings)
            .expect("build snapshot should succeed");

        assert_eq!(plugin.kind(), SWAGGER_KIND);
        assert_eq!(snapshot.endpoints(), &["https://api.example.com/v1".to_string()]);
        assert_eq!(snapshot.metadata().description, "Widget store");

        let create = snapshot.procedure("create-widget").expect("procedure should be present");
        assert_eq!(create.input_type().essence(), APPLICATION_JSON);
        assert_eq!(create.output_type().essence(), TEXT_PLAIN);
        assert_eq!(create.input()["required"], json!(["name"]));
        assert_eq!(create.input()["properties"]["limit"]["minimum"], 1);
        assert!(create.is_external());

        let list = snapshot.procedure("list-widgets").expect("procedure should be present");
        assert!(!list.is_external());
        assert_eq!(list.output_type().essence(), APPLICATION_JSON);
        assert_eq!(list.output()["type"], "array");
    }
}
