use std::sync::Arc;

use rpcprims::procedure::{Handler, HandlerFailure, HandlerResult, RequestContext};
use rpcprims::spec::{
    operation_ids, DescriptorSource, HandlerBindings, OpenApiSpecification, SourceLimits,
    SpecSnapshot, SpecificationConfig,
};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::RoutesArgs;
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct RouteOutput {
    method: String,
    path: String,
    procedure: String,
    external: bool,
    input_type: String,
    output_type: String,
    errors: Vec<String>,
}

#[derive(Serialize)]
struct RoutesOutput {
    name: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    endpoints: Vec<String>,
    routes: Vec<RouteOutput>,
}

pub async fn run(args: RoutesArgs, format: OutputFormat) -> CliResult<i32> {
    let source = DescriptorSource::from_reference(&args.descriptor);
    let document = source
        .load(SourceLimits::default())
        .await
        .map_err(|err| rpc_error("failed to load descriptor", err))?;

    let mut config = SpecificationConfig::new(&args.name);
    config.endpoints = args.endpoints.clone();
    let snapshot = OpenApiSpecification::new(config)
        .build_snapshot(&document, &placeholder_bindings(&document))
        .map_err(|err| rpc_error("failed to parse descriptor", err))?;

    let out = describe(&snapshot, args.all);
    print_routes(&out, format);
    Ok(SUCCESS)
}

/// Every operation bound to a handler that refuses to run. Listing never invokes them.
fn placeholder_bindings(document: &Value) -> HandlerBindings {
    let refuse: Arc<dyn Handler> = Arc::new(|_input: Value, ctx: RequestContext| async move {
        HandlerResult::Err(HandlerFailure::raise(
            "not_served",
            format!("{} is not served by the routes listing", ctx.procedure),
        ))
    });
    let mut bindings = HandlerBindings::new();
    for id in operation_ids(document) {
        let _ = bindings.bind_shared(id, refuse.clone());
    }
    bindings
}

fn describe(snapshot: &SpecSnapshot, include_internal: bool) -> RoutesOutput {
    let routes = snapshot
        .routes()
        .entries()
        .iter()
        .filter_map(|entry| {
            let procedure = snapshot.procedure(&entry.procedure)?;
            if !include_internal && !procedure.is_external() {
                return None;
            }
            Some(RouteOutput {
                method: entry.key.method.to_string(),
                path: entry.key.template.to_string(),
                procedure: entry.procedure.clone(),
                external: procedure.is_external(),
                input_type: procedure.input_type().to_string(),
                output_type: procedure.output_type().to_string(),
                errors: procedure
                    .errors()
                    .iter()
                    .map(|declared| match declared.status {
                        Some(status) => format!("{} ({status})", declared.code),
                        None => declared.code.clone(),
                    })
                    .collect(),
            })
        })
        .collect();

    let metadata = snapshot.metadata();
    RoutesOutput {
        name: metadata.name.clone(),
        title: metadata.title.clone(),
        version: metadata.version.clone(),
        endpoints: metadata.endpoints.clone(),
        routes,
    }
}

fn print_routes(out: &RoutesOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let rows = out
                .routes
                .iter()
                .map(|route| {
                    vec![
                        route.method.clone(),
                        route.path.clone(),
                        route.procedure.clone(),
                        route.input_type.clone(),
                        route.output_type.clone(),
                        route.errors.join(", "),
                    ]
                })
                .collect();
            print_table(
                &["METHOD", "PATH", "PROCEDURE", "INPUT", "OUTPUT", "ERRORS"],
                rows,
            );
        }
        OutputFormat::Pretty => {
            let title = if out.title.is_empty() { &out.name } else { &out.title };
            match &out.version {
                Some(version) => println!("{title} {version}"),
                None => println!("{title}"),
            }
            println!("  Endpoints: {}", out.endpoints.join(", "));
            for route in &out.routes {
                let mut line = format!(
                    "  {:<7} {:<32} -> {}",
                    route.method, route.path, route.procedure
                );
                if !route.external {
                    line.push_str(" [internal]");
                }
                println!("{line}");
            }
        }
        OutputFormat::Raw => {
            for route in &out.routes {
                println!("{} {}", route.method, route.path);
            }
        }
    }
}
