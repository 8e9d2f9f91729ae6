use std::fs;
use std::path::Path;
use std::time::Duration;

use rpcprims::transport::{
    HttpTransport, HttpTransportConfig, OutboundRequest, OutboundResponse, RequestOptions,
    StrategyKind, TlsMaterial, Transport,
};
use rpcprims::types::Method;
use serde::Serialize;
use serde_json::Value;

use crate::cmd::CallArgs;
use crate::exit::{io_error, rpc_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{body_preview, print_json, print_raw, print_table, OutputFormat};

#[derive(Serialize)]
struct CallOutput<'a> {
    endpoint: &'a str,
    status: u16,
    content_type: Option<&'a str>,
    body: Value,
}

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let method: Method = args
        .method
        .parse()
        .map_err(|err| rpc_error("invalid method", err))?;
    let timeout = parse_duration(&args.timeout)?;

    let mut config = HttpTransportConfig::new("cli")
        .secure(args.secure)
        .default_timeout(timeout);
    for endpoint in &args.endpoints {
        config = config.endpoint(endpoint.clone());
    }
    if let Some(strategy) = &args.strategy {
        let strategy: StrategyKind = strategy
            .parse()
            .map_err(|err| rpc_error("invalid strategy", err))?;
        config = config.default_strategy(strategy);
    }
    let transport =
        HttpTransport::new(config).map_err(|err| rpc_error("invalid transport", err))?;

    let request = build_request(method, &args)?;
    let options = build_options(&args, timeout)?;
    let response = transport
        .request(request, &options)
        .await
        .map_err(|err| rpc_error("call failed", err))?;

    print_response(&response, format);
    Ok(SUCCESS)
}

fn build_request(method: Method, args: &CallArgs) -> CliResult<OutboundRequest> {
    let mut request = OutboundRequest::new(method, args.path.clone());
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| CliError::new(USAGE, format!("header must be NAME:VALUE: {header}")))?;
        request = request.header(name.trim(), value.trim());
    }

    if let Some(json) = &args.json {
        let value: Value = serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(request.json(&value));
    }
    if let Some(data) = &args.data {
        return Ok(request.body(args.content_type.clone(), data.clone()));
    }
    if let Some(path) = &args.file {
        return Ok(request.body(args.content_type.clone(), read_file(path)?));
    }
    Ok(request)
}

fn build_options(args: &CallArgs, timeout: Duration) -> CliResult<RequestOptions> {
    let mut options = RequestOptions::default().timeout(timeout);
    if let Some(auth) = &args.auth {
        options = options.auth(auth.clone());
    }

    let mut tls = TlsMaterial::new();
    let mut has_tls = false;
    for ca in &args.ca {
        tls = tls.ca(read_file(ca)?);
        has_tls = true;
    }
    if let (Some(cert), Some(key)) = (&args.cert, &args.key) {
        tls = tls.identity_pem(read_file(cert)?, read_file(key)?);
        has_tls = true;
    }
    if let Some(pfx) = &args.pfx {
        tls = tls.pfx(read_file(pfx)?, String::new());
        has_tls = true;
    }
    if let Some(passphrase) = &args.passphrase {
        tls = tls.passphrase(passphrase.clone());
    }
    if has_tls {
        options = options.tls(tls);
    }
    Ok(options)
}

fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
}

fn print_response(response: &OutboundResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let body = response
                .json()
                .unwrap_or_else(|| Value::String(body_preview(&response.body)));
            print_json(&CallOutput {
                endpoint: &response.endpoint,
                status: response.status,
                content_type: response.content_type.as_deref(),
                body,
            });
        }
        OutputFormat::Table => print_table(
            &["STATUS", "ENDPOINT", "CONTENT-TYPE", "BODY"],
            vec![vec![
                response.status.to_string(),
                response.endpoint.clone(),
                response.content_type.clone().unwrap_or_default(),
                body_preview(&response.body),
            ]],
        ),
        OutputFormat::Pretty => {
            println!(
                "{} {} ({})",
                response.status,
                response.endpoint,
                response.content_type.as_deref().unwrap_or("no content type")
            );
            println!("{}", body_preview(&response.body));
        }
        OutputFormat::Raw => print_raw(&response.body),
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
