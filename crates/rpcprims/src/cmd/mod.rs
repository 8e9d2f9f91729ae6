use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

pub mod call;
pub mod routes;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a descriptor and list the routes it declares.
    Routes(RoutesArgs),
    /// Send one request through the HTTP transport.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Routes(args) => block_on(routes::run(args, format)),
        Command::Call(args) => block_on(call::run(args, format)),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F: std::future::Future<Output = CliResult<i32>>>(future: F) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    runtime.block_on(future)
}

#[derive(Args, Debug)]
pub struct RoutesArgs {
    /// Descriptor file path or http(s) URL.
    pub descriptor: String,
    /// Specification name.
    #[arg(long, default_value = "default")]
    pub name: String,
    /// Endpoint to record when the descriptor declares none (repeatable).
    #[arg(long = "endpoint", value_name = "URL")]
    pub endpoints: Vec<String>,
    /// Include operations marked `x-internal`.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// HTTP method (GET, POST, ...).
    pub method: String,
    /// Request path, optionally with a query string.
    pub path: String,
    /// Endpoint to call (repeatable).
    #[arg(long = "endpoint", value_name = "URL", required = true)]
    pub endpoints: Vec<String>,
    /// Use https for endpoints given without a scheme.
    #[arg(long)]
    pub secure: bool,
    /// Endpoint selection strategy: round-robin or failover.
    #[arg(long)]
    pub strategy: Option<String>,
    /// JSON body.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string body.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read body from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Content type for --data or --file.
    #[arg(long, default_value = "text/plain")]
    pub content_type: String,
    /// Extra header as NAME:VALUE (repeatable).
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE")]
    pub headers: Vec<String>,
    /// Basic auth credentials as user:password.
    #[arg(long, env = "RPCPRIMS_AUTH", hide_env_values = true)]
    pub auth: Option<String>,
    /// Request timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
    /// Trusted CA certificate in PEM (repeatable).
    #[arg(long = "ca", value_name = "FILE")]
    pub ca: Vec<PathBuf>,
    /// Client certificate in PEM.
    #[arg(long, requires = "key", conflicts_with = "pfx")]
    pub cert: Option<PathBuf>,
    /// Client private key in PEM.
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,
    /// Client identity as a PKCS#12 archive.
    #[arg(long)]
    pub pfx: Option<PathBuf>,
    /// Passphrase for an encrypted --key or for --pfx.
    #[arg(long, env = "RPCPRIMS_KEY_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
