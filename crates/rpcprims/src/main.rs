mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel, LOG_FILTER_ENV};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "rpcprims", version, about = "RPC primitives CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Per-crate log directives layered over --log-level.
    #[arg(long, value_name = "DIRECTIVES", env = LOG_FILTER_ENV, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level, cli.log_filter.as_deref());

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_subcommand() {
        let cli = Cli::try_parse_from([
            "rpcprims",
            "call",
            "GET",
            "/ping",
            "--endpoint",
            "localhost:8080",
            "--endpoint",
            "localhost:8081",
            "--strategy",
            "failover",
        ])
        .expect("call args should parse");

        let Command::Call(args) = cli.command else {
            panic!("expected call");
        };
        assert_eq!(args.endpoints.len(), 2);
        assert_eq!(args.strategy.as_deref(), Some("failover"));
    }

    #[test]
    fn rejects_conflicting_body_args() {
        let err = Cli::try_parse_from([
            "rpcprims",
            "call",
            "POST",
            "/widgets",
            "--endpoint",
            "localhost:8080",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn call_requires_an_endpoint() {
        let err = Cli::try_parse_from(["rpcprims", "call", "GET", "/ping"])
            .expect_err("missing endpoint should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_routes_subcommand() {
        let cli = Cli::try_parse_from(["rpcprims", "--format", "json", "routes", "openapi.json"])
            .expect("routes args should parse");
        assert!(matches!(cli.command, Command::Routes(_)));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
