//! GA4 Report MCP Server
//!
//! Runs Google Analytics 4 real-time and standard reports and returns them
//! as flat `headers` + `rows` tables, over the Model Context Protocol or
//! directly from the command line.

mod api;
mod auth;
mod config;
mod data_api;
mod debug;
mod error;
mod flatten;
mod query;
mod server;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

use crate::api::{RealtimeReport, Report};
use crate::auth::TokenProvider;
use crate::config::Config;
use crate::data_api::DataApiClient;
use crate::debug::DebugLogger;
use crate::flatten::ReportResult;
use crate::query::QueryDescriptor;
use crate::server::{Ga4ReportServer, ReportClients};

#[derive(Parser, Debug)]
#[command(name = "ga4-report-mcp")]
#[command(author, version, about = "GA4 Report MCP Server", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Enable debug mode (logs all tool calls)
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve report tools over MCP stdio (default)
    Serve,

    /// Run a real-time report and print it
    Realtime {
        /// Comma-separated dimension names
        #[arg(long, value_delimiter = ',')]
        dimensions: Vec<String>,

        /// Comma-separated metric names
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<u32>,

        /// Include property quota usage (JSON output only)
        #[arg(long)]
        quota: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Tsv)]
        format: OutputFormat,
    },

    /// Run a standard report over date ranges and print it
    Report {
        /// Comma-separated dimension names
        #[arg(long, value_delimiter = ',')]
        dimensions: Vec<String>,

        /// Comma-separated metric names
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,

        /// Date range as START:END, e.g. 2023-01-01:2023-01-31 or 7daysAgo:today
        #[arg(long = "date-range", value_parser = parse_date_range, required = true)]
        date_ranges: Vec<(String, String)>,

        /// Row offset for pagination
        #[arg(long)]
        offset: Option<u32>,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<u32>,

        /// Drop rows whose metrics are all zero
        #[arg(long)]
        skip_empty_rows: bool,

        /// Include property quota usage (JSON output only)
        #[arg(long)]
        quota: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Tsv)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Tsv,
    Json,
}

fn parse_date_range(value: &str) -> Result<(String, String), String> {
    match value.split_once(':') {
        Some((start, end)) if !start.is_empty() && !end.is_empty() => {
            Ok((start.to_string(), end.to_string()))
        }
        _ => Err(format!("expected START:END, got '{}'", value)),
    }
}

/// Log to stderr; stdout carries the MCP transport.
fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,ga4_report_mcp={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn print_result(result: &ReportResult, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Tsv => print!("{}", result.to_tsv()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    let debug_enabled = args.debug || config.debug;

    init_tracing(debug_enabled);
    tracing::info!(
        property = %config.property(),
        base_url = %config.api_base_url(),
        static_token = config.uses_static_token(),
        "Configuration loaded"
    );

    let token_provider =
        TokenProvider::new(&config).context("Failed to initialize credentials")?;
    tracing::debug!(?token_provider, "Credentials ready");

    let data_api = DataApiClient::new(&config, token_provider)?;
    let realtime = RealtimeReport::new(config.property_id.clone(), data_api.clone());
    let report = Report::new(config.property_id.clone(), data_api.clone());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let debug = Arc::new(DebugLogger::new(debug_enabled));
            if let Some(path) = debug.trace_path() {
                tracing::info!(path = %path.display(), "Trace file");
            }

            let server = Ga4ReportServer::new(
                ReportClients {
                    realtime,
                    report,
                    data_api,
                },
                debug,
            );

            tracing::info!("Starting MCP server on stdio transport");
            let service = server.serve(stdio()).await?;
            service.waiting().await?;
            tracing::info!("MCP server shutting down");
        }
        Command::Realtime {
            dimensions,
            metrics,
            limit,
            quota,
            format,
        } => {
            let result = match (limit, quota) {
                (None, false) => realtime.query_report(dimensions, metrics).await?,
                _ => {
                    let mut query = QueryDescriptor::new(dimensions, metrics).include_quota(quota);
                    if let Some(limit) = limit {
                        query = query.limit(limit);
                    }
                    realtime.query_report_with(&query).await?
                }
            };
            print_result(&result, format)?;
        }
        Command::Report {
            dimensions,
            metrics,
            date_ranges,
            offset,
            limit,
            skip_empty_rows,
            quota,
            format,
        } => {
            let mut query = date_ranges.into_iter().fold(
                QueryDescriptor::new(dimensions, metrics),
                |q, (start, end)| q.date_range(start, end),
            );
            query = query
                .offset(offset.unwrap_or(0))
                .keep_empty_rows(!skip_empty_rows)
                .include_quota(quota);
            if let Some(limit) = limit {
                query = query.limit(limit);
            }

            let result = report.run_report(&query).await?;
            print_result(&result, format)?;
            if let Some(next) = result.next_offset(query.row_offset()) {
                tracing::info!(next_offset = next, row_count = ?result.row_count, "More rows available");
            }
        }
    }

    Ok(())
}
