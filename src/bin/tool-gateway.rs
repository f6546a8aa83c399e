// ABOUTME: Gateway server binary: loads configuration, installs logging and serves HTTP
// ABOUTME: Command-line flags override the corresponding environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Tool Gateway Server Binary
//!
//! Connects to the MCP tool server and serves the gateway API until SIGINT or
//! SIGTERM. Start-up failures exit non-zero.

use anyhow::{Context, Result};
use clap::Parser;
use tool_gateway::config::ServerConfig;
use tool_gateway::logging::{LogFormat, LoggingConfig};
use tool_gateway::server::Server;
use tool_gateway::telemetry::Telemetry;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tool-gateway")]
#[command(about = "Tool-brokering API gateway between chat clients, LLM providers and an MCP server")]
pub struct Args {
    /// Override `API_SERVER_PORT`
    #[arg(long)]
    port: Option<u16>,

    /// Override `MCP_SERVER_URL`
    #[arg(long)]
    mcp_server_url: Option<String>,

    /// Override `LOG_FORMAT` (json, pretty, compact)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env().context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(url) = args.mcp_server_url {
        config.mcp.server_url = url;
    }

    let telemetry = Telemetry::init(&config.tracing).context("Failed to initialize tracing")?;
    let mut logging = LoggingConfig::from_env().with_service(&config.tracing, config.service_name());
    if let Some(format) = args.log_format.as_deref() {
        logging.format = LogFormat::parse(format);
    }
    logging.init(&telemetry).context("Failed to initialize logging")?;

    info!(
        port = config.http.port,
        mcp_server_url = %config.mcp.server_url,
        "Starting tool gateway"
    );

    let result = match Server::from_config(&config).await {
        Ok(server) => server.run().await,
        Err(e) => Err(e),
    };
    telemetry.shutdown();

    if let Err(e) = &result {
        error!(error = %e, "Gateway stopped with an error");
    }
    result.context("Gateway server failed")
}
