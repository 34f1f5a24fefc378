//! mcpwire demo client.
//!
//! Opens a transport to an MCP server, runs the `initialize` handshake, sends
//! one follow-up request and prints every inbound message as a JSON line on
//! stdout. Logs and server diagnostics go to stderr.
//!
//! ```text
//! mcpwire-demo --command npx -- -y @modelcontextprotocol/server-everything
//! mcpwire-demo --url http://localhost:8080/mcp --method tools/list -vv
//! mcpwire-demo --config server.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use mcpwire::{
    ChannelHandler, InboundEvent, Message, RequestId, ServerConfig, StdioConfig,
    StreamableHttpConfig, Transport, TransportError, build_transport,
};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

const CLIENT_NAME: &str = "mcpwire-demo";
const INITIALIZE_ID: i64 = 1;
const FOLLOW_UP_ID: i64 = 2;

/// Run a short MCP session against a server
#[derive(Parser, Debug)]
#[command(name = "mcpwire-demo", version, about)]
#[command(group(ArgGroup::new("server").required(true).args(["command", "url", "config"])))]
struct Cli {
    /// Spawn this command and talk to it over stdin/stdout
    #[arg(long)]
    command: Option<String>,

    /// Arguments for --command
    #[arg(last = true)]
    args: Vec<String>,

    /// Streamable HTTP endpoint URL
    #[arg(long)]
    url: Option<String>,

    /// JSON server config file ({"type": "stdio" | "http", ...})
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bearer token for HTTP servers
    #[arg(long, env = "MCPWIRE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Method of the request sent after initialization
    #[arg(long, default_value = "tools/list")]
    method: String,

    /// JSON params for the follow-up request
    #[arg(long)]
    params: Option<String>,

    /// Protocol version offered in `initialize`
    #[arg(long, default_value = "2025-06-18")]
    protocol_version: String,

    /// Seconds to wait for each response
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig> {
        if let Some(path) = &self.config {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            return Ok(ServerConfig::from_json(&json)?);
        }
        if let Some(command) = &self.command {
            return Ok(ServerConfig::Stdio(
                StdioConfig::new(command).with_args(self.args.iter().cloned()),
            ));
        }
        if let Some(url) = &self.url {
            let mut config = StreamableHttpConfig::new(url);
            if let Some(token) = &self.token {
                config = config.with_header("Authorization", format!("Bearer {token}"));
            }
            return Ok(ServerConfig::Http(config));
        }
        bail!("one of --command, --url or --config is required")
    }

    fn follow_up_params(&self) -> Result<Value> {
        match &self.params {
            Some(raw) => serde_json::from_str(raw).context("--params is not valid JSON"),
            None => Ok(json!({})),
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(spec) if !spec.is_empty() => EnvFilter::new(spec),
        _ => {
            let level = match verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            };
            EnvFilter::new(level.as_str())
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn object(value: Value) -> Message {
    match value {
        Value::Object(map) => map,
        _ => Message::new(),
    }
}

fn initialize_request(protocol_version: &str) -> Message {
    object(json!({
        "jsonrpc": "2.0",
        "id": INITIALIZE_ID,
        "method": "initialize",
        "params": {
            "protocolVersion": protocol_version,
            "capabilities": {},
            "clientInfo": { "name": CLIENT_NAME, "version": env!("CARGO_PKG_VERSION") }
        }
    }))
}

/// Prints inbound traffic until the response for `id` arrives.
async fn await_response(
    inbound: &mut UnboundedReceiver<InboundEvent>,
    id: &RequestId,
    timeout: Duration,
) -> Result<Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = tokio::time::timeout_at(deadline, inbound.recv())
            .await
            .with_context(|| format!("no response to request {id} within {timeout:?}"))?
            .context("transport handler dropped")?;

        match event {
            InboundEvent::Diagnostic(line) => eprintln!("[server] {line}"),
            InboundEvent::Message(line) => {
                println!("{line}");
                let Ok(value) = serde_json::from_str::<Value>(&line) else {
                    warn!("Server sent a line that is not JSON");
                    continue;
                };
                let answers = value.get("id").and_then(RequestId::from_value).as_ref() == Some(id)
                    && (value.get("result").is_some() || value.get("error").is_some());
                if answers {
                    return Ok(value);
                }
            }
        }
    }
}

async fn run_session(
    cli: &Cli,
    transport: &dyn Transport,
    inbound: &mut UnboundedReceiver<InboundEvent>,
) -> Result<()> {
    let timeout = Duration::from_secs(cli.timeout);

    transport
        .send_message(initialize_request(&cli.protocol_version))
        .await?;
    let response = await_response(inbound, &RequestId::from(INITIALIZE_ID), timeout).await?;
    if let Some(error) = response.get("error") {
        bail!("initialize failed: {error}");
    }

    let negotiated = response
        .pointer("/result/protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(&cli.protocol_version);
    info!(protocol_version = negotiated, "Initialized");
    match transport.set_protocol_version(negotiated) {
        Ok(()) | Err(TransportError::Unsupported(_)) => {}
        Err(e) => return Err(e.into()),
    }

    transport
        .send_message(object(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        })))
        .await?;

    let params = cli.follow_up_params()?;
    transport
        .send_message(object(json!({
            "jsonrpc": "2.0",
            "id": FOLLOW_UP_ID,
            "method": cli.method,
            "params": params
        })))
        .await?;
    await_response(inbound, &RequestId::from(FOLLOW_UP_ID), timeout).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let transport = build_transport(cli.server_config()?)?;
    let (handler, mut inbound) = ChannelHandler::new();
    transport.set_handler(Arc::new(handler));

    transport.start().await.context("starting transport")?;
    info!(transport = %transport.transport_type(), "Connected");

    let outcome = run_session(&cli, transport.as_ref(), &mut inbound).await;

    transport.close(Duration::from_secs(5)).await;
    debug!(metrics = ?transport.metrics(), "Session finished");
    outcome
}
