//! lywsd03mmc-graph: MCP host for the LYWSD03MMC sensor feed
//!
//! Polls the configured sensor in the background and serves the reading and
//! the graph hooks as MCP tools over stdio.

use clap::{Parser, Subcommand};
use lywsd03mmc_graph::hooks::{self, Series};
use lywsd03mmc_graph::shared::{format_reading, internal_error};
use lywsd03mmc_graph::{FileSettings, PlatformClient, SensorMonitor};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    ErrorData as McpError,
    ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

type Monitor = SensorMonitor<PlatformClient, FileSettings>;

// === CLI ===

#[derive(Parser)]
#[command(name = "lywsd03mmc-graph")]
#[command(about = "Feeds LYWSD03MMC thermometer readings to a host graph over MCP")]
struct Cli {
    /// Config file to use instead of ~/.config/lywsd03mmc-graph/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the config file in your editor
    Config,
    /// Poll the sensor once and print the reading
    Read,
}

// === Parameter Types ===

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EmptyParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SeriesParams {
    #[schemars(description = "Series label -> [value, target or null] as parsed by the host")]
    #[serde(default)]
    pub series: Series,
}

// === Server ===

#[derive(Debug)]
pub struct GraphServer {
    pub tool_router: ToolRouter<Self>,
    monitor: Arc<Monitor>,
}

impl GraphServer {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            monitor,
        }
    }
}

fn series_result(series: &Series) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(series)
        .map_err(|e| internal_error(format!("Failed to encode series: {}", e)))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[rmcp::tool_router]
impl GraphServer {
    #[rmcp::tool(description = "Get the latest cached sensor reading (temperature, humidity, battery, age)")]
    pub async fn get_reading(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        let reading = self.monitor.get_reading();
        Ok(CallToolResult::success(vec![Content::text(format_reading(
            &reading,
            chrono::Utc::now(),
        ))]))
    }

    #[rmcp::tool(description = "Received-temperatures hook: add the sensor's series (no target) to the given map and return it")]
    pub async fn callback(
        &self,
        Parameters(params): Parameters<SeriesParams>,
    ) -> Result<CallToolResult, McpError> {
        series_result(&self.monitor.callback(params.series))
    }

    #[rmcp::tool(description = "Temperature-data hook: add the sensor's series (target 0) to the given map and return it")]
    pub async fn get_temperature_data(
        &self,
        Parameters(params): Parameters<SeriesParams>,
    ) -> Result<CallToolResult, McpError> {
        series_result(&self.monitor.get_temperature_data(params.series))
    }

    #[rmcp::tool(description = "Get update-check metadata (version, release repository, archive URL)")]
    pub async fn get_update_information(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        let json = serde_json::to_string_pretty(&hooks::update_information())
            .map_err(|e| internal_error(format!("Failed to encode update information: {}", e)))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[rmcp::tool(description = "Start background polling of the configured sensor (no-op if already running)")]
    pub async fn start_polling(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        let settings = self.monitor.settings();
        if !settings.is_configured() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No sensor address configured. Run `lywsd03mmc-graph config` to set device_address.",
            )]));
        }

        self.monitor.start();
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Polling {} every {}s",
            settings.address(),
            settings.poll_interval().as_secs()
        ))]))
    }

    #[rmcp::tool(description = "Stop background polling (waits up to 5 seconds)")]
    pub async fn stop_polling(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        let text = if self.monitor.stop(STOP_TIMEOUT).await {
            "Polling stopped"
        } else {
            "Stop requested; the poller will exit after its current read"
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[rmcp::tool_handler]
impl ServerHandler for GraphServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "lywsd03mmc-graph: LYWSD03MMC temperature/humidity/battery feed for graph hooks.\n"
                    .to_string(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match cli.config {
        Some(path) => FileSettings::new(path),
        None => FileSettings::at_default_path()?,
    };

    match cli.command {
        Some(Commands::Config) => {
            run_config_command(&settings)?;
        }
        Some(Commands::Read) => {
            init_tracing();
            run_read_command(settings).await?;
        }
        None => {
            init_tracing();
            run_server(settings).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries the MCP protocol
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open config file in user's editor
fn run_config_command(settings: &FileSettings) -> anyhow::Result<()> {
    let config_path = settings.path();

    // Create config dir if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create config file from template if it doesn't exist
    if !config_path.exists() {
        let template = include_str!("../config.toml.example");
        std::fs::write(config_path, template)?;
        println!("Created config file: {}", config_path.display());
    }

    // Get editor from environment or use defaults
    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            { "notepad".to_string() }
            #[cfg(not(target_os = "windows"))]
            { "nano".to_string() }
        });

    println!("Opening {} with {}", config_path.display(), editor);

    std::process::Command::new(&editor)
        .arg(config_path)
        .status()?;

    Ok(())
}

/// Single poll cycle against the real sensor
async fn run_read_command(settings: FileSettings) -> anyhow::Result<()> {
    let monitor = SensorMonitor::new(PlatformClient::default(), Arc::new(settings));
    let mut poller = monitor.poller();
    poller.poll_once().await;

    let reading = monitor.get_reading();
    print!("{}", format_reading(&reading, chrono::Utc::now()));

    if !reading.is_present() {
        anyhow::bail!("No reading obtained from the sensor");
    }
    Ok(())
}

/// Run the MCP server
async fn run_server(settings: FileSettings) -> anyhow::Result<()> {
    tracing::info!("Starting lywsd03mmc-graph server");

    let monitor = Arc::new(SensorMonitor::new(PlatformClient::default(), Arc::new(settings)));
    monitor.on_start();

    let server = GraphServer::new(Arc::clone(&monitor));
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;

    monitor.stop(STOP_TIMEOUT).await;
    tracing::info!("lywsd03mmc-graph server stopped");
    Ok(())
}
