use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use five_whys_rca::{
    config::{Config, LogFormat},
    export::ReportExporter,
    gateway::PipeClient,
    rca::{RcaEngine, RcaService},
    server::{AppState, McpServer},
    storage::SqliteStorage,
};

/// Interactive 5 Whys root cause analysis over MCP (stdio).
///
/// Settings come from the environment (and `.env`); flags override them.
#[derive(Parser, Debug)]
#[command(name = "five-whys-rca", version, about)]
struct Cli {
    /// SQLite database file
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Directory for exported markdown reports
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Maximum number of why questions per session
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_depth: Option<u32>,

    /// Log output format: pretty or json
    #[arg(long, value_parser = ["pretty", "json"])]
    log_format: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.database_path {
            config.database.path = path;
        }
        if let Some(dir) = self.report_dir {
            config.analysis.report_dir = dir;
        }
        if let Some(depth) = self.max_depth {
            config.analysis.max_depth = depth;
        }
        if let Some(format) = self.log_format {
            config.logging.format = match format.as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            };
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        max_depth = config.analysis.max_depth,
        "Five Whys RCA server starting..."
    );

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let client = match PipeClient::new(
        &config.gateway,
        config.request.clone(),
        config.pipes.clone(),
    ) {
        Ok(c) => {
            info!(base_url = %config.gateway.base_url, "Gateway client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize gateway client");
            return Err(e.into());
        }
    };

    info!("Ensuring required pipes exist...");
    if let Err(e) = client.ensure_pipes().await {
        error!(error = %e, "Failed to ensure pipes exist");
        return Err(e.into());
    }

    let engine = RcaEngine::new(
        Arc::new(client),
        config.analysis.clone(),
        config.request.operation_timeout(),
    );
    let exporter = ReportExporter::new(&config.analysis.report_dir);
    let service = RcaService::new(engine, storage, exporter);

    let state = Arc::new(AppState::new(config, service));
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging on stderr; stdout carries the protocol.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
