//! HTTP traffic capture proxy
//!
//! Sits in front of an HTTP service, forwards every request to it unchanged,
//! and exports a copy of each exchange to a collector.
//!
//! ```text
//!     Client ──▶ ┌──────────────────────────────┐ ──▶ Upstream
//!                │  http server                 │
//!                │    └─ capture interceptor    │
//!     Client ◀── │         │ (response tap)     │ ◀── Upstream
//!                └─────────┼────────────────────┘
//!                          ▼
//!                 bounded export queue ──▶ N workers ──▶ Collector
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use traffic_capture::config::{load_config, validate_config, CaptureProxyConfig, ConfigWatcher};
use traffic_capture::export::Exporter;
use traffic_capture::http::{shutdown_signal, HttpServer};
use traffic_capture::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "traffic-capture")]
#[command(about = "Reverse proxy that exports captured HTTP traffic to a collector", long_about = None)]
struct Cli {
    /// TOML configuration file, watched for capture policy changes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to accept client connections on
    #[arg(short, long)]
    listen: Option<String>,

    /// Upstream base URL requests are forwarded to
    #[arg(short, long)]
    upstream: Option<String>,

    /// Collector base URL
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Service name reported with each capture
    #[arg(short, long)]
    service_name: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut CaptureProxyConfig) {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.upstream.url = upstream.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.capture.tpa_endpoint = endpoint.clone();
        }
        if let Some(service_name) = &self.service_name {
            config.capture.service_name = service_name.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CaptureProxyConfig::default(),
    };
    cli.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("traffic-capture v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        collector = %config.capture.tpa_endpoint,
        service_name = %config.capture.service_name,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let exporter = Exporter::start(&config.capture, &config.exporter)?;

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, exporter.clone())?;
    server.run(listener, config_updates, shutdown_signal()).await?;

    exporter.close();
    let stats = exporter.stats();
    tracing::info!(
        enqueued = stats.enqueued,
        delivered = stats.delivered,
        dropped = stats.dropped,
        "Shutdown complete"
    );
    Ok(())
}
