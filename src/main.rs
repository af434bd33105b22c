//! fileferry - minimal file transfer service

use clap::Parser;
use fileferry::config::{Config, ENV_DOWNLOAD_DIR, ENV_PORT, ENV_UPLOAD_DIR};
use fileferry::logging::init_subscriber;
use fileferry::metrics::server::{MetricsServer, MetricsServerConfig};
use fileferry::server::Server;
use std::path::PathBuf;
use tracing::info;

/// fileferry - upload files, get a reference back, download by reference
#[derive(Parser, Debug)]
#[command(name = "fileferry")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file (defaults plus APP_* variables when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    if let Some(level) = args.log_level {
        config.logging.level = level;
        config.validate()?;
    }

    init_subscriber(&config.logging)?;

    info!("Starting fileferry v{}", fileferry::VERSION);
    match &args.config {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration file given, using defaults"),
    }
    info!(
        "Use {}, {}, {} environment variables",
        ENV_PORT, ENV_UPLOAD_DIR, ENV_DOWNLOAD_DIR
    );

    let mut metrics_server = if config.metrics.enabled {
        let mut server = MetricsServer::new(MetricsServerConfig {
            address: format!("{}:{}", config.server.host, config.metrics.port),
        });
        server.start().await?;
        Some(server)
    } else {
        None
    };

    let server = Server::new(config).await?;
    server.run().await?;

    if let Some(metrics) = metrics_server.as_mut() {
        metrics.shutdown().await;
    }

    Ok(())
}
