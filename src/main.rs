use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stream_supervisor::{http, AppConfig, SupervisorBuilder};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML config file. Defaults to ./stream-supervisor.toml when present.
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if config.stream.stream_key().is_none() {
        tracing::error!("no stream key set (STREAM_KEY or YOUTUBE_KEY); serving status only");
    }

    let supervisor = SupervisorBuilder::from_config(&config).build();
    let facade = supervisor.facade().clone();
    let handle = supervisor.run();

    // The encoder keeps running when the HTTP server fails to bind.
    if let Err(e) = http::serve(&config.server, facade, http::shutdown_signal()).await {
        tracing::error!(error = %e, "HTTP server failed");
        http::shutdown_signal().await;
    }

    if let Err(e) = handle.stop().await {
        tracing::warn!(error = %e, "supervisor was already gone");
    }
    tracing::info!("shut down");
    Ok(())
}
