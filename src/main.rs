// src/main.rs - Demo entrypoint: runs the agent against simulated collaborators
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use crealink::agent::Agent;
use crealink::config;
use crealink::driver::{TemperaturePair, TemperatureSample};
use crealink::lifecycle::PrinterEvent;
use crealink::sim::{RecordingTransport, SimPrinterDriver};

#[derive(Parser)]
#[command(name = "crealink-agent", version, about = "Cloud shadow agent for networked 3D printers")]
struct Cli {
    /// Path to the agent configuration file
    #[arg(default_value = "crealink.toml")]
    config: String,
    /// Maximum log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();
    let level: tracing::Level = cli.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting crealink shadow agent");
    tracing::info!("Loading configuration from: {}", cli.config);

    let config = config::load_config(&cli.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", cli.config, e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    // Simulated collaborators stand in for the firmware link and the cloud
    // session; a host integration supplies real ones through the same traits.
    let driver = Arc::new(SimPrinterDriver::new());
    driver
        .set_temperatures(Some(TemperatureSample {
            tool0: Some(TemperaturePair {
                actual: 24,
                target: 0,
            }),
            bed: Some(TemperaturePair {
                actual: 23,
                target: 0,
            }),
        }))
        .await;
    let transport = Arc::new(RecordingTransport::new());
    let (_transport_tx, transport_rx) = mpsc::channel(32);

    let mut agent = Agent::new(config, driver, transport, transport_rx);

    match agent.start_tunnel().await {
        Ok(status) => tracing::info!(?status, "tunnel supervisor"),
        Err(e) => tracing::warn!(error = %e, "tunnel helper not started"),
    }

    let events = agent.event_sender();
    tokio::spawn(async move {
        let _ = events.send(PrinterEvent::Connected).await;
    });

    let shutdown = agent.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = shutdown.send(());
        }
    });

    agent.run().await?;
    agent.stop_tunnel().await;
    Ok(())
}
