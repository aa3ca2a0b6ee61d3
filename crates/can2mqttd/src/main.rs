//! can2mqttd - CAN <-> MQTT bridge daemon
//!
//! Opens a CAN interface and an MQTT broker connection, loads an optional
//! static route file and translates traffic both ways until interrupted or
//! until either connection is lost.
//!
//! Usage:
//!   can2mqttd [OPTIONS]
//!
//! Examples:
//!   # Bridge vcan0 to a local broker with routes from a CSV file
//!   can2mqttd -c vcan0 -m tcp://localhost:1883 -f config/routes.csv
//!
//!   # Only forward CAN traffic to MQTT
//!   can2mqttd -c can0 -d 1

mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use c2m_bridge::{connect_can, connect_mqtt, Bridge};
use c2m_conv::CodecRegistry;
use c2m_routing::{load_routes_file, RoutingTable};

use crate::cli::{Args, LogFormat};
use crate::config::{AppConfig, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = AppConfig::load(args.config.as_deref())?.merge_with_args(&args)?;

    init_logging(&settings.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting can2mqttd");

    let registry = Arc::new(CodecRegistry::new());
    let routes = match &settings.routes_file {
        Some(path) => load_routes_file(path, &registry)
            .with_context(|| format!("Failed to load routes from {}", path.display()))?,
        None => Vec::new(),
    };

    let can = connect_can(&settings.can)
        .await
        .with_context(|| format!("Failed to open CAN interface {}", settings.can.interface))?;
    let mqtt = connect_mqtt(&settings.mqtt).await.with_context(|| {
        format!(
            "Failed to connect to MQTT broker {}:{}",
            settings.mqtt.host, settings.mqtt.port
        )
    })?;

    let bridge = Bridge::new(
        can,
        mqtt,
        Arc::new(RoutingTable::new()),
        registry,
        settings.bridge.clone(),
    );
    let handle = bridge.start().await.context("Failed to start bridge")?;

    if !routes.is_empty() {
        bridge
            .load_routes(routes)
            .await
            .context("Failed to install static routes")?;
    }

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
        result = handle.wait() => result,
    };

    bridge.stop().await;
    result.context("Bridge stopped")?;

    info!("can2mqttd exited");
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level for our crates
fn init_logging(config: &LoggingConfig) {
    let level = &config.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "can2mqttd={level},c2m_bridge={level},c2m_routing={level},c2m_conv={level},rumqttc=warn"
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}
