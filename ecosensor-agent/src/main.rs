//! EcoSensor Agent - workstation energy estimation and telemetry
//!
//! Long-running agent that:
//! - Samples hardware and user activity on a configurable cadence
//! - Accumulates estimated energy into session and daily counters
//! - Emits CloudEvents telemetry (registration, status, heartbeat,
//!   daily summary) to a remote collector
//! - Keeps ticking through missing readings, bad config values and
//!   backend outages

mod config_manager;
mod monitors;
mod scheduler;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use config_manager::{ConfigManager, LiveConfig};
use ecosensor_core::delivery::{DeliveryChannel, HttpDeliveryChannel};
use ecosensor_core::energy::EnergyModel;
use ecosensor_core::events::EventFactory;
use monitors::MonitorSet;
use scheduler::Scheduler;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration comes first so its verbosity setting can seed the
    // subscriber; RUST_LOG still wins when set.
    let config_path = ConfigManager::default_path().context("resolving config path")?;
    let mut config_manager = ConfigManager::new(config_path);
    let load_error = config_manager.load().await.err();
    let config = config_manager.config().clone();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("EcoSensor agent v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(e) = load_error {
        // Persistence failures are never fatal; run on built-in defaults.
        warn!("config load failed, using defaults: {e:#}");
    }

    let live_config = LiveConfig::new(config.clone());
    let snapshot = live_config.snapshot();

    let delivery = Arc::new(
        HttpDeliveryChannel::new(&snapshot.backend_url).context("building delivery channel")?,
    );
    let factory = EventFactory::new();
    info!(source = factory.source(), backend = %snapshot.backend_url, "agent identity established");

    // One-shot registration so the collector learns this machine. Failure
    // is logged and the agent keeps going.
    let registration =
        factory.build_registration_event(std::env::consts::OS, env!("CARGO_PKG_VERSION"));
    if let Err(e) = delivery.send(&registration).await {
        warn!(error = %e, "registration event delivery failed");
    }

    let scheduler = Scheduler::new(
        live_config,
        MonitorSet::new(),
        EnergyModel::new(Utc::now()),
        factory,
        delivery,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(shutdown_rx).await;
    info!("agent stopped");
    Ok(())
}
