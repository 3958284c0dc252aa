//! `rackhub-simulator` -- a stand-in locker controller.
//!
//! Connects to the hub's controller endpoint as a single-door unit or a
//! multi-door shelf, registers, heartbeats, and answers `lock` /
//! `unlock` commands with status reports. See
//! [`SimulatorConfig::from_env`] for the environment variables.

use rackhub_simulator::config::SimulatorConfig;
use rackhub_simulator::device::SimulatedDevice;
use rackhub_simulator::session;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rackhub_simulator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SimulatorConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid simulator configuration");
        std::process::exit(1);
    });

    tracing::info!(
        ws_url = %config.ws_url,
        kind = ?config.kind,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        "Starting rackhub-simulator",
    );

    let mut device = SimulatedDevice::new(config.kind.clone(), config.item_present);
    session::run(&config.ws_url, &mut device, config.heartbeat_interval).await;
}
