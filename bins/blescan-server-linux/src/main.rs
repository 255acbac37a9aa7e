mod config;
mod sim;

use std::net::SocketAddr;
use std::time::Duration;

use blescan_core::{FileStorage, PersistentStore, RadioController};
use blescan_server::{Device, SessionServer, WsListener};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::sim::SimulatedRadio;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,blescan_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("BLE scan server starting...");

    let app = AppConfig::load()?;
    tracing::debug!("Configuration: {:?}", app);

    let storage = FileStorage::new(&app.data_dir)?;
    let store = PersistentStore::open(storage, &app.store_file);
    let radio = RadioController::new(SimulatedRadio::default())?;
    let device = Device::new(radio, store);

    let addr = SocketAddr::from(([0, 0, 0, 0], app.port));
    let listener = WsListener::bind(addr).await?;
    let mut server = SessionServer::start(app.server_config(), device, listener)?;

    tracing::info!("Ready: ws://localhost:{}", app.port);
    tracing::info!("   Try: websocat --crlf ws://localhost:{}", app.port);

    let mut ticker = tokio::time::interval(Duration::from_millis(app.tick_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => server.process_tick(),
        }
    }

    server.stop();
    if let Err(e) = server.device_mut().radio.stop() {
        tracing::warn!("Failed to stop radio: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
