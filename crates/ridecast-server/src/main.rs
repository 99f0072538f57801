//! # Ridecast
//!
//! Realtime glue for the ride-hailing demo.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! ridecast
//!
//! # Run with environment variables
//! RIDECAST_PORT=8080 RIDECAST_HOST=0.0.0.0 RIDECAST_BACKEND_URL=http://dms-backend:8000 ridecast
//! ```
//!
//! Configuration files are looked up in `ridecast.toml`,
//! `/etc/ridecast/ridecast.toml` and `~/.config/ridecast/ridecast.toml`.

use anyhow::Result;
use ridecast_server::{config::Config, metrics, run_server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ridecast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    tracing::info!(
        "Starting Ridecast on {}:{} (broker: {:?})",
        config.host,
        config.port,
        config.broker.mode
    );

    metrics::init_metrics();

    run_server(config).await?;

    Ok(())
}
