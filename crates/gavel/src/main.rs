//! Gavel server binary.
//!
//! ```bash
//! gavel --bind 0.0.0.0:8080 --catalog players.json
//!
//! # Same thing from the environment
//! GAVEL_BIND=0.0.0.0:8080 GAVEL_CATALOG=players.json RUST_LOG=gavel=debug gavel
//! ```

use clap::Parser;
use gavel::{GavelError, GavelServer, ServerArgs};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), GavelError> {
    let args = ServerArgs::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = args.into_config();
    tracing::info!(
        bind = %config.bind_addr,
        bid_window_secs = config.settings.bid_window.as_secs(),
        catalog = ?config.catalog_path,
        "Gavel server starting"
    );

    let server = GavelServer::builder().config(config).build().await?;
    tracing::info!(addr = %server.local_addr()?, "listening");
    server.run().await
}
