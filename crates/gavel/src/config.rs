//! Server configuration.
//!
//! [`ServerConfig`] holds what a running server needs and defaults to local
//! play. [`ServerArgs`] is the command line of the `gavel` binary. Every flag
//! can also be set from a `GAVEL_*` environment variable, and the flag wins
//! when both are given.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use gavel_room::AuctionSettings;
use gavel_timer::TimerConfig;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Bid window, lot-draw seed, per-room queue depth.
    pub settings: AuctionSettings,

    pub timer: TimerConfig,

    /// JSON lot catalog. The built-in catalog is used when `None`.
    pub catalog_path: Option<PathBuf>,

    /// How long a new connection has to send its `Handshake`.
    pub handshake_timeout: Duration,

    /// A connection that sends nothing (not even a heartbeat) for this
    /// long is closed.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            settings: AuctionSettings::default(),
            timer: TimerConfig::default(),
            catalog_path: None,
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Gavel auction server
#[derive(Parser, Debug)]
#[command(name = "gavel")]
#[command(about = "Live multi-team player auction server")]
#[command(version)]
pub struct ServerArgs {
    /// Address to bind to
    #[arg(short, long, env = "GAVEL_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Seconds a lot stays open after the latest bid
    #[arg(
        long,
        env = "GAVEL_BID_WINDOW_SECS",
        default_value_t = 20,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub bid_window_secs: u64,

    /// Path to a JSON lot catalog (built-in IPL catalog when omitted)
    #[arg(short, long, env = "GAVEL_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Seed for lot draws, for reproducible auctions
    #[arg(long, env = "GAVEL_SEED")]
    pub seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl ServerArgs {
    /// Applies the arguments on top of [`ServerConfig::default`].
    pub fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            bind_addr: self.bind,
            settings: AuctionSettings {
                bid_window: Duration::from_secs(self.bid_window_secs),
                rng_seed: self.seed,
                ..defaults.settings
            },
            catalog_path: self.catalog,
            ..defaults
        }
    }
}
