//! `GavelServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → room manager.

use std::sync::Arc;
use std::time::Duration;

use gavel_protocol::{Codec, JsonCodec};
use gavel_room::{AuctionSettings, ChannelBroadcaster, MemoryRoomStore, RoomManager};
use gavel_timer::{MemoryDeadlineStore, TimerService};
use gavel_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{GavelError, LotCatalog, ServerConfig};

/// Shared by every connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) rooms: RoomManager,
    pub(crate) catalog: LotCatalog,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Gavel server.
///
/// ```rust,no_run
/// # async fn run() -> Result<(), gavel::GavelError> {
/// let server = gavel::GavelServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct GavelServerBuilder {
    config: ServerConfig,
    catalog: Option<LotCatalog>,
}

impl GavelServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            catalog: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn settings(mut self, settings: AuctionSettings) -> Self {
        self.config.settings = settings;
        self
    }

    pub fn bid_window(mut self, window: Duration) -> Self {
        self.config.settings.bid_window = window;
        self
    }

    /// Seeds lot draws so runs are reproducible.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.settings.rng_seed = Some(seed);
        self
    }

    /// Uses `catalog` instead of reading `catalog_path` or the built-in one.
    pub fn catalog(mut self, catalog: LotCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Loads the catalog, binds the listener and recovers pending rooms.
    pub async fn build(self) -> Result<GavelServer<JsonCodec>, GavelError> {
        let catalog = match (self.catalog, &self.config.catalog_path) {
            (Some(catalog), _) => catalog,
            (None, Some(path)) => LotCatalog::load(path)?,
            (None, None) => LotCatalog::builtin(),
        };

        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let rooms = RoomManager::new(
            MemoryRoomStore::new(),
            ChannelBroadcaster::new(),
            TimerService::new(MemoryDeadlineStore::new(), self.config.timer.clone()),
            self.config.settings.clone(),
        );
        let recovered = rooms.recover().await?;
        if recovered > 0 {
            tracing::info!(recovered, "resumed rooms with pending countdowns");
        }

        let state = Arc::new(ServerState {
            rooms,
            catalog,
            codec: JsonCodec,
            config: self.config,
        });
        Ok(GavelServer { transport, state })
    }
}

impl Default for GavelServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Gavel server. Call [`run()`](Self::run) to start accepting.
pub struct GavelServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl GavelServer<JsonCodec> {
    pub fn builder() -> GavelServerBuilder {
        GavelServerBuilder::new()
    }
}

impl<C: Codec> GavelServer<C> {
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, GavelError> {
        Ok(self.transport.local_addr()?)
    }

    /// Accepts connections and spawns a handler task for each, until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), GavelError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Gavel server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
