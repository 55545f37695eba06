//! Per-connection handler: handshake, then request routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `Handshake` → check the protocol version → `HandshakeAck`
//!   2. Loop over three sources at once: frames from the client, events
//!      the room broadcasts to this team, and the idle deadline
//!   3. On exit, unsubscribe and mark the team disconnected
//!
//! Failed requests are answered with `Rejected` to this connection only.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use gavel_protocol::{
    ClientMessage, Codec, ConnectionRef, Envelope, ErrorKind, Message, PROTOCOL_VERSION,
    ProtocolError, RoomId, ServerEvent, TeamName,
};
use gavel_room::{AuctionError, DEFAULT_BUDGET, RoomConfig};
use gavel_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::GavelError;
use crate::server::ServerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), GavelError> {
    let mut session = Session::new(&conn, &state);
    debug!(connection = %session.connection, "handling new connection");

    session.handshake().await?;
    let result = session.run().await;
    session.leave_room().await;
    result
}

struct Session<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    state: &'a ServerState<C>,
    connection: ConnectionRef,
    outbound_tx: mpsc::UnboundedSender<ServerEvent>,
    outbound_rx: mpsc::UnboundedReceiver<ServerEvent>,
    seq: u64,
    started: Instant,
    last_seen: tokio::time::Instant,
    /// The room and team this connection is subscribed as.
    membership: Option<(RoomId, TeamName)>,
}

impl<'a, C: Codec> Session<'a, C> {
    fn new(conn: &'a WebSocketConnection, state: &'a ServerState<C>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            conn,
            state,
            connection: ConnectionRef(conn.id().into_inner()),
            outbound_tx,
            outbound_rx,
            seq: 0,
            started: Instant::now(),
            last_seen: tokio::time::Instant::now(),
            membership: None,
        }
    }

    async fn handshake(&mut self) -> Result<(), GavelError> {
        let timeout = self.state.config.handshake_timeout;
        let data = match tokio::time::timeout(timeout, self.conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                return Err(invalid("connection closed before handshake"));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(invalid("handshake timed out")),
        };

        let version = match self.state.codec.decode::<Envelope>(&data) {
            Ok(Envelope {
                message: Message::Client(ClientMessage::Handshake { version }),
                ..
            }) => version,
            Ok(_) => {
                self.reject(ErrorKind::Validation, "first message must be Handshake")
                    .await?;
                return Err(invalid("first message must be Handshake"));
            }
            Err(e) => {
                self.reject(ErrorKind::Validation, format!("malformed handshake: {e}"))
                    .await?;
                return Err(e.into());
            }
        };

        if version != PROTOCOL_VERSION {
            let reason = format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}");
            self.reject(ErrorKind::Validation, reason.clone()).await?;
            return Err(invalid(reason));
        }

        self.send_event(ServerEvent::HandshakeAck {
            server_time: epoch_ms(),
        })
        .await?;
        info!(connection = %self.connection, "handshake complete");
        Ok(())
    }

    async fn run(&mut self) -> Result<(), GavelError> {
        let idle = self.state.config.idle_timeout;
        self.last_seen = tokio::time::Instant::now();

        loop {
            tokio::select! {
                frame = self.conn.recv() => {
                    let data = match frame {
                        Ok(Some(data)) => data,
                        Ok(None) => {
                            info!(connection = %self.connection, "connection closed cleanly");
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    };
                    self.last_seen = tokio::time::Instant::now();
                    if self.on_frame(&data).await? == Flow::Close {
                        info!(connection = %self.connection, "client left");
                        let _ = self.conn.close().await;
                        return Ok(());
                    }
                }
                Some(event) = self.outbound_rx.recv() => {
                    self.send_event(event).await?;
                }
                _ = tokio::time::sleep_until(self.last_seen + idle) => {
                    info!(connection = %self.connection, "connection idle, closing");
                    let _ = self.conn.close().await;
                    return Ok(());
                }
            }
        }
    }

    async fn on_frame(&mut self, data: &[u8]) -> Result<Flow, GavelError> {
        let request = match self.state.codec.decode::<Envelope>(data) {
            Ok(Envelope {
                message: Message::Client(request),
                ..
            }) => request,
            Ok(_) => {
                self.reject(ErrorKind::Validation, "clients may not send server events")
                    .await?;
                return Ok(Flow::Continue);
            }
            Err(e) => {
                debug!(connection = %self.connection, error = %e, "undecodable frame");
                self.reject(ErrorKind::Validation, format!("malformed message: {e}"))
                    .await?;
                return Ok(Flow::Continue);
            }
        };
        self.dispatch(request).await
    }

    /// Routes one request to the room manager.
    async fn dispatch(&mut self, request: ClientMessage) -> Result<Flow, GavelError> {
        let state = self.state;
        let rooms = &state.rooms;
        let outcome = match request {
            ClientMessage::Handshake { .. } => Err(AuctionError::Validation(
                "handshake already completed".into(),
            )),
            ClientMessage::CreateRoom {
                team_name,
                league,
                teams_expected,
                team_capacity,
                foreign_cap,
                budget,
            } => {
                let config = RoomConfig {
                    league,
                    teams_expected,
                    team_capacity,
                    foreign_cap,
                    starting_budget: budget.unwrap_or(DEFAULT_BUDGET),
                };
                self.create_room(team_name, config).await
            }
            ClientMessage::JoinRoom { room_id, team_name } => {
                self.join_room(room_id, team_name).await
            }
            ClientMessage::StartAuction { room_id, team_name } => {
                rooms.start_auction(&room_id, team_name).await
            }
            ClientMessage::PlaceBid { room_id, team_name } => {
                rooms.place_bid(&room_id, team_name).await
            }
            ClientMessage::PassOnLot { room_id, team_name } => {
                rooms.pass_on_lot(&room_id, team_name).await
            }
            ClientMessage::DecideUnsold {
                room_id,
                team_name,
                proceed,
            } => rooms.decide_unsold(&room_id, team_name, proceed).await,
            ClientMessage::Heartbeat { client_time } => {
                self.send_event(ServerEvent::HeartbeatAck {
                    client_time,
                    server_time: epoch_ms(),
                })
                .await?;
                Ok(())
            }
            ClientMessage::Leave => return Ok(Flow::Close),
        };

        if let Err(err) = outcome {
            debug!(connection = %self.connection, kind = %err.kind(), error = %err, "request rejected");
            self.reject(err.kind(), err.to_string()).await?;
        }
        Ok(Flow::Continue)
    }

    async fn create_room(&mut self, host: TeamName, config: RoomConfig) -> Result<(), AuctionError> {
        let state = self.state;
        let lots = state.catalog.lots(config.league);
        if lots.is_empty() {
            return Err(AuctionError::Validation(format!(
                "no lots in the {} catalog",
                config.league
            )));
        }

        self.leave_room().await;
        let room_id = state
            .rooms
            .create_room(config, host.clone(), Some(self.connection), lots)
            .await?;

        // Queued ahead of the lobby update the join below triggers.
        let _ = self.outbound_tx.send(ServerEvent::RoomCreated {
            room_id: room_id.clone(),
        });
        self.enter_room(room_id, host).await
    }

    async fn join_room(&mut self, room_id: RoomId, team: TeamName) -> Result<(), AuctionError> {
        if team.is_blank() {
            return Err(AuctionError::Validation("team name is required".into()));
        }
        let same = self
            .membership
            .as_ref()
            .is_some_and(|(r, t)| *r == room_id && *t == team);
        if !same {
            self.leave_room().await;
        }
        self.enter_room(room_id, team).await
    }

    /// Subscribes first so the team sees the lobby update or snapshot its
    /// own join produces.
    async fn enter_room(&mut self, room_id: RoomId, team: TeamName) -> Result<(), AuctionError> {
        let state = self.state;
        let broadcaster = state.rooms.broadcaster();
        broadcaster.subscribe(&room_id, &team, self.connection, self.outbound_tx.clone());

        match state
            .rooms
            .join_room(&room_id, team.clone(), Some(self.connection))
            .await
        {
            Ok(()) => {
                info!(connection = %self.connection, %room_id, %team, "joined room");
                self.membership = Some((room_id, team));
                Ok(())
            }
            Err(err) => {
                broadcaster.unsubscribe(&room_id, &team, self.connection);
                Err(err)
            }
        }
    }

    async fn leave_room(&mut self) {
        let Some((room_id, team)) = self.membership.take() else {
            return;
        };
        let state = self.state;
        state
            .rooms
            .broadcaster()
            .unsubscribe(&room_id, &team, self.connection);
        if let Err(err) = state
            .rooms
            .disconnect(&room_id, team.clone(), Some(self.connection))
            .await
        {
            debug!(%room_id, %team, error = %err, "disconnect not recorded");
        }
    }

    async fn reject(&mut self, kind: ErrorKind, reason: impl Into<String>) -> Result<(), GavelError> {
        self.send_event(ServerEvent::Rejected {
            kind,
            reason: reason.into(),
        })
        .await
    }

    async fn send_event(&mut self, event: ServerEvent) -> Result<(), GavelError> {
        let seq = self.seq;
        self.seq += 1;
        let timestamp = self.started.elapsed().as_millis() as u64;
        let bytes = self
            .state
            .codec
            .encode(&Envelope::server(seq, timestamp, event))?;
        self.conn.send(&bytes).await?;
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> GavelError {
    ProtocolError::InvalidMessage(reason.into()).into()
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
