//! End-to-end tests: a real server and `tokio-tungstenite` clients.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gavel::prelude::*;
use tokio_tungstenite::tungstenite;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const WAIT: Duration = Duration::from_secs(5);

fn one_lot_catalog() -> LotCatalog {
    let mut catalog = LotCatalog::new();
    catalog.insert(
        League::Ipl,
        vec![PlayerLot::new("Virat Kohli", Amount::crores(2), "India", "Batter")],
    );
    catalog
}

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    let server = GavelServer::builder()
        .bind("127.0.0.1:0")
        .catalog(one_lot_catalog())
        .rng_seed(1)
        .build()
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("should have local addr").to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, msg: ClientMessage) {
    let json = serde_json::to_string(&Envelope::client(0, 0, msg)).expect("encode");
    ws.send(tungstenite::Message::Text(json.into()))
        .await
        .expect("send");
}

/// The next server event, skipping control frames.
async fn next_event(ws: &mut ClientWs) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("stream ended")
            .expect("websocket error");
        if !(frame.is_text() || frame.is_binary()) {
            continue;
        }
        let envelope: Envelope = serde_json::from_slice(&frame.into_data()).expect("decode");
        match envelope.message {
            Message::Server(event) => return event,
            Message::Client(other) => panic!("server sent a client message: {other:?}"),
        }
    }
}

/// Reads events until one matches, returning it.
async fn wait_for(ws: &mut ClientWs, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
    loop {
        let event = next_event(ws).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn handshake(ws: &mut ClientWs) {
    send(
        ws,
        ClientMessage::Handshake {
            version: PROTOCOL_VERSION,
        },
    )
    .await;
    let ack = next_event(ws).await;
    assert!(matches!(ack, ServerEvent::HandshakeAck { .. }), "got {ack:?}");
}

fn create_room(team: &str) -> ClientMessage {
    ClientMessage::CreateRoom {
        team_name: team.into(),
        league: League::Ipl,
        teams_expected: 2,
        team_capacity: 15,
        foreign_cap: 4,
        budget: None,
    }
}

/// Host creates a room and a guest joins it. Returns both sockets with
/// the lobby events already consumed.
async fn lobby(addr: &str) -> (ClientWs, ClientWs, RoomId) {
    let mut host = connect(addr).await;
    handshake(&mut host).await;
    send(&mut host, create_room("Chennai")).await;
    let ServerEvent::RoomCreated { room_id } = next_event(&mut host).await else {
        panic!("expected RoomCreated");
    };
    wait_for(&mut host, |e| matches!(e, ServerEvent::LobbyUpdate { .. })).await;

    let mut guest = connect(addr).await;
    handshake(&mut guest).await;
    send(
        &mut guest,
        ClientMessage::JoinRoom {
            room_id: room_id.clone(),
            team_name: "Mumbai".into(),
        },
    )
    .await;
    for ws in [&mut host, &mut guest] {
        wait_for(ws, |e| {
            matches!(e, ServerEvent::LobbyUpdate { teams, .. } if teams.len() == 2)
        })
        .await;
    }
    (host, guest, room_id)
}

fn is_rejected(event: &ServerEvent, expected: ErrorKind) -> bool {
    matches!(event, ServerEvent::Rejected { kind, .. } if *kind == expected)
}

// =========================================================================
// Handshake and connection
// =========================================================================

#[tokio::test]
async fn test_handshake_success() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;
}

#[tokio::test]
async fn test_handshake_version_mismatch_is_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, ClientMessage::Handshake { version: 999 }).await;

    let event = next_event(&mut ws).await;
    assert!(is_rejected(&event, ErrorKind::Validation), "got {event:?}");
}

#[tokio::test]
async fn test_first_message_must_be_handshake() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, ClientMessage::Heartbeat { client_time: 1 }).await;

    let event = next_event(&mut ws).await;
    assert!(is_rejected(&event, ErrorKind::Validation), "got {event:?}");
}

#[tokio::test]
async fn test_heartbeat_is_acknowledged() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    send(&mut ws, ClientMessage::Heartbeat { client_time: 12345 }).await;
    match next_event(&mut ws).await {
        ServerEvent::HeartbeatAck { client_time, server_time } => {
            assert_eq!(client_time, 12345);
            assert!(server_time > 0);
        }
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frame_is_rejected_and_connection_survives() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    ws.send(tungstenite::Message::Text(r#"{"type": "Client", "data": {"type": "StealPlayer"}}"#.into()))
        .await
        .unwrap();
    let event = next_event(&mut ws).await;
    assert!(is_rejected(&event, ErrorKind::Validation), "got {event:?}");

    send(&mut ws, ClientMessage::Heartbeat { client_time: 7 }).await;
    assert!(matches!(
        next_event(&mut ws).await,
        ServerEvent::HeartbeatAck { client_time: 7, .. }
    ));
}

#[tokio::test]
async fn test_leave_closes_connection() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;
    send(&mut ws, ClientMessage::Leave).await;

    let next = tokio::time::timeout(WAIT, ws.next()).await.expect("should close");
    match next {
        None | Some(Err(_)) | Some(Ok(tungstenite::Message::Close(_))) => {}
        Some(Ok(other)) => panic!("expected close, got {other:?}"),
    }
}

// =========================================================================
// Rooms
// =========================================================================

#[tokio::test]
async fn test_join_unknown_room_is_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    send(
        &mut ws,
        ClientMessage::JoinRoom {
            room_id: "nope00".into(),
            team_name: "Chennai".into(),
        },
    )
    .await;
    let event = next_event(&mut ws).await;
    assert!(is_rejected(&event, ErrorKind::Precondition), "got {event:?}");
}

#[tokio::test]
async fn test_create_room_with_invalid_config_is_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    send(
        &mut ws,
        ClientMessage::CreateRoom {
            team_name: "Chennai".into(),
            league: League::Ipl,
            teams_expected: 2,
            team_capacity: 3,
            foreign_cap: 5,
            budget: None,
        },
    )
    .await;
    let event = next_event(&mut ws).await;
    assert!(is_rejected(&event, ErrorKind::Validation), "got {event:?}");
}

#[tokio::test]
async fn test_full_auction_over_websocket() {
    let addr = start_server().await;
    let (mut host, mut guest, room_id) = lobby(&addr).await;

    send(
        &mut host,
        ClientMessage::StartAuction {
            room_id: room_id.clone(),
            team_name: "Chennai".into(),
        },
    )
    .await;
    for ws in [&mut host, &mut guest] {
        assert!(matches!(next_event(ws).await, ServerEvent::AuctionStarted { .. }));
        match next_event(ws).await {
            ServerEvent::CurrentLot { lot, lots_remaining } => {
                assert_eq!(lot.name, "Virat Kohli");
                assert_eq!(lots_remaining, 1);
            }
            other => panic!("expected CurrentLot, got {other:?}"),
        }
        assert!(matches!(
            next_event(ws).await,
            ServerEvent::CountdownStarted { window_ms: 20_000, .. }
        ));
    }

    send(
        &mut guest,
        ClientMessage::PlaceBid {
            room_id: room_id.clone(),
            team_name: "Mumbai".into(),
        },
    )
    .await;
    let bid = wait_for(&mut host, |e| matches!(e, ServerEvent::BidUpdate { .. })).await;
    assert_eq!(
        bid,
        ServerEvent::BidUpdate {
            highest_bid: Amount::crores(2),
            highest_bidder: "Mumbai".into(),
            last_bidder: "Mumbai".into(),
        }
    );

    send(
        &mut host,
        ClientMessage::PassOnLot {
            room_id: room_id.clone(),
            team_name: "Chennai".into(),
        },
    )
    .await;
    for ws in [&mut host, &mut guest] {
        let sold = wait_for(ws, |e| matches!(e, ServerEvent::LotSold { .. })).await;
        let ServerEvent::LotSold { team, price, remaining_budget, .. } = sold else {
            unreachable!()
        };
        assert_eq!(team.as_str(), "Mumbai");
        assert_eq!(price, Amount::crores(2));
        assert_eq!(remaining_budget, Amount::crores(118));

        match next_event(ws).await {
            ServerEvent::AuctionFinished { teams } => {
                let mumbai = teams.iter().find(|t| t.name.as_str() == "Mumbai").unwrap();
                assert_eq!(mumbai.roster.len(), 1);
            }
            other => panic!("expected AuctionFinished, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_rejection_goes_to_requester_only() {
    let addr = start_server().await;
    let (mut host, mut guest, room_id) = lobby(&addr).await;

    send(
        &mut host,
        ClientMessage::StartAuction {
            room_id: room_id.clone(),
            team_name: "Chennai".into(),
        },
    )
    .await;
    let bid = ClientMessage::PlaceBid {
        room_id: room_id.clone(),
        team_name: "Mumbai".into(),
    };
    send(&mut guest, bid.clone()).await;
    wait_for(&mut guest, |e| matches!(e, ServerEvent::BidUpdate { .. })).await;
    wait_for(&mut host, |e| matches!(e, ServerEvent::BidUpdate { .. })).await;

    send(&mut guest, bid).await;
    let event = wait_for(&mut guest, |e| matches!(e, ServerEvent::Rejected { .. })).await;
    assert!(is_rejected(&event, ErrorKind::BusinessRule), "got {event:?}");

    // The host's next event is its own heartbeat reply, not the rejection.
    wait_for(&mut host, |e| matches!(e, ServerEvent::CountdownStarted { .. })).await;
    send(&mut host, ClientMessage::Heartbeat { client_time: 99 }).await;
    let event = next_event(&mut host).await;
    assert!(
        matches!(event, ServerEvent::HeartbeatAck { client_time: 99, .. }),
        "got {event:?}"
    );
}

#[tokio::test]
async fn test_non_host_cannot_start() {
    let addr = start_server().await;
    let (_host, mut guest, room_id) = lobby(&addr).await;

    send(
        &mut guest,
        ClientMessage::StartAuction {
            room_id,
            team_name: "Mumbai".into(),
        },
    )
    .await;
    let event = next_event(&mut guest).await;
    assert!(is_rejected(&event, ErrorKind::Precondition), "got {event:?}");
}

#[tokio::test]
async fn test_reconnect_receives_snapshot() {
    let addr = start_server().await;
    let (mut host, mut guest, room_id) = lobby(&addr).await;

    send(
        &mut host,
        ClientMessage::StartAuction {
            room_id: room_id.clone(),
            team_name: "Chennai".into(),
        },
    )
    .await;
    wait_for(&mut guest, |e| matches!(e, ServerEvent::CountdownStarted { .. })).await;

    guest.close(None).await.unwrap();
    let event = wait_for(&mut host, |e| matches!(e, ServerEvent::TeamConnection { .. })).await;
    assert_eq!(
        event,
        ServerEvent::TeamConnection {
            team: "Mumbai".into(),
            connected: false
        }
    );

    let mut guest = connect(&addr).await;
    handshake(&mut guest).await;
    send(
        &mut guest,
        ClientMessage::JoinRoom {
            room_id: room_id.clone(),
            team_name: "Mumbai".into(),
        },
    )
    .await;

    match next_event(&mut guest).await {
        ServerEvent::AuctionSnapshot {
            room_id: snapshot_room,
            state,
            current_lot,
            teams,
            ..
        } => {
            assert_eq!(snapshot_room, room_id);
            assert_eq!(state, RoomState::Bidding);
            assert!(current_lot.is_some());
            let mumbai = teams.iter().find(|t| t.name.as_str() == "Mumbai").unwrap();
            assert!(mumbai.connected);
            assert_eq!(mumbai.budget, Amount::crores(120));
        }
        other => panic!("expected AuctionSnapshot, got {other:?}"),
    }
    let event = wait_for(&mut host, |e| matches!(e, ServerEvent::TeamConnection { .. })).await;
    assert_eq!(
        event,
        ServerEvent::TeamConnection {
            team: "Mumbai".into(),
            connected: true
        }
    );
}
