//! Integration tests for the race lobby server
//!
//! These tests bind a real server on an ephemeral port and talk to it over
//! WebSocket and plain HTTP.

use client::network::Connection;
use server::color::PALETTE;
use server::config::ServerConfig;
use server::network::Server;
use shared::{ClientMessage, PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const RECV_LIMIT: Duration = Duration::from_secs(5);

/// Starts a server with a fast countdown and returns its address
async fn start_server() -> SocketAddr {
    start_server_with(ServerConfig {
        port: 0,
        countdown_tick_ms: 20,
        color_seed: Some(1),
        ..ServerConfig::default()
    })
    .await
}

async fn start_server_with(config: ServerConfig) -> SocketAddr {
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{}/ws", addr)
}

async fn recv(connection: &mut Connection) -> ServerMessage {
    connection
        .recv_timeout(RECV_LIMIT)
        .await
        .unwrap()
        .expect("timed out waiting for server message")
}

/// Reads messages until one of `kind` arrives, returning everything seen
async fn recv_until(connection: &mut Connection, kind: &str) -> Vec<ServerMessage> {
    let mut seen = Vec::new();
    loop {
        let message = recv(connection).await;
        let done = message.kind() == kind;
        seen.push(message);
        if done {
            return seen;
        }
    }
}

async fn join(addr: SocketAddr) -> (Connection, PlayerId, shared::Color) {
    let mut connection = Connection::connect(&ws_url(addr)).await.unwrap();
    match recv(&mut connection).await {
        ServerMessage::Welcome { id, color } => (connection, id, color),
        other => panic!("Expected welcome, got {:?}", other),
    }
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

async fn status(addr: SocketAddr) -> serde_json::Value {
    let response = http_get(addr, "/status").await;
    let body = response
        .split("\r\n\r\n")
        .nth(1)
        .expect("response body");
    serde_json::from_str(body).unwrap()
}

async fn wait_for_players(addr: SocketAddr, count: usize) {
    for _ in 0..100 {
        let snapshot = status(addr).await;
        if snapshot["players"].as_array().map(Vec::len) == Some(count) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Server never registered {} players", count);
}

/// LOBBY AND RACE FLOW TESTS
mod race_flow_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Two players join, ready up, race and receive ranked results
    #[tokio::test]
    async fn full_race_between_two_players() {
        let addr = start_server().await;

        let (mut a, id_a, color_a) = join(addr).await;
        let (mut b, id_b, color_b) = join(addr).await;
        assert_eq!(color_a, PALETTE[0]);
        assert_eq!(color_b, PALETTE[1]);

        a.send(&ClientMessage::Ready).await.unwrap();
        b.send(&ClientMessage::Ready).await.unwrap();

        for connection in [&mut a, &mut b] {
            let seen = recv_until(connection, "game_start").await;
            let countdown: Vec<u8> = seen
                .iter()
                .filter_map(|m| match m {
                    ServerMessage::Countdown { value } => Some(*value),
                    _ => None,
                })
                .collect();
            assert_eq!(countdown, vec![3, 2, 1]);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        a.send(&ClientMessage::Finish).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        b.send(&ClientMessage::Finish).await.unwrap();

        for connection in [&mut a, &mut b] {
            let seen = recv_until(connection, "game_over").await;
            let finished = seen
                .iter()
                .filter(|m| m.kind() == "player_finished")
                .count();
            assert_eq!(finished, 2);

            match seen.last() {
                Some(ServerMessage::GameOver { results }) => {
                    assert_eq!(results.len(), 2);
                    assert_eq!(results[0].id, id_a);
                    assert_eq!(results[1].id, id_b);
                    let first = results[0].time.unwrap();
                    let second = results[1].time.unwrap();
                    assert!(first >= 0.1);
                    assert!(second > first);
                    assert_approx_eq!(second - first, 0.15, 0.1);
                }
                other => panic!("Expected game_over, got {:?}", other),
            }
        }

        let snapshot = status(addr).await;
        assert_eq!(snapshot["phase"], "LOBBY");
        assert_eq!(snapshot["players"].as_array().unwrap().len(), 2);
    }

    /// Position updates reach other players but are not echoed
    #[tokio::test]
    async fn position_updates_are_relayed() {
        let addr = start_server().await;
        let (mut a, id_a, color_a) = join(addr).await;
        let (mut b, _id_b, _) = join(addr).await;

        a.send(&ClientMessage::UpdatePosition {
            x: 12.0,
            z: -7.5,
            lap: 2,
        })
        .await
        .unwrap();

        let seen = recv_until(&mut b, "player_update").await;
        assert_eq!(
            seen.last(),
            Some(&ServerMessage::PlayerUpdate {
                id: id_a,
                x: 12.0,
                z: -7.5,
                lap: 2,
                color: color_a,
            })
        );

        // A only ever sees lobby traffic
        while let Some(message) = a.recv_timeout(Duration::from_millis(200)).await.unwrap() {
            assert_ne!(message.kind(), "player_update");
        }
    }

    /// Malformed frames are dropped without closing the connection
    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let addr = start_server().await;
        let (mut a, id_a, _) = join(addr).await;
        let (mut b, _, _) = join(addr).await;

        a.send_text("not json".to_string()).await.unwrap();
        a.send_text(r#"{"type":"teleport"}"#.to_string()).await.unwrap();
        a.send_text(r#"{"type":"update_position"}"#.to_string())
            .await
            .unwrap();

        // Missing fields fall back to the origin on lap one
        let seen = recv_until(&mut b, "player_update").await;
        match seen.last() {
            Some(ServerMessage::PlayerUpdate { id, x, z, lap, .. }) => {
                assert_eq!(*id, id_a);
                assert_eq!(*x, 0.0);
                assert_eq!(*z, 0.0);
                assert_eq!(*lap, 1);
            }
            other => panic!("Expected player_update, got {:?}", other),
        }

        // The connection survived and still drives the lobby
        a.send(&ClientMessage::Ready).await.unwrap();
        loop {
            if let ServerMessage::LobbyUpdate { players, .. } = recv(&mut a).await {
                if players.iter().any(|p| p.id == id_a && p.ready) {
                    break;
                }
            }
        }
    }

    /// Leaving frees the colour and the last leaver resets the lobby
    #[tokio::test]
    async fn disconnects_release_colors_and_reset() {
        let addr = start_server().await;
        let (a, _, color_a) = join(addr).await;
        let (mut b, _, _) = join(addr).await;

        b.send(&ClientMessage::Ready).await.unwrap();
        a.close().await.unwrap();

        // B is now the only player and already ready, so the countdown starts
        recv_until(&mut b, "game_start").await;

        let (c, _, color_c) = join(addr).await;
        assert_eq!(color_c, color_a);
        let snapshot = status(addr).await;
        assert_eq!(snapshot["phase"], "RACING");
        let players = snapshot["players"].as_array().unwrap();
        assert!(players
            .iter()
            .any(|p| p["spectating"] == serde_json::Value::Bool(true)));

        b.close().await.unwrap();
        c.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = status(addr).await;
        assert_eq!(snapshot["phase"], "LOBBY");
        assert!(snapshot["players"].as_array().unwrap().is_empty());

        let (_d, _, color_d) = join(addr).await;
        assert_eq!(color_d, PALETTE[0]);
    }
}

/// SCRIPTED CLIENT TESTS
mod racer_tests {
    use super::*;
    use client::racer::{Racer, RacerConfig};

    /// Two scripted racers complete a race against a live server
    #[tokio::test]
    async fn scripted_racers_complete_a_race() {
        let addr = start_server().await;
        let config = RacerConfig {
            laps: 2,
            lap_time: Duration::from_millis(60),
            update_interval: Duration::from_millis(10),
            pace_jitter: 0.0,
        };

        // Both must be registered before either readies, or the first
        // racer would start a solo race and the second would spectate
        let mut connections = Vec::new();
        for _ in 0..2 {
            connections.push(Connection::connect(&ws_url(addr)).await.unwrap());
        }
        wait_for_players(addr, 2).await;

        let mut handles = Vec::new();
        for mut connection in connections {
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                Racer::new(config).run(&mut connection).await.unwrap()
            }));
        }

        let mut places = Vec::new();
        for handle in handles {
            let outcome = tokio::time::timeout(RECV_LIMIT, handle)
                .await
                .expect("race took too long")
                .unwrap();
            assert_eq!(outcome.results.len(), 2);
            assert!(outcome.results.iter().all(|r| r.time.is_some()));
            places.push(outcome.place().unwrap());
        }

        places.sort();
        assert_eq!(places, vec![1, 2]);
    }
}

/// SLOW CONSUMER TESTS
mod slow_consumer_tests {
    use super::*;
    use tokio::net::TcpSocket;

    /// A player that stops reading is removed once a send to it times out
    #[tokio::test]
    async fn stalled_reader_is_disconnected() {
        let addr = start_server_with(ServerConfig {
            port: 0,
            send_timeout_ms: 200,
            ..ServerConfig::default()
        })
        .await;

        // Tiny receive window and never polled, so server writes back up
        let socket = TcpSocket::new_v4().unwrap();
        socket.set_recv_buffer_size(2048).unwrap();
        let stream = socket.connect(addr).await.unwrap();
        let url = ws_url(addr);
        let (_stalled, _response) = tokio_tungstenite::client_async(url.as_str(), stream)
            .await
            .unwrap();
        wait_for_players(addr, 1).await;

        let (mut flooder, flooder_id, _) = join(addr).await;
        let flood = tokio::spawn(async move {
            let mut step = 0u64;
            loop {
                let message = ClientMessage::UpdatePosition {
                    x: step as f64,
                    z: 0.0,
                    lap: 1,
                };
                if flooder.send(&message).await.is_err() {
                    break;
                }
                step += 1;
            }
        });

        let mut remaining = Vec::new();
        for _ in 0..300 {
            let snapshot = status(addr).await;
            remaining = snapshot["players"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["id"].as_str().unwrap().to_string())
                .collect();
            if remaining.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        flood.abort();

        assert_eq!(remaining, vec![flooder_id.to_string()]);
    }
}

/// HTTP PROBE TESTS
mod http_tests {
    use super::*;

    /// Health answers regardless of session state
    #[tokio::test]
    async fn health_check_responds() {
        let addr = start_server().await;
        let (_a, _, _) = join(addr).await;

        let response = http_get(addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#"{"status":"ok"}"#));
    }
}
