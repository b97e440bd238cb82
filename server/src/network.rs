//! Server network layer: WebSocket sessions and HTTP probes
//!
//! Each accepted WebSocket gets a bounded outbox and two tasks. The writer
//! drains the outbox into the socket, giving up on a write that exceeds the
//! send timeout. The reader decodes client frames and forwards them to the
//! session queue. Whichever task ends first tears the connection down and the
//! session is told exactly once that the player left.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::session::{LobbySession, SessionEvent, SessionSnapshot};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::json;
use shared::{ClientMessage, PlayerId, ServerMessage};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// Handles shared by every HTTP/WebSocket request
#[derive(Clone)]
pub struct AppState {
    events: mpsc::Sender<SessionEvent>,
    outbox_capacity: usize,
    send_timeout: Duration,
}

impl AppState {
    pub fn new(
        events: mpsc::Sender<SessionEvent>,
        outbox_capacity: usize,
        send_timeout: Duration,
    ) -> Self {
        Self {
            events,
            outbox_capacity,
            send_timeout,
        }
    }
}

/// Routes: `/ws` for players, `/` for liveness, `/status` for a session snapshot
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/status", get(status))
        .route("/ws", get(websocket))
        .with_state(state)
}

/// Lobby server bound to a socket, ready to run
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the session coordinator and serves connections until the
    /// listener fails or the coordinator dies.
    pub async fn run(self) -> Result<(), ServerError> {
        let (events_tx, events_rx) = mpsc::channel(self.config.event_queue);
        let session = LobbySession::new(self.config.session_config());
        let mut coordinator = tokio::spawn(session.run(events_rx));

        let state = AppState::new(
            events_tx,
            self.config.outbox_capacity,
            self.config.send_timeout(),
        );
        let serve = axum::serve(self.listener, router(state)).into_future();

        tokio::select! {
            result = serve => {
                coordinator.abort();
                result?;
                Ok(())
            }
            result = &mut coordinator => {
                if let Err(e) = result {
                    error!("Session coordinator failed: {}", e);
                }
                Err(ServerError::SessionStopped)
            }
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<AppState>) -> Result<Json<SessionSnapshot>, StatusCode> {
    let (reply, reply_rx) = oneshot::channel();
    state
        .events
        .send(SessionEvent::Snapshot { reply })
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    reply_rx
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (outbox, inbox) = mpsc::channel(state.outbox_capacity);
    let (reply, reply_rx) = oneshot::channel();

    if state
        .events
        .send(SessionEvent::Connect { outbox, reply })
        .await
        .is_err()
    {
        error!("Session coordinator is gone, refusing connection");
        return;
    }
    let player_id = match reply_rx.await {
        Ok(id) => id,
        Err(_) => {
            error!("Session coordinator dropped the registration");
            return;
        }
    };

    let (ws_sender, ws_receiver) = socket.split();
    let mut writer = tokio::spawn(handle_outgoing_messages(
        player_id,
        inbox,
        ws_sender,
        state.send_timeout,
    ));
    let mut reader = tokio::spawn(handle_incoming_messages(
        player_id,
        ws_receiver,
        state.events.clone(),
    ));

    tokio::select! {
        result = &mut writer => {
            if let Err(e) = result {
                error!("Writer task for player {} failed: {}", player_id, e);
            }
            reader.abort();
        }
        result = &mut reader => {
            if let Err(e) = result {
                error!("Reader task for player {} failed: {}", player_id, e);
            }
            writer.abort();
        }
    }

    info!("Player {} disconnected", player_id);
    if state
        .events
        .send(SessionEvent::Disconnect { id: player_id })
        .await
        .is_err()
    {
        warn!("Session coordinator is gone, dropping disconnect of {}", player_id);
    }
}

async fn handle_outgoing_messages(
    player_id: PlayerId,
    mut inbox: mpsc::Receiver<ServerMessage>,
    mut ws_sender: SplitSink<WebSocket, Message>,
    send_timeout: Duration,
) {
    while let Some(message) = inbox.recv().await {
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {}: {}", message.kind(), e);
                continue;
            }
        };

        match timeout(send_timeout, ws_sender.send(Message::Text(text))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Send to player {} failed: {}", player_id, e);
                break;
            }
            Err(_) => {
                warn!(
                    "Send to player {} timed out after {:?}, dropping connection",
                    player_id, send_timeout
                );
                // A close frame would queue behind the stalled write
                return;
            }
        }
    }

    if timeout(send_timeout, ws_sender.close()).await.is_err() {
        debug!("Close handshake with player {} timed out", player_id);
    }
}

async fn handle_incoming_messages(
    player_id: PlayerId,
    mut ws_receiver: SplitStream<WebSocket>,
    events: mpsc::Sender<SessionEvent>,
) {
    while let Some(frame) = ws_receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Receive from player {} failed: {}", player_id, e);
                break;
            }
        };

        let message = match ClientMessage::decode(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring frame from player {}: {}", player_id, e);
                continue;
            }
        };

        debug!("Player {} sent {:?}", player_id, message);
        if events
            .send(SessionEvent::Message {
                id: player_id,
                message,
            })
            .await
            .is_err()
        {
            break;
        }
    }
}
