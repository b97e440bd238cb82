use crate::error::ClientError;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// WebSocket connection to the lobby server speaking the JSON protocol
pub struct Connection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (stream, _) = connect_async(url).await?;
        info!("Connected to {}", url);
        Ok(Connection { stream })
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let text = message.encode()?;
        self.send_text(text).await
    }

    /// Sends a raw text frame, bypassing the protocol types
    pub async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Waits for the next server message, skipping control frames.
    pub async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => {
                    let message = ServerMessage::decode(&text)?;
                    debug!("Received {}", message.kind());
                    return Ok(message);
                }
                Message::Close(_) => return Err(ClientError::Closed),
                _ => continue,
            }
        }
        Err(ClientError::Closed)
    }

    /// Like [`Connection::recv`], but gives up after `limit` with `Ok(None)`.
    pub async fn recv_timeout(
        &mut self,
        limit: Duration,
    ) -> Result<Option<ServerMessage>, ClientError> {
        match timeout(limit, self.recv()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
