use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed by server")]
    Closed,

    #[error("Expected welcome, got {0}")]
    UnexpectedMessage(&'static str),
}
