//! WebSocket push channel to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the WebSocket base URL. Each call to
//! [`ComfyUIClient::connect`] opens a dedicated [`ComfyUIConnection`]
//! addressed by the caller's client id; connections are never shared
//! between submissions.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// The raw stream type of a push channel.
pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI push channel endpoint.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
}

/// A live push channel.
pub struct ComfyUIConnection {
    /// Client id sent during the handshake; submissions made with the same
    /// id have their events delivered here.
    pub client_id: String,
    pub ws_stream: WsStream,
}

impl ComfyUIClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// Open the push channel for `client_id`.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(client_id = %client_id, "Opened ComfyUI push channel at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the push channel.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
