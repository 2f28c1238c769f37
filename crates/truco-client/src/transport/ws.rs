//! WebSocket push transport.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use truco_core::MatchId;

use crate::{
    authority::{PushChannel, PushTransport},
    error::TransportError,
};

/// Frames buffered between the socket task and the session runtime.
const FRAME_BUFFER: usize = 64;

/// Opens `/ws/matches/{id}` subscriptions.
///
/// `base_url` is the WebSocket origin, e.g. `ws://localhost:8080`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    base_url: String,
}

impl WsTransport {
    /// Transport for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    fn match_url(&self, match_id: &MatchId) -> String {
        format!("{}/ws/matches/{}", self.base_url, match_id)
    }
}

impl PushTransport for WsTransport {
    async fn open(&self, match_id: MatchId) -> Result<PushChannel, TransportError> {
        let url = self.match_url(&match_id);
        let (mut stream, _) =
            connect_async(url.as_str()).await.map_err(|e| TransportError::Connection(e.to_string()))?;
        tracing::debug!(%url, "websocket connected");

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let handle = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text.as_str().to_string(),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "websocket closed by peer");
                        break;
                    },
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket stream error");
                        break;
                    },
                };

                if tx.send(text).await.is_err() {
                    // Subscriber went away.
                    let _ = stream.close(None).await;
                    break;
                }
            }
        });

        Ok(PushChannel::new(rx, Some(handle.abort_handle())))
    }
}
