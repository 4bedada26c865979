use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use super::{Connector, RelayConnection, TransportError, TransportEvent};

/// Relay over WebSocket: one socket per peer at `<relay>?session=<id>`,
/// one text frame per sealed envelope.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

pub fn session_url(relay_address: &str, session_id: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(relay_address)
        .map_err(|_| TransportError::InvalidAddress(relay_address.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(TransportError::InvalidAddress(relay_address.to_string()));
    }
    url.query_pairs_mut().append_pair("session", session_id);
    Ok(url)
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        relay_address: &str,
        session_id: &str,
    ) -> Result<RelayConnection, TransportError> {
        let url = session_url(relay_address, session_id)?;
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(relay = %relay_address, "relay socket open");

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    warn!(error = %e, "relay write failed");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(Message::Text(text)) => TransportEvent::Message(text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(_) => TransportEvent::Error("non-utf8 binary frame".into()),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                };
                if in_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = in_tx.send(TransportEvent::Closed);
        });

        Ok(RelayConnection::new(out_tx, in_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_url_appends_query() {
        let url = session_url("wss://relay.example/ws?region=eu", "abc").unwrap();
        assert_eq!(url.as_str(), "wss://relay.example/ws?region=eu&session=abc");
    }

    #[test]
    fn non_websocket_addresses_are_rejected() {
        assert!(matches!(
            session_url("https://relay.example", "abc"),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!(session_url("not a url", "abc").is_err());
    }
}
