//! WebSocket transport over `tokio-tungstenite`.

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::sync::mpsc,
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, trace, warn},
};

use {
    super::{Link, Transport, TransportEvent},
    crate::Result,
};

/// Connects with `tokio_tungstenite::connect_async`; `wss://` uses rustls
/// with the webpki root set.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Link> {
        let (stream, response) = connect_async(url).await?;
        debug!(url, status = %response.status(), "websocket connected");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        // Writer: drain the outbound queue; a dropped sender closes the socket.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "websocket write failed");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: forward text until the socket ends, then report one close.
        tokio::spawn(async move {
            let reason = loop {
                let msg = match source.next().await {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_string(),
                };
                let text = match msg {
                    Message::Text(text) => text.to_string(),
                    Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(len = data.len(), "dropping non-utf8 binary message");
                            continue;
                        },
                    },
                    Message::Close(frame) => {
                        break frame.map_or_else(
                            || "closed by peer".to_string(),
                            |f| format!("closed by peer ({}): {}", u16::from(f.code), f.reason.as_str()),
                        );
                    },
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                };
                trace!(len = text.len(), "websocket message");
                if in_tx.send(TransportEvent::Message(text)).is_err() {
                    return;
                }
            };
            debug!(%reason, "websocket closed");
            let _ = in_tx.send(TransportEvent::Closed { reason });
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
