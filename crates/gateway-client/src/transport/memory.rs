//! In-process transport. Each `connect` hands a [`ServerEnd`] to the paired
//! [`MemoryAcceptor`], which plays the gateway.
//!
//! Test support only. Nothing here is covered by semver.

use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicUsize, Ordering},
};

use {
    agentfield_protocol::{
        CONNECT_METHOD, ConnectParams, ErrorShape, EventFrame, Features, GatewayFrame, HelloOk,
        PROTOCOL_VERSION, Policy, RequestFrame, ResponseFrame, ServerInfo, Snapshot, decode,
        encode,
    },
    async_trait::async_trait,
    tokio::sync::mpsc,
};

use {
    super::{Link, Transport, TransportEvent},
    crate::{Error, Result},
};

#[derive(Debug, Clone)]
pub struct MemoryTransport {
    accept_tx: mpsc::UnboundedSender<ServerEnd>,
    refuse: Arc<AtomicU32>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryAcceptor) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let transport = Self {
            accept_tx,
            refuse: Arc::new(AtomicU32::new(0)),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        (transport, MemoryAcceptor { rx: accept_rx })
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: u32) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Total `connect` calls, refused ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, url: &str) -> Result<Link> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::message(format!("connection to {url} refused")));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let server = ServerEnd {
            url: url.to_string(),
            to_client: in_tx,
            from_client: out_rx,
        };
        self.accept_tx
            .send(server)
            .map_err(|_| Error::message("memory acceptor dropped"))?;
        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[derive(Debug)]
pub struct MemoryAcceptor {
    rx: mpsc::UnboundedReceiver<ServerEnd>,
}

impl MemoryAcceptor {
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.rx.recv().await
    }

    /// Accept and complete the handshake with [`hello`]`(conn_id)`.
    pub async fn accept_hello(&mut self, conn_id: &str) -> Option<(ServerEnd, ConnectParams)> {
        let mut server = self.accept().await?;
        let params = server.handshake(hello(conn_id)).await?;
        Some((server, params))
    }
}

/// Gateway side of one in-memory connection.
#[derive(Debug)]
pub struct ServerEnd {
    pub url: String,
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// Next raw text from the client; `None` once the client dropped the link.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next request frame, skipping anything that is not one.
    pub async fn recv_request(&mut self) -> Option<RequestFrame> {
        loop {
            let text = self.recv_text().await?;
            if let Ok(GatewayFrame::Request(req)) = decode(&text) {
                return Some(req);
            }
        }
    }

    /// Read the `connect` request and answer it with `hello`.
    pub async fn handshake(&mut self, hello: HelloOk) -> Option<ConnectParams> {
        let req = self.recv_request().await?;
        if req.method != CONNECT_METHOD {
            return None;
        }
        let params = serde_json::from_value(req.params.clone()?).ok()?;
        let payload = serde_json::to_value(hello).ok()?;
        self.respond_ok(&req.id, payload);
        Some(params)
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client
            .send(TransportEvent::Message(text.into()))
            .is_ok()
    }

    pub fn send(&self, frame: &GatewayFrame) -> bool {
        self.send_text(encode(frame))
    }

    pub fn respond_ok(&self, id: &str, payload: serde_json::Value) -> bool {
        self.send(&GatewayFrame::Response(ResponseFrame::ok(id, payload)))
    }

    pub fn respond_err(&self, id: &str, code: &str, message: &str) -> bool {
        self.send(&GatewayFrame::Response(ResponseFrame::err(
            id,
            ErrorShape::new(code, message),
        )))
    }

    pub fn event(&self, frame: EventFrame) -> bool {
        self.send(&GatewayFrame::Event(frame))
    }

    /// Drop the link from the gateway side.
    pub fn close(self, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Closed {
            reason: reason.to_string(),
        });
    }

    /// Whether the client has released its side of the link.
    pub fn client_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}

/// A minimal successful handshake payload.
pub fn hello(conn_id: &str) -> HelloOk {
    HelloOk {
        protocol: PROTOCOL_VERSION,
        server: ServerInfo {
            version: "test".into(),
            commit: None,
            host: None,
            conn_id: conn_id.to_string(),
        },
        features: Features::default(),
        snapshot: Snapshot::default(),
        policy: Policy::default(),
        auth: None,
    }
}
